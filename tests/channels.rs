mod helpers;

use helpers::instant_retry;
use jwquant_notify::config::EmailConfig;
use jwquant_notify::core::Notifier;
use jwquant_notify::notification::{
    dingtalk, DingTalkNotifier, EmailNotifier, WeChatNotifier, WeChatProvider,
};
use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;
use tracing_test::traced_test;

// Nothing listens on the discard port, so every attempt fails at connect.
const UNREACHABLE: &str = "http://127.0.0.1:9";

#[test]
fn test_serverchan_posts_form_and_accepts_code_zero() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/SCT123.send")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("title".into(), "成交通知".into()),
            Matcher::UrlEncoded("desp".into(), "### 委托成交".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(r#"{"code":0,"message":"","data":{}}"#)
        .expect(1)
        .create();

    let (retry, sleeper) = instant_retry(3);
    let notifier = WeChatNotifier::new(WeChatProvider::ServerChan, "SCT123")
        .with_base_url(server.url())
        .with_retry(retry);

    assert!(notifier.send("成交通知", "### 委托成交"));
    mock.assert();
    assert!(sleeper.slept.lock().unwrap().is_empty());
}

#[test]
fn test_serverchan_rejection_is_retried_with_backoff() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/SCT123.send")
        .with_body(r#"{"code":40001,"message":"bad key"}"#)
        .expect(3)
        .create();

    let (retry, sleeper) = instant_retry(3);
    let notifier = WeChatNotifier::new(WeChatProvider::ServerChan, "SCT123")
        .with_base_url(server.url())
        .with_retry(retry);

    assert!(!notifier.send("t", "b"));
    mock.assert();
    assert_eq!(
        *sleeper.slept.lock().unwrap(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[test]
fn test_pushplus_posts_markdown_json_and_accepts_code_200() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/send")
        .match_body(Matcher::Json(json!({
            "token": "PP-TOKEN",
            "title": "风控预警",
            "content": "仓位超限",
            "template": "markdown",
        })))
        .with_body(r#"{"code":200,"msg":"请求成功"}"#)
        .create();

    let (retry, _) = instant_retry(1);
    let notifier = WeChatNotifier::new(WeChatProvider::PushPlus, "PP-TOKEN")
        .with_base_url(server.url())
        .with_retry(retry);

    assert!(notifier.send("风控预警", "仓位超限"));
    mock.assert();
}

#[test]
fn test_pushplus_code_zero_is_not_success() {
    let mut server = Server::new();
    let _mock = server
        .mock("POST", "/send")
        .with_body(r#"{"code":0}"#)
        .create();

    let (retry, _) = instant_retry(1);
    let notifier = WeChatNotifier::new(WeChatProvider::PushPlus, "PP-TOKEN")
        .with_base_url(server.url())
        .with_retry(retry);

    assert!(!notifier.send("t", "b"));
}

#[test]
fn test_non_json_error_response_is_retried() {
    let mut server = Server::new();
    let failing = server
        .mock("POST", "/SCT123.send")
        .with_status(502)
        .with_body("bad gateway")
        .expect(2)
        .create();

    let (retry, sleeper) = instant_retry(2);
    let notifier = WeChatNotifier::new(WeChatProvider::ServerChan, "SCT123")
        .with_base_url(server.url())
        .with_retry(retry);

    assert!(!notifier.send("t", "b"));
    failing.assert();
    assert_eq!(*sleeper.slept.lock().unwrap(), vec![Duration::from_secs(1)]);
}

#[test]
#[traced_test]
fn test_serverchan_transport_error_does_not_log_token() {
    let (retry, _) = instant_retry(1);
    let notifier = WeChatNotifier::new(WeChatProvider::ServerChan, "SCTSECRETTOKEN")
        .with_base_url(UNREACHABLE)
        .with_retry(retry);

    assert!(!notifier.send("t", "b"));
    assert!(logs_contain("Attempt failed"));
    assert!(!logs_contain("SCTSECRETTOKEN"));
}

#[test]
fn test_dingtalk_signed_markdown_request() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/robot/send")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("access_token".into(), "abc".into()),
            Matcher::Regex(r"timestamp=\d{13}".into()),
            Matcher::Regex("sign=".into()),
        ]))
        .match_body(Matcher::Json(json!({
            "msgtype": "markdown",
            "markdown": {
                "title": "系统异常",
                "text": "## 系统异常\n\n行情断线",
            },
        })))
        .with_body(r#"{"errcode":0,"errmsg":"ok"}"#)
        .expect(1)
        .create();

    let (retry, _) = instant_retry(3);
    let notifier = DingTalkNotifier::new(
        format!("{}/robot/send?access_token=abc", server.url()),
        "SEC123",
    )
    .with_retry(retry);

    assert!(notifier.send("系统异常", "行情断线"));
    mock.assert();
}

#[test]
fn test_dingtalk_nonzero_errcode_is_failure() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/robot/send")
        .with_body(r#"{"errcode":310000,"errmsg":"sign not match"}"#)
        .expect(2)
        .create();

    let (retry, sleeper) = instant_retry(2);
    let notifier = DingTalkNotifier::new(format!("{}/robot/send", server.url()), "")
        .with_retry(retry);

    assert!(!notifier.send("t", "b"));
    mock.assert();
    assert_eq!(sleeper.slept.lock().unwrap().len(), 1);
}

#[test]
#[traced_test]
fn test_dingtalk_transport_error_does_not_log_access_token() {
    let (retry, _) = instant_retry(1);
    let notifier = DingTalkNotifier::new(
        format!("{UNREACHABLE}/robot/send?access_token=DTSECRETTOKEN"),
        "SEC123",
    )
    .with_retry(retry);

    assert!(!notifier.send("t", "b"));
    assert!(logs_contain("Attempt failed"));
    assert!(!logs_contain("DTSECRETTOKEN"));
    assert!(!logs_contain("sign="));
}

#[test]
fn test_dingtalk_signature_known_vector() {
    assert_eq!(
        dingtalk::sign("SEC123", 1_700_000_000_000).unwrap(),
        "lkcPI1uoxBY1gUnCnnPH1Kkru0Hqjo7rFpA3haIVhEQ%3D"
    );
}

#[test]
fn test_email_unreachable_server_exhausts_retries() {
    let config = EmailConfig {
        smtp_server: "127.0.0.1".to_string(),
        smtp_port: 1,
        from_addr: "bot@example.com".to_string(),
        to_addrs: vec!["ops@example.com".to_string()],
        use_tls: false,
        ..Default::default()
    };
    let (retry, sleeper) = instant_retry(2);
    let notifier = EmailNotifier::new(config).with_retry(retry);

    assert!(!notifier.send("t", "b"));
    assert_eq!(*sleeper.slept.lock().unwrap(), vec![Duration::from_secs(1)]);
}

#[test]
fn test_email_bad_recipient_is_not_retried() {
    let config = EmailConfig {
        smtp_server: "127.0.0.1".to_string(),
        from_addr: "bot@example.com".to_string(),
        to_addrs: vec!["definitely not an address".to_string()],
        ..Default::default()
    };
    let (retry, sleeper) = instant_retry(3);
    let notifier = EmailNotifier::new(config).with_retry(retry);

    assert!(!notifier.send("t", "b"));
    assert!(sleeper.slept.lock().unwrap().is_empty());
}
