//! Turns trading events on the bus into outbound notifications.

use super::router::NotificationRouter;
use super::templates::Message;
use crate::core::Level;
use crate::events::{handler, EventBus, EventType, Payload, SubscriptionId};
use serde_json::Value;
use std::sync::Arc;

/// Alert handlers run after every other subscriber of the same event.
pub const ALERT_PRIORITY: i32 = -100;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

struct AlertRoute {
    event_type: &'static str,
    template: &'static str,
    title: &'static str,
    level: fn(&Payload) -> Level,
}

static ROUTES: &[AlertRoute] = &[
    AlertRoute {
        event_type: EventType::ORDER_FILLED,
        template: "order_filled",
        title: "委托成交",
        level: |_| Level::Info,
    },
    AlertRoute {
        event_type: EventType::RISK_VIOLATION,
        template: "risk_alert",
        title: "风控预警",
        level: severity_level,
    },
    AlertRoute {
        event_type: EventType::SYSTEM_ERROR,
        template: "system_error",
        title: "系统异常",
        level: |_| Level::Error,
    },
    AlertRoute {
        event_type: EventType::DAILY_BRIEFING,
        template: "daily_briefing",
        title: "每日投资晨报",
        level: |_| Level::Info,
    },
];

/// A risk payload's `severity` field, defaulting to WARNING.
fn severity_level(payload: &Payload) -> Level {
    payload
        .get("severity")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::Warning)
}

/// The payload as template variables, with `timestamp` filled in if absent.
fn template_vars(payload: &Payload) -> Value {
    let mut vars = payload.clone();
    if let Some(map) = vars.as_object_mut() {
        map.entry("timestamp").or_insert_with(|| {
            Value::String(chrono::Local::now().format(TIMESTAMP_FORMAT).to_string())
        });
    }
    vars
}

/// Subscribes `router` to the order fill, risk violation, system error and
/// daily briefing events.
///
/// A payload missing a template variable makes the handler fail; the bus logs
/// it and carries on.
pub fn subscribe_alerts(bus: &EventBus, router: Arc<NotificationRouter>) -> Vec<SubscriptionId> {
    ROUTES
        .iter()
        .map(|route| {
            let router = router.clone();
            let on_event = handler(move |payload| {
                let level = (route.level)(payload);
                let message = Message::template(route.template, template_vars(payload));
                router.notify(route.title, message, level.as_str())?;
                Ok(())
            });
            bus.subscribe(route.event_type, on_event, ALERT_PRIORITY)
        })
        .collect()
}
