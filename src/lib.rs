//! JWQuant notify - event distribution and alert delivery
//!
//! This library provides the in-process event bus used by the trading core
//! and the notification router that delivers alerts to WeChat, DingTalk and
//! email with severity routing, rate limiting and retry.

pub mod cli;
pub mod config;
pub mod core;
pub mod events;
pub mod notification;
pub mod rate_limit;
pub mod retry;
pub mod telemetry;

// Re-export core types for convenience
pub use crate::core::*;
pub use events::{EventBus, EventType};
pub use notification::{render_template, Message, NotificationRouter, TemplateError};
