//! Well-known event type tags.
//!
//! Tags are plain strings so components can define their own, but everything
//! the trading core publishes goes through these constants.

/// Namespace of the built-in event type tags.
pub struct EventType;

impl EventType {
    // Market data
    pub const BAR: &'static str = "event.market.bar";
    pub const TICK: &'static str = "event.market.tick";

    // Strategy
    pub const SIGNAL: &'static str = "event.strategy.signal";

    // Order lifecycle
    pub const ORDER_SUBMITTED: &'static str = "event.order.submitted";
    pub const ORDER_FILLED: &'static str = "event.order.filled";
    pub const ORDER_CANCELLED: &'static str = "event.order.cancelled";
    pub const ORDER_REJECTED: &'static str = "event.order.rejected";

    // Risk
    pub const RISK_VIOLATION: &'static str = "event.risk.violation";

    // System
    pub const SYSTEM_ERROR: &'static str = "event.system.error";
    pub const DAILY_BRIEFING: &'static str = "event.system.daily_briefing";

    /// Market data types fire at high frequency and are usually published
    /// with the audit line switched off.
    pub fn is_high_frequency(event_type: &str) -> bool {
        matches!(event_type, Self::BAR | Self::TICK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_constants() {
        assert_eq!(EventType::BAR, "event.market.bar");
        assert_eq!(EventType::ORDER_FILLED, "event.order.filled");
        assert_eq!(EventType::RISK_VIOLATION, "event.risk.violation");
    }

    #[test]
    fn test_market_data_is_high_frequency() {
        assert!(EventType::is_high_frequency(EventType::TICK));
        assert!(!EventType::is_high_frequency(EventType::ORDER_FILLED));
    }
}
