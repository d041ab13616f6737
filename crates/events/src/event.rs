use chrono::{DateTime, Utc};

/// A pipeline event.
///
/// Events are immutable facts carrying a stable type name and schema version so
/// they can be serialized onto external transports.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "knowledge.entry.updated").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred.
    fn occurred_at(&self) -> DateTime<Utc>;
}
