use crate::models::MarketEvent;

/// A sink for the reporting, notification and audit subsystems.
///
/// Delivery is fire-and-forget: the engine never waits on, or learns the
/// fate of, a notification.
pub trait Notifier: Send + Sync + 'static {
    /// Hand an event to the sink
    fn notify(&self, event: MarketEvent);
}

/// A notifier that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: MarketEvent) {}
}
