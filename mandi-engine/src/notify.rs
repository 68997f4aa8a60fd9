use mandi_core::models::MarketEvent;
use mandi_core::ports::Notifier;
use tracing::{error, info};

/// A notifier that writes every event to the `tracing` subscriber.
///
/// Failed settlements and forced closes need an operator and are logged at
/// error level; everything else is informational.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: MarketEvent) {
        match &event {
            MarketEvent::SettlementFailed {
                bid_id,
                lot_id,
                reason,
            } => error!(%bid_id, %lot_id, %reason, "settlement failed"),
            MarketEvent::LotForceClosed {
                lot_id,
                attempt_number,
            } => error!(%lot_id, attempt_number, "lot force-closed by reconciliation"),
            other => info!(event = ?other, "market event"),
        }
    }
}
