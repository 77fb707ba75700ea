use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::facade::PoolFacade;

/// Periodically writes `Expired` onto lapsed confirmation windows and
/// invitations. Reads already treat them as expired; this keeps the stored
/// state and emitted events in step.
pub async fn start_expiry_worker(facade: Arc<PoolFacade>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!("Expiry worker started, sweeping every {:?}", every);

    loop {
        ticker.tick().await;
        match facade.sweep_expired().await {
            Ok((0, 0)) => {}
            Ok((trips, invitations)) => {
                info!("Expired {} confirmation windows and {} invitations", trips, invitations);
            }
            Err(e) => error!("Expiry sweep failed: {}", e),
        }
    }
}
