//! Delivery fan-out
//!
//! Sends one event's routes to the notifier sink concurrently and waits for
//! all of them before returning. A failed delivery is logged and counted; it
//! never stops delivery to the other tenants.

use futures::future::join_all;
use reddisc_core::sink::NotifierSink;
use tracing::{debug, warn};

use crate::router::Route;

/// Outcome counts for one event's deliveries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
    /// Tenants without a destination channel
    pub skipped: usize,
}

enum Outcome {
    Delivered,
    Failed,
    Skipped,
}

/// Deliver every route through the sink
pub async fn deliver(routes: &[Route], sink: &dyn NotifierSink) -> DeliveryReport {
    let sends = routes.iter().map(|route| async move {
        let Some(destination) = route.destination.as_deref() else {
            warn!(
                "Tenant {} matched but has no destination channel; skipping",
                route.tenant_id
            );
            return Outcome::Skipped;
        };

        let text = route.payload.render();
        match sink.send(destination, &text).await {
            Ok(()) => {
                debug!("Delivered to tenant {} (channel {})", route.tenant_id, destination);
                Outcome::Delivered
            }
            Err(e) => {
                warn!(
                    "Delivery to tenant {} (channel {}) failed: {}",
                    route.tenant_id, destination, e
                );
                Outcome::Failed
            }
        }
    });

    join_all(sends)
        .await
        .into_iter()
        .fold(DeliveryReport::default(), |mut report, outcome| {
            match outcome {
                Outcome::Delivered => report.delivered += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Skipped => report.skipped += 1,
            }
            report
        })
}
