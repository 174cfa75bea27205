//! Bus-to-connection fan-out.
//!
//! One task per server instance drains the bus receiver and hands each
//! payload, verbatim, to every local connection registered against the
//! payload's article. Delivery is fire-and-forget; a dead connection
//! drops its copy without affecting the others.

use crate::handlers::AppState;
use crate::metrics;
use std::sync::Arc;
use tracing::{debug, warn};
use wordwire_core::BusDirective;
use wordwire_protocol::{article_of_channel, update_channel};
use wordwire_store::BusReceiver;

/// Fan bus messages out to local connections until the bus closes.
pub async fn run_bridge(state: Arc<AppState>, mut rx: BusReceiver) {
    while let Some(msg) = rx.recv().await {
        let Some(article_id) = article_of_channel(&msg.channel) else {
            continue;
        };
        metrics::record_message(msg.payload.len(), "fanout");
        state.presence().broadcast_raw(article_id, &msg.payload);
    }
    debug!("Bus receiver closed; bridge task ending");
}

/// Execute the bus directives a presence mutation produced, outside the
/// registry lock. Failures are logged and absorbed; the worst case is a
/// subscription that lingers until the article empties again.
pub async fn apply_directives(state: &AppState, directives: Vec<BusDirective>) {
    for directive in directives {
        let result = match &directive {
            BusDirective::Subscribe(article_id) => {
                state.bus.subscribe(&update_channel(article_id)).await
            }
            BusDirective::Unsubscribe(article_id) => {
                state.bus.unsubscribe(&update_channel(article_id)).await
            }
        };
        if let Err(err) = result {
            warn!(?directive, error = %err, "Bus directive failed");
            metrics::record_error("bus");
        }
    }
}
