//! Cross-client logout propagation.
//!
//! A logout writes a marker key into the shared store; every other client
//! watching the same store observes the change and tears its session down
//! locally without calling the backend again.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::store::tokens::LOGOUT_EVENT_KEY;
use crate::store::ClientStore;

use super::LogoutReason;

/// Watch the store for logout markers written by other clients. Runs until
/// the store's change channel closes.
pub fn spawn_observer(
    store: Arc<dyn ClientStore>,
    teardown: mpsc::UnboundedSender<LogoutReason>,
) -> tokio::task::JoinHandle<()> {
    let mut changes = store.subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) if change.key == LOGOUT_EVENT_KEY => {
                    debug!("logout marker observed, tearing down local session");
                    if teardown.send(LogoutReason::CrossTab).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "store change stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
