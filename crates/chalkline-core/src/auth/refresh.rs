use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::registry::RegistryClient;

use super::CredentialStore;

/// How a refresh attempt ended, as observed by every rendezvoused caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The store now holds a freshly issued credential pair.
    Refreshed,
    /// The refresh credential was rejected or unreachable; the store has
    /// been cleared and the caller must treat this as a hard logout.
    SessionEnded,
}

enum Flight {
    Idle,
    InFlight(broadcast::Sender<RefreshOutcome>),
}

/// Collapses concurrent refresh demand into a single network round-trip.
///
/// Refresh credentials are single use, so N concurrent callers must not
/// race N requests at the registry: all but the first would be rejected and
/// the session would be corrupted. Callers that find a refresh already in
/// flight subscribe to its outcome instead of starting their own; once the
/// attempt settles the flight returns to idle so a later call starts fresh.
///
/// The attempt itself runs on a detached task. Every caller, the one that
/// started the flight included, only ever waits on the broadcast, so a
/// caller dropped at its await point (timeout, abandoned request) cannot
/// abort the attempt or leave the in-flight marker stuck: the task always
/// settles the flight and writes or clears the store before broadcasting.
pub struct RefreshCoordinator {
    shared: Arc<Shared>,
}

struct Shared {
    store: Arc<CredentialStore>,
    registry: RegistryClient,
    flight: Mutex<Flight>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<CredentialStore>, registry: RegistryClient) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                registry,
                flight: Mutex::new(Flight::Idle),
            }),
        }
    }

    /// Refresh the stored credential pair, sharing any in-flight attempt.
    pub async fn refresh(&self) -> RefreshOutcome {
        let mut rx = {
            let mut flight = self.shared.flight.lock().await;
            if let Flight::InFlight(tx) = &*flight {
                tx.subscribe()
            } else {
                let (tx, rx) = broadcast::channel(1);
                *flight = Flight::InFlight(tx);
                let shared = self.shared.clone();
                tokio::spawn(async move {
                    let outcome = shared.perform_refresh().await;
                    let mut flight = shared.flight.lock().await;
                    if let Flight::InFlight(tx) = std::mem::replace(&mut *flight, Flight::Idle) {
                        let _ = tx.send(outcome);
                    }
                });
                rx
            }
        };

        // The detached task broadcasts exactly once after settling the flight.
        rx.recv().await.unwrap_or(RefreshOutcome::SessionEnded)
    }
}

impl Shared {
    async fn perform_refresh(&self) -> RefreshOutcome {
        let Some(refresh_credential) = self.store.refresh_credential().await else {
            return RefreshOutcome::SessionEnded;
        };

        tracing::debug!("refreshing credential pair");
        match self.registry.refresh(&refresh_credential).await {
            Ok(pair) => match self.store.replace_pair(pair).await {
                Ok(()) => RefreshOutcome::Refreshed,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to store refreshed credentials");
                    let _ = self.store.clear().await;
                    RefreshOutcome::SessionEnded
                }
            },
            Err(err) => {
                // Any failure here is unrecoverable locally: the refresh
                // credential may already be consumed on the registry side.
                tracing::warn!(error = %err, "credential refresh failed; ending session");
                let _ = self.store.clear().await;
                RefreshOutcome::SessionEnded
            }
        }
    }
}
