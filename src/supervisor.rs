// =============================================================================
// Streaming Supervisor — transport selection, failover, state machine
// =============================================================================
//
// Drives exactly one active 1-minute bar producer per configured symbol
// set. Transport policy is `ws`, `rest`, or `auto` (§4.1). `auto` starts WS
// and, the first time it exits for any reason, starts REST exactly once —
// the `rest_fallback_triggered` latch (§4.10, §8 invariant 6) prevents a
// second REST start and WS is never restarted for the remainder of the
// process lifetime.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::aggregator::Aggregator;
use crate::binance::{rest_poller, ws_client, BinanceClient};

/// Transport policy selected at startup (spec §6 `binance_transport`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Ws,
    Rest,
    Auto,
}

/// Supervisor state machine states (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupervisorState {
    Stopped,
    StartingWs,
    RunningWs,
    StartingRest,
    RunningRest,
    FailedTerminal,
}

/// Snapshot exposed via `/v1/providers`.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    pub configured_transport: Transport,
    pub active_transport: &'static str,
    pub state: SupervisorState,
    pub rest_fallback_triggered: bool,
    pub symbols: Vec<String>,
    pub poll_interval_secs: f64,
}

/// Owns producer task lifetimes and the fallback latch. Constructed once at
/// startup and driven by a single long-running supervisor task.
pub struct StreamingSupervisor {
    transport: Transport,
    symbols: Vec<String>,
    poll_interval_secs: f64,
    rest_fallback_triggered: AtomicBool,
    status: RwLock<SupervisorStatus>,
    shutdown: Arc<Notify>,
}

impl StreamingSupervisor {
    pub fn new(transport: Transport, symbols: Vec<String>, poll_interval_secs: f64) -> StreamingSupervisor {
        let status = SupervisorStatus {
            configured_transport: transport,
            active_transport: "none",
            state: SupervisorState::Stopped,
            rest_fallback_triggered: false,
            symbols: symbols.clone(),
            poll_interval_secs,
        };
        StreamingSupervisor {
            transport,
            symbols,
            poll_interval_secs,
            rest_fallback_triggered: AtomicBool::new(false),
            status: RwLock::new(status),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Current status snapshot, for the `/v1/providers` handler.
    pub fn status(&self) -> SupervisorStatus {
        self.status.read().clone()
    }

    /// Signal all producers to stop; they exit within a bounded grace
    /// period and treat this as a normal exit (no fallback latch fires).
    pub fn shutdown(&self) {
        self.set_state(SupervisorState::Stopped, "none");
        self.shutdown.notify_waiters();
    }

    fn set_state(&self, state: SupervisorState, active_transport: &'static str) {
        let mut status = self.status.write();
        status.state = state;
        status.active_transport = active_transport;
        status.rest_fallback_triggered = self.rest_fallback_triggered.load(Ordering::SeqCst);
    }

    /// Drive ingestion until shutdown. Spawns the producer(s) dictated by
    /// the configured transport and reacts to their exit per §4.10.
    pub async fn run(self: Arc<Self>, client: Arc<BinanceClient>, aggregator: Arc<Aggregator>) {
        match self.transport {
            Transport::Rest => {
                self.set_state(SupervisorState::StartingRest, "rest");
                self.set_state(SupervisorState::RunningRest, "rest");
                rest_poller::run(
                    self.symbols.clone(),
                    client,
                    aggregator,
                    self.poll_interval_secs,
                    self.shutdown.clone(),
                )
                .await;
                self.set_state(SupervisorState::Stopped, "none");
            }
            Transport::Ws => {
                self.set_state(SupervisorState::StartingWs, "ws");
                self.set_state(SupervisorState::RunningWs, "ws");
                let outcome = ws_client::run(self.symbols.clone(), aggregator, self.shutdown.clone()).await;
                match outcome {
                    ws_client::WsOutcome::Cancelled => {
                        self.set_state(SupervisorState::Stopped, "none");
                    }
                    ws_client::WsOutcome::Disconnected | ws_client::WsOutcome::Unavailable => {
                        error!(?outcome, "WS producer exited in ws-only mode — no fallback configured");
                        self.set_state(SupervisorState::FailedTerminal, "none");
                    }
                }
            }
            Transport::Auto => {
                self.set_state(SupervisorState::StartingWs, "ws");
                self.set_state(SupervisorState::RunningWs, "ws");
                let outcome = ws_client::run(self.symbols.clone(), aggregator.clone(), self.shutdown.clone()).await;

                if outcome == ws_client::WsOutcome::Cancelled {
                    self.set_state(SupervisorState::Stopped, "none");
                    return;
                }

                warn!(?outcome, "WS producer exited in auto mode — triggering one-shot REST fallback");
                let already_triggered = self.rest_fallback_triggered.swap(true, Ordering::SeqCst);
                if already_triggered {
                    // Invariant 6 (§8): the latch must never allow a second
                    // fallback or a WS restart.
                    error!("rest fallback already triggered — refusing to start a second producer");
                    self.set_state(SupervisorState::FailedTerminal, "none");
                    return;
                }

                self.set_state(SupervisorState::StartingRest, "rest");
                self.set_state(SupervisorState::RunningRest, "rest");
                rest_poller::run(
                    self.symbols.clone(),
                    client,
                    aggregator,
                    self.poll_interval_secs,
                    self.shutdown.clone(),
                )
                .await;
                self.set_state(SupervisorState::Stopped, "none");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BarStore;

    #[tokio::test]
    async fn rest_only_transport_runs_and_stops_on_shutdown() {
        let store = Arc::new(BarStore::open_in_memory().unwrap());
        let aggregator = Arc::new(Aggregator::new(store, vec![]));
        let client = Arc::new(BinanceClient::new());
        let sup = Arc::new(StreamingSupervisor::new(Transport::Rest, vec![], 5.0));

        let sup_clone = sup.clone();
        let handle = tokio::spawn(sup_clone.run(client, aggregator));

        // Give it a tick to reach RunningRest, then shut down.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(sup.status().state, SupervisorState::RunningRest);
        sup.shutdown();

        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("supervisor did not stop promptly")
            .unwrap();
        assert_eq!(sup.status().state, SupervisorState::Stopped);
    }

    #[test]
    fn fallback_latch_prevents_second_trigger() {
        let sup = StreamingSupervisor::new(Transport::Auto, vec![], 2.0);
        assert!(!sup.rest_fallback_triggered.swap(true, Ordering::SeqCst));
        assert!(sup.rest_fallback_triggered.swap(true, Ordering::SeqCst));
    }
}
