//! Transfer coordinator
//!
//! Runs one transfer on its own task so a blocking data wait never stalls
//! command processing on the control connection. Whatever happens, the
//! coordinator signals end of transfer exactly once.
//!
//! - store-like: the peer drives the data; wait for the data signal.
//! - list-like: lines are already computed; write them and finish at once.
//! - retrieve-like: trigger the file push, then wait for the data signal.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use crate::client::LogicalSession;
use crate::transfer::job::{Transfer, TransferKind, render_lines};
use crate::transfer::results::TransferOutcome;

pub struct TransferCoordinator {
    session: Arc<LogicalSession>,
    transfer: Option<Arc<Transfer>>,
    timeout: Duration,
}

impl TransferCoordinator {
    /// Coordinates the session's current transfer; data waits are bounded
    /// by `timeout`.
    pub fn new(session: Arc<LogicalSession>, timeout: Duration) -> Self {
        let transfer = session.current_transfer();
        Self {
            session,
            transfer,
            timeout,
        }
    }

    /// Runs the coordinator on a dedicated task.
    pub fn spawn(self) -> JoinHandle<TransferOutcome> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) -> TransferOutcome {
        let Some(transfer) = self.transfer.clone() else {
            error!("No transfer to execute for session {}", self.session.id());
            return self.end(None, TransferOutcome::Failed);
        };
        transfer.mark_running();
        info!(
            "Session {}: {:?} transfer of {} started",
            self.session.id(),
            transfer.kind(),
            transfer.path()
        );

        let outcome = match transfer.kind() {
            TransferKind::Store => self.wait_for_data().await,
            TransferKind::List => {
                let message = render_lines(transfer.info());
                let written = self.session.data().write_message(&message).await;
                transfer.set_status(written);
                let outcome = if written {
                    TransferOutcome::Success
                } else {
                    TransferOutcome::Failed
                };
                self.session.data().data_signal().try_resolve(outcome);
                outcome
            }
            TransferKind::Retrieve => match transfer.source() {
                Some(source) => match source.start_retrieve(self.session.data()) {
                    Ok(()) => {
                        debug!("Session {}: wait for end of retrieve", self.session.id());
                        self.wait_for_data().await
                    }
                    Err(e) => {
                        error!("Session {}: retrieve failed: {}", self.session.id(), e);
                        transfer.set_status(false);
                        TransferOutcome::FileUnavailable
                    }
                },
                None => {
                    error!(
                        "Session {}: retrieve of {} has no file source",
                        self.session.id(),
                        transfer.path()
                    );
                    transfer.set_status(false);
                    TransferOutcome::Failed
                }
            },
        };

        // the peer waits for EOF on the data connection before the final reply
        self.session.data().shutdown_stream().await;
        self.end(Some(&transfer), outcome)
    }

    /// Waits for the data layer. When the wait is abandoned the data signal
    /// is resolved here, which stops the copy task; if the data layer got
    /// there first its outcome wins.
    async fn wait_for_data(&self) -> TransferOutcome {
        let signal = self.session.data().data_signal();
        let outcome = tokio::select! {
            biased;
            outcome = signal.wait(self.timeout) => outcome.unwrap_or_else(|| {
                warn!(
                    "Session {}: no end of data after {:?}",
                    self.session.id(),
                    self.timeout
                );
                TransferOutcome::TimedOut
            }),
            _ = self.session.cancelled() => {
                warn!("Session {}: transfer wait interrupted", self.session.id());
                TransferOutcome::Interrupted
            }
        };
        if signal.try_resolve(outcome) {
            return outcome;
        }
        signal.peek().unwrap_or(outcome)
    }

    fn end(&self, transfer: Option<&Arc<Transfer>>, outcome: TransferOutcome) -> TransferOutcome {
        if let Some(transfer) = transfer {
            transfer.finish(outcome.is_success());
        }
        self.session.data().set_end_of_transfer(outcome);
        info!(
            "Session {}: end of transfer ({:?})",
            self.session.id(),
            outcome
        );
        outcome
    }
}
