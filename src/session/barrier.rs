use tokio::sync::watch;

use super::state::SessionReport;
use crate::error::RecorderError;

type Outcome = Option<Result<SessionReport, String>>;

/// Single-shot completion of a session's finalization.
///
/// Every `stop()` caller for the same session waits on a clone of the same
/// barrier. Only the first `resolve` takes effect.
#[derive(Clone)]
pub struct FinalizeBarrier {
    rx: watch::Receiver<Outcome>,
}

pub struct BarrierResolver {
    tx: watch::Sender<Outcome>,
}

impl FinalizeBarrier {
    pub fn new() -> (Self, BarrierResolver) {
        let (tx, rx) = watch::channel(None);
        (Self { rx }, BarrierResolver { tx })
    }

    /// Wait for the outcome. A resolver dropped without resolving counts as a failure.
    pub async fn wait(mut self) -> Result<SessionReport, RecorderError> {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        match outcome {
            Some(Ok(report)) => Ok(report),
            Some(Err(message)) => Err(RecorderError::UnexpectedFinalizeFailure(message)),
            None => Err(RecorderError::UnexpectedFinalizeFailure(
                "finalization ended without an outcome".to_string(),
            )),
        }
    }
}

impl BarrierResolver {
    /// Publish the outcome. Returns false if an outcome was already published.
    pub fn resolve(&self, outcome: Result<SessionReport, String>) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(outcome);
            true
        })
    }
}
