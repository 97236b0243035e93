//! Routing of fatal protocol violations to a single owner.

use tokio::sync::mpsc;

use crate::error::ProtocolViolation;

/// Exit status used when a protocol violation stops the process.
pub const EXIT_PROTOCOL_VIOLATION: i32 = 70;

/// Creates a connected reporter/supervisor pair.
pub fn supervisor() -> (FatalReporter, Supervisor) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FatalReporter { tx }, Supervisor { rx })
}

/// Handed to everything that can detect a protocol violation.
#[derive(Debug, Clone)]
pub struct FatalReporter {
    tx: mpsc::UnboundedSender<ProtocolViolation>,
}

impl FatalReporter {
    /// Logs `violation` and forwards it to the supervisor. If the
    /// supervisor is gone the process exits immediately.
    pub fn report(&self, violation: ProtocolViolation) {
        tracing::error!(%violation, "protocol violation");
        metrics::counter!("participant_fatal_violations_total").increment(1);

        if self.tx.send(violation).is_err() {
            tracing::error!("no supervisor listening, exiting");
            std::process::exit(EXIT_PROTOCOL_VIOLATION);
        }
    }
}

/// Receives protocol violations. The owner decides how to stop the process.
#[derive(Debug)]
pub struct Supervisor {
    rx: mpsc::UnboundedReceiver<ProtocolViolation>,
}

impl Supervisor {
    /// Waits for the next violation. Returns `None` once every reporter has
    /// been dropped.
    pub async fn next_violation(&mut self) -> Option<ProtocolViolation> {
        self.rx.recv().await
    }

    /// Returns a pending violation without waiting.
    pub fn try_next_violation(&mut self) -> Option<ProtocolViolation> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use common::TxnPartId;

    use super::*;

    #[tokio::test]
    async fn test_report_reaches_supervisor() {
        let (reporter, mut supervisor) = supervisor();
        assert!(supervisor.try_next_violation().is_none());

        let violation = ProtocolViolation::UnregisteredCaller {
            part_id: TxnPartId::new("t1-0"),
            call_name: "ghost".to_string(),
        };
        reporter.clone().report(violation.clone());

        assert_eq!(supervisor.next_violation().await, Some(violation));
    }

    #[tokio::test]
    async fn test_supervisor_ends_when_reporters_drop() {
        let (reporter, mut supervisor) = supervisor();
        drop(reporter);
        assert_eq!(supervisor.next_violation().await, None);
    }
}
