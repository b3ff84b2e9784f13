use super::{ConnectionListener, ConnectionStatus};
use flume::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::{debug, warn};

/// One-shot gate for implementing [`AudioConnection::ready`].
///
/// The transport keeps the [`ReadySignal`] half and fires it once its
/// handshake completes or fails; `ready` waits on the gate. A gate that
/// times out is cancelled, so late signals are discarded rather than
/// reported twice.
///
/// [`AudioConnection::ready`]: super::AudioConnection::ready
#[derive(Debug)]
pub struct ReadyGate {
    rx: Receiver<ConnectionStatus>,
}

/// Completion half of a [`ReadyGate`].
#[derive(Clone, Debug)]
pub struct ReadySignal {
    tx: Sender<ConnectionStatus>,
}

impl ReadyGate {
    /// Creates a linked gate and signal.
    #[must_use]
    pub fn new() -> (ReadyGate, ReadySignal) {
        let (tx, rx) = flume::bounded(1);

        (ReadyGate { rx }, ReadySignal { tx })
    }

    /// Waits up to `timeout` for the handshake outcome.
    ///
    /// On timeout, `listener` is told of [`ConnectionStatus::ErrorConnectionTimeout`],
    /// which is also returned. If every signal was dropped without firing,
    /// the attempt is reported as [`ConnectionStatus::ErrorConnectionFailed`].
    pub fn wait(self, timeout: Duration, listener: &dyn ConnectionListener) -> ConnectionStatus {
        match self.rx.recv_timeout(timeout) {
            Ok(status) => {
                debug!("Connection readied with status {}.", status);
                status
            },
            Err(RecvTimeoutError::Timeout) => {
                warn!("Connection failed to ready within {:?}.", timeout);
                let status = ConnectionStatus::ErrorConnectionTimeout;
                listener.on_status_change(status);
                status
            },
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Connection attempt was abandoned before readying.");
                let status = ConnectionStatus::ErrorConnectionFailed;
                listener.on_status_change(status);
                status
            },
        }
    }
}

impl ReadySignal {
    /// Reports the handshake outcome.
    ///
    /// Returns `false` if the gate has already given up waiting, or a
    /// status has already been reported.
    pub fn notify(&self, status: ConnectionStatus) -> bool {
        self.tx.try_send(status).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingListener;
    use std::thread;

    #[test]
    fn signal_before_timeout_is_returned() {
        let (gate, signal) = ReadyGate::new();
        let listener = RecordingListener::default();

        let handle = thread::spawn(move || signal.notify(ConnectionStatus::Connected));

        let status = gate.wait(Duration::from_secs(5), &listener);
        assert!(handle.join().unwrap());
        assert_eq!(status, ConnectionStatus::Connected);
        assert!(listener.statuses().is_empty());
    }

    #[test]
    fn timeout_is_a_status_and_cancels_gate() {
        let (gate, signal) = ReadyGate::new();
        let listener = RecordingListener::default();

        let status = gate.wait(Duration::from_millis(10), &listener);

        assert_eq!(status, ConnectionStatus::ErrorConnectionTimeout);
        assert_eq!(
            listener.statuses(),
            vec![ConnectionStatus::ErrorConnectionTimeout]
        );
        assert!(!signal.notify(ConnectionStatus::Connected));
    }

    #[test]
    fn dropped_signal_fails_attempt() {
        let (gate, signal) = ReadyGate::new();
        let listener = RecordingListener::default();
        drop(signal);

        let status = gate.wait(Duration::from_secs(5), &listener);
        assert_eq!(status, ConnectionStatus::ErrorConnectionFailed);
    }

    #[test]
    fn only_first_signal_counts() {
        let (gate, signal) = ReadyGate::new();
        let listener = RecordingListener::default();

        assert!(signal.notify(ConnectionStatus::Connected));
        assert!(!signal.notify(ConnectionStatus::ErrorLostConnection));
        assert_eq!(
            gate.wait(Duration::from_secs(1), &listener),
            ConnectionStatus::Connected
        );
    }
}
