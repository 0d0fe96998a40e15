//! Fire-and-forget handoff to the persistence collaborator.

use tokio::sync::mpsc;
use trackbee_types::Position;

/// Cheap-clone sender half of the persistence channel.
///
/// The decode path never waits on storage: a full queue drops the record
/// with a warning instead of stalling the connection task. Retries and
/// backpressure beyond the queue are the collaborator's concern.
#[derive(Clone, Debug)]
pub struct PositionSink {
    sender: mpsc::Sender<Position>,
}

impl PositionSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Position>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn submit(&self, position: Position) {
        match self.sender.try_send(position) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(position)) => {
                tracing::warn!(
                    device_id = %position.device_id,
                    protocol = position.protocol,
                    "position queue full, dropping record"
                );
            }
            Err(mpsc::error::TrySendError::Closed(position)) => {
                tracing::error!(
                    device_id = %position.device_id,
                    "position sink closed, dropping record"
                );
            }
        }
    }
}
