//! Archive/backlog drain state machine.
//!
//! Devices that buffer records while disconnected report the index of
//! their newest available record; the server requests the gap since its
//! own cursor, one outstanding request per device at a time, until the
//! backlog is drained. Indices are monotonic per device.

use std::time::{
    Duration,
    Instant,
};

/// A reply lost on the wire would otherwise leave the cursor stuck in
/// `RequestSent`; after this long the next report may request again.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveState {
    Idle,
    RequestSent,
}

/// An archive-request reply to send to the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchiveRequest {
    /// First record index the server is missing.
    pub from_index: u64,
    /// How many records the device should send per batch.
    pub batch_hint: u32,
}

/// Per-session archive cursor. Lives inside the session's locked state,
/// so all transitions are atomic read-modify-write.
#[derive(Debug, Default)]
pub struct ArchiveCursor {
    /// Next index the server expects; 0 means never synchronized.
    last_index: u64,
    /// Newest index the device has reported having.
    newest_reported: u64,
    request_sent_at: Option<Instant>,
}

impl ArchiveCursor {
    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    pub fn state(&self) -> ArchiveState {
        if self.request_in_flight() {
            ArchiveState::RequestSent
        }
        else {
            ArchiveState::Idle
        }
    }

    pub fn request_in_flight(&self) -> bool {
        self.request_sent_at
            .is_some_and(|sent_at| sent_at.elapsed() < REQUEST_TIMEOUT)
    }

    /// Handles the device reporting its newest available record index.
    ///
    /// On first contact (`last_index == 0`) the reported index is adopted
    /// as the baseline without requesting anything, so a freshly
    /// registered device doesn't re-upload its full history. Otherwise,
    /// if the device is ahead and no request is outstanding, one
    /// archive-request is issued.
    pub fn observe_newest(&mut self, newest: u64, batch_hint: u32) -> Option<ArchiveRequest> {
        if newest > self.newest_reported {
            self.newest_reported = newest;
        }

        if self.last_index == 0 {
            self.last_index = newest;
            return None;
        }

        if self.newest_reported > self.last_index && !self.request_in_flight() {
            self.request_sent_at = Some(Instant::now());
            return Some(ArchiveRequest {
                from_index: self.last_index,
                batch_hint,
            });
        }

        None
    }

    /// Accepts one archived record. Returns `false` for an index the
    /// server has already seen (device retransmission after a lost
    /// reply) — the record must not be forwarded again.
    pub fn accept_record(&mut self, index: u64) -> bool {
        if index < self.last_index {
            return false;
        }
        self.last_index = index + 1;
        true
    }

    /// Ends the current batch. If the device still has newer records
    /// than the cursor, the drain continues with another request.
    pub fn finish_batch(&mut self, batch_hint: u32) -> Option<ArchiveRequest> {
        self.request_sent_at = None;

        if self.newest_reported > self.last_index {
            self.request_sent_at = Some(Instant::now());
            return Some(ArchiveRequest {
                from_index: self.last_index,
                batch_hint,
            });
        }

        None
    }
}
