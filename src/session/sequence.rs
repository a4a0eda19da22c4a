use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Hands out strictly increasing tickets for calls that write the document
/// or the result.
///
/// Recompute and project load draw from the same sequencer, so whichever of
/// them was dispatched last wins. Issuing a ticket cancels the one before it.
#[derive(Debug, Default)]
pub struct Sequencer {
    latest: u64,
    outstanding: Option<CancellationToken>,
}

/// A dispatched call's place in the sequence plus its cancellation handle.
#[derive(Debug, Clone)]
pub struct Ticket {
    seq: u64,
    cancel: CancellationToken,
}

impl Ticket {
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once a newer ticket supersedes this one.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next ticket, cancelling the previously issued one.
    pub fn issue(&mut self) -> Ticket {
        if let Some(previous) = self.outstanding.take() {
            previous.cancel();
        }
        self.latest += 1;
        let cancel = CancellationToken::new();
        self.outstanding = Some(cancel.clone());
        Ticket {
            seq: self.latest,
            cancel,
        }
    }

    pub const fn latest(&self) -> u64 {
        self.latest
    }

    /// Accept a response for `seq` only if no newer call was dispatched.
    pub fn check(&self, seq: u64) -> Result<()> {
        if seq == self.latest {
            Ok(())
        } else {
            Err(Error::StaleResponse {
                seq,
                latest: self.latest,
            })
        }
    }

    /// Mark the latest call as resolved.
    pub fn settle(&mut self, seq: u64) {
        if seq == self.latest {
            self.outstanding = None;
        }
    }

    /// Whether the latest ticket is still waiting on its response.
    pub fn is_pending(&self) -> bool {
        self.outstanding.is_some()
    }
}
