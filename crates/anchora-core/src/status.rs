//! # Invoice and Batch Status State Machines
//!
//! Both lifecycles move strictly forward or into a terminal failure; the
//! only backward edges are the explicit claim reversals (upload cancellation
//! and batch-creation rollback). Every persisted transition in the store
//! layer is guarded by a conditional update that pins the expected current
//! status, so an illegal transition can never reach the database even under
//! concurrent workers.
//!
//! ## Persistence encoding
//!
//! Statuses are stored as `INT` columns using one pinned code family:
//!
//! - Invoice: `Uploaded=1, IpfsStored=2, Batched=3, BlockchainPending=5,
//!   BlockchainConfirmed=6, Finalized=8, IpfsInFlight=9, IpfsFailed=101,
//!   BlockchainFailed=102`. `IpfsInFlight` sits outside the historic `1..8`
//!   range so it cannot collide with either legacy numbering.
//! - Batch: `Processing=1, ReadyToSend=2, BlockchainPending=3,
//!   BlockchainConfirmed=4, BlockchainFailed=5`.

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Lifecycle status of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceStatus {
    /// Created externally, waiting for IPFS publication.
    Uploaded,
    /// Claimed by an upload worker; pin in progress.
    IpfsInFlight,
    /// Pinned to IPFS; `cid` and `immutable_hash` are set.
    IpfsStored,
    /// Member of a batch under construction.
    Batched,
    /// Proof recorded; waiting for the batch anchor to confirm.
    BlockchainPending,
    /// The containing batch's anchor transaction is confirmed.
    BlockchainConfirmed,
    /// Post-confirmation archival state.
    Finalized,
    /// IPFS publication failed permanently (terminal).
    IpfsFailed,
    /// Anchoring failed permanently (terminal).
    BlockchainFailed,
}

impl InvoiceStatus {
    /// The pinned persistence code.
    pub fn code(self) -> i32 {
        match self {
            Self::Uploaded => 1,
            Self::IpfsStored => 2,
            Self::Batched => 3,
            Self::BlockchainPending => 5,
            Self::BlockchainConfirmed => 6,
            Self::Finalized => 8,
            Self::IpfsInFlight => 9,
            Self::IpfsFailed => 101,
            Self::BlockchainFailed => 102,
        }
    }

    /// Decode a persisted status code.
    pub fn from_code(code: i32) -> Result<Self, StateError> {
        match code {
            1 => Ok(Self::Uploaded),
            2 => Ok(Self::IpfsStored),
            3 => Ok(Self::Batched),
            5 => Ok(Self::BlockchainPending),
            6 => Ok(Self::BlockchainConfirmed),
            8 => Ok(Self::Finalized),
            9 => Ok(Self::IpfsInFlight),
            101 => Ok(Self::IpfsFailed),
            102 => Ok(Self::BlockchainFailed),
            other => Err(StateError::UnknownCode {
                entity: "invoice",
                code: other,
            }),
        }
    }

    /// Whether this status is a terminal failure.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::IpfsFailed | Self::BlockchainFailed)
    }

    /// Whether no further transitions are allowed.
    pub fn is_terminal(self) -> bool {
        self.is_failure() || matches!(self, Self::Finalized)
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// The backward edges `IpfsInFlight → Uploaded` (upload cancellation)
    /// and `{Batched, BlockchainPending} → IpfsStored` (batch rollback) are
    /// the only non-forward transitions.
    pub fn can_transition_to(self, next: Self) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Uploaded, IpfsInFlight)
                | (IpfsInFlight, IpfsStored)
                | (IpfsInFlight, IpfsFailed)
                | (IpfsInFlight, Uploaded)
                | (IpfsStored, Batched)
                | (Batched, BlockchainPending)
                | (Batched, BlockchainFailed)
                | (Batched, IpfsStored)
                | (BlockchainPending, BlockchainConfirmed)
                | (BlockchainPending, BlockchainFailed)
                | (BlockchainPending, IpfsStored)
                | (BlockchainConfirmed, Finalized)
        )
    }

    /// Validate a transition, returning a [`StateError`] when illegal.
    pub fn transition_to(self, next: Self) -> Result<Self, StateError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StateError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uploaded => "UPLOADED",
            Self::IpfsInFlight => "IPFS_IN_FLIGHT",
            Self::IpfsStored => "IPFS_STORED",
            Self::Batched => "BATCHED",
            Self::BlockchainPending => "BLOCKCHAIN_PENDING",
            Self::BlockchainConfirmed => "BLOCKCHAIN_CONFIRMED",
            Self::Finalized => "FINALIZED",
            Self::IpfsFailed => "IPFS_FAILED",
            Self::BlockchainFailed => "BLOCKCHAIN_FAILED",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of an invoice batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    /// Created by the batch job; membership being claimed.
    Processing,
    /// Merkle root and metadata CID recorded; eligible for submission.
    ReadyToSend,
    /// Claimed for (or awaiting confirmation of) the anchor transaction.
    BlockchainPending,
    /// Anchor transaction confirmed at the required depth.
    BlockchainConfirmed,
    /// Anchoring failed permanently (terminal).
    BlockchainFailed,
}

impl BatchStatus {
    /// The pinned persistence code.
    pub fn code(self) -> i32 {
        match self {
            Self::Processing => 1,
            Self::ReadyToSend => 2,
            Self::BlockchainPending => 3,
            Self::BlockchainConfirmed => 4,
            Self::BlockchainFailed => 5,
        }
    }

    /// Decode a persisted status code.
    pub fn from_code(code: i32) -> Result<Self, StateError> {
        match code {
            1 => Ok(Self::Processing),
            2 => Ok(Self::ReadyToSend),
            3 => Ok(Self::BlockchainPending),
            4 => Ok(Self::BlockchainConfirmed),
            5 => Ok(Self::BlockchainFailed),
            other => Err(StateError::UnknownCode {
                entity: "batch",
                code: other,
            }),
        }
    }

    /// Whether no further transitions are allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::BlockchainConfirmed | Self::BlockchainFailed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Processing, ReadyToSend)
                | (Processing, BlockchainFailed)
                | (ReadyToSend, BlockchainPending)
                | (ReadyToSend, BlockchainFailed)
                | (BlockchainPending, ReadyToSend)
                | (BlockchainPending, BlockchainConfirmed)
                | (BlockchainPending, BlockchainFailed)
        )
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Processing => "PROCESSING",
            Self::ReadyToSend => "READY_TO_SEND",
            Self::BlockchainPending => "BLOCKCHAIN_PENDING",
            Self::BlockchainConfirmed => "BLOCKCHAIN_CONFIRMED",
            Self::BlockchainFailed => "BLOCKCHAIN_FAILED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_codes_round_trip() {
        for status in [
            InvoiceStatus::Uploaded,
            InvoiceStatus::IpfsInFlight,
            InvoiceStatus::IpfsStored,
            InvoiceStatus::Batched,
            InvoiceStatus::BlockchainPending,
            InvoiceStatus::BlockchainConfirmed,
            InvoiceStatus::Finalized,
            InvoiceStatus::IpfsFailed,
            InvoiceStatus::BlockchainFailed,
        ] {
            assert_eq!(InvoiceStatus::from_code(status.code()).unwrap(), status);
        }
    }

    #[test]
    fn batch_codes_round_trip() {
        for status in [
            BatchStatus::Processing,
            BatchStatus::ReadyToSend,
            BatchStatus::BlockchainPending,
            BatchStatus::BlockchainConfirmed,
            BatchStatus::BlockchainFailed,
        ] {
            assert_eq!(BatchStatus::from_code(status.code()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_codes_rejected() {
        assert!(InvoiceStatus::from_code(0).is_err());
        assert!(InvoiceStatus::from_code(4).is_err());
        assert!(InvoiceStatus::from_code(7).is_err());
        assert!(BatchStatus::from_code(0).is_err());
        assert!(BatchStatus::from_code(6).is_err());
    }

    #[test]
    fn forward_spine_is_legal() {
        use InvoiceStatus::*;
        let spine = [
            Uploaded,
            IpfsInFlight,
            IpfsStored,
            Batched,
            BlockchainPending,
            BlockchainConfirmed,
            Finalized,
        ];
        for pair in spine.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} must be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn terminal_states_have_no_successors() {
        use InvoiceStatus::*;
        let all = [
            Uploaded,
            IpfsInFlight,
            IpfsStored,
            Batched,
            BlockchainPending,
            BlockchainConfirmed,
            Finalized,
            IpfsFailed,
            BlockchainFailed,
        ];
        for terminal in [IpfsFailed, BlockchainFailed, Finalized] {
            for next in all {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn no_skipping_forward() {
        use InvoiceStatus::*;
        assert!(!Uploaded.can_transition_to(IpfsStored));
        assert!(!Uploaded.can_transition_to(Batched));
        assert!(!IpfsStored.can_transition_to(BlockchainPending));
        assert!(!Batched.can_transition_to(BlockchainConfirmed));
    }

    #[test]
    fn claim_reversals_are_legal() {
        use InvoiceStatus::*;
        assert!(IpfsInFlight.can_transition_to(Uploaded));
        assert!(Batched.can_transition_to(IpfsStored));
        assert!(BlockchainPending.can_transition_to(IpfsStored));
    }

    #[test]
    fn transition_to_reports_illegal_pairs() {
        let err = InvoiceStatus::Uploaded
            .transition_to(InvoiceStatus::BlockchainConfirmed)
            .unwrap_err();
        assert!(err.to_string().contains("UPLOADED"));
    }

    #[test]
    fn submit_claim_reversal_is_legal_for_batches() {
        assert!(BatchStatus::BlockchainPending.can_transition_to(BatchStatus::ReadyToSend));
        assert!(!BatchStatus::BlockchainConfirmed.can_transition_to(BatchStatus::ReadyToSend));
    }
}
