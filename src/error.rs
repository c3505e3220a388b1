// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use uuid::Uuid;

use crate::ids::{GlobalAddress, StreamId};

/// Classification of why a transaction aborted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortCause {
    /// The sequencer rejected the commit because a fingerprint in the read
    /// set was updated since the snapshot. Imprecise unless `precise` is
    /// also set on the surfacing error.
    Conflict,
    /// During precise-conflict scanning or sync, the required log range had
    /// already been trimmed.
    Trim,
    /// The sequencer was unreachable or returned an internal error.
    SequencerFail,
    /// A lower-level I/O failure on the log or sequencer transport.
    Network,
    /// The caller explicitly requested abort.
    User,
    /// Catch-all for causes that don't fit the above.
    Undefined,
}

/// Carries `(txid, cause, conflictStream?, conflictAddress?, precise)` as
/// specified for every aborted transaction.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("transaction {txid} aborted: {cause:?} (precise={precise})")]
pub struct TransactionAbortedError {
    pub txid: Uuid,
    pub cause: AbortCause,
    pub conflict_stream: Option<StreamId>,
    pub conflict_address: Option<GlobalAddress>,
    /// Whether the CONFLICT cause was confirmed by a precise log scan
    /// (§4.4.7) rather than surfaced on fingerprint collision alone.
    pub precise: bool,
}

impl TransactionAbortedError {
    pub fn new(txid: Uuid, cause: AbortCause) -> Self {
        Self { txid, cause, conflict_stream: None, conflict_address: None, precise: false }
    }

    pub fn with_conflict_location(mut self, stream: StreamId, address: GlobalAddress) -> Self {
        self.conflict_stream = Some(stream);
        self.conflict_address = Some(address);
        self
    }

    pub fn precise(mut self) -> Self {
        self.cause = AbortCause::Conflict;
        self.precise = true;
        self
    }
}

/// A failure surfaced by an external service client (§6) before it has been
/// classified into an [`AbortCause`]. Internal to the commit path; never
/// escapes the crate boundary directly.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExternalError {
    #[error("conflict detected by sequencer on stream {stream:?} at {address:?}")]
    Conflict { stream: StreamId, address: GlobalAddress },
    #[error("log range has been trimmed")]
    Trim,
    #[error("sequencer unavailable or failed: {0}")]
    SequencerFail(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("attempted to overwrite address {0:?}")]
    Overwrite(GlobalAddress),
}

impl ExternalError {
    pub fn into_abort(self, txid: Uuid) -> TransactionAbortedError {
        match self {
            ExternalError::Conflict { stream, address } => {
                TransactionAbortedError::new(txid, AbortCause::Conflict)
                    .with_conflict_location(stream, address)
            }
            ExternalError::Trim => TransactionAbortedError::new(txid, AbortCause::Trim),
            ExternalError::SequencerFail(_) => {
                TransactionAbortedError::new(txid, AbortCause::SequencerFail)
            }
            ExternalError::Network(_) => TransactionAbortedError::new(txid, AbortCause::Network),
            ExternalError::Overwrite(_) => {
                unreachable!("overwrite is a fatal invariant violation, not an abort")
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Aborted(#[from] TransactionAbortedError),

    #[error(
        "cannot begin a {attempted:?} transaction nested under an active {existing:?} root"
    )]
    NestingFlavorMismatch { existing: crate::flavor::Flavor, attempted: crate::flavor::Flavor },

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("overwrite at commit installation: stream {0:?} address {1:?}")]
    Overwrite(StreamId, GlobalAddress),

    #[error("no active transaction on this thread")]
    NoActiveTransaction,
}

impl From<ExternalError> for Error {
    fn from(value: ExternalError) -> Self {
        match value {
            ExternalError::Overwrite(addr) => {
                Error::Invariant(format!("unexpected overwrite at {addr:?}"))
            }
            other => Error::Invariant(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
