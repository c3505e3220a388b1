// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexSet;
use uuid::Uuid;

use crate::error::ExternalError;
use crate::fingerprint::Fingerprint;
use crate::ids::{GlobalAddress, StreamId};
use crate::smr::MultiObjectSmrEntry;

/// The sequencer's reply to a token request: the address it assigned, and
/// the address each affected stream pointed to immediately before (§6.1).
#[derive(Clone, Debug)]
pub struct TokenResponse {
    pub token: GlobalAddress,
    pub backpointers: HashMap<StreamId, GlobalAddress>,
}

/// Wire shape of the resolution payload the sequencer needs to decide
/// whether to accept a commit (§6.3).
#[derive(Clone, Debug)]
pub struct TxResolutionInfo {
    pub txid: Uuid,
    pub snapshot: GlobalAddress,
    pub reads: HashMap<StreamId, IndexSet<Fingerprint>>,
    pub writes: HashMap<StreamId, IndexSet<Fingerprint>>,
    /// Streams (and the address up to which) the precise-conflict loop has
    /// already verified don't actually conflict; tells the sequencer not to
    /// re-flag them (§4.4.7).
    pub verified: HashMap<StreamId, GlobalAddress>,
}

impl TxResolutionInfo {
    pub fn new(
        txid: Uuid,
        snapshot: GlobalAddress,
        reads: HashMap<StreamId, IndexSet<Fingerprint>>,
        writes: HashMap<StreamId, IndexSet<Fingerprint>>,
    ) -> Self {
        Self { txid, snapshot, reads, writes, verified: HashMap::new() }
    }

    pub fn with_verified(mut self, verified: HashMap<StreamId, GlobalAddress>) -> Self {
        self.verified = verified;
        self
    }
}

/// `nextToken` / `append` contract of the sequencer service (§6.1). Out of
/// scope for this crate's implementation; an in-memory reference
/// implementation lives in [`crate::test_utils`].
pub trait SequencerClient: Send + Sync {
    fn next_token(
        &self,
        streams: &IndexSet<StreamId>,
        count: u32,
    ) -> Result<TokenResponse, ExternalError>;

    fn append(
        &self,
        streams: &IndexSet<StreamId>,
        payload: &MultiObjectSmrEntry,
        resolution: &TxResolutionInfo,
    ) -> Result<GlobalAddress, ExternalError>;

    /// Finalizes a commit at a token already acquired via [`Self::next_token`]
    /// (§4.6 step 5, DEFERRED commit's two-phase token-then-finalize flow):
    /// accepts iff no conflict occurred between `resolution.snapshot` and
    /// `token`.
    fn finalize(
        &self,
        token: GlobalAddress,
        streams: &IndexSet<StreamId>,
        payload: &MultiObjectSmrEntry,
        resolution: &TxResolutionInfo,
    ) -> Result<GlobalAddress, ExternalError>;
}

/// Whether a log position holds real data or a filled hole (§6.2).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogEntryKind {
    Data,
    #[default]
    Hole,
}

/// The payload and metadata a `read` returns (§6.2).
#[derive(Clone, Debug)]
pub struct LogData {
    pub kind: LogEntryKind,
    pub payload: Option<MultiObjectSmrEntry>,
    pub backpointers: HashMap<StreamId, GlobalAddress>,
}

impl LogData {
    pub fn hole() -> Self {
        Self { kind: LogEntryKind::Hole, payload: None, backpointers: HashMap::new() }
    }

    pub fn data(payload: MultiObjectSmrEntry, backpointers: HashMap<StreamId, GlobalAddress>) -> Self {
        Self { kind: LogEntryKind::Data, payload: Some(payload), backpointers }
    }
}

/// A positioned scanner over one stream's committed entries (§6.2, "supports
/// `get(streamID)` returning a positioned scanner").
pub trait StreamScanner: Send {
    fn seek(&mut self, addr: GlobalAddress);

    /// Returns every committed `(address, entry)` pair from the current
    /// position up to (and including) `limit`, advancing past them.
    fn stream_up_to(&mut self, limit: GlobalAddress) -> Result<Vec<(GlobalAddress, LogData)>, ExternalError>;
}

/// `read` / `append` / `fillHole` / `get` contract of the log service (§6.2).
pub trait LogClient: Send + Sync {
    fn read(&self, addr: GlobalAddress) -> Result<LogData, ExternalError>;

    fn append(
        &self,
        addr: GlobalAddress,
        streams: &IndexSet<StreamId>,
        payload: MultiObjectSmrEntry,
        backpointers: HashMap<StreamId, GlobalAddress>,
    ) -> Result<(), ExternalError>;

    fn fill_hole(&self, addr: GlobalAddress) -> Result<(), ExternalError>;

    fn scanner(&self, stream: StreamId) -> Box<dyn StreamScanner>;
}

/// Bundles a sequencer and log client behind the single service boundary the
/// commit path talks to, so a [`Runtime`](crate::runtime::Runtime) only
/// needs to hold one `Arc`.
pub trait ExternalServices: Send + Sync {
    fn sequencer(&self) -> &dyn SequencerClient;
    fn log(&self) -> &dyn LogClient;
}

pub type SharedExternalServices = Arc<dyn ExternalServices>;
