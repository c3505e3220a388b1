// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! In-memory reference implementations of the log and sequencer contracts
//! (§6, §10.4), sufficient to drive the full transaction lifecycle —
//! including genuine sequencer-side conflict detection, trims, and
//! hole-filling — so integration tests exercise the real engine code paths
//! against a real (if non-durable) implementation of the external
//! contracts, rather than mocks.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::error::ExternalError;
use crate::external::{
    ExternalServices, LogClient, LogData, LogEntryKind, SequencerClient, StreamScanner,
    TokenResponse, TxResolutionInfo,
};
use crate::ids::{GlobalAddress, StreamId};
use crate::smr::MultiObjectSmrEntry;

#[derive(Clone, Default)]
struct LogRecord {
    kind: LogEntryKind,
    payload: Option<MultiObjectSmrEntry>,
    backpointers: HashMap<StreamId, GlobalAddress>,
}

/// A process-local, non-durable stand-in for the Log / Address-Space
/// Service (§6.2). Addresses are reserved by [`InMemorySequencer`] before a
/// record is written into them, so `append`/`fill_hole` only ever see a
/// reserved-but-empty slot or raise [`ExternalError::Overwrite`], matching
/// the real `OverwriteException` contract.
pub struct InMemoryLog {
    entries: Arc<Mutex<Vec<Option<LogRecord>>>>,
    trim_mark: Mutex<GlobalAddress>,
}

impl InMemoryLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            trim_mark: Mutex::new(GlobalAddress::NEVER_READ),
        })
    }

    /// Reserves the next `count` addresses, returning the first reserved
    /// one. For `count == 0` — the "peek current tail" query §4.4.4 uses to
    /// fetch a snapshot without consuming a log position — nothing is
    /// reserved and the *current* tail is returned instead of the next free
    /// slot, so the conflict window `(snapshot, commit]` includes whatever
    /// the first committer lands on.
    fn reserve(&self, count: u32) -> GlobalAddress {
        let mut entries = self.entries.lock();
        if count == 0 {
            return GlobalAddress::new(entries.len() as i64 - 1);
        }
        let start = entries.len();
        for _ in 0..count {
            entries.push(None);
        }
        GlobalAddress::new(start as i64)
    }

    fn write_at(&self, addr: GlobalAddress, record: LogRecord) -> Result<(), ExternalError> {
        let mut entries = self.entries.lock();
        let idx = addr.as_i64();
        if idx < 0 {
            return Err(ExternalError::Overwrite(addr));
        }
        match entries.get_mut(idx as usize) {
            Some(slot @ None) => {
                *slot = Some(record);
                Ok(())
            }
            _ => Err(ExternalError::Overwrite(addr)),
        }
    }

    /// Every committed (non-hole) address strictly after `snapshot`, paired
    /// with the streams it touches — used by [`InMemorySequencer`] to detect
    /// conflicts and by tests to assert on log shape directly.
    fn committed_since(&self, snapshot: GlobalAddress) -> Vec<(GlobalAddress, Vec<StreamId>)> {
        let entries = self.entries.lock();
        let start = (snapshot.as_i64() + 1).max(0) as usize;
        entries
            .iter()
            .enumerate()
            .skip(start)
            .filter_map(|(i, slot)| {
                let record = slot.as_ref()?;
                let payload = record.payload.as_ref()?;
                Some((GlobalAddress::new(i as i64), payload.streams().collect()))
            })
            .collect()
    }

    /// Marks every address up to and including `addr` as trimmed; reads and
    /// scans below the mark report [`ExternalError::Trim`].
    pub fn trim(&self, addr: GlobalAddress) {
        *self.trim_mark.lock() = addr;
    }

    fn check_not_trimmed(&self, addr: GlobalAddress) -> Result<(), ExternalError> {
        if addr.as_i64() <= self.trim_mark.lock().as_i64() {
            return Err(ExternalError::Trim);
        }
        Ok(())
    }
}

impl LogClient for InMemoryLog {
    fn read(&self, addr: GlobalAddress) -> Result<LogData, ExternalError> {
        self.check_not_trimmed(addr)?;
        if !addr.is_address() {
            return Ok(LogData::hole());
        }
        let entries = self.entries.lock();
        match entries.get(addr.as_i64() as usize) {
            Some(Some(record)) => Ok(match record.kind {
                LogEntryKind::Data => {
                    LogData::data(record.payload.clone().unwrap_or_default(), record.backpointers.clone())
                }
                LogEntryKind::Hole => LogData::hole(),
            }),
            _ => Ok(LogData::hole()),
        }
    }

    fn append(
        &self,
        addr: GlobalAddress,
        _streams: &IndexSet<StreamId>,
        payload: MultiObjectSmrEntry,
        backpointers: HashMap<StreamId, GlobalAddress>,
    ) -> Result<(), ExternalError> {
        self.write_at(addr, LogRecord { kind: LogEntryKind::Data, payload: Some(payload), backpointers })
    }

    fn fill_hole(&self, addr: GlobalAddress) -> Result<(), ExternalError> {
        self.write_at(addr, LogRecord { kind: LogEntryKind::Hole, payload: None, backpointers: HashMap::new() })
    }

    fn scanner(&self, _stream: StreamId) -> Box<dyn StreamScanner> {
        Box::new(InMemoryScanner { entries: self.entries.clone(), pos: 0 })
    }
}

struct InMemoryScanner {
    entries: Arc<Mutex<Vec<Option<LogRecord>>>>,
    pos: usize,
}

impl StreamScanner for InMemoryScanner {
    fn seek(&mut self, addr: GlobalAddress) {
        self.pos = addr.as_i64().max(0) as usize;
    }

    fn stream_up_to(&mut self, limit: GlobalAddress) -> Result<Vec<(GlobalAddress, LogData)>, ExternalError> {
        let entries = self.entries.lock();
        let limit_idx = limit.as_i64();
        let mut out = Vec::new();
        while self.pos as i64 <= limit_idx && self.pos < entries.len() {
            let data = match &entries[self.pos] {
                Some(record) => match record.kind {
                    LogEntryKind::Data => {
                        LogData::data(record.payload.clone().unwrap_or_default(), record.backpointers.clone())
                    }
                    LogEntryKind::Hole => LogData::hole(),
                },
                None => LogData::hole(),
            };
            out.push((GlobalAddress::new(self.pos as i64), data));
            self.pos += 1;
        }
        Ok(out)
    }
}

/// A process-local, non-durable stand-in for the Sequencer Service (§6.1).
/// Shares an [`InMemoryLog`] with its `append`/`finalize` callers so that
/// token reservation and the actual write land in the same address space.
pub struct InMemorySequencer {
    log: Arc<InMemoryLog>,
    backpointers: Mutex<HashMap<StreamId, GlobalAddress>>,
    commit_lock: Mutex<()>,
}

impl InMemorySequencer {
    pub fn new(log: Arc<InMemoryLog>) -> Arc<Self> {
        Arc::new(Self { log, backpointers: Mutex::new(HashMap::new()), commit_lock: Mutex::new(()) })
    }

    /// The first committed address, after `resolution.snapshot` and not
    /// already covered by `resolution.verified`, on any stream in
    /// `resolution.reads` — an imprecise, stream-level check: any write to a
    /// read stream conflicts, regardless of which parameter it touched (the
    /// precise-conflict loop, §4.4.7, is what narrows this down to an actual
    /// parameter overlap).
    fn find_conflict(&self, resolution: &TxResolutionInfo) -> Option<(StreamId, GlobalAddress)> {
        for (addr, streams) in self.log.committed_since(resolution.snapshot) {
            for stream in streams {
                if !resolution.reads.contains_key(&stream) {
                    continue;
                }
                let cleared = resolution.verified.get(&stream).is_some_and(|v| addr.as_i64() <= v.as_i64());
                if !cleared {
                    return Some((stream, addr));
                }
            }
        }
        None
    }

    fn advance_backpointers(&self, streams: &IndexSet<StreamId>, addr: GlobalAddress) {
        let mut backpointers = self.backpointers.lock();
        for stream in streams {
            backpointers.insert(*stream, addr);
        }
    }
}

impl SequencerClient for InMemorySequencer {
    fn next_token(&self, streams: &IndexSet<StreamId>, count: u32) -> Result<TokenResponse, ExternalError> {
        let _guard = self.commit_lock.lock();
        let token = self.log.reserve(count);
        let backpointers = self.backpointers.lock();
        let reported = streams
            .iter()
            .map(|s| (*s, backpointers.get(s).copied().unwrap_or(GlobalAddress::NEVER_READ)))
            .collect();
        Ok(TokenResponse { token, backpointers: reported })
    }

    fn append(
        &self,
        streams: &IndexSet<StreamId>,
        payload: &MultiObjectSmrEntry,
        resolution: &TxResolutionInfo,
    ) -> Result<GlobalAddress, ExternalError> {
        let _guard = self.commit_lock.lock();
        if let Some((stream, address)) = self.find_conflict(resolution) {
            return Err(ExternalError::Conflict { stream, address });
        }
        let address = self.log.reserve(1);
        self.log.append(address, streams, payload.clone(), HashMap::new())?;
        self.advance_backpointers(streams, address);
        Ok(address)
    }

    fn finalize(
        &self,
        token: GlobalAddress,
        streams: &IndexSet<StreamId>,
        payload: &MultiObjectSmrEntry,
        resolution: &TxResolutionInfo,
    ) -> Result<GlobalAddress, ExternalError> {
        let _guard = self.commit_lock.lock();
        if let Some((stream, address)) = self.find_conflict(resolution) {
            return Err(ExternalError::Conflict { stream, address });
        }
        self.log.append(token, streams, payload.clone(), HashMap::new())?;
        self.advance_backpointers(streams, token);
        Ok(token)
    }
}

/// Bundles an [`InMemoryLog`] and [`InMemorySequencer`] behind
/// [`ExternalServices`] for a test [`crate::runtime::Runtime`].
pub struct InMemoryServices {
    log: Arc<InMemoryLog>,
    sequencer: Arc<InMemorySequencer>,
}

impl InMemoryServices {
    pub fn new() -> Arc<Self> {
        let log = InMemoryLog::new();
        let sequencer = InMemorySequencer::new(log.clone());
        Arc::new(Self { log, sequencer })
    }

    pub fn log(&self) -> &Arc<InMemoryLog> {
        &self.log
    }
}

impl ExternalServices for InMemoryServices {
    fn sequencer(&self) -> &dyn SequencerClient {
        self.sequencer.as_ref()
    }

    fn log(&self) -> &dyn LogClient {
        self.log.as_ref()
    }
}
