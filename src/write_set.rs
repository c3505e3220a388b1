// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::conflict_set::ConflictSet;
use crate::fingerprint::{ConflictParam, Fingerprint};
use crate::ids::StreamId;
use crate::registry::TransactionRegistry;
use crate::smr::{MultiObjectSmrEntry, SmrEntry};

/// A Conflict Set extended with the set of affected streams and the ordered
/// speculative updates themselves (§3). Every [`TxContext`](crate::context)
/// owns exactly one, wrapped in `Arc<Mutex<..>>` so that a
/// [`WriteSetStreamView`] can observe entries appended to it after the view
/// was constructed, and so nested contexts can be chained without copying.
#[derive(Default, Debug)]
pub struct WriteSet {
    conflicts: ConflictSet,
    entries: MultiObjectSmrEntry,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_conflict(&mut self, stream: StreamId, param: ConflictParam) {
        self.conflicts.record(stream, param);
    }

    /// Appends `entry` to `stream`'s speculative update list, returning its
    /// per-stream index (the "speculative address", §3).
    pub fn add_update(&mut self, stream: StreamId, entry: SmrEntry) -> usize {
        self.entries.push(stream, entry)
    }

    pub fn entry_at(&self, stream: StreamId, index: usize) -> Option<&SmrEntry> {
        self.entries.entry_at(stream, index)
    }

    pub fn entries_for(&self, stream: StreamId) -> Vec<SmrEntry> {
        self.entries.entries_for(stream).to_vec()
    }

    pub fn streams(&self) -> IndexSet<StreamId> {
        self.entries.streams().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hashed_conflicts(&self) -> HashMap<StreamId, IndexSet<Fingerprint>> {
        self.conflicts.hashed()
    }

    /// The exact (unhashed) conflict parameters recorded for `stream`, used
    /// by precise-conflict resolution to compare against a committed
    /// entry's classified parameters (§4.4.7).
    pub fn conflict_params_for(&self, stream: StreamId) -> Vec<ConflictParam> {
        self.conflicts.params_for(stream).cloned().collect()
    }

    pub fn multi_object_entry(&self) -> MultiObjectSmrEntry {
        self.entries.clone()
    }

    /// Folds `child` into `self`, unioning per-stream conflict parameters
    /// and concatenating SMR entries in order (§4.7, invariant 6).
    pub fn merge(&mut self, child: WriteSet) {
        self.conflicts.merge(&child.conflicts);
        self.entries.extend(child.entries);
    }
}

/// A positioned, replayable view over one stream's slice of a chain of
/// Write Sets (root context first, leaf context last), used as a Version-
/// Locked Object's optimistic overlay (§4.2).
///
/// The view does not own the entries; it re-reads the live write sets on
/// every call, so writes appended to the chain after the view was
/// constructed (e.g. by `logUpdate` calls that happen after the overlay was
/// installed) become visible without reinstalling the overlay.
#[derive(Clone)]
pub struct WriteSetStreamView {
    stream: StreamId,
    owner_thread: ThreadId,
    chain: Vec<Arc<Mutex<WriteSet>>>,
    pos: usize,
}

impl WriteSetStreamView {
    pub fn new(stream: StreamId, owner_thread: ThreadId, chain: Vec<Arc<Mutex<WriteSet>>>) -> Self {
        Self { stream, owner_thread, chain, pos: 0 }
    }

    pub fn owner_thread(&self) -> ThreadId {
        self.owner_thread
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    fn entries(&self) -> Vec<SmrEntry> {
        self.chain.iter().flat_map(|ws| ws.lock().entries_for(self.stream)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn reset(&mut self) {
        self.pos = 0;
    }

    pub fn current(&self) -> Option<SmrEntry> {
        self.entries().into_iter().nth(self.pos)
    }

    pub fn previous(&mut self) -> Option<SmrEntry> {
        if self.pos == 0 {
            return None;
        }
        self.pos -= 1;
        self.current()
    }

    /// Advances past the current entry, returning it.
    pub fn advance(&mut self) -> Option<SmrEntry> {
        let entries = self.entries();
        let entry = entries.into_iter().nth(self.pos)?;
        self.pos += 1;
        Some(entry)
    }

    /// Returns (and advances past) every entry from the current position up
    /// to, but not including, `limit`.
    pub fn remaining_up_to(&mut self, limit: usize) -> Vec<SmrEntry> {
        let mut out = Vec::new();
        while self.pos < limit {
            match self.advance() {
                Some(entry) => out.push(entry),
                None => break,
            }
        }
        out
    }

    /// True iff the backing write set chain is exactly the thread's current
    /// context's chain, i.e. this view was installed by (and still belongs
    /// to) the innermost active context on this thread. Distinct from
    /// [`Self::is_stream_for_this_thread`]: a view can belong to this
    /// thread's *root* context (still "for this thread") while a different,
    /// nested context is now the current one (so it is no longer "the
    /// current context's").
    pub fn is_stream_current_context_thread_current_context(
        &self,
        registry: &TransactionRegistry,
    ) -> bool {
        registry
            .current_write_set(self.owner_thread)
            .map(|current| Arc::ptr_eq(&current, self.chain.last().unwrap()))
            .unwrap_or(false)
    }

    /// True iff the backing write set chain's root belongs to the thread
    /// that currently owns a transaction (i.e. the owning thread still has
    /// *some* active transaction rooted the same way this overlay was
    /// installed under), regardless of which nested context is current.
    pub fn is_stream_for_this_thread(&self, registry: &TransactionRegistry) -> bool {
        registry
            .root_write_set(self.owner_thread)
            .map(|root| Arc::ptr_eq(&root, &self.chain[0]))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_parent_and_child_in_stack_order() {
        let stream = StreamId::new();
        let parent = Arc::new(Mutex::new(WriteSet::new()));
        parent.lock().add_update(stream, SmrEntry::new("set", Arc::new(1u32)));
        let child = Arc::new(Mutex::new(WriteSet::new()));
        child.lock().add_update(stream, SmrEntry::new("set", Arc::new(2u32)));

        let mut view = WriteSetStreamView::new(stream, std::thread::current().id(), vec![parent.clone(), child.clone()]);
        assert_eq!(view.len(), 2);
        let first = view.advance().unwrap();
        assert_eq!(*first.args.downcast_ref::<u32>().unwrap(), 1);
        let second = view.advance().unwrap();
        assert_eq!(*second.args.downcast_ref::<u32>().unwrap(), 2);
        assert!(view.advance().is_none());
    }

    #[test]
    fn reflects_entries_appended_after_construction() {
        let stream = StreamId::new();
        let ws = Arc::new(Mutex::new(WriteSet::new()));
        let view = WriteSetStreamView::new(stream, std::thread::current().id(), vec![ws.clone()]);
        assert_eq!(view.len(), 0);
        ws.lock().add_update(stream, SmrEntry::new("set", Arc::new(1u32)));
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn remaining_up_to_stops_at_limit() {
        let stream = StreamId::new();
        let ws = Arc::new(Mutex::new(WriteSet::new()));
        for i in 0..5u32 {
            ws.lock().add_update(stream, SmrEntry::new("set", Arc::new(i)));
        }
        let mut view = WriteSetStreamView::new(stream, std::thread::current().id(), vec![ws]);
        let batch = view.remaining_up_to(3);
        assert_eq!(batch.len(), 3);
        assert_eq!(view.pos(), 3);
    }
}
