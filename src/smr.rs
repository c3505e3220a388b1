// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::any::Any;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::ids::StreamId;

/// Type-erased arguments or upcall result carried by an [`SmrEntry`]. Boxed
/// as `Any` because a `MultiObjectSmrEntry` spans streams backed by
/// different [`ReplicatedObject`](crate::object::ReplicatedObject)
/// implementations; each object's `apply`/`undo` downcasts its own payload.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// A single mutation `(method, args)` applied deterministically to a
/// materialized object, plus the optional upcall result of having applied it
/// and the optional inverse used to undo it.
#[derive(Clone)]
pub struct SmrEntry {
    pub method: Arc<str>,
    pub args: Payload,
    upcall_result: Arc<Mutex<Option<Payload>>>,
    pub undo_record: Option<Payload>,
}

impl SmrEntry {
    pub fn new(method: impl Into<Arc<str>>, args: Payload) -> Self {
        Self { method: method.into(), args, upcall_result: Arc::new(Mutex::new(None)), undo_record: None }
    }

    pub fn with_undo(mut self, undo_record: Payload) -> Self {
        self.undo_record = Some(undo_record);
        self
    }

    /// Returns the cached upcall result, if the entry has already been
    /// applied to some replica and its result recorded via
    /// [`SmrEntry::set_upcall_result`].
    pub fn upcall_result(&self) -> Option<Payload> {
        self.upcall_result.lock().unwrap().clone()
    }

    /// Records the result of applying this entry. Entries are shared (via
    /// `Arc`-backed interior mutability) between the write set and every
    /// Version-Locked Object's overlay view, so recording it once makes it
    /// visible everywhere the entry is read from, per §4.1 step 4.
    pub fn set_upcall_result(&self, result: Payload) {
        *self.upcall_result.lock().unwrap() = Some(result);
    }

    pub fn is_undoable(&self) -> bool {
        self.undo_record.is_some()
    }
}

impl std::fmt::Debug for SmrEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmrEntry")
            .field("method", &self.method)
            .field("has_upcall_result", &self.upcall_result().is_some())
            .field("undoable", &self.is_undoable())
            .finish()
    }
}

/// A mapping from Stream ID to an ordered list of SMR Entries. Insertion
/// preserves per-stream order; `IndexMap` additionally preserves the order
/// in which streams were first touched, which keeps iteration
/// deterministic for tests and for building the sequencer payload.
#[derive(Clone, Default, Debug)]
pub struct MultiObjectSmrEntry {
    by_stream: IndexMap<StreamId, Vec<SmrEntry>>,
}

impl MultiObjectSmrEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry` to `stream`'s list, returning its index within that
    /// stream's list (the "speculative address").
    pub fn push(&mut self, stream: StreamId, entry: SmrEntry) -> usize {
        let list = self.by_stream.entry(stream).or_default();
        list.push(entry);
        list.len() - 1
    }

    pub fn entries_for(&self, stream: StreamId) -> &[SmrEntry] {
        self.by_stream.get(&stream).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entry_at(&self, stream: StreamId, index: usize) -> Option<&SmrEntry> {
        self.by_stream.get(&stream).and_then(|v| v.get(index))
    }

    pub fn streams(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.by_stream.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_stream.values().all(Vec::is_empty)
    }

    /// Appends `other`'s entries after this one's, per stream, preserving
    /// per-stream order — used when folding a nested transaction's write set
    /// into its parent (§4.7).
    pub fn extend(&mut self, other: MultiObjectSmrEntry) {
        for (stream, entries) in other.by_stream {
            self.by_stream.entry(stream).or_default().extend(entries);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (StreamId, &[SmrEntry])> {
        self.by_stream.iter().map(|(s, v)| (*s, v.as_slice()))
    }
}
