// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::flavor::Flavor;
use crate::write_set::WriteSet;

/// The bookkeeping the registry needs about one active context, shared with
/// (but independent of) the full [`TxContext`](crate::context::TxContext)
/// the owning thread holds directly.
#[derive(Clone)]
pub struct StackEntry {
    pub txid: Uuid,
    pub flavor: Flavor,
    pub write_set: Arc<Mutex<WriteSet>>,
}

/// A process-wide mapping thread-id -> stack of active Transactional
/// Contexts (§3). The head of a thread's stack is its *current context*;
/// the bottom is its *root context*. Explicit rather than `thread_local!` so
/// it can be owned by a [`Runtime`](crate::runtime::Runtime) value instead
/// of living as hidden global state (§9 design notes).
#[derive(Default)]
pub struct TransactionRegistry {
    stacks: Mutex<HashMap<ThreadId, Vec<StackEntry>>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, thread: ThreadId, entry: StackEntry) {
        self.stacks.lock().entry(thread).or_default().push(entry);
    }

    pub fn pop(&self, thread: ThreadId) -> Option<StackEntry> {
        let mut stacks = self.stacks.lock();
        let popped = stacks.get_mut(&thread).and_then(Vec::pop);
        if stacks.get(&thread).is_some_and(Vec::is_empty) {
            stacks.remove(&thread);
        }
        popped
    }

    pub fn current(&self, thread: ThreadId) -> Option<StackEntry> {
        self.stacks.lock().get(&thread).and_then(|s| s.last()).cloned()
    }

    pub fn root(&self, thread: ThreadId) -> Option<StackEntry> {
        self.stacks.lock().get(&thread).and_then(|s| s.first()).cloned()
    }

    pub fn depth(&self, thread: ThreadId) -> usize {
        self.stacks.lock().get(&thread).map(Vec::len).unwrap_or(0)
    }

    pub fn current_write_set(&self, thread: ThreadId) -> Option<Arc<Mutex<WriteSet>>> {
        self.current(thread).map(|e| e.write_set)
    }

    pub fn root_write_set(&self, thread: ThreadId) -> Option<Arc<Mutex<WriteSet>>> {
        self.root(thread).map(|e| e.write_set)
    }

    /// All write sets for `thread`'s stack, root first, used to build a
    /// [`WriteSetStreamView`](crate::write_set::WriteSetStreamView) that
    /// concatenates nested transactions in stack order (§4.2).
    pub fn chain(&self, thread: ThreadId) -> Vec<Arc<Mutex<WriteSet>>> {
        self.stacks
            .lock()
            .get(&thread)
            .map(|s| s.iter().map(|e| e.write_set.clone()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_root_and_current_independently_across_nesting() {
        let registry = TransactionRegistry::new();
        let thread = std::thread::current().id();
        let root_ws = Arc::new(Mutex::new(WriteSet::new()));
        registry.push(
            thread,
            StackEntry { txid: Uuid::nil(), flavor: Flavor::Optimistic, write_set: root_ws.clone() },
        );
        assert_eq!(registry.depth(thread), 1);

        let child_ws = Arc::new(Mutex::new(WriteSet::new()));
        registry.push(
            thread,
            StackEntry { txid: Uuid::nil(), flavor: Flavor::Optimistic, write_set: child_ws.clone() },
        );
        assert_eq!(registry.depth(thread), 2);
        assert!(Arc::ptr_eq(&registry.root_write_set(thread).unwrap(), &root_ws));
        assert!(Arc::ptr_eq(&registry.current_write_set(thread).unwrap(), &child_ws));

        registry.pop(thread);
        assert!(Arc::ptr_eq(&registry.current_write_set(thread).unwrap(), &root_ws));
        registry.pop(thread);
        assert!(registry.current(thread).is_none());
    }
}
