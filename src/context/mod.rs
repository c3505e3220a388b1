// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Transactional Context: the per-flavor read/write/commit algorithms of
//! §4.4-§4.6. One concrete `TxContext` struct carries a `flavor` tag rather
//! than three separate types — the divergence between flavors is small
//! enough (what populates the conflict set, and the commit body) to live as
//! a match inside shared methods plus two small per-flavor commit modules.

mod deferred;
mod optimistic;
mod waw;

use std::sync::Arc;
use std::thread::ThreadId;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{AbortCause, Error, Result, TransactionAbortedError};
use crate::fingerprint::ConflictParam;
use crate::flavor::Flavor;
use crate::ids::{GlobalAddress, StreamId};
use crate::object::ReplicatedObject;
use crate::proxy::{ErasedProxy, Proxy};
use crate::registry::{StackEntry, TransactionRegistry};
use crate::runtime::Runtime;
use crate::smr::{Payload, SmrEntry};
use crate::vlo::VloState;
use crate::write_set::{WriteSet, WriteSetStreamView};

/// A closure captured by a DEFERRED context's `NO_CONFLICT` accessor,
/// invoked once at commit time against the commit-time snapshot (§4.6, §9
/// design notes).
pub(crate) type DeferredClosure = Box<dyn FnOnce() + Send>;

/// Fields shared by all three flavors (§3 "Transactional Context"). Flavor-
/// specific behavior is dispatched on `flavor` inside the methods below and
/// in the `optimistic`/`waw`/`deferred` submodules.
pub struct TxContext {
    runtime: Arc<Runtime>,
    txid: Uuid,
    flavor: Flavor,
    thread: ThreadId,
    parent: Option<Arc<TxContext>>,
    snapshot: Mutex<Option<GlobalAddress>>,
    write_set: Arc<Mutex<WriteSet>>,
    /// Every proxy this context installed an overlay on (read or written),
    /// used to release overlay ownership on abort (§4.8).
    touched_proxies: Mutex<IndexMap<StreamId, Arc<dyn ErasedProxy>>>,
    /// Proxies with at least one write-set entry, used for post-commit
    /// installation (§4.4.6).
    modified_proxies: Mutex<IndexMap<StreamId, Arc<dyn ErasedProxy>>>,
    precise_conflicts: bool,
    deferred: Mutex<Vec<DeferredClosure>>,
    future_affected_streams: Mutex<IndexSet<StreamId>>,
}

impl TxContext {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        flavor: Flavor,
        thread: ThreadId,
        parent: Option<Arc<TxContext>>,
        snapshot_override: Option<GlobalAddress>,
        precise_conflicts: bool,
    ) -> Arc<Self> {
        let txid = Uuid::new_v4();
        let write_set = Arc::new(Mutex::new(WriteSet::new()));
        runtime.registry().push(
            thread,
            StackEntry { txid, flavor, write_set: write_set.clone() },
        );
        info!(%txid, ?flavor, nested = parent.is_some(), "transaction begun");
        Arc::new(Self {
            runtime,
            txid,
            flavor,
            thread,
            parent,
            snapshot: Mutex::new(snapshot_override),
            write_set,
            touched_proxies: Mutex::new(IndexMap::new()),
            modified_proxies: Mutex::new(IndexMap::new()),
            precise_conflicts,
            deferred: Mutex::new(Vec::new()),
            future_affected_streams: Mutex::new(IndexSet::new()),
        })
    }

    pub fn txid(&self) -> Uuid {
        self.txid
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn is_nested(&self) -> bool {
        self.parent.is_some()
    }

    /// The root's snapshot, lazily fetched on first use (§4.4.4). Nested
    /// contexts inherit the root's value.
    pub(crate) fn ensure_snapshot(&self) -> Result<GlobalAddress> {
        if let Some(parent) = &self.parent {
            return parent.ensure_snapshot();
        }
        let mut guard = self.snapshot.lock();
        if let Some(snapshot) = *guard {
            return Ok(snapshot);
        }
        let resp = self
            .runtime
            .services()
            .sequencer()
            .next_token(&IndexSet::new(), 0)
            .map_err(|e| e.into_abort(self.txid))?;
        *guard = Some(resp.token);
        Ok(resp.token)
    }

    fn set_snapshot(&self, snapshot: GlobalAddress) {
        *self.snapshot.lock() = Some(snapshot);
    }

    /// This context's write set chained under every ancestor's, root first
    /// (§4.2), used to build the overlay a Version-Locked Object installs.
    fn write_set_chain(&self) -> Vec<Arc<Mutex<WriteSet>>> {
        let mut chain = match &self.parent {
            Some(parent) => parent.write_set_chain(),
            None => Vec::new(),
        };
        chain.push(self.write_set.clone());
        chain
    }

    fn registry(&self) -> &TransactionRegistry {
        self.runtime.registry()
    }

    pub(crate) fn thread(&self) -> ThreadId {
        self.thread
    }

    pub(crate) fn write_set_arc(&self) -> Arc<Mutex<WriteSet>> {
        self.write_set.clone()
    }

    pub(crate) fn precise_conflicts(&self) -> bool {
        self.precise_conflicts
    }

    pub(crate) fn parent(&self) -> Option<&Arc<TxContext>> {
        self.parent.as_ref()
    }

    /// `access(proxy, fn, conflictParams)` (§4.4.1). Shared by OPTIMISTIC
    /// and WAW (and DEFERRED's fallthrough path, §4.6): only WAW skips
    /// populating the conflict set on reads.
    #[instrument(level = "debug", skip(self, proxy, read), fields(txid = %self.txid, stream = ?proxy.stream()))]
    pub fn access<T: ReplicatedObject, R>(
        &self,
        proxy: &Proxy<T>,
        conflict_params: Vec<ConflictParam>,
        read: impl FnOnce(&T) -> R,
    ) -> Result<R> {
        let stream = proxy.stream();
        if self.flavor != Flavor::WriteAfterWrite {
            let mut ws = self.write_set.lock();
            for param in &conflict_params {
                ws.record_conflict(stream, param.clone());
            }
        }
        self.touched_proxies
            .lock()
            .entry(stream)
            .or_insert_with(|| Arc::new(proxy.clone()));

        let snapshot = self.ensure_snapshot()?;
        let registry = self.registry();
        let thread = self.thread;
        let chain = self.write_set_chain();

        let guard = |state: &VloState<T>| {
            state.version() == snapshot
                && state.overlay().map_or(true, |view| {
                    view.is_stream_current_context_thread_current_context(registry) && view.pos() == view.len()
                })
        };
        let sync = |state: &mut VloState<T>| -> std::result::Result<(), crate::error::ExternalError> {
            let view = WriteSetStreamView::new(stream, thread, chain.clone());
            let needs_replay = state.take_overlay_ownership(stream, thread, view);
            if needs_replay {
                state.replay_from_log(stream, snapshot, self.runtime.services().log())?;
            } else if state.version() > snapshot {
                state.reset_and_replay(stream, snapshot, self.runtime.services().log())?;
            } else if state.version() != snapshot {
                state.replay_from_log(stream, snapshot, self.runtime.services().log())?;
            }
            state.apply_overlay(stream);
            Ok(())
        };

        proxy.vlo().access(guard, sync, read).map_err(|e| e.into_abort(self.txid).into())
    }

    /// `logUpdate(proxy, entry, conflictParams)` (§4.4.2, §4.5).
    pub fn log_update<T: ReplicatedObject>(
        &self,
        proxy: &Proxy<T>,
        entry: SmrEntry,
        conflict_params: Vec<ConflictParam>,
    ) -> usize {
        let stream = proxy.stream();
        let mut ws = self.write_set.lock();
        if self.flavor == Flavor::WriteAfterWrite {
            for param in &conflict_params {
                ws.record_conflict(stream, param.clone());
            }
        }
        let index = ws.add_update(stream, entry);
        drop(ws);
        let proxy_ref: Arc<dyn ErasedProxy> = Arc::new(proxy.clone());
        self.touched_proxies.lock().entry(stream).or_insert_with(|| proxy_ref.clone());
        self.modified_proxies.lock().entry(stream).or_insert(proxy_ref);
        index
    }

    /// `getUpcallResult(proxy, index)` (§4.4.3).
    pub fn get_upcall_result<T: ReplicatedObject>(
        &self,
        proxy: &Proxy<T>,
        index: usize,
        conflict_params: Vec<ConflictParam>,
    ) -> Result<Option<Payload>> {
        let stream = proxy.stream();
        if self.flavor != Flavor::WriteAfterWrite {
            let mut ws = self.write_set.lock();
            for param in &conflict_params {
                ws.record_conflict(stream, param.clone());
            }
        }
        if let Some(result) = self.write_set.lock().entry_at(stream, index).and_then(|e| e.upcall_result()) {
            return Ok(Some(result));
        }

        let snapshot = self.ensure_snapshot()?;
        let registry = self.registry();
        let thread = self.thread;
        let chain = self.write_set_chain();
        proxy
            .vlo()
            .update(|state| -> std::result::Result<(), crate::error::ExternalError> {
                let view = WriteSetStreamView::new(stream, thread, chain);
                let needs_replay = state.take_overlay_ownership(stream, thread, view);
                if needs_replay || state.version() != snapshot {
                    if state.version() > snapshot {
                        state.reset_and_replay(stream, snapshot, self.runtime.services().log())?;
                    } else {
                        state.replay_from_log(stream, snapshot, self.runtime.services().log())?;
                    }
                }
                state.apply_overlay(stream);
                let _ = registry;
                Ok(())
            })
            .map_err(|e| e.into_abort(self.txid))?;

        self.write_set
            .lock()
            .entry_at(stream, index)
            .and_then(|e| e.upcall_result())
            .map(Some)
            .ok_or_else(|| {
                Error::Invariant(format!("no upcall result for {stream:?}#{index} after full sync"))
            })
    }

    /// DEFERRED's `NO_CONFLICT` accessor override (§4.6): no sync happens
    /// now; `accessor` is captured and run once, at commit time, directly
    /// against whatever is in memory then.
    pub fn access_deferred<T: ReplicatedObject>(
        &self,
        proxy: &Proxy<T>,
        accessor: impl FnOnce(&T) + Send + 'static,
    ) {
        debug_assert_eq!(self.flavor, Flavor::Deferred);
        self.future_affected_streams.lock().insert(proxy.stream());
        let proxy = proxy.clone();
        self.deferred.lock().push(Box::new(move || {
            proxy.vlo().no_access(accessor);
        }));
    }

    pub fn commit(self: &Arc<Self>) -> Result<GlobalAddress> {
        match self.flavor {
            Flavor::Optimistic => optimistic::commit(self),
            Flavor::WriteAfterWrite => waw::commit(self),
            Flavor::Deferred => deferred::commit(self),
        }
    }

    /// `TXAbort()` (§4.8): discards the context and releases overlay
    /// ownership on every proxy it touched.
    pub fn abort(self: &Arc<Self>, cause: AbortCause) -> TransactionAbortedError {
        warn!(txid = %self.txid, ?cause, "transaction aborted");
        for proxy in self.touched_proxies.lock().values() {
            proxy.release_overlay(self.thread);
        }
        self.clear_thread_state();
        TransactionAbortedError::new(self.txid, cause)
    }

    pub(crate) fn clear_thread_state(&self) {
        self.registry().pop(self.thread);
        self.runtime.pop_context(self.thread);
    }

    pub(crate) fn fold_into_parent(&self, parent: &TxContext) {
        let child_ws = std::mem::take(&mut *self.write_set.lock());
        parent.write_set.lock().merge(child_ws);
        let mut parent_modified = parent.modified_proxies.lock();
        for (stream, proxy) in self.modified_proxies.lock().drain(..) {
            parent_modified.entry(stream).or_insert(proxy);
        }
        let mut parent_touched = parent.touched_proxies.lock();
        for (stream, proxy) in self.touched_proxies.lock().drain(..) {
            parent_touched.entry(stream).or_insert(proxy);
        }
    }

    pub(crate) fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }
}

