// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::thread::ThreadId;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::external::{LogClient, LogEntryKind};
use crate::ids::{GlobalAddress, StreamId};
use crate::object::ReplicatedObject;
use crate::write_set::WriteSetStreamView;

/// The mutable half of a [`VersionLockedObject`]: the materialized state, the
/// version it reflects, and the optimistic overlay currently installed on
/// top of it, if any (§3, §4.1).
pub struct VloState<T> {
    object: T,
    version: GlobalAddress,
    overlay: Option<WriteSetStreamView>,
    overlay_owner: Option<ThreadId>,
}

impl<T: ReplicatedObject> VloState<T> {
    pub fn object(&self) -> &T {
        &self.object
    }

    pub fn version(&self) -> GlobalAddress {
        self.version
    }

    pub fn overlay_owner(&self) -> Option<ThreadId> {
        self.overlay_owner
    }

    pub fn has_overlay(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn overlay(&self) -> Option<&WriteSetStreamView> {
        self.overlay.as_ref()
    }

    /// Undoes the installed overlay entry-by-entry using recorded undo
    /// records, in reverse application order. Falls back to resetting the
    /// object to its origin if any applied entry lacks an undo record (§4.1
    /// step 1), in which case the caller is responsible for replaying from
    /// the log afterward.
    ///
    /// Returns `true` if a clean in-place undo succeeded, `false` if the
    /// object was reset and needs a full replay from the log.
    fn undo_overlay(&mut self, stream: StreamId) -> bool {
        let Some(mut view) = self.overlay.take() else {
            self.overlay_owner = None;
            return true;
        };
        let applied = view.pos();
        let mut entries = Vec::with_capacity(applied);
        view.reset();
        for _ in 0..applied {
            entries.push(view.advance().expect("position was within applied range"));
        }
        self.overlay_owner = None;

        if entries.iter().any(|e| !e.is_undoable()) {
            debug!(stream = ?stream, "overlay has non-undoable entry, resetting object");
            self.object.reset();
            self.version = GlobalAddress::NEVER_READ;
            return false;
        }
        for entry in entries.iter().rev() {
            self.object.undo(entry);
        }
        true
    }

    /// Installs `view` as the overlay owned by `owner`, undoing any existing
    /// overlay belonging to a different thread first (§4.1, §5: "a second
    /// thread takes ownership only by first undoing the existing overlay").
    ///
    /// Returns `true` if the prior overlay required a full reset (in which
    /// case the caller must replay from the log before applying `view`).
    pub fn take_overlay_ownership(&mut self, stream: StreamId, owner: ThreadId, view: WriteSetStreamView) -> bool {
        let needs_replay = if self.overlay_owner.is_some() && self.overlay_owner != Some(owner) {
            !self.undo_overlay(stream)
        } else {
            self.overlay.take();
            false
        };
        self.overlay = Some(view);
        self.overlay_owner = Some(owner);
        needs_replay
    }

    /// Removes the overlay without undoing it, used after its entries have
    /// been committed and applied as real log entries (§4.4.6 step a).
    pub fn clear_overlay(&mut self) {
        self.overlay = None;
        self.overlay_owner = None;
    }

    pub fn set_version(&mut self, version: GlobalAddress) {
        self.version = version;
    }

    /// Replays every committed entry in `(version, target]` from the log,
    /// applying each to the object and advancing `version` (§4.1 step 2).
    /// Holes are skipped. Backward motion through a trim is reported as an
    /// error by the caller's `log.read` returning one; this method assumes
    /// forward or already-validated backward replay.
    pub fn replay_from_log(
        &mut self,
        stream: StreamId,
        target: GlobalAddress,
        log: &dyn LogClient,
    ) -> Result<(), crate::error::ExternalError> {
        let mut scanner = log.scanner(stream);
        scanner.seek(self.version.next());
        let batch = scanner.stream_up_to(target)?;
        for (addr, data) in batch {
            if let LogEntryKind::Data = data.kind {
                if let Some(payload) = data.payload {
                    for entry in payload.entries_for(stream) {
                        let result = self.object.apply(&entry.method, &entry.args);
                        entry.set_upcall_result(result);
                    }
                }
            }
            self.version = addr;
        }
        self.version = target;
        Ok(())
    }

    /// Resets the object to its origin and replays from scratch up to
    /// `target`, the fallback path for backward motion through entries we
    /// can't undo in place (§4.1 step 2).
    pub fn reset_and_replay(
        &mut self,
        stream: StreamId,
        target: GlobalAddress,
        log: &dyn LogClient,
    ) -> Result<(), crate::error::ExternalError> {
        self.object.reset();
        self.version = GlobalAddress::NEVER_READ;
        self.replay_from_log(stream, target, log)
    }

    /// Applies the overlay's entries (those not yet applied, i.e. from
    /// `pos()` onward are NOT applied — only entries up to `pos()` are
    /// considered "installed"; this applies the full remaining overlay in
    /// order and caches upcall results, §4.1 step 3-4).
    pub fn apply_overlay(&mut self, stream: StreamId) {
        let Some(view) = self.overlay.as_mut() else { return };
        while let Some(entry) = view.advance() {
            if entry.upcall_result().is_none() {
                let result = self.object.apply(&entry.method, &entry.args);
                entry.set_upcall_result(result);
            }
        }
        trace!(stream = ?stream, "overlay fully applied, upcall results cached");
    }
}

/// Owns the materialized replica of one stream: a read/write-locked
/// [`VloState`] (§3, §4.1). Shared across threads via `Arc` inside a
/// [`Proxy`](crate::proxy::Proxy); only one thread may own its overlay at a
/// time.
pub struct VersionLockedObject<T> {
    stream: StreamId,
    state: RwLock<VloState<T>>,
}

impl<T: ReplicatedObject> VersionLockedObject<T> {
    pub fn new(stream: StreamId, object: T) -> Self {
        Self {
            stream,
            state: RwLock::new(VloState {
                object,
                version: GlobalAddress::NEVER_READ,
                overlay: None,
                overlay_owner: None,
            }),
        }
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Fast path: runs `read` under the read lock if `guard` holds. On a
    /// miss, upgrades to the write lock, runs `sync`, then `read` (§4.1).
    pub fn access<R>(
        &self,
        guard: impl Fn(&VloState<T>) -> bool,
        sync: impl FnOnce(&mut VloState<T>) -> Result<(), crate::error::ExternalError>,
        read: impl FnOnce(&T) -> R,
    ) -> Result<R, crate::error::ExternalError> {
        {
            let state = self.state.read();
            if guard(&state) {
                trace!(stream = ?self.stream, "access fast path");
                return Ok(read(&state.object));
            }
        }
        let mut state = self.state.write();
        if !guard(&state) {
            debug!(stream = ?self.stream, "access sync miss");
            sync(&mut state)?;
        }
        Ok(read(&state.object))
    }

    /// Acquires the write lock unconditionally and runs `f`; used by commit
    /// installation and rollforward-with-side-effects.
    pub fn update<R>(&self, f: impl FnOnce(&mut VloState<T>) -> R) -> R {
        f(&mut self.state.write())
    }

    /// Invokes `read` without syncing, used by DEFERRED contexts to capture
    /// a closure of the accessor for later execution at commit time (§4.6).
    pub fn no_access<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        read(&self.state.read().object)
    }

    pub fn version(&self) -> GlobalAddress {
        self.state.read().version
    }

    pub fn overlay_owner(&self) -> Option<ThreadId> {
        self.state.read().overlay_owner
    }

    pub fn has_overlay(&self) -> bool {
        self.state.read().overlay.is_some()
    }

    /// Used by precise-conflict resolution (§4.4.7) to classify a committed
    /// entry's conflict parameters without the caller needing to know `T`.
    pub fn conflict_params(
        &self,
        method: &str,
        args: &crate::smr::Payload,
    ) -> crate::object::ConflictResult {
        self.state.read().object.conflict_params(method, args)
    }

    /// Undoes and releases the overlay if it's still owned by `thread`,
    /// used by `TXAbort` to clear overlay ownership for an aborted
    /// context's touched proxies (§4.8).
    pub fn release_overlay_if_owned(&self, thread: ThreadId) {
        let mut state = self.state.write();
        if state.overlay_owner() == Some(thread) {
            state.undo_overlay(self.stream);
        }
    }
}
