// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;
use std::thread::ThreadId;

use crate::error::ExternalError;
use crate::external::LogClient;
use crate::ids::{GlobalAddress, StreamId};
use crate::object::{ConflictResult, ReplicatedObject};
use crate::smr::Payload;
use crate::vlo::VersionLockedObject;

/// Binds a user object type to a stream and its Version-Locked Object (§3,
/// §4). The Transactional Context talks to objects only through a Proxy,
/// never the Version-Locked Object directly, so the object type stays
/// generic at the call site while the Runtime's proxy registry can still
/// hold proxies of different object types behind [`ErasedProxy`].
pub struct Proxy<T: ReplicatedObject> {
    vlo: Arc<VersionLockedObject<T>>,
}

impl<T: ReplicatedObject> Proxy<T> {
    pub fn new(stream: StreamId, object: T) -> Self {
        Self { vlo: Arc::new(VersionLockedObject::new(stream, object)) }
    }

    pub fn stream(&self) -> StreamId {
        self.vlo.stream()
    }

    pub fn vlo(&self) -> &Arc<VersionLockedObject<T>> {
        &self.vlo
    }
}

impl<T: ReplicatedObject> Clone for Proxy<T> {
    fn clone(&self) -> Self {
        Self { vlo: self.vlo.clone() }
    }
}

/// The stream-identity + conflict-classification surface a Proxy exposes
/// without requiring the caller to know its object type `T` — what the
/// Runtime's proxy registry and the precise-conflict loop (§4.4.7) need.
/// Proxy-to-Context is otherwise a weak back-reference by stream id (§9
/// design notes: "break with indirection").
pub trait ErasedProxy: Send + Sync {
    fn stream(&self) -> StreamId;

    fn conflict_params(&self, method: &str, args: &Payload) -> ConflictResult;

    /// Post-commit installation (§4.4.6): if this proxy's overlay is still
    /// owned by `thread`, applies it as committed, replays any entries
    /// committed by other transactions up to `commit_address - 1`, and
    /// advances the version past `commit_address`. No-op if ownership was
    /// stolen in the meantime.
    fn install_commit(
        &self,
        thread: ThreadId,
        commit_address: GlobalAddress,
        log: &dyn LogClient,
    ) -> Result<(), ExternalError>;

    /// Releases this proxy's overlay if `thread` owns it, without applying
    /// it, used when a context aborts (§4.8).
    fn release_overlay(&self, thread: ThreadId);
}

impl<T: ReplicatedObject> ErasedProxy for Proxy<T> {
    fn stream(&self) -> StreamId {
        self.vlo.stream()
    }

    fn conflict_params(&self, method: &str, args: &Payload) -> ConflictResult {
        self.vlo.conflict_params(method, args)
    }

    fn install_commit(
        &self,
        thread: ThreadId,
        commit_address: GlobalAddress,
        log: &dyn LogClient,
    ) -> Result<(), ExternalError> {
        let stream = self.vlo.stream();
        self.vlo.update(|state| {
            if state.overlay_owner() != Some(thread) {
                return Ok(());
            }
            state.apply_overlay(stream);
            state.clear_overlay();
            if commit_address.prev().as_i64() >= state.version().as_i64() {
                state.replay_from_log(stream, commit_address.prev(), log)?;
            }
            state.set_version(commit_address.next());
            Ok(())
        })
    }

    fn release_overlay(&self, thread: ThreadId) {
        self.vlo.release_overlay_if_owned(thread);
    }
}
