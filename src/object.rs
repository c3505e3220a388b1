// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use crate::fingerprint::ConflictParam;
use crate::smr::{Payload, SmrEntry};

/// The hook a user's materialized object (map, set, counter, ...) implements
/// so the engine can apply, undo, and reason about conflicts for its
/// mutations generically. §3 calls this "arbitrary in-memory objects"; this
/// trait is the concrete shape that assumption takes.
pub trait ReplicatedObject: Send + 'static {
    /// Applies `method(args)` to `self`, returning the upcall result (for
    /// accessor-mutators such as `map.put(k, v) -> Option<V>`).
    fn apply(&mut self, method: &str, args: &Payload) -> Payload;

    /// Applies the inverse of a previously-applied entry. Only called when
    /// `entry.is_undoable()`.
    fn undo(&mut self, entry: &SmrEntry);

    /// Resets to the object's origin (version `NEVER_READ`), for the
    /// fallback path when an in-place undo isn't possible (§4.1 step 1-2).
    fn reset(&mut self);

    /// The conflict parameters a committed `method(args)` entry touches —
    /// used by precise-conflict resolution (§4.4.7) to decide whether a
    /// fingerprint collision was a real conflict.
    fn conflict_params(&self, method: &str, args: &Payload) -> ConflictResult;
}

/// Result of [`ReplicatedObject::conflict_params`].
#[derive(Clone, Debug)]
pub enum ConflictResult {
    /// This mutation conflicts with nothing (e.g. a pure accessor should
    /// never reach here, but some mutators may be provably commutative).
    None,
    /// This mutation conflicts with any update on the stream.
    All,
    /// This mutation conflicts with exactly these parameters.
    Params(Vec<ConflictParam>),
}

impl ConflictResult {
    pub fn intersects(&self, others: &[ConflictParam]) -> bool {
        match self {
            ConflictResult::None => false,
            ConflictResult::All => true,
            ConflictResult::Params(params) => {
                others.iter().any(|o| matches!(o, ConflictParam::All) || params.contains(o))
            }
        }
    }
}
