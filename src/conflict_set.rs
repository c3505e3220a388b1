// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::collections::HashMap;

use indexmap::IndexSet;

use crate::fingerprint::{ConflictParam, Fingerprint};
use crate::ids::StreamId;

/// Mapping from stream to the set of opaque conflict-parameter objects read
/// (or, inside a [`WriteSet`](crate::write_set::WriteSet), written) against
/// it. A Proxy binds exactly one stream (§3), so this is keyed directly by
/// stream rather than by proxy identity.
#[derive(Clone, Default, Debug)]
pub struct ConflictSet {
    params: HashMap<StreamId, IndexSet<ConflictParam>>,
}

impl ConflictSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stream: StreamId, param: ConflictParam) {
        self.params.entry(stream).or_default().insert(param);
    }

    pub fn params_for(&self, stream: StreamId) -> impl Iterator<Item = &ConflictParam> {
        self.params.get(&stream).into_iter().flatten()
    }

    pub fn streams(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.params.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// The hashed view: stream -> set of fixed-width fingerprints, as sent
    /// to the sequencer (§4.3).
    pub fn hashed(&self) -> HashMap<StreamId, IndexSet<Fingerprint>> {
        self.params
            .iter()
            .map(|(stream, params)| {
                (*stream, params.iter().map(ConflictParam::fingerprint).collect())
            })
            .collect()
    }

    /// Unions `other`'s per-stream parameters into `self`, used when a
    /// nested transaction folds into its parent (§4.7).
    pub fn merge(&mut self, other: &ConflictSet) {
        for (stream, params) in &other.params {
            let entry = self.params.entry(*stream).or_default();
            for param in params {
                entry.insert(param.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_unions_per_stream_params() {
        let s = StreamId::new();
        let mut a = ConflictSet::new();
        a.record(s, ConflictParam::from_bytes(b"k1".to_vec()));
        let mut b = ConflictSet::new();
        b.record(s, ConflictParam::from_bytes(b"k2".to_vec()));

        a.merge(&b);
        assert_eq!(a.params_for(s).count(), 2);
    }

    #[test]
    fn hashed_view_maps_all_to_distinct_fingerprint() {
        let s = StreamId::new();
        let mut cs = ConflictSet::new();
        cs.record(s, ConflictParam::All);
        let hashed = cs.hashed();
        assert_eq!(hashed[&s].iter().next(), Some(&Fingerprint::All));
    }
}
