// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

/// The three transaction flavors a context can be built as (§4.4-§4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flavor {
    /// Snapshot fixed at first read; reads and writes both populate the
    /// conflict set; aborts on any read-set fingerprint overlap.
    Optimistic,
    /// Like `Optimistic`, but reads do not populate the conflict set — only
    /// writes do, so commit aborts only on write-write conflicts.
    WriteAfterWrite,
    /// Snapshot fixed at commit time; `NO_CONFLICT` accessors are captured
    /// as closures and replayed against the commit-time snapshot.
    Deferred,
}
