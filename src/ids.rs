// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::fmt;

use uuid::Uuid;

/// Opaque 128-bit identifier of a replicated stream. Each replicated object
/// has exactly one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(Uuid);

impl StreamId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// The fixed stream receiving a mirror of every committing transaction
    /// when transaction logging is enabled.
    pub fn transaction_stream() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 64-bit monotonically increasing log position, represented internally as
/// `i64` so that the reserved sentinels can live outside the range of real
/// addresses (which are always `>= 0`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobalAddress(i64);

impl GlobalAddress {
    /// No read has ever happened; used as the initial version of a freshly
    /// created Version-Locked Object.
    pub const NEVER_READ: GlobalAddress = GlobalAddress(-1);

    /// Returned by a read-only commit: no log append occurred.
    pub const NOWRITE_ADDRESS: GlobalAddress = GlobalAddress(-5);

    /// Returned by a nested commit that folded into its parent.
    pub const FOLDED_ADDRESS: GlobalAddress = GlobalAddress(-6);

    /// The largest representable address; used as an open upper bound for
    /// scans.
    pub const MAX: GlobalAddress = GlobalAddress(i64::MAX);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// A "real" address is one a log entry could actually occupy, i.e. not
    /// one of the reserved sentinels.
    pub const fn is_address(self) -> bool {
        self.0 >= 0
    }

    pub fn next(self) -> Self {
        debug_assert!(self.is_address());
        Self(self.0 + 1)
    }

    pub fn prev(self) -> Self {
        debug_assert!(self.is_address());
        Self(self.0 - 1)
    }
}

impl fmt::Debug for GlobalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NEVER_READ => write!(f, "NEVER_READ"),
            Self::NOWRITE_ADDRESS => write!(f, "NOWRITE_ADDRESS"),
            Self::FOLDED_ADDRESS => write!(f, "FOLDED_ADDRESS"),
            Self::MAX => write!(f, "MAX"),
            GlobalAddress(v) => write!(f, "{v}"),
        }
    }
}
