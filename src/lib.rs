// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! A client-side optimistic transaction engine for in-memory objects
//! replicated off a shared, totally-ordered log.
//!
//! Each replicated object lives behind a [`Proxy`] bound to a [`StreamId`]
//! and materialized locally as a [`vlo::VersionLockedObject`]. A
//! [`Runtime`] holds the proxy registry and the external service clients
//! (sequencer + log, §6); transactions are built with [`TxBuilder`] in one
//! of three flavors ([`Flavor::Optimistic`], [`Flavor::WriteAfterWrite`],
//! [`Flavor::Deferred`]) and driven through [`TxContext::access`],
//! [`TxContext::commit`], and [`TxContext::abort`].

pub mod builder;
pub mod conflict_set;
pub mod context;
pub mod error;
pub mod external;
pub mod fingerprint;
pub mod flavor;
pub mod ids;
pub mod object;
pub mod proxy;
pub mod registry;
pub mod runtime;
pub mod smr;
pub mod write_set;
pub mod vlo;

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

pub use builder::{tx_abort, tx_begin, tx_end, TxBuilder};
pub use context::TxContext;
pub use error::{AbortCause, Error, ExternalError, Result, TransactionAbortedError};
pub use external::{ExternalServices, LogClient, SequencerClient, SharedExternalServices, StreamScanner};
pub use flavor::Flavor;
pub use ids::{GlobalAddress, StreamId};
pub use object::{ConflictResult, ReplicatedObject};
pub use proxy::{ErasedProxy, Proxy};
pub use runtime::{Runtime, RuntimeConfig};
