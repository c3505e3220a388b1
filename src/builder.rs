// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Transaction Builder + Entry API (§4.8, §2 component 7): `TXBuild().set_type(flavor)
//! .begin()`, `TXEnd`, `TXAbort`. Discovers an existing root to nest under
//! via the Runtime's context stack (kept separate from the lightweight
//! [`crate::registry::TransactionRegistry`], which only needs the write-set
//! chain — see §2 component 6 vs. 7).

use std::sync::Arc;

use crate::context::TxContext;
use crate::error::{AbortCause, Error, Result, TransactionAbortedError};
use crate::flavor::Flavor;
use crate::ids::GlobalAddress;
use crate::runtime::Runtime;

/// `TXBuild().setType(flavor).setSnapshot(opt).begin()` (§4.8).
#[derive(Clone, Copy, Debug)]
pub struct TxBuilder {
    flavor: Flavor,
    snapshot_override: Option<GlobalAddress>,
    precise_conflicts_override: Option<bool>,
}

impl TxBuilder {
    pub fn new(flavor: Flavor) -> Self {
        Self { flavor, snapshot_override: None, precise_conflicts_override: None }
    }

    pub fn set_type(mut self, flavor: Flavor) -> Self {
        self.flavor = flavor;
        self
    }

    pub fn set_snapshot(mut self, snapshot: GlobalAddress) -> Self {
        self.snapshot_override = Some(snapshot);
        self
    }

    pub fn set_precise_conflicts(mut self, precise: bool) -> Self {
        self.precise_conflicts_override = Some(precise);
        self
    }

    /// Creates and pushes a context on the calling thread, nesting under any
    /// context already active on this thread. Nesting under a root of a
    /// different flavor is rejected (§4.7).
    pub fn begin(self, runtime: &Arc<Runtime>) -> Result<Arc<TxContext>> {
        let thread = std::thread::current().id();
        let parent = runtime.current_context(thread);
        if let Some(parent) = &parent {
            if parent.flavor() != self.flavor {
                return Err(Error::NestingFlavorMismatch {
                    existing: parent.flavor(),
                    attempted: self.flavor,
                });
            }
        }
        let precise_conflicts = self
            .precise_conflicts_override
            .unwrap_or(runtime.config().precise_conflicts_default);
        let ctx =
            TxContext::new(runtime.clone(), self.flavor, thread, parent, self.snapshot_override, precise_conflicts);
        runtime.push_context(thread, ctx.clone());
        Ok(ctx)
    }
}

/// `TXBegin()` shorthand for `TxBuilder::new(flavor).begin(runtime)`.
pub fn tx_begin(runtime: &Arc<Runtime>, flavor: Flavor) -> Result<Arc<TxContext>> {
    TxBuilder::new(flavor).begin(runtime)
}

/// `TXEnd()`: commits the current context.
pub fn tx_end(ctx: &Arc<TxContext>) -> Result<GlobalAddress> {
    ctx.commit()
}

/// `TXAbort()`: discards the context, releasing overlay ownership for every
/// proxy it touched.
pub fn tx_abort(ctx: &Arc<TxContext>, cause: AbortCause) -> TransactionAbortedError {
    ctx.abort(cause)
}
