// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! DEFERRED commit (§4.6): the snapshot is fixed at commit time rather than
//! first read, and deferred closures captured by `NO_CONFLICT` accessors run
//! once between token acquisition and the finalizing append.

use std::sync::Arc;

use indexmap::IndexSet;
use tracing::{info, instrument};

use super::TxContext;
use crate::error::Result;
use crate::external::TxResolutionInfo;
use crate::fingerprint::Fingerprint;
use crate::ids::{GlobalAddress, StreamId};

#[instrument(level = "debug", skip(ctx), fields(txid = %ctx.txid))]
pub(crate) fn commit(ctx: &Arc<TxContext>) -> Result<GlobalAddress> {
    if let Some(parent) = ctx.parent() {
        ctx.fold_into_parent(parent);
        ctx.clear_thread_state();
        info!(txid = %ctx.txid, "nested deferred transaction folded into parent");
        return Ok(GlobalAddress::FOLDED_ADDRESS);
    }

    let write_streams = ctx.write_set.lock().streams();
    let future_streams = ctx.future_affected_streams.lock().clone();
    if write_streams.is_empty() && future_streams.is_empty() {
        ctx.clear_thread_state();
        return Ok(GlobalAddress::NOWRITE_ADDRESS);
    }

    let mut affected: IndexSet<StreamId> = write_streams.union(&future_streams).copied().collect();
    if ctx.runtime().config().transaction_logging {
        affected.insert(StreamId::transaction_stream());
    }

    let token_response = ctx
        .runtime()
        .services()
        .sequencer()
        .next_token(&affected, 1)
        .map_err(|e| e.into_abort(ctx.txid))?;
    let token = token_response.token;
    let snapshot = token.prev();
    ctx.set_snapshot(snapshot);

    for closure in ctx.deferred.lock().drain(..) {
        closure();
    }

    let ws = ctx.write_set.lock();
    let payload = ws.multi_object_entry();
    let reads = ws.hashed_conflicts();
    drop(ws);
    let writes = affected
        .iter()
        .map(|s| (*s, IndexSet::from_iter([Fingerprint::All])))
        .collect();
    let resolution = TxResolutionInfo::new(ctx.txid, snapshot, reads, writes);

    let address = match ctx
        .runtime()
        .services()
        .sequencer()
        .finalize(token, &affected, &payload, &resolution)
    {
        Ok(address) => address,
        Err(err) => {
            ctx.clear_thread_state();
            return Err(err.into_abort(ctx.txid).into());
        }
    };

    if let Err(err) = install_commit(ctx, address) {
        tracing::warn!(txid = %ctx.txid, ?err, "post-commit installation failed on one or more proxies");
    }
    ctx.clear_thread_state();
    info!(txid = %ctx.txid, ?address, "deferred transaction committed");
    Ok(address)
}

fn install_commit(ctx: &Arc<TxContext>, address: GlobalAddress) -> Result<()> {
    let log = ctx.runtime().services().log();
    for proxy in ctx.modified_proxies.lock().values() {
        proxy.install_commit(ctx.thread(), address, log).map_err(crate::error::Error::from)?;
    }
    Ok(())
}
