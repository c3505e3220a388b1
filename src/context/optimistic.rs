// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Commit body shared by OPTIMISTIC and WRITE-AFTER-WRITE (§4.4.5, §4.5):
//! the two flavors only differ in what populates the conflict set, handled
//! in [`super::TxContext::access`] / [`super::TxContext::log_update`].

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexSet;
use tracing::{info, instrument, warn};

use super::TxContext;
use crate::error::{ExternalError, Result};
use crate::external::TxResolutionInfo;
use crate::fingerprint::{ConflictParam, Fingerprint};
use crate::ids::{GlobalAddress, StreamId};
use crate::smr::MultiObjectSmrEntry;

#[instrument(level = "debug", skip(ctx), fields(txid = %ctx.txid))]
pub(crate) fn commit(ctx: &Arc<TxContext>) -> Result<GlobalAddress> {
    if let Some(parent) = ctx.parent() {
        ctx.fold_into_parent(parent);
        ctx.clear_thread_state();
        info!(txid = %ctx.txid, "nested transaction folded into parent");
        return Ok(GlobalAddress::FOLDED_ADDRESS);
    }

    if ctx.write_set.lock().is_empty() {
        ctx.clear_thread_state();
        return Ok(GlobalAddress::NOWRITE_ADDRESS);
    }

    let snapshot = ctx.ensure_snapshot()?;
    let (mut affected, payload, reads, writes) = write_set_wire(ctx);
    if ctx.runtime().config().transaction_logging {
        affected.insert(StreamId::transaction_stream());
    }
    let resolution = TxResolutionInfo::new(ctx.txid, snapshot, reads, writes);

    let attempt = ctx.runtime().services().sequencer().append(&affected, &payload, &resolution);
    let address = match attempt {
        Ok(address) => address,
        Err(conflict @ ExternalError::Conflict { .. }) => {
            if !ctx.precise_conflicts() {
                ctx.clear_thread_state();
                return Err(conflict.into_abort(ctx.txid).into());
            }
            match do_precise_commit(ctx, conflict, &affected, &payload, &resolution) {
                Ok(address) => address,
                Err(err) => {
                    ctx.clear_thread_state();
                    return Err(err);
                }
            }
        }
        Err(other) => {
            ctx.clear_thread_state();
            return Err(other.into_abort(ctx.txid).into());
        }
    };

    if let Err(err) = install_commit(ctx, address) {
        warn!(txid = %ctx.txid, ?err, "post-commit installation failed on one or more proxies");
    }
    ctx.clear_thread_state();
    info!(txid = %ctx.txid, ?address, "transaction committed");
    Ok(address)
}

/// Builds the sequencer-facing payload: affected streams, the Multi-Object
/// SMR Entry, the hashed read set, and a conservative hashed write set (one
/// `ALL` fingerprint per written stream — the sequencer only needs to know
/// *that* a stream was dirtied by this commit, not by which parameter) (§4.3,
/// §6.3).
fn write_set_wire(
    ctx: &TxContext,
) -> (
    IndexSet<StreamId>,
    MultiObjectSmrEntry,
    HashMap<StreamId, IndexSet<Fingerprint>>,
    HashMap<StreamId, IndexSet<Fingerprint>>,
) {
    let ws = ctx.write_set.lock();
    let streams = ws.streams();
    let payload = ws.multi_object_entry();
    let reads = ws.hashed_conflicts();
    let writes = streams
        .iter()
        .map(|s| (*s, IndexSet::from_iter([Fingerprint::All])))
        .collect();
    (streams, payload, reads, writes)
}

/// §4.4.7: when the sequencer reports a fingerprint-level conflict and the
/// context requires precise conflicts, scan the conflicting range for an
/// actual overlap before giving up.
fn do_precise_commit(
    ctx: &Arc<TxContext>,
    first_conflict: ExternalError,
    affected: &IndexSet<StreamId>,
    payload: &MultiObjectSmrEntry,
    base_resolution: &TxResolutionInfo,
) -> Result<GlobalAddress> {
    let mut verified: HashMap<StreamId, GlobalAddress> = HashMap::new();
    let mut conflict = first_conflict;
    loop {
        let (conflict_stream, conflict_addr) = match conflict {
            ExternalError::Conflict { stream, address } => (stream, address),
            other => return Err(other.into_abort(ctx.txid).into()),
        };

        let proxy = match ctx.runtime().lookup_proxy(conflict_stream) {
            Some(proxy) => proxy,
            // Open Question (3): original code logs and continues to throw
            // currentException. We abort with the original exception
            // unmodified rather than invent a different cause.
            None => {
                return Err(ExternalError::Conflict { stream: conflict_stream, address: conflict_addr }
                    .into_abort(ctx.txid)
                    .into());
            }
        };

        let my_params: Vec<ConflictParam> = ctx.write_set.lock().conflict_params_for(conflict_stream);
        let mut scanner = ctx.runtime().services().log().scanner(conflict_stream);
        scanner.seek(base_resolution.snapshot.next());
        let committed = scanner.stream_up_to(conflict_addr).map_err(|e| e.into_abort(ctx.txid))?;
        for (_, data) in committed {
            let Some(entry_payload) = data.payload else { continue };
            for entry in entry_payload.entries_for(conflict_stream) {
                let classified = proxy.conflict_params(&entry.method, &entry.args);
                if classified.intersects(&my_params) {
                    return Err(ExternalError::Conflict { stream: conflict_stream, address: conflict_addr }
                        .into_abort(ctx.txid)
                        .precise()
                        .into());
                }
            }
        }
        verified.insert(conflict_stream, conflict_addr);

        let resolution = base_resolution.clone().with_verified(verified.clone());
        match ctx.runtime().services().sequencer().append(affected, payload, &resolution) {
            Ok(address) => return Ok(address),
            Err(next @ ExternalError::Conflict { .. }) => {
                conflict = next;
                continue;
            }
            Err(other) => return Err(other.into_abort(ctx.txid).into()),
        }
    }
}

/// Post-commit installation (§4.4.6): for every modified proxy, apply the
/// overlay as committed, catch up on anything committed concurrently, and
/// advance the version past the new commit address.
fn install_commit(ctx: &Arc<TxContext>, address: GlobalAddress) -> Result<()> {
    let log = ctx.runtime().services().log();
    for proxy in ctx.modified_proxies.lock().values() {
        proxy.install_commit(ctx.thread(), address, log).map_err(crate::error::Error::from)?;
    }
    Ok(())
}
