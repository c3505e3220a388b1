// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

mod common;

use common::{new_proxy, new_runtime, tx_get, tx_put, tx_put_fire_and_forget};
use txlog::{tx_abort, tx_begin, AbortCause, Flavor, GlobalAddress};

#[test]
fn read_your_own_writes_before_commit() {
    let (runtime, _services) = new_runtime();
    let proxy = new_proxy(&runtime);

    let ctx = tx_begin(&runtime, Flavor::Optimistic).unwrap();
    assert_eq!(tx_get(&ctx, &proxy, "k").unwrap(), None);
    tx_put(&ctx, &proxy, "k", "v1").unwrap();
    assert_eq!(tx_get(&ctx, &proxy, "k").unwrap(), Some("v1".to_string()));

    let address = tx_end_ok(&ctx);
    assert!(address.is_address());
}

#[test]
fn re_read_after_a_bare_log_update_sees_the_new_write() {
    let (runtime, _services) = new_runtime();
    let proxy = new_proxy(&runtime);

    let ctx = tx_begin(&runtime, Flavor::Optimistic).unwrap();
    assert_eq!(tx_get(&ctx, &proxy, "k").unwrap(), None);
    tx_put_fire_and_forget(&ctx, &proxy, "k", "v1");
    assert_eq!(tx_get(&ctx, &proxy, "k").unwrap(), Some("v1".to_string()));
}

#[test]
fn read_only_commit_returns_nowrite_address() {
    let (runtime, _services) = new_runtime();
    let proxy = new_proxy(&runtime);

    let ctx = tx_begin(&runtime, Flavor::Optimistic).unwrap();
    let _ = tx_get(&ctx, &proxy, "k").unwrap();
    let address = tx_end_ok(&ctx);
    assert_eq!(address, GlobalAddress::NOWRITE_ADDRESS);
}

#[test]
fn second_transaction_observes_first_committed_write() {
    let (runtime, _services) = new_runtime();
    let proxy = new_proxy(&runtime);

    let ctx1 = tx_begin(&runtime, Flavor::Optimistic).unwrap();
    tx_put(&ctx1, &proxy, "k", "1").unwrap();
    tx_end_ok(&ctx1);

    let ctx2 = tx_begin(&runtime, Flavor::Optimistic).unwrap();
    assert_eq!(tx_get(&ctx2, &proxy, "k").unwrap(), Some("1".to_string()));
    tx_put(&ctx2, &proxy, "k", "2").unwrap();
    tx_end_ok(&ctx2);

    let ctx3 = tx_begin(&runtime, Flavor::Optimistic).unwrap();
    assert_eq!(tx_get(&ctx3, &proxy, "k").unwrap(), Some("2".to_string()));
}

#[test]
fn abort_releases_overlay_so_next_transaction_is_unaffected() {
    let (runtime, _services) = new_runtime();
    let proxy = new_proxy(&runtime);

    let ctx = tx_begin(&runtime, Flavor::Optimistic).unwrap();
    tx_put(&ctx, &proxy, "k", "speculative").unwrap();
    let aborted = tx_abort(&ctx, AbortCause::User);
    assert_eq!(aborted.cause, AbortCause::User);

    let ctx2 = tx_begin(&runtime, Flavor::Optimistic).unwrap();
    assert_eq!(tx_get(&ctx2, &proxy, "k").unwrap(), None);
}

fn tx_end_ok(ctx: &std::sync::Arc<txlog::TxContext>) -> GlobalAddress {
    txlog::tx_end(ctx).expect("commit should succeed")
}
