// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

mod common;

use std::sync::{Arc, Mutex};
use std::thread;

use common::{new_proxy, new_runtime, tx_put};
use txlog::{tx_begin, Flavor};

#[test]
fn deferred_accessor_observes_the_commit_time_snapshot() {
    let (runtime, _services) = new_runtime();
    let proxy = new_proxy(&runtime);

    // Something is written before the transaction even begins.
    {
        let setup = tx_begin(&runtime, Flavor::Optimistic).unwrap();
        tx_put(&setup, &proxy, "k", "42").unwrap();
        txlog::tx_end(&setup).unwrap();
    }

    let ctx = tx_begin(&runtime, Flavor::Deferred).unwrap();
    let observed = Arc::new(Mutex::new(None));
    {
        let observed = observed.clone();
        let map_proxy = proxy.clone();
        ctx.access_deferred(&map_proxy, move |m| {
            *observed.lock().unwrap() = m.get("k");
        });
    }

    // A second client, on its own thread, commits a write strictly between
    // this context's begin() and commit(); the deferred closure should
    // observe it, since DEFERRED fixes its snapshot at commit time rather
    // than at first read.
    {
        let runtime = runtime.clone();
        let proxy = proxy.clone();
        thread::spawn(move || {
            let writer = tx_begin(&runtime, Flavor::Deferred).unwrap();
            tx_put(&writer, &proxy, "k", "43").unwrap();
            txlog::tx_end(&writer).unwrap();
        })
        .join()
        .unwrap();
    }

    let address = txlog::tx_end(&ctx).unwrap();
    assert!(address.is_address());
    assert_eq!(*observed.lock().unwrap(), Some("43".to_string()));
}

#[test]
fn deferred_commit_with_no_writes_and_no_accessors_is_nowrite() {
    let (runtime, _services) = new_runtime();
    let ctx = tx_begin(&runtime, Flavor::Deferred).unwrap();
    let address = txlog::tx_end(&ctx).unwrap();
    assert_eq!(address, txlog::GlobalAddress::NOWRITE_ADDRESS);
}

#[test]
fn deferred_commit_affects_both_written_and_deferred_streams() {
    let (runtime, _services) = new_runtime();
    let proxy_a = new_proxy(&runtime);
    let proxy_b = new_proxy(&runtime);

    let ctx = tx_begin(&runtime, Flavor::Deferred).unwrap();
    tx_put(&ctx, &proxy_b, "written", "b").unwrap();
    ctx.access_deferred(&proxy_a, |_m| {});
    let address = txlog::tx_end(&ctx).unwrap();
    assert!(address.is_address());
}
