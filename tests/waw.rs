// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{new_proxy, new_runtime, tx_get, tx_put};
use txlog::{tx_begin, AbortCause, Flavor};

#[test]
fn reads_do_not_conflict_only_writes_do() {
    let (runtime, _services) = new_runtime();
    let proxy = new_proxy(&runtime);

    let ctx = tx_begin(&runtime, Flavor::WriteAfterWrite).unwrap();
    assert_eq!(tx_get(&ctx, &proxy, "untouched").unwrap(), None);

    // A concurrent writer commits to the same key this context only read.
    {
        let other = tx_begin(&runtime, Flavor::WriteAfterWrite).unwrap();
        tx_put(&other, &proxy, "untouched", "from elsewhere").unwrap();
        txlog::tx_end(&other).unwrap();
    }

    // WAW never recorded the read as a conflict param, so this still commits.
    tx_put(&ctx, &proxy, "mine", "value").unwrap();
    let address = txlog::tx_end(&ctx).unwrap();
    assert!(address.is_address());
}

#[test]
fn concurrent_writers_to_the_same_key_one_aborts() {
    let (runtime, _services) = new_runtime();
    let proxy = new_proxy(&runtime);
    let barrier = Arc::new(Barrier::new(2));

    let results: Vec<_> = [0, 1]
        .into_iter()
        .map(|i| {
            let runtime = runtime.clone();
            let proxy = proxy.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let ctx = tx_begin(&runtime, Flavor::WriteAfterWrite).unwrap();
                // Force the snapshot to be fetched before either thread writes.
                let _ = tx_get(&ctx, &proxy, "k").unwrap();
                barrier.wait();
                tx_put(&ctx, &proxy, "k", if i == 0 { "a" } else { "b" }).unwrap();
                txlog::tx_end(&ctx)
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    let ok_count = results.iter().filter(|r| r.is_ok()).count();
    let err_count = results.iter().filter(|r| r.is_err()).count();
    assert_eq!(ok_count, 1, "exactly one writer should commit");
    assert_eq!(err_count, 1, "exactly one writer should abort on conflict");
    let aborted = results.into_iter().find_map(|r| r.err()).unwrap();
    let txlog::Error::Aborted(aborted) = aborted else { panic!("expected an abort") };
    assert_eq!(aborted.cause, AbortCause::Conflict);
}
