// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! A minimal `ReplicatedObject` (a string-to-string map) plus Runtime/Proxy
//! wiring shared by the integration suites.

use std::collections::HashMap;
use std::sync::Arc;

use txlog::fingerprint::ConflictParam;
use txlog::object::{ConflictResult, ReplicatedObject};
use txlog::smr::{Payload, SmrEntry};
use txlog::test_utils::InMemoryServices;
use txlog::{ExternalServices, Proxy, Result, Runtime, RuntimeConfig, StreamId, TxContext};

#[derive(Default, Clone)]
pub struct TestMap {
    data: HashMap<String, String>,
}

impl TestMap {
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.get(key).cloned()
    }
}

impl ReplicatedObject for TestMap {
    fn apply(&mut self, method: &str, args: &Payload) -> Payload {
        match method {
            "put" => {
                let (k, v) = args.downcast_ref::<(String, String)>().expect("put args");
                Arc::new(self.data.insert(k.clone(), v.clone()))
            }
            "remove" => {
                let k = args.downcast_ref::<String>().expect("remove args");
                Arc::new(self.data.remove(k))
            }
            other => panic!("unknown method {other}"),
        }
    }

    fn undo(&mut self, entry: &SmrEntry) {
        let Some(undo) = &entry.undo_record else { return };
        let old = undo.downcast_ref::<Option<String>>().expect("undo record shape");
        match entry.method.as_ref() {
            "put" => {
                let (k, _) = entry.args.downcast_ref::<(String, String)>().expect("put args");
                match old {
                    Some(v) => {
                        self.data.insert(k.clone(), v.clone());
                    }
                    None => {
                        self.data.remove(k);
                    }
                }
            }
            "remove" => {
                let k = entry.args.downcast_ref::<String>().expect("remove args");
                if let Some(v) = old {
                    self.data.insert(k.clone(), v.clone());
                }
            }
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.data.clear();
    }

    fn conflict_params(&self, method: &str, args: &Payload) -> ConflictResult {
        let key = match method {
            "put" => args.downcast_ref::<(String, String)>().map(|(k, _)| k.clone()),
            "remove" => args.downcast_ref::<String>().cloned(),
            _ => None,
        };
        match key {
            Some(k) => ConflictResult::Params(vec![ConflictParam::from_bytes(k.into_bytes())]),
            None => ConflictResult::All,
        }
    }
}

pub fn key_conflict(key: &str) -> Vec<ConflictParam> {
    vec![ConflictParam::from_bytes(key.as_bytes().to_vec())]
}

/// A fresh `Runtime` wired to its own in-memory log + sequencer, and a handle
/// to that harness for inspecting log shape directly in assertions.
pub fn new_runtime() -> (Arc<Runtime>, Arc<InMemoryServices>) {
    let services = InMemoryServices::new();
    let as_services: Arc<dyn ExternalServices> = services.clone();
    let runtime = Runtime::new(as_services, RuntimeConfig::default());
    (runtime, services)
}

pub fn new_proxy(runtime: &Arc<Runtime>) -> Proxy<TestMap> {
    let proxy = Proxy::new(StreamId::new(), TestMap::default());
    runtime.register_proxy(Arc::new(proxy.clone()));
    proxy
}

/// Reads `key` through the context, populating the conflict set as the
/// active flavor dictates.
pub fn tx_get(ctx: &TxContext, proxy: &Proxy<TestMap>, key: &str) -> Result<Option<String>> {
    ctx.access(proxy, key_conflict(key), |m| m.get(key))
}

/// Reads the current value (for the undo record), then speculatively writes
/// `key = value`, returning the upcall result (the prior value, if any).
pub fn tx_put(ctx: &TxContext, proxy: &Proxy<TestMap>, key: &str, value: &str) -> Result<Option<String>> {
    let conflict = key_conflict(key);
    let old = ctx.access(proxy, conflict.clone(), |m| m.get(key))?;
    let args: Payload = Arc::new((key.to_string(), value.to_string()));
    let undo: Payload = Arc::new(old);
    let entry = SmrEntry::new("put", args).with_undo(undo);
    let index = ctx.log_update(proxy, entry, conflict.clone());
    let result = ctx.get_upcall_result(proxy, index, conflict)?;
    Ok(result.and_then(|p| p.downcast_ref::<Option<String>>().cloned()).flatten())
}

/// Like [`tx_put`], but never calls `get_upcall_result` — the overlay sync
/// that call triggers as a side effect of fetching the upcall result. Isolates
/// `logUpdate`'s own effect on a subsequent `access` within the same
/// transaction.
pub fn tx_put_fire_and_forget(ctx: &TxContext, proxy: &Proxy<TestMap>, key: &str, value: &str) {
    let conflict = key_conflict(key);
    let args: Payload = Arc::new((key.to_string(), value.to_string()));
    let undo: Payload = Arc::new(None::<String>);
    let entry = SmrEntry::new("put", args).with_undo(undo);
    let _ = ctx.log_update(proxy, entry, conflict);
}
