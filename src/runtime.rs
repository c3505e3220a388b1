// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;

use crossbeam_skiplist::SkipMap;
use parking_lot::Mutex;

use crate::context::TxContext;
use crate::external::SharedExternalServices;
use crate::ids::StreamId;
use crate::proxy::ErasedProxy;
use crate::registry::TransactionRegistry;

/// Constructor-time knobs the embedder sets on a [`Runtime`] (§10.3). Not a
/// CLI surface — §6.5 places CLI/config loading out of scope for this
/// crate; the engine never reads environment variables or files itself.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeConfig {
    /// Whether committing transactions also mirror onto
    /// `TRANSACTION_STREAM_ID` (§4.4.5, §4.6, §6.4).
    pub transaction_logging: bool,
    /// Default for whether a context requires precise-conflict resolution
    /// (§4.4.7) absent an explicit per-transaction override from the
    /// builder (§4.8).
    pub precise_conflicts_default: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { transaction_logging: false, precise_conflicts_default: true }
    }
}

/// The pre-connected runtime object embedding client code constructs once
/// and shares across threads (§6.5, §10.5): the proxy registry, the
/// per-thread transaction stack, and the external service clients.
pub struct Runtime {
    proxies: SkipMap<StreamId, Arc<dyn ErasedProxy>>,
    registry: TransactionRegistry,
    /// The per-thread stack of active context handles, used by the
    /// Transaction Builder (component 7, §2) to discover an existing root
    /// to nest under. Kept separate from [`TransactionRegistry`]
    /// (component 6), which only needs the lightweight write-set chain.
    contexts: Mutex<HashMap<ThreadId, Vec<Arc<TxContext>>>>,
    services: SharedExternalServices,
    config: RuntimeConfig,
}

impl Runtime {
    pub fn new(services: SharedExternalServices, config: RuntimeConfig) -> Arc<Self> {
        Arc::new(Self {
            proxies: SkipMap::new(),
            registry: TransactionRegistry::new(),
            contexts: Mutex::new(HashMap::new()),
            services,
            config,
        })
    }

    pub(crate) fn push_context(&self, thread: ThreadId, ctx: Arc<TxContext>) {
        self.contexts.lock().entry(thread).or_default().push(ctx);
    }

    pub(crate) fn pop_context(&self, thread: ThreadId) -> Option<Arc<TxContext>> {
        let mut contexts = self.contexts.lock();
        let popped = contexts.get_mut(&thread).and_then(Vec::pop);
        if contexts.get(&thread).is_some_and(Vec::is_empty) {
            contexts.remove(&thread);
        }
        popped
    }

    pub(crate) fn current_context(&self, thread: ThreadId) -> Option<Arc<TxContext>> {
        self.contexts.lock().get(&thread).and_then(|s| s.last()).cloned()
    }

    pub fn config(&self) -> RuntimeConfig {
        self.config
    }

    pub fn registry(&self) -> &TransactionRegistry {
        &self.registry
    }

    pub fn services(&self) -> &SharedExternalServices {
        &self.services
    }

    /// Registers `proxy` under its stream id. A stream has exactly one
    /// Proxy for the lifetime of the Runtime (§3).
    pub fn register_proxy(&self, proxy: Arc<dyn ErasedProxy>) {
        self.proxies.insert(proxy.stream(), proxy);
    }

    /// Looks up a proxy by stream id without the caller needing to know its
    /// object type (§9 design notes: weak back-reference by stream id).
    pub fn lookup_proxy(&self, stream: StreamId) -> Option<Arc<dyn ErasedProxy>> {
        self.proxies.get(&stream).map(|e| e.value().clone())
    }
}
