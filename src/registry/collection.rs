use super::Namespace;
use crate::errors::{Error, ErrorKind, Result};
use crate::hooks::{HookKind, HookOpts, Hooks};
use crate::infrastructure::metrics::EngineMetrics;
use crate::instance::chain::ChainArena;
use crate::instance::Instance;
use crate::types::definition::{declare, Scope};
use crate::types::{SubtypeTable, TypeConfig, TypeDef, TypeSpec};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_COLLECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Table of top-level type definitions within a namespace
pub struct TypeCollection {
    id: u64,
    namespace: Weak<Namespace>,
    namespace_name: String,
    association: Option<String>,
    types: SubtypeTable,
    config: TypeConfig,
    hooks: Hooks,
    arena: Arc<ChainArena>,
    metrics: Arc<EngineMetrics>,
}

impl TypeCollection {
    pub(crate) fn new(
        namespace: Weak<Namespace>,
        namespace_name: &str,
        association: Option<&str>,
        config: TypeConfig,
        arena: Arc<ChainArena>,
        metrics: Arc<EngineMetrics>,
    ) -> Arc<Self> {
        let collection = Arc::new(Self {
            id: NEXT_COLLECTION_ID.fetch_add(1, Ordering::Relaxed),
            namespace,
            namespace_name: namespace_name.to_string(),
            association: association.map(str::to_string),
            types: SubtypeTable::new(),
            config,
            hooks: Hooks::new(),
            arena,
            metrics,
        });
        tracing::debug!(
            namespace = namespace_name,
            association = ?association,
            use_old_style = config.use_old_style,
            strict_chain = config.strict_chain,
            "Created types collection"
        );
        collection
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn namespace(&self) -> Result<Arc<Namespace>> {
        self.namespace.upgrade().ok_or_else(|| {
            Error::with_addition(ErrorKind::NamespaceDoesNotExist, &self.namespace_name)
        })
    }

    pub fn namespace_name(&self) -> &str {
        &self.namespace_name
    }

    pub fn association(&self) -> Option<&str> {
        self.association.as_deref()
    }

    /// Flags resolved against the namespace defaults
    pub fn config(&self) -> TypeConfig {
        self.config
    }

    /// Live table of top-level types
    pub fn types(&self) -> &SubtypeTable {
        &self.types
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn define(self: &Arc<Self>, spec: TypeSpec) -> Result<TypeDef> {
        declare(Scope::Collection(self), spec)
    }

    pub fn define_from<F>(self: &Arc<Self>, factory: F) -> Result<TypeDef>
    where
        F: FnOnce() -> TypeSpec,
    {
        self.define(factory())
    }

    pub fn lookup(&self, path: &str) -> Option<TypeDef> {
        self.types.lookup_path(path)
    }

    pub fn register_hook<F>(&self, kind: HookKind, hook: F)
    where
        F: Fn(&HookOpts<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.register_hook(kind, hook);
    }

    pub fn register_flow_checker<F>(&self, checker: F)
    where
        F: Fn(&HookOpts<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.register_flow_checker(checker);
    }

    /// Run this collection's hooks of `kind` outside of a construction.
    pub fn invoke_hook(&self, kind: HookKind, opts: &HookOpts<'_>) -> Result<usize> {
        self.hooks.invoke(kind, opts)
    }

    /// Whether `instance` was constructed from a type of this collection
    pub fn owns(&self, instance: &Instance) -> bool {
        std::ptr::eq(instance.collection().as_ref(), self)
    }

    pub(crate) fn arena(&self) -> &Arc<ChainArena> {
        &self.arena
    }

    pub(crate) fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }
}

impl fmt::Debug for TypeCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCollection")
            .field("id", &self.id)
            .field("namespace", &self.namespace_name)
            .field("association", &self.association)
            .field("config", &self.config)
            .field("types", &self.types)
            .finish()
    }
}
