//! Namespace registry
//!
//! A [`Registry`] owns every namespace, the delegation-chain arena and the
//! metrics collector. It is append-only: namespaces and collections are never
//! removed. Most programs use the lazily created [`Registry::global`];
//! tests and embedders create their own.

mod collection;
mod namespace;

pub use collection::TypeCollection;
pub use namespace::Namespace;

use crate::config::Config;
use crate::errors::{Error, ErrorKind, Result};
use crate::infrastructure::metrics::EngineMetrics;
use crate::instance::chain::ChainArena;
use crate::types::{ConfigOverrides, TypeConfig, TypeDef, TypeSpec};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

/// Name of the namespace every registry starts with
pub const DEFAULT_NAMESPACE: &str = "default";

static GLOBAL: Lazy<Arc<Registry>> = Lazy::new(Registry::new);

pub struct Registry {
    namespaces: DashMap<String, Arc<Namespace>>,
    default_namespace: Arc<Namespace>,
    arena: Arc<ChainArena>,
    metrics: Arc<EngineMetrics>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(TypeConfig::default()))
    }

    /// Registry seeded from `config`: defaults for the default namespace and
    /// the configured namespaces created up front.
    pub fn with_config(config: &Config) -> Result<Arc<Self>> {
        // `[namespaces.default]` refines the defaults instead of creating a namespace
        let defaults = config
            .namespaces
            .iter()
            .find(|(name, _)| name.trim() == DEFAULT_NAMESPACE)
            .map_or(config.defaults, |(_, overrides)| overrides.resolve(config.defaults));
        let registry = Self::build(defaults);
        for (name, overrides) in &config.namespaces {
            if name.trim() != DEFAULT_NAMESPACE {
                registry.create_namespace_with(name, *overrides)?;
            }
        }
        Ok(Arc::new(registry))
    }

    /// Process-wide registry
    pub fn global() -> Arc<Registry> {
        GLOBAL.clone()
    }

    fn build(defaults: TypeConfig) -> Self {
        let arena = Arc::new(ChainArena::new());
        let metrics = Arc::new(EngineMetrics::new());
        let default_namespace = Namespace::new(DEFAULT_NAMESPACE, defaults, arena.clone(), metrics.clone());
        let namespaces = DashMap::new();
        namespaces.insert(DEFAULT_NAMESPACE.to_string(), default_namespace.clone());
        Self {
            namespaces,
            default_namespace,
            arena,
            metrics,
        }
    }

    pub fn default_namespace(&self) -> &Arc<Namespace> {
        &self.default_namespace
    }

    /// Default collection of the default namespace
    pub fn default_types(&self) -> Arc<TypeCollection> {
        self.default_namespace.default_collection().clone()
    }

    pub fn create_namespace(&self, name: &str) -> Result<Arc<Namespace>> {
        self.create_namespace_with(name, ConfigOverrides::default())
    }

    /// Namespace whose flags default to `overrides`, then to the registry defaults.
    pub fn create_namespace_with(&self, name: &str, overrides: ConfigOverrides) -> Result<Arc<Namespace>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::with_addition(ErrorKind::WrongArgumentsUsed, "empty namespace name"));
        }
        match self.namespaces.entry(name.to_string()) {
            Entry::Occupied(_) => {
                tracing::warn!(namespace = name, "Rejected duplicate namespace");
                Err(Error::with_addition(ErrorKind::NamespaceAlreadyExists, name))
            }
            Entry::Vacant(slot) => {
                let config = overrides.resolve(self.default_namespace.config());
                let namespace = Namespace::new(name, config, self.arena.clone(), self.metrics.clone());
                slot.insert(namespace.clone());
                Ok(namespace)
            }
        }
    }

    pub fn namespace(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.get(name).map(|entry| entry.value().clone())
    }

    pub fn namespace_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// New collection in `namespace` (the default namespace when `None`).
    ///
    /// Fails when the namespace is not registered here or `association` is
    /// already bound in it.
    pub fn create_collection(
        &self,
        namespace: Option<&Arc<Namespace>>,
        association: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Arc<TypeCollection>> {
        let namespace = namespace.unwrap_or(&self.default_namespace);
        let registered = self
            .namespaces
            .get(namespace.name())
            .map(|entry| Arc::ptr_eq(entry.value(), namespace))
            .unwrap_or(false);
        if !registered {
            tracing::warn!(namespace = namespace.name(), "Rejected collection for unknown namespace");
            return Err(Error::with_addition(ErrorKind::NamespaceDoesNotExist, namespace.name()));
        }
        namespace.attach_collection(association, overrides)
    }

    /// Define a top-level type in the default collection.
    pub fn define(&self, spec: TypeSpec) -> Result<TypeDef> {
        self.default_namespace.default_collection().define(spec)
    }

    pub fn lookup(&self, path: &str) -> Option<TypeDef> {
        self.default_namespace.default_collection().lookup(path)
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn arena(&self) -> &Arc<ChainArena> {
        &self.arena
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("namespaces", &self.namespace_names())
            .field("chain_ids", &self.arena.issued())
            .finish()
    }
}
