use super::TypeCollection;
use crate::errors::{Error, ErrorKind, Result};
use crate::hooks::{HookKind, HookOpts, Hooks};
use crate::infrastructure::metrics::EngineMetrics;
use crate::instance::chain::ChainArena;
use crate::instance::Instance;
use crate::types::{ConfigOverrides, TypeConfig};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Isolated scope of collections, with its own defaults and interceptors
pub struct Namespace {
    name: String,
    config: TypeConfig,
    hooks: Hooks,
    default_collection: Arc<TypeCollection>,
    collections: RwLock<Vec<Arc<TypeCollection>>>,
    associations: DashMap<String, Arc<TypeCollection>>,
    arena: Arc<ChainArena>,
    metrics: Arc<EngineMetrics>,
}

impl Namespace {
    pub(crate) fn new(
        name: &str,
        config: TypeConfig,
        arena: Arc<ChainArena>,
        metrics: Arc<EngineMetrics>,
    ) -> Arc<Self> {
        let namespace = Arc::new_cyclic(|weak| {
            let default_collection =
                TypeCollection::new(weak.clone(), name, None, config, arena.clone(), metrics.clone());
            Self {
                name: name.to_string(),
                config,
                hooks: Hooks::new(),
                collections: RwLock::new(vec![default_collection.clone()]),
                default_collection,
                associations: DashMap::new(),
                arena,
                metrics,
            }
        });
        tracing::debug!(namespace = name, "Created namespace");
        namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> TypeConfig {
        self.config
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn default_collection(&self) -> &Arc<TypeCollection> {
        &self.default_collection
    }

    /// Every collection of this namespace, in creation order
    pub fn collections(&self) -> Vec<Arc<TypeCollection>> {
        self.collections.read().clone()
    }

    pub fn association(&self, key: &str) -> Option<Arc<TypeCollection>> {
        self.associations.get(key).map(|entry| entry.value().clone())
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

    pub fn invoke_hook(&self, kind: HookKind, opts: &HookOpts<'_>) -> Result<usize> {
        self.hooks.invoke(kind, opts)
    }

    /// Whether `instance` was constructed within this namespace
    pub fn owns(&self, instance: &Instance) -> bool {
        std::ptr::eq(instance.namespace().as_ref(), self)
    }

    pub(crate) fn attach_collection(
        self: &Arc<Self>,
        association: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Arc<TypeCollection>> {
        let config = overrides.resolve(self.config);
        let make = || {
            TypeCollection::new(
                Arc::downgrade(self),
                &self.name,
                association,
                config,
                self.arena.clone(),
                self.metrics.clone(),
            )
        };

        let collection = match association {
            Some(key) => match self.associations.entry(key.to_string()) {
                Entry::Occupied(_) => {
                    tracing::warn!(namespace = %self.name, association = key, "Rejected duplicate association");
                    return Err(Error::with_addition(ErrorKind::AssociationExists, key));
                }
                Entry::Vacant(slot) => slot.insert(make()).value().clone(),
            },
            None => make(),
        };

        self.collections.write().push(collection.clone());
        Ok(collection)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("collections", &self.collections.read().len())
            .field("hooks", &self.hooks)
            .finish()
    }
}
