//! Type definitions
//!
//! A [`TypeDef`] is a cheap handle to one declared type. Children hold their
//! parent and collection weakly; the owning table holds the child strongly.

use super::flags::{ConfigOverrides, TypeConfig};
use super::initializer::{Context, Initializer};
use super::table::SubtypeTable;
use super::Props;
use crate::errors::{Error, ErrorKind, Result};
use crate::hooks::{HookKind, HookOpts, Hooks};
use crate::infrastructure::metrics::{counters, EngineMetrics};
use crate::instance::chain::{ChainArena, ChainId, ConstructionStyle};
use crate::instance::{construct, Construction, Receiver};
use crate::registry::TypeCollection;
use dashmap::mapref::entry::Entry;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

/// Declaration of a type, consumed by `define`
#[derive(Clone)]
pub struct TypeSpec {
    name: String,
    initializer: Initializer,
    template: Value,
    overrides: ConfigOverrides,
}

impl TypeSpec {
    /// `name` may be dotted; leading segments name existing subtypes of the
    /// declaring scope.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initializer: Initializer::noop(),
            template: Value::Null,
            overrides: ConfigOverrides::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare below the existing subtype path `path` of the declaring scope.
    pub fn under(mut self, path: &str) -> Self {
        self.name = format!("{}.{}", path.trim(), self.name);
        self
    }

    pub fn initializer(mut self, initializer: Initializer) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn init<F>(self, body: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.initializer(Initializer::new(body))
    }

    /// Shared properties; must be a JSON object (or null for none).
    pub fn template(mut self, template: impl Into<Value>) -> Self {
        self.template = template.into();
        self
    }

    pub fn use_old_style(mut self, value: bool) -> Self {
        self.overrides.use_old_style = Some(value);
        self
    }

    pub fn strict_chain(mut self, value: bool) -> Self {
        self.overrides.strict_chain = Some(value);
        self
    }

    pub fn config(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

impl fmt::Debug for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSpec")
            .field("name", &self.name)
            .field("template", &self.template)
            .field("overrides", &self.overrides)
            .finish()
    }
}

pub(crate) struct TypeDefInner {
    id: u64,
    name: String,
    path: String,
    template: Props,
    initializer: Initializer,
    config: TypeConfig,
    parent: Option<Weak<TypeDefInner>>,
    collection: Weak<TypeCollection>,
    subtypes: SubtypeTable,
    hooks: Hooks,
    arena: Arc<ChainArena>,
    metrics: Arc<EngineMetrics>,
    /// Node shared by every instance in classic style
    classic_node: OnceCell<ChainId>,
    /// Chain of the parent instance this type was last materialized on
    last_origin: Mutex<Option<ChainId>>,
}

#[derive(Clone)]
pub struct TypeDef(Arc<TypeDefInner>);

impl TypeDef {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Dotted path from the collection root
    pub fn path(&self) -> &str {
        &self.0.path
    }

    pub fn template(&self) -> &Props {
        &self.0.template
    }

    /// Live table of direct subtypes
    pub fn subtypes(&self) -> &SubtypeTable {
        &self.0.subtypes
    }

    pub fn is_subtype(&self) -> bool {
        self.0.parent.is_some()
    }

    pub fn config(&self) -> TypeConfig {
        self.0.config
    }

    pub fn initializer(&self) -> &Initializer {
        &self.0.initializer
    }

    pub fn hooks(&self) -> &Hooks {
        &self.0.hooks
    }

    pub fn parent(&self) -> Option<TypeDef> {
        self.0.parent.as_ref().and_then(Weak::upgrade).map(TypeDef)
    }

    /// Root type first, `self` last
    pub fn lineage(&self) -> Vec<TypeDef> {
        let mut lineage = vec![self.clone()];
        let mut current = self.parent();
        while let Some(def) = current {
            current = def.parent();
            lineage.push(def);
        }
        lineage.reverse();
        lineage
    }

    pub fn root(&self) -> TypeDef {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Whether `self` is `ancestor` or declared somewhere below it
    pub fn descends_from(&self, ancestor: &TypeDef) -> bool {
        self.lineage().iter().any(|def| def == ancestor)
    }

    pub fn collection(&self) -> Result<Arc<TypeCollection>> {
        self.0.collection.upgrade().ok_or_else(|| {
            Error::with_addition(
                ErrorKind::WrongModificationPattern,
                format!("collection of {} is gone", self.path()),
            )
        })
    }

    pub fn define(&self, spec: TypeSpec) -> Result<TypeDef> {
        declare(Scope::Type(self), spec)
    }

    /// Factory form: the factory runs once, right now.
    pub fn define_from<F>(&self, factory: F) -> Result<TypeDef>
    where
        F: FnOnce() -> TypeSpec,
    {
        self.define(factory())
    }

    /// Never fails; dotted paths walk nested subtype tables.
    pub fn lookup(&self, path: &str) -> Option<TypeDef> {
        self.0.subtypes.lookup_path(path)
    }

    pub fn register_hook<F>(&self, kind: HookKind, hook: F)
    where
        F: Fn(&HookOpts<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.0.hooks.register_hook(kind, hook);
    }

    pub fn register_flow_checker<F>(&self, checker: F)
    where
        F: Fn(&HookOpts<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.0.hooks.register_flow_checker(checker);
    }

    /// Construct on a fresh context.
    pub fn construct(&self, args: Vec<Value>) -> Result<Construction> {
        self.construct_on(Receiver::Fresh, args)
    }

    /// Construct with an explicit receiver.
    ///
    /// Root types accept any receiver; subtypes need an instance related to
    /// their declaring type.
    pub fn construct_on(&self, receiver: impl Into<Receiver>, args: Vec<Value>) -> Result<Construction> {
        let shell = construct::prepare(self, receiver.into(), args.into())?;
        construct::run(shell)
    }

    pub(crate) fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.0.metrics
    }

    pub(crate) fn allocate_chain(&self) -> ChainId {
        let style = ConstructionStyle::from_old_style(self.0.config.use_old_style);
        match style {
            ConstructionStyle::Classic => *self
                .0
                .classic_node
                .get_or_init(|| self.0.arena.alloc()),
            ConstructionStyle::Composed => self.0.arena.alloc(),
        }
    }

    pub(crate) fn record_origin(&self, parent_chain: ChainId) {
        *self.0.last_origin.lock() = Some(parent_chain);
    }

    pub(crate) fn last_origin(&self) -> Option<ChainId> {
        *self.0.last_origin.lock()
    }

    pub fn ptr_eq(&self, other: &TypeDef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for TypeDef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for TypeDef {}

impl fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDef")
            .field("path", &self.0.path)
            .field("config", &self.0.config)
            .field("subtypes", &self.0.subtypes)
            .finish()
    }
}

/// Where a declaration starts navigating from
pub(crate) enum Scope<'a> {
    Collection(&'a Arc<TypeCollection>),
    Type(&'a TypeDef),
}

fn split_path(name: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = name.split('.').map(str::trim).collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(Error::with_addition(
            ErrorKind::WrongArgumentsUsed,
            format!("bad type name {:?}", name),
        ));
    }
    Ok(segments)
}

pub(crate) fn declare(scope: Scope<'_>, spec: TypeSpec) -> Result<TypeDef> {
    let segments = split_path(&spec.name)?;
    let (name, prefix) = match segments.split_last() {
        Some(split) => split,
        None => return Err(Error::new(ErrorKind::WrongArgumentsUsed)),
    };

    let (collection, mut parent, mut table) = match scope {
        Scope::Collection(collection) => (collection.clone(), None, collection.types().clone()),
        Scope::Type(def) => (def.collection()?, Some(def.clone()), def.subtypes().clone()),
    };

    for segment in prefix {
        let next = table.get(segment).ok_or_else(|| {
            tracing::warn!(name = %spec.name, missing = %segment, "Rejected dotted definition");
            Error::with_addition(
                ErrorKind::WrongTypeDefinition,
                format!("{} : {} is not declared", spec.name.trim(), segment),
            )
        })?;
        table = next.subtypes().clone();
        parent = Some(next);
    }

    let template = match spec.template {
        Value::Null => Props::new(),
        Value::Object(props) => props,
        other => {
            return Err(Error::with_addition(
                ErrorKind::WrongArgumentsUsed,
                format!("template of {} must be an object, got {}", name, other),
            ))
        }
    };

    let path = match &parent {
        Some(parent) => format!("{}.{}", parent.path(), name),
        None => name.to_string(),
    };

    let def = match table.entries().entry(name.to_string()) {
        Entry::Occupied(_) => {
            tracing::warn!(path = %path, "Rejected duplicate definition");
            return Err(Error::with_addition(ErrorKind::AlreadyDeclared, path));
        }
        Entry::Vacant(slot) => {
            let def = TypeDef(Arc::new(TypeDefInner {
                id: NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed),
                name: name.to_string(),
                path,
                template,
                initializer: spec.initializer,
                config: spec.overrides.resolve(collection.config()),
                parent: parent.as_ref().map(|parent| Arc::downgrade(&parent.0)),
                collection: Arc::downgrade(&collection),
                subtypes: SubtypeTable::new(),
                hooks: Hooks::new(),
                arena: collection.arena().clone(),
                metrics: collection.metrics().clone(),
                classic_node: OnceCell::new(),
                last_origin: Mutex::new(None),
            }));
            slot.insert(def.clone());
            def
        }
    };

    collection.metrics().increment(counters::DEFINITIONS);
    tracing::debug!(
        path = def.path(),
        use_old_style = def.config().use_old_style,
        strict_chain = def.config().strict_chain,
        "Defined type"
    );
    Ok(def)
}
