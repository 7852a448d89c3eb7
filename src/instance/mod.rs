//! Instances and the composition engine
//!
//! An [`Instance`] is a shared handle: cloning it with [`Clone`] copies the
//! handle, [`Instance::clone_instance`] duplicates the instance. Reads fall
//! through own data, the type template, the parent instance and finally the
//! foreign receiver of the root construction.

pub mod chain;
pub(crate) mod construct;
mod fork;
mod pending;

pub use chain::{ChainArena, ChainId, ConstructionStyle};
pub use construct::Construction;
pub use pending::PendingInstance;

use crate::errors::{Error, ErrorKind, Result};
use crate::infrastructure::metrics::counters;
use crate::registry::{Namespace, TypeCollection};
use crate::types::{initializer, Args, Props, SubtypeTable, TypeDef, TypeSpec};
use crate::utils::{self, Parsed};
use parking_lot::{RwLock, RwLockReadGuard};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Bottom of a root instance's delegation chain
#[derive(Debug, Clone)]
pub enum Gaia {
    Object(Props),
    Instance(Instance),
}

impl Gaia {
    fn get(&self, key: &str) -> Option<Value> {
        match self {
            Self::Object(props) => props.get(key).cloned(),
            Self::Instance(instance) => instance.get(key),
        }
    }

    fn to_receiver(&self) -> Receiver {
        match self {
            Self::Object(props) => Receiver::Object(props.clone()),
            Self::Instance(instance) => Receiver::Instance(instance.clone()),
        }
    }
}

/// What a construction is bound to
#[derive(Debug, Clone, Default)]
pub enum Receiver {
    /// A new, empty context
    #[default]
    Fresh,
    /// A foreign object the type is installed onto
    Object(Props),
    /// An existing instance
    Instance(Instance),
}

impl From<Props> for Receiver {
    fn from(props: Props) -> Self {
        Self::Object(props)
    }
}

impl From<Instance> for Receiver {
    fn from(instance: Instance) -> Self {
        Self::Instance(instance)
    }
}

impl From<&Instance> for Receiver {
    fn from(instance: &Instance) -> Self {
        Self::Instance(instance.clone())
    }
}

/// Read `key` through a delegation chain.
pub(crate) fn resolve_in_chain(
    key: &str,
    own: &Props,
    template: &Props,
    parent: Option<&Instance>,
    gaia: Option<&Gaia>,
) -> Option<Value> {
    if let Some(value) = own.get(key).or_else(|| template.get(key)) {
        return Some(value.clone());
    }
    match (parent, gaia) {
        (Some(parent), _) => parent.get(key),
        (None, Some(gaia)) => gaia.get(key),
        (None, None) => None,
    }
}

pub(crate) struct InstanceMeta {
    pub(crate) def: TypeDef,
    pub(crate) args: Args,
    pub(crate) namespace: Arc<Namespace>,
    pub(crate) collection: Arc<TypeCollection>,
    pub(crate) subtypes: SubtypeTable,
    pub(crate) parent: Option<Instance>,
    pub(crate) gaia: Option<Gaia>,
    pub(crate) chain: ChainId,
    pub(crate) created_at: SystemTime,
}

struct InstanceInner {
    id: u64,
    data: RwLock<Props>,
    pending: AtomicBool,
    meta: Arc<InstanceMeta>,
}

#[derive(Clone)]
pub struct Instance(Arc<InstanceInner>);

impl Instance {
    pub(crate) fn from_meta(meta: Arc<InstanceMeta>, data: Props) -> Self {
        Self(Arc::new(InstanceInner {
            id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            data: RwLock::new(data),
            pending: AtomicBool::new(false),
            meta,
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn type_def(&self) -> &TypeDef {
        &self.0.meta.def
    }

    pub fn type_name(&self) -> &str {
        self.0.meta.def.name()
    }

    pub fn type_path(&self) -> &str {
        self.0.meta.def.path()
    }

    /// Arguments the instance was constructed with
    pub fn args(&self) -> &[Value] {
        &self.0.meta.args
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.0.meta.namespace
    }

    pub fn collection(&self) -> &Arc<TypeCollection> {
        &self.0.meta.collection
    }

    /// Live subtype table of the instance's type
    pub fn subtypes(&self) -> &SubtypeTable {
        &self.0.meta.subtypes
    }

    /// Instance this one descended from; `None` for root constructions
    pub fn parent(&self) -> Option<&Instance> {
        self.0.meta.parent.as_ref()
    }

    pub fn gaia(&self) -> Option<&Gaia> {
        self.0.meta.gaia.as_ref()
    }

    /// Delegation-chain node the instance was built on
    pub fn chain(&self) -> ChainId {
        self.0.meta.chain
    }

    pub fn created_at(&self) -> SystemTime {
        self.0.meta.created_at
    }

    /// Whether an asynchronous initializer is still running
    pub fn is_pending(&self) -> bool {
        self.0.pending.load(Ordering::Acquire)
    }

    pub(crate) fn set_pending(&self, pending: bool) {
        self.0.pending.store(pending, Ordering::Release);
    }

    pub(crate) fn args_handle(&self) -> Args {
        self.0.meta.args.clone()
    }

    /// Own data
    pub fn data(&self) -> RwLockReadGuard<'_, Props> {
        self.0.data.read()
    }

    /// Copy of the own data
    pub fn snapshot(&self) -> Props {
        self.0.data.read().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.data.read().keys().cloned().collect()
    }

    pub fn has_own(&self, key: &str) -> bool {
        self.0.data.read().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let data = self.0.data.read();
        resolve_in_chain(
            key,
            &data,
            self.0.meta.def.template(),
            self.0.meta.parent.as_ref(),
            self.0.meta.gaia.as_ref(),
        )
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.data.write().insert(key.into(), value.into())
    }

    pub(crate) fn replace_data(&self, data: Props) {
        *self.0.data.write() = data;
    }

    /// Merge an initializer's settled value onto the own data in one write.
    pub(crate) fn merge_data(&self, returned: Option<Value>) {
        let mut data = self.0.data.write();
        initializer::merge_returned(&mut data, returned, self.type_path());
    }

    /// Whether `def` is this instance's type, one of its ancestors, or a type
    /// of an instance this one descended from.
    pub fn is_instance_of(&self, def: &TypeDef) -> bool {
        self.type_def().descends_from(def)
            || self.parent().map_or(false, |parent| parent.is_instance_of(def))
    }

    /// Whether `ancestor` is this instance or appears among its parents
    pub fn descends_from(&self, ancestor: &Instance) -> bool {
        let mut current = Some(self);
        while let Some(instance) = current {
            if instance == ancestor {
                return true;
            }
            current = instance.parent();
        }
        false
    }

    /// Find the subtype `name` as seen from this instance.
    ///
    /// The own type's table is searched first; ancestor types contribute only
    /// their non-strict subtypes.
    pub fn resolve_subtype(&self, name: &str) -> Result<TypeDef> {
        let name = name.trim();
        if let Some(def) = self.subtypes().get(name) {
            return Ok(def);
        }
        let lineage = self.type_def().lineage();
        for ancestor in lineage.iter().rev().skip(1) {
            if let Some(def) = ancestor.subtypes().get(name) {
                if !def.config().strict_chain {
                    return Ok(def);
                }
            }
        }
        tracing::warn!(instance = self.type_path(), subtype = name, "Subtype is not reachable");
        Err(Error::with_addition(
            ErrorKind::WrongTypeDefinition,
            format!("{} is not reachable from {}", name, self.type_path()),
        ))
    }

    /// Construct the subtype `name` with this instance as parent.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Construction> {
        let def = self.resolve_subtype(name)?;
        def.construct_on(self, args)
    }

    /// Declare a subtype of this instance's type.
    pub fn define(&self, spec: TypeSpec) -> Result<TypeDef> {
        self.type_def().define(spec)
    }

    /// Same type, chain and arguments, copied own data; no initializer runs.
    pub fn clone_instance(&self) -> Instance {
        let clone = Instance::from_meta(self.0.meta.clone(), self.snapshot());
        self.type_def().metrics().increment(counters::CLONES);
        tracing::trace!(
            type_path = self.type_path(),
            source = self.id(),
            clone = clone.id(),
            "Cloned instance"
        );
        clone
    }

    /// Empty copy sharing this instance's metadata, filled in later.
    pub(crate) fn clone_shell(&self) -> Instance {
        let shell = Instance::from_meta(self.0.meta.clone(), Props::new());
        shell.set_pending(true);
        shell
    }

    pub fn extract(&self) -> Props {
        utils::extract(self).unwrap_or_default()
    }

    pub fn pick<S: AsRef<str>>(&self, keys: &[S]) -> Props {
        utils::pick(self, keys).unwrap_or_default()
    }

    pub fn parse(&self) -> Parsed {
        utils::parse(self)
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Instance {}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.type_name())
            .field("id", &self.0.id)
            .field("chain", &self.0.meta.chain)
            .field("pending", &self.is_pending())
            .field("data", &*self.0.data.read())
            .finish()
    }
}
