//! Construction pipeline
//!
//! [`prepare`] binds a definition to its receiver and builds an empty shell
//! instance; [`run`] drives the shell through flow checkers, `preCreation`
//! hooks, the initializer and `postCreation` hooks. Interceptors run
//! namespace first, then collection, then type.

use super::pending::PendingInstance;
use super::{Gaia, Instance, InstanceMeta, Receiver};
use crate::errors::{Error, ErrorKind, Result};
use crate::hooks::{HookKind, HookOpts, Hooks};
use crate::infrastructure::metrics::{counters, timings, Timer};
use crate::types::initializer::merge_returned;
use crate::types::{Args, Context, Outcome, Props, TypeDef};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::time::SystemTime;

/// Result of a construction
#[derive(Debug, Clone)]
pub enum Construction {
    Ready(Instance),
    Pending(PendingInstance),
}

impl Construction {
    /// The instance, settled or not
    pub fn instance(&self) -> &Instance {
        match self {
            Self::Ready(instance) => instance,
            Self::Pending(pending) => pending.instance(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn is_instance_of(&self, def: &TypeDef) -> bool {
        self.instance().is_instance_of(def)
    }

    /// The settled instance, or an error while still pending
    pub fn into_ready(self) -> Result<Instance> {
        match self {
            Self::Ready(instance) => Ok(instance),
            Self::Pending(pending) => Err(Error::with_addition(
                ErrorKind::WrongInstanceInvocation,
                format!("{} is still pending", pending.instance().type_path()),
            )),
        }
    }

    pub async fn settle(self) -> Result<Instance> {
        match self {
            Self::Ready(instance) => Ok(instance),
            Self::Pending(pending) => pending.await,
        }
    }

    /// Construct subtype `name`; on a pending handle the construction waits
    /// for settlement.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Construction> {
        match self {
            Self::Ready(instance) => instance.invoke(name, args),
            Self::Pending(pending) => pending.invoke(name, args).map(Self::Pending),
        }
    }

    pub fn clone_instance(&self) -> Construction {
        match self {
            Self::Ready(instance) => Self::Ready(instance.clone_instance()),
            Self::Pending(pending) => Self::Pending(pending.clone_instance()),
        }
    }

    pub fn fork(&self, args: Vec<Value>) -> Result<Construction> {
        match self {
            Self::Ready(instance) => instance.fork(args),
            Self::Pending(pending) => pending.fork(args).map(Self::Pending),
        }
    }
}

impl From<Instance> for Construction {
    fn from(instance: Instance) -> Self {
        Self::Ready(instance)
    }
}

/// Bind `def` to `receiver` and stamp the metadata of the coming instance.
pub(crate) fn prepare(def: &TypeDef, receiver: Receiver, args: Args) -> Result<Instance> {
    let collection = def.collection()?;
    let namespace = collection.namespace()?;

    let (parent, gaia) = match def.parent() {
        Some(declaring) => match receiver {
            Receiver::Instance(existent) if related(&existent, def, &declaring) => (Some(existent), None),
            other => {
                tracing::warn!(
                    type_path = def.path(),
                    receiver = receiver_kind(&other),
                    "Rejected subtype receiver"
                );
                return Err(Error::with_addition(
                    ErrorKind::WrongTypeDefinition,
                    format!("{} needs an instance of {}", def.path(), declaring.path()),
                ));
            }
        },
        None => match receiver {
            Receiver::Fresh => (None, None),
            Receiver::Object(props) => (None, Some(Gaia::Object(props))),
            Receiver::Instance(instance) => (None, Some(Gaia::Instance(instance))),
        },
    };

    let meta = InstanceMeta {
        def: def.clone(),
        args,
        namespace,
        collection,
        subtypes: def.subtypes().clone(),
        parent,
        gaia,
        chain: def.allocate_chain(),
        created_at: SystemTime::now(),
    };
    Ok(Instance::from_meta(Arc::new(meta), Props::new()))
}

fn related(existent: &Instance, def: &TypeDef, declaring: &TypeDef) -> bool {
    if existent.is_instance_of(declaring) {
        return true;
    }
    !def.config().strict_chain && existent.type_def().root() == def.root()
}

fn receiver_kind(receiver: &Receiver) -> &'static str {
    match receiver {
        Receiver::Fresh => "fresh",
        Receiver::Object(_) => "object",
        Receiver::Instance(_) => "unrelated instance",
    }
}

fn scopes(shell: &Instance) -> [&Hooks; 3] {
    [
        shell.namespace().hooks(),
        shell.collection().hooks(),
        shell.type_def().hooks(),
    ]
}

fn opts<'a>(
    shell: &'a Instance,
    context: &'a Props,
    inherited_instance: Option<&'a Instance>,
) -> HookOpts<'a> {
    let def = shell.type_def();
    HookOpts {
        type_name: def.name(),
        type_path: def.path(),
        args: shell.args(),
        context,
        proto: def.template(),
        existent_instance: shell.parent(),
        inherited_instance,
    }
}

/// Run the pipeline on a prepared shell.
pub(crate) fn run(shell: Instance) -> Result<Construction> {
    let metrics = shell.type_def().metrics().clone();
    let result = {
        let _timer = Timer::new(&metrics, timings::CONSTRUCTION);
        run_stages(&shell)
    };
    match result {
        Ok(Some(future)) => {
            metrics.increment(counters::ASYNC_CONSTRUCTIONS);
            tracing::trace!(type_path = shell.type_path(), id = shell.id(), "Construction pending");
            Ok(Construction::Pending(PendingInstance::spawn(shell, future)))
        }
        Ok(None) => {
            metrics.increment(counters::CONSTRUCTIONS);
            tracing::trace!(type_path = shell.type_path(), id = shell.id(), "Constructed instance");
            Ok(Construction::Ready(shell))
        }
        Err(err) => {
            shell.set_pending(false);
            Err(fail(&shell, err))
        }
    }
}

pub(crate) fn fail(shell: &Instance, err: Error) -> Error {
    shell.type_def().metrics().increment(counters::FAILED_CONSTRUCTIONS);
    tracing::debug!(type_path = shell.type_path(), error = %err, "Construction failed");
    err.within_construction(shell.type_path(), shell.args())
}

type Deferred = BoxFuture<'static, Result<Option<Value>>>;

/// Everything up to the initializer; the future is returned when it defers.
fn run_stages(shell: &Instance) -> Result<Option<Deferred>> {
    let def = shell.type_def();
    let metrics = def.metrics();
    let scopes = scopes(shell);

    let mut data = Props::new();
    {
        let opts = opts(shell, &data, None);
        let mut checks = 0;
        for hooks in scopes {
            checks += hooks.check_flow(&opts)?;
        }
        metrics.add(counters::FLOW_CHECKS, checks as u64);

        let mut invoked = 0;
        for hooks in scopes {
            invoked += hooks.invoke(HookKind::PreCreation, &opts)?;
        }
        metrics.add(counters::HOOK_INVOCATIONS, invoked as u64);
    }

    let args = shell.args_handle();
    let outcome = {
        let mut ctx = Context::new(def.path(), &args, &mut data, def.template(), shell.parent(), shell.gaia());
        def.initializer().call(&mut ctx)?
    };

    match outcome {
        Outcome::Done(returned) => {
            merge_returned(&mut data, returned, def.path());
            shell.replace_data(data);
            shell.set_pending(false);
            post_creation(shell)?;
            record_origin(shell);
            Ok(None)
        }
        Outcome::Awaiting(future) => {
            shell.replace_data(data);
            shell.set_pending(true);
            Ok(Some(future))
        }
    }
}

/// Merge the settled value of a deferred initializer and finish the instance.
pub(crate) fn settle(shell: &Instance, resolved: Result<Option<Value>>) -> Result<Instance> {
    let outcome = resolved.and_then(|returned| {
        shell.merge_data(returned);
        shell.set_pending(false);
        post_creation(shell)
    });
    shell.set_pending(false);
    match outcome {
        Ok(()) => {
            record_origin(shell);
            tracing::trace!(type_path = shell.type_path(), id = shell.id(), "Settled instance");
            Ok(shell.clone())
        }
        Err(err) => Err(fail(shell, err)),
    }
}

/// Only finished constructions move a subtype's origin; aborted ones leave it.
fn record_origin(shell: &Instance) {
    if let Some(parent) = shell.parent() {
        shell.type_def().record_origin(parent.chain());
    }
}

fn post_creation(shell: &Instance) -> Result<()> {
    let context = shell.snapshot();
    let opts = opts(shell, &context, Some(shell));
    let mut invoked = 0;
    for hooks in scopes(shell) {
        invoked += hooks.invoke(HookKind::PostCreation, &opts)?;
    }
    shell.type_def().metrics().add(counters::HOOK_INVOCATIONS, invoked as u64);
    Ok(())
}
