//! Forking
//!
//! [`Instance::fork`] rebuilds an instance with new arguments on a fresh
//! chain node. Root instances are rebuilt on their original receiver,
//! subtype instances on the parent instance they descended from, after the
//! parent's chain is checked against the one the subtype was last
//! materialized on. [`Instance::fork_onto`] replays the whole lineage, root
//! first, on another receiver.

use super::construct::{self, Construction};
use super::{Instance, Receiver};
use crate::errors::{Error, ErrorKind, Result};
use crate::infrastructure::metrics::counters;
use serde_json::Value;

impl Instance {
    pub fn fork(&self, args: Vec<Value>) -> Result<Construction> {
        let shell = self.prepare_fork(args)?;
        construct::run(shell)
    }

    /// Replay the lineage on `receiver`; the last level gets `args`, every
    /// other level its recorded arguments.
    pub fn fork_onto(&self, receiver: impl Into<Receiver>, args: Vec<Value>) -> Result<Construction> {
        let mut lineage = vec![self.clone()];
        let mut current = self.parent();
        while let Some(instance) = current {
            lineage.push(instance.clone());
            current = instance.parent();
        }
        lineage.reverse();

        self.type_def().metrics().increment(counters::FORKS);
        tracing::trace!(
            type_path = self.type_path(),
            levels = lineage.len(),
            "Replaying lineage onto receiver"
        );

        let last = lineage.len() - 1;
        let level_args = |index: usize, instance: &Instance| {
            if index == last {
                args.clone()
            } else {
                instance.args().to_vec()
            }
        };

        let root = &lineage[0];
        let mut construction = root.type_def().construct_on(receiver, level_args(0, root))?;
        for (index, instance) in lineage.iter().enumerate().skip(1) {
            let def = instance.type_def();
            let level = level_args(index, instance);
            construction = match construction {
                Construction::Ready(parent) => def.construct_on(&parent, level)?,
                Construction::Pending(parent) => {
                    let shell = construct::prepare(def, parent.instance().into(), level.into())?;
                    Construction::Pending(parent.run_after(shell))
                }
            };
        }
        Ok(construction)
    }

    /// Shell of the fork, checked and bound but not yet run.
    pub(crate) fn prepare_fork(&self, args: Vec<Value>) -> Result<Instance> {
        self.check_shared_proto(&args)?;
        let def = self.type_def();
        let receiver = match (self.parent(), self.gaia()) {
            (Some(parent), _) => Receiver::Instance(parent.clone()),
            (None, Some(gaia)) => gaia.to_receiver(),
            (None, None) => Receiver::Fresh,
        };
        let shell = construct::prepare(def, receiver, args.into())?;
        def.metrics().increment(counters::FORKS);
        tracing::trace!(
            type_path = self.type_path(),
            source = self.id(),
            fork = shell.id(),
            "Forking instance"
        );
        Ok(shell)
    }

    /// A subtype may only be forked from the parent chain it was last
    /// materialized on.
    fn check_shared_proto(&self, args: &[Value]) -> Result<()> {
        let parent = match self.parent() {
            Some(parent) => parent,
            None => return Ok(()),
        };
        let def = self.type_def();
        match def.last_origin() {
            Some(origin) if origin != parent.chain() => {
                tracing::warn!(
                    type_path = def.path(),
                    origin = %origin,
                    parent_chain = %parent.chain(),
                    "Rejected fork over a shared prototype"
                );
                Err(Error::with_addition(
                    ErrorKind::WrongTypeDefinition,
                    format!(
                        "shared proto usage is prohibited\n\t[ {} ]\n{}\n\tnot equal to\n{}",
                        def.name(),
                        args_label(args),
                        args_label(self.args()),
                    ),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Strings verbatim, anything else as JSON, joined by ", ".
pub(crate) fn args_label(args: &[Value]) -> String {
    args.iter()
        .map(|arg| match arg {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
