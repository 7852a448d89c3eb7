//! Interceptor registries
//!
//! Namespaces, collections and type definitions each own a [`Hooks`] table.
//! Flow checkers and `preCreation` hooks run before an initializer,
//! `postCreation` hooks after the instance is final. Within one table
//! interceptors run in registration order; across tables the pipeline walks
//! namespace, then collection, then type.

use crate::errors::{Error, ErrorKind, Result};
use crate::instance::Instance;
use crate::types::Props;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    PreCreation,
    PostCreation,
}

impl HookKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreCreation => "preCreation",
            Self::PostCreation => "postCreation",
        }
    }
}

impl FromStr for HookKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "preCreation" => Ok(Self::PreCreation),
            "postCreation" => Ok(Self::PostCreation),
            other => Err(Error::with_addition(ErrorKind::WrongHookType, other)),
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an interceptor sees of a construction
#[derive(Clone, Copy)]
pub struct HookOpts<'a> {
    pub type_name: &'a str,
    pub type_path: &'a str,
    pub args: &'a [Value],
    /// Own data of the context under construction
    pub context: &'a Props,
    /// Template of the type being constructed
    pub proto: &'a Props,
    /// Instance the construction descended from
    pub existent_instance: Option<&'a Instance>,
    /// Finished instance, only set for `postCreation`
    pub inherited_instance: Option<&'a Instance>,
}

impl fmt::Debug for HookOpts<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookOpts")
            .field("type_path", &self.type_path)
            .field("args", &self.args)
            .field("context", &self.context)
            .field("existent_instance", &self.existent_instance.map(Instance::id))
            .field("inherited_instance", &self.inherited_instance.map(Instance::id))
            .finish()
    }
}

pub type Hook = Arc<dyn Fn(&HookOpts<'_>) -> Result<()> + Send + Sync>;

/// Flow checkers share the hook signature; their success value is ignored.
pub type FlowChecker = Hook;

#[derive(Default)]
pub struct Hooks {
    pre_creation: RwLock<Vec<Hook>>,
    post_creation: RwLock<Vec<Hook>>,
    flow_checkers: RwLock<Vec<FlowChecker>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_hook<F>(&self, kind: HookKind, hook: F)
    where
        F: Fn(&HookOpts<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.list(kind).write().push(Arc::new(hook));
    }

    pub fn register_flow_checker<F>(&self, checker: F)
    where
        F: Fn(&HookOpts<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.flow_checkers.write().push(Arc::new(checker));
    }

    /// Run every hook of `kind`; the first failure aborts the rest.
    pub fn invoke(&self, kind: HookKind, opts: &HookOpts<'_>) -> Result<usize> {
        // snapshot so a hook may register further hooks
        let hooks = self.list(kind).read().clone();
        for hook in &hooks {
            hook(opts)?;
        }
        Ok(hooks.len())
    }

    pub fn check_flow(&self, opts: &HookOpts<'_>) -> Result<usize> {
        let checkers = self.flow_checkers.read().clone();
        for checker in &checkers {
            checker(opts)?;
        }
        Ok(checkers.len())
    }

    pub fn hook_count(&self, kind: HookKind) -> usize {
        self.list(kind).read().len()
    }

    pub fn flow_checker_count(&self) -> usize {
        self.flow_checkers.read().len()
    }

    fn list(&self, kind: HookKind) -> &RwLock<Vec<Hook>> {
        match kind {
            HookKind::PreCreation => &self.pre_creation,
            HookKind::PostCreation => &self.post_creation,
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_creation", &self.hook_count(HookKind::PreCreation))
            .field("post_creation", &self.hook_count(HookKind::PostCreation))
            .field("flow_checkers", &self.flow_checker_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn opts<'a>(context: &'a Props) -> HookOpts<'a> {
        HookOpts {
            type_name: "T",
            type_path: "T",
            args: &[],
            context,
            proto: context,
            existent_instance: None,
            inherited_instance: None,
        }
    }

    #[test]
    fn test_hook_kind_parsing() {
        assert_eq!("preCreation".parse::<HookKind>().unwrap(), HookKind::PreCreation);
        assert_eq!("postCreation".parse::<HookKind>().unwrap(), HookKind::PostCreation);
        let err = "midCreation".parse::<HookKind>().unwrap_err();
        assert_eq!(err, ErrorKind::WrongHookType);
    }

    #[test]
    fn test_registration_order() {
        let hooks = Hooks::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for label in ["A", "B", "C"] {
            let seen = seen.clone();
            hooks.register_hook(HookKind::PostCreation, move |_| {
                seen.lock().push(label);
                Ok(())
            });
        }
        let context = Props::new();
        assert_eq!(hooks.invoke(HookKind::PostCreation, &opts(&context)).unwrap(), 3);
        assert_eq!(hooks.invoke(HookKind::PreCreation, &opts(&context)).unwrap(), 0);
        assert_eq!(*seen.lock(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_failure_stops_the_chain() {
        let hooks = Hooks::new();
        let reached = Arc::new(Mutex::new(false));
        hooks.register_flow_checker(|_| Err(Error::raised("audit refused")));
        let flag = reached.clone();
        hooks.register_flow_checker(move |_| {
            *flag.lock() = true;
            Ok(())
        });
        let context = Props::new();
        let err = hooks.check_flow(&opts(&context)).unwrap_err();
        assert_eq!(err, ErrorKind::Raised);
        assert!(!*reached.lock());
    }
}
