//! Initializers and the context they run against

use crate::errors::Result;
use crate::instance::{resolve_in_chain, Gaia, Instance};
use crate::types::Props;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Arguments of one construction, shared between the instance and hooks
pub type Args = Arc<[Value]>;

/// What an initializer produced
pub enum Outcome {
    /// Finished; an object value is merged onto the context
    Done(Option<Value>),
    /// Construction continues once the future resolves
    Awaiting(BoxFuture<'static, Result<Option<Value>>>),
}

impl Outcome {
    pub fn awaiting<F>(future: F) -> Self
    where
        F: Future<Output = Result<Option<Value>>> + Send + 'static,
    {
        Self::Awaiting(Box::pin(future))
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self, Self::Awaiting(_))
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done(value) => f.debug_tuple("Done").field(value).finish(),
            Self::Awaiting(_) => f.write_str("Awaiting(..)"),
        }
    }
}

/// The `this` of an initializer.
///
/// Writes land in the own data of the context under construction; reads
/// fall through the delegation chain.
pub struct Context<'a> {
    type_path: &'a str,
    args: &'a Args,
    data: &'a mut Props,
    template: &'a Props,
    parent: Option<&'a Instance>,
    gaia: Option<&'a Gaia>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        type_path: &'a str,
        args: &'a Args,
        data: &'a mut Props,
        template: &'a Props,
        parent: Option<&'a Instance>,
        gaia: Option<&'a Gaia>,
    ) -> Self {
        Self {
            type_path,
            args,
            data,
            template,
            parent,
            gaia,
        }
    }

    pub fn type_path(&self) -> &str {
        self.type_path
    }

    pub fn args(&self) -> &[Value] {
        self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Instance this construction descends from
    pub fn parent(&self) -> Option<&Instance> {
        self.parent
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        resolve_in_chain(key, self.data, self.template, self.parent, self.gaia)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.shift_remove(key)
    }

    /// Copy every field of `props` onto the context.
    pub fn assign(&mut self, props: Props) {
        self.data.extend(props);
    }

    pub fn data(&self) -> &Props {
        self.data
    }

    pub fn data_mut(&mut self) -> &mut Props {
        self.data
    }

    pub fn snapshot(&self) -> Props {
        self.data.clone()
    }
}

type InitFn = dyn Fn(&mut Context<'_>) -> Result<Outcome> + Send + Sync;

/// The constructor body of a type definition
#[derive(Clone)]
pub struct Initializer(Arc<InitFn>);

impl Initializer {
    /// Initializer that only mutates the context.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(move |ctx| {
            body(ctx)?;
            Ok(Outcome::Done(None))
        }))
    }

    /// Initializer whose returned object is merged onto the context.
    pub fn returning<F>(body: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        Self(Arc::new(move |ctx| body(ctx).map(Outcome::Done)))
    }

    pub fn with_outcome<F>(body: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<Outcome> + Send + Sync + 'static,
    {
        Self(Arc::new(body))
    }

    /// Asynchronous initializer.
    ///
    /// `body` receives a snapshot of the context and the arguments; the value
    /// its future resolves to is merged onto the context.
    pub fn future<F, Fut>(body: F) -> Self
    where
        F: Fn(Props, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
    {
        Self(Arc::new(move |ctx| {
            let future = body(ctx.snapshot(), ctx.args.clone());
            Ok(Outcome::awaiting(future))
        }))
    }

    pub fn noop() -> Self {
        Self(Arc::new(|_| Ok(Outcome::Done(None))))
    }

    pub(crate) fn call(&self, ctx: &mut Context<'_>) -> Result<Outcome> {
        (self.0)(ctx)
    }

    pub fn ptr_eq(&self, other: &Initializer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Initializer {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Initializer({:p})", Arc::as_ptr(&self.0))
    }
}

/// Merge an initializer's result onto the context.
pub(crate) fn merge_returned(data: &mut Props, returned: Option<Value>, type_path: &str) {
    match returned {
        Some(Value::Object(props)) => data.extend(props),
        Some(Value::Null) | None => {}
        Some(other) => {
            tracing::trace!(
                event = "ignored_return",
                type_path,
                kind = value_kind(&other),
                "Initializer returned a non-object value"
            );
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
