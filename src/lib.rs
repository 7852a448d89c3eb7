//! Progeny: declarative trees of type definitions
//!
//! Types are declared into collections, subtypes are declared under types,
//! and every instance can construct the subtypes of its type on demand, with
//! itself as the parent. Constructions pass through flow checkers and
//! creation hooks registered on the namespace, the collection and the type.
//!
//! ```no_run
//! use progeny::{Registry, TypeSpec};
//! use serde_json::json;
//!
//! # fn main() -> progeny::Result<()> {
//! let registry = Registry::new();
//! let account = registry.define(
//!     TypeSpec::new("Account")
//!         .template(json!({"kind": "account"}))
//!         .init(|ctx| {
//!             let balance = ctx.arg(0).cloned().unwrap_or(json!(0));
//!             ctx.set("balance", balance);
//!             Ok(())
//!         }),
//! )?;
//! account.define(TypeSpec::new("Frozen"))?;
//!
//! let a = account.construct(vec![json!(100)])?.into_ready()?;
//! let frozen = a.invoke("Frozen", vec![])?.into_ready()?;
//! assert!(frozen.is_instance_of(&account));
//! assert_eq!(frozen.get("kind"), Some(json!("account")));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod hooks;
pub mod infrastructure;
pub mod instance;
pub mod registry;
pub mod types;
pub mod utils;

pub use config::Config;
pub use errors::{define_stack_cleaner, Error, ErrorKind, FailedConstruction, Result};
pub use hooks::{HookKind, HookOpts, Hooks};
pub use infrastructure::{init_logging, EngineMetrics, LogConfig, LogFormat, LogOutput};
pub use instance::{ChainId, Construction, Gaia, Instance, PendingInstance, Receiver};
pub use registry::{Namespace, Registry, TypeCollection, DEFAULT_NAMESPACE};
pub use types::{
    Args, ConfigOverrides, Context, Initializer, Outcome, Props, SubtypeTable, TypeConfig, TypeDef, TypeSpec,
};
pub use utils::{collect_constructors, extract, merge, parse, pick, Parsed};
