//! Type definitions and their building blocks

pub mod definition;
pub mod flags;
pub mod initializer;
pub mod table;

pub use definition::{TypeDef, TypeSpec};
pub use flags::{ConfigOverrides, TypeConfig};
pub use initializer::{Args, Context, Initializer, Outcome};
pub use table::SubtypeTable;

/// Property bag of instances, templates and foreign receivers
pub type Props = serde_json::Map<String, serde_json::Value>;
