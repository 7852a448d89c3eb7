use serde::{Deserialize, Serialize};

/// Resolved construction flags of a namespace, collection or type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeConfig {
    /// Every instance of the type shares a single delegation-chain node
    #[serde(default = "default_false")]
    pub use_old_style: bool,

    /// Subtypes are reachable only from instances of their declaring type
    #[serde(default = "default_true")]
    pub strict_chain: bool,
}

impl Default for TypeConfig {
    fn default() -> Self {
        Self {
            use_old_style: false,
            strict_chain: true,
        }
    }
}

/// Per-flag overrides; `None` inherits from the enclosing scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_old_style: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_chain: Option<bool>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_old_style(mut self, value: bool) -> Self {
        self.use_old_style = Some(value);
        self
    }

    pub fn strict_chain(mut self, value: bool) -> Self {
        self.strict_chain = Some(value);
        self
    }

    /// Each flag independently: explicit value wins, else `inherited`.
    pub fn resolve(&self, inherited: TypeConfig) -> TypeConfig {
        TypeConfig {
            use_old_style: self.use_old_style.unwrap_or(inherited.use_old_style),
            strict_chain: self.strict_chain.unwrap_or(inherited.strict_chain),
        }
    }
}

impl From<TypeConfig> for ConfigOverrides {
    fn from(config: TypeConfig) -> Self {
        Self {
            use_old_style: Some(config.use_old_style),
            strict_chain: Some(config.strict_chain),
        }
    }
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }
