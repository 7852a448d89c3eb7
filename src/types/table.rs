use super::TypeDef;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Live name → definition table.
///
/// Cloning shares the table, so every holder observes later definitions.
#[derive(Clone, Default)]
pub struct SubtypeTable(Arc<DashMap<String, TypeDef>>);

impl SubtypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<TypeDef> {
        self.0.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Names in lexical order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve `A.B.C` through nested subtype tables.
    pub fn lookup_path(&self, path: &str) -> Option<TypeDef> {
        let mut segments = path.split('.').map(str::trim);
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = current.subtypes().get(segment)?;
        }
        Some(current)
    }

    pub fn ptr_eq(&self, other: &SubtypeTable) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn entries(&self) -> &DashMap<String, TypeDef> {
        &self.0
    }
}

impl fmt::Debug for SubtypeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
