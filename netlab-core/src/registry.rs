//! Kind string to node factory mapping.

use std::collections::BTreeMap;

use crate::error::{Result, UnknownKindSnafu};
use crate::kinds;
use crate::node::Node;

pub type NodeFactory = fn() -> Box<dyn Node>;

#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    factories: BTreeMap<String, NodeFactory>,
}

impl NodeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every kind shipped in this crate.
    #[must_use]
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        kinds::register_all(&mut registry);
        registry
    }

    /// Register `factory` for `kind`, replacing an earlier registration.
    pub fn register(&mut self, kind: impl Into<String>, factory: NodeFactory) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn new_node(&self, kind: &str) -> Result<Box<dyn Node>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| UnknownKindSnafu { kind }.build())?;
        Ok(factory())
    }

    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_builtin_kinds_registered() {
        let registry = NodeRegistry::with_builtin_kinds();
        assert!(registry.contains("ceos"));
        assert!(registry.contains("linux"));
        let kinds: Vec<_> = registry.kinds().collect();
        assert_eq!(kinds, vec!["ceos", "linux"]);
    }

    #[test]
    fn test_unknown_kind_fails() {
        let registry = NodeRegistry::with_builtin_kinds();
        let err = registry.new_node("vr-sros").err().unwrap();
        assert!(matches!(err, Error::UnknownKind { kind } if kind == "vr-sros"));
    }

    #[test]
    fn test_register_overrides() {
        let mut registry = NodeRegistry::new();
        assert!(registry.new_node("linux").is_err());
        registry.register("linux", || -> Box<dyn Node> {
            Box::new(kinds::linux::Linux::default())
        });
        assert!(registry.new_node("linux").is_ok());
    }
}
