use crate::plugin::builtin::{RandomGuardRemover, SLIME_SPAWN_RULES};
use crate::plugin::errors::TransformError;
use crate::plugin::manifest::TransformerManifest;
use std::collections::BTreeMap;
use std::fmt;

/// Capability every plugin provides: rewrite one compiled module.
pub trait Transformer {
    /// Called once after construction, before any module is transformed.
    fn init(&mut self) -> Result<(), TransformError> {
        Ok(())
    }

    /// Return the (possibly unchanged) bytes of the module `qualified_name`.
    fn transform(&mut self, module: Vec<u8>, qualified_name: &str)
        -> Result<Vec<u8>, TransformError>;
}

pub type TransformerFactory =
    Box<dyn Fn(&TransformerManifest) -> Result<Box<dyn Transformer>, TransformError>>;

/// Host-controlled map from entry-point ids to transformer constructors.
/// Only ids registered here can be named by a package manifest.
#[derive(Default)]
pub struct TransformerRegistry {
    factories: BTreeMap<String, TransformerFactory>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the transformers shipped with this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(SLIME_SPAWN_RULES, |_: &TransformerManifest| {
            Ok(Box::new(RandomGuardRemover::new()) as Box<dyn Transformer>)
        });
        registry
    }

    /// Register `factory` under `entry_point`, replacing any previous one.
    pub fn register<F>(&mut self, entry_point: impl Into<String>, factory: F)
    where
        F: Fn(&TransformerManifest) -> Result<Box<dyn Transformer>, TransformError> + 'static,
    {
        self.factories.insert(entry_point.into(), Box::new(factory));
    }

    pub fn contains(&self, entry_point: &str) -> bool {
        self.factories.contains_key(entry_point)
    }

    pub fn entry_points(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// `None` when the manifest names an unregistered entry point.
    pub fn create(
        &self,
        manifest: &TransformerManifest,
    ) -> Option<Result<Box<dyn Transformer>, TransformError>> {
        self.factories
            .get(&manifest.entry_point)
            .map(|factory| factory(manifest))
    }

    /// Closest registered id to `entry_point`, if any is reasonably close.
    pub fn suggest(&self, entry_point: &str) -> Option<String> {
        self.factories
            .keys()
            .map(|id| (strsim::levenshtein(id, entry_point), id))
            .filter(|(distance, id)| *distance <= (id.len().max(entry_point.len()) / 3).max(2))
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, id)| id.clone())
    }
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field("entry_points", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Identity;

    impl Transformer for Identity {
        fn transform(&mut self, module: Vec<u8>, _: &str) -> Result<Vec<u8>, TransformError> {
            Ok(module)
        }
    }

    fn manifest(entry_point: &str) -> TransformerManifest {
        TransformerManifest {
            name: "test".to_string(),
            version: "1".to_string(),
            author: "me".to_string(),
            entry_point: entry_point.to_string(),
            supported_versions: None,
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = TransformerRegistry::with_builtins();
        assert!(registry.contains(SLIME_SPAWN_RULES));
        assert!(registry.create(&manifest(SLIME_SPAWN_RULES)).unwrap().is_ok());
    }

    #[test]
    fn test_unknown_entry_point() {
        let registry = TransformerRegistry::with_builtins();
        assert!(registry.create(&manifest("com.example.Missing")).is_none());
    }

    #[test]
    fn test_factory_receives_manifest() {
        let mut registry = TransformerRegistry::new();
        registry.register("demo", |m: &TransformerManifest| {
            if m.author == "me" {
                Ok(Box::new(Identity) as Box<dyn Transformer>)
            } else {
                Err(TransformError::Other("wrong author".to_string()))
            }
        });
        assert!(registry.create(&manifest("demo")).unwrap().is_ok());

        let mut other = manifest("demo");
        other.author = "someone".to_string();
        assert!(registry.create(&other).unwrap().is_err());
    }

    #[test]
    fn test_suggestion() {
        let registry = TransformerRegistry::with_builtins();
        assert_eq!(
            registry.suggest("builtin:slime-spawn-rule"),
            Some(SLIME_SPAWN_RULES.to_string())
        );
        assert_eq!(registry.suggest("org.unrelated.Thing"), None);
    }
}
