//! Transformers shipped with the crate.

use crate::class::{AccessFlags, DecodedModule, MethodRule};
use crate::plugin::errors::TransformError;
use crate::plugin::registry::Transformer;
use crate::rewrite::WindowRewrite;
use tracing::{debug, error, info, warn};

pub const SLIME_SPAWN_RULES: &str = "builtin:slime-spawn-rules";

/// Removes the `random.nextInt(8)` early return from the slime spawn check,
/// so spawn rules no longer depend on that roll.
#[derive(Debug, Clone)]
pub struct RandomGuardRemover {
    class_prefix: String,
    class_suffix: String,
    rule: MethodRule,
    rewrite: WindowRewrite,
}

impl Default for RandomGuardRemover {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomGuardRemover {
    pub fn new() -> Self {
        Self {
            class_prefix: "net.minecraft.server".to_string(),
            class_suffix: "EntitySlime".to_string(),
            rule: MethodRule::new()
                .with_flags(AccessFlags::STATIC)
                .descriptor_ends_with("Z"),
            rewrite: WindowRewrite::random_guard(),
        }
    }

    pub fn applies_to(&self, qualified_name: &str) -> bool {
        qualified_name.starts_with(&self.class_prefix) && qualified_name.ends_with(&self.class_suffix)
    }
}

impl Transformer for RandomGuardRemover {
    fn transform(
        &mut self,
        module: Vec<u8>,
        qualified_name: &str,
    ) -> Result<Vec<u8>, TransformError> {
        if !self.applies_to(qualified_name) {
            return Ok(module);
        }

        let mut decoded = DecodedModule::decode(&module)?;
        let index = match decoded.select_method(&self.rule) {
            Ok(index) => index,
            Err(e) => {
                error!("{}; leaving {} unchanged", e, qualified_name);
                return Ok(module);
            }
        };

        let method = &mut decoded.methods[index];
        let method_name = format!("{}{}", method.name, method.descriptor);
        let Some(code) = method.code.as_mut() else {
            warn!("{}.{} has no body", qualified_name, method_name);
            return Ok(module);
        };
        let Some(report) = self.rewrite.apply(code) else {
            warn!(
                "{}.{} does not contain {}",
                qualified_name, method_name, self.rewrite.pattern
            );
            return Ok(module);
        };

        debug!(
            "Removed {} instructions at index {} of {}.{}",
            report.removed.len(),
            report.start,
            qualified_name,
            method_name
        );
        info!("Patched spawn rules in {}.{}", qualified_name, method_name);
        Ok(decoded.encode()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_name_filter() {
        let t = RandomGuardRemover::new();
        assert!(t.applies_to("net.minecraft.server.v1_8_R3.EntitySlime"));
        assert!(t.applies_to("net.minecraft.server.EntitySlime"));
        assert!(!t.applies_to("net.minecraft.server.EntityMagmaCube"));
        assert!(!t.applies_to("org.example.EntitySlime"));
    }

    #[test]
    fn test_other_classes_pass_through_untouched() {
        let mut t = RandomGuardRemover::new();
        let bytes = vec![1, 2, 3];
        assert_eq!(t.transform(bytes.clone(), "a.B").unwrap(), bytes);
    }

    #[test]
    fn test_garbage_target_is_decode_error() {
        let mut t = RandomGuardRemover::new();
        let err = t
            .transform(vec![0, 1, 2, 3], "net.minecraft.server.EntitySlime")
            .unwrap_err();
        assert!(matches!(err, TransformError::Decode(_)));
    }
}
