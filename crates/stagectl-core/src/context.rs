//! Per-run context.
//!
//! A `RunContext` is built once per invocation and passed explicitly to every
//! component. It is never persisted and never shared between runs.

use std::collections::BTreeMap;

/// Flags that relax safety checks for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForceFlags {
    /// Skip every confirmation prompt.
    pub assume_yes: bool,
    /// Allow zero-grace escalation when cleaning up stragglers.
    pub force_delete: bool,
    /// Keep data-bearing resources (storage claims, stateful tiers, namespace).
    pub keep_data: bool,
    /// Skip stages that configure external routing.
    pub skip_routing: bool,
}

#[derive(Debug, Clone)]
pub struct RunContext {
    pub namespace: String,
    pub image_tag: String,
    pub registry: String,
    pub flags: ForceFlags,
    /// Extra placeholder values substituted into manifests.
    pub env: BTreeMap<String, String>,
}

impl RunContext {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            image_tag: "latest".to_string(),
            registry: String::new(),
            flags: ForceFlags::default(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_image_tag(mut self, tag: impl Into<String>) -> Self {
        self.image_tag = tag.into();
        self
    }

    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = registry.into();
        self
    }

    pub fn with_flags(mut self, flags: ForceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// All placeholder values for manifest rendering, built-ins last so they win.
    pub fn placeholders(&self) -> BTreeMap<String, String> {
        let mut values = self.env.clone();
        values.insert("NAMESPACE".to_string(), self.namespace.clone());
        values.insert("REGISTRY".to_string(), self.registry.clone());
        values.insert("IMAGE_TAG".to_string(), self.image_tag.clone());
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_placeholders_override_env() {
        let ctx = RunContext::new("shop")
            .with_registry("registry.local/shop")
            .with_env("NAMESPACE", "ignored")
            .with_env("LOG_LEVEL", "INFO");
        let values = ctx.placeholders();
        assert_eq!(values["NAMESPACE"], "shop");
        assert_eq!(values["REGISTRY"], "registry.local/shop");
        assert_eq!(values["IMAGE_TAG"], "latest");
        assert_eq!(values["LOG_LEVEL"], "INFO");
    }
}
