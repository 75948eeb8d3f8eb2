//! Configuration layer merging
//!
//! Layers, lowest precedence first:
//! Global -> Project -> Environment. Command-line flags are applied by the
//! caller on top of the merged result.

use super::schema::{CleanupSettings, HealthSettings, StagectlConfig};

pub const ENV_NAMESPACE: &str = "STAGECTL_NAMESPACE";
pub const ENV_REGISTRY: &str = "STAGECTL_REGISTRY";
pub const ENV_IMAGE_TAG: &str = "STAGECTL_IMAGE_TAG";
pub const ENV_MANIFESTS_DIR: &str = "STAGECTL_MANIFESTS_DIR";
pub const ENV_KUBECTL: &str = "STAGECTL_KUBECTL";

/// Merge the global and project layers. Project values win field by field.
pub fn merge_configs(
    global: Option<StagectlConfig>,
    project: Option<StagectlConfig>,
) -> StagectlConfig {
    let mut merged = global.unwrap_or_default();
    if let Some(layer) = project {
        merge_layer(&mut merged, layer);
    }
    merged
}

fn merge_layer(base: &mut StagectlConfig, overlay: StagectlConfig) {
    overlay_option(&mut base.namespace, overlay.namespace);
    overlay_option(&mut base.registry, overlay.registry);
    overlay_option(&mut base.image_tag, overlay.image_tag);
    overlay_option(&mut base.manifests_dir, overlay.manifests_dir);
    overlay_option(&mut base.managed_label, overlay.managed_label);
    overlay_option(&mut base.kubectl, overlay.kubectl);
    overlay_option(&mut base.kube_context, overlay.kube_context);

    merge_health(&mut base.health, overlay.health);
    merge_cleanup(&mut base.cleanup, overlay.cleanup);

    // Deep merge placeholders
    base.env.extend(overlay.env);

    // A project plan replaces the global one wholesale; stage lists are ordered.
    if !overlay.stages.is_empty() {
        base.stages = overlay.stages;
    }
}

fn merge_health(base: &mut HealthSettings, overlay: HealthSettings) {
    overlay_option(&mut base.poll_interval_secs, overlay.poll_interval_secs);
    overlay_option(&mut base.default_timeout_secs, overlay.default_timeout_secs);
    overlay_option(&mut base.request_timeout_secs, overlay.request_timeout_secs);
}

fn merge_cleanup(base: &mut CleanupSettings, overlay: CleanupSettings) {
    overlay_option(&mut base.retry_budget, overlay.retry_budget);
    overlay_option(&mut base.retry_interval_secs, overlay.retry_interval_secs);
    overlay_option(&mut base.pod_grace_period_secs, overlay.pod_grace_period_secs);
    overlay_option(
        &mut base.namespace_timeout_secs,
        overlay.namespace_timeout_secs,
    );
}

fn overlay_option<T>(base: &mut Option<T>, overlay: Option<T>) {
    if overlay.is_some() {
        *base = overlay;
    }
}

/// Apply `STAGECTL_*` overrides. Empty values are ignored.
///
/// `lookup` is usually `std::env::var(..).ok()`; tests pass a map.
pub fn apply_env_overrides<F>(config: &mut StagectlConfig, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    overlay_option(&mut config.namespace, get(ENV_NAMESPACE));
    overlay_option(&mut config.registry, get(ENV_REGISTRY));
    overlay_option(&mut config.image_tag, get(ENV_IMAGE_TAG));
    overlay_option(&mut config.manifests_dir, get(ENV_MANIFESTS_DIR).map(Into::into));
    overlay_option(&mut config.kubectl, get(ENV_KUBECTL));

    // The namespace may have come from the environment, so validate again.
    config.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_merge_without_layers_is_default() {
        assert_eq!(merge_configs(None, None), StagectlConfig::default());
    }

    #[test]
    fn test_project_overrides_global_field_by_field() {
        let mut global = StagectlConfig::new();
        global.namespace = Some("global-ns".to_string());
        global.registry = Some("registry.global".to_string());
        global.health.poll_interval_secs = Some(5);
        global.health.request_timeout_secs = Some(10);
        global.env.insert("A".to_string(), "global".to_string());
        global.env.insert("B".to_string(), "global".to_string());

        let mut project = StagectlConfig::new();
        project.namespace = Some("shop".to_string());
        project.health.default_timeout_secs = Some(60);
        project.env.insert("B".to_string(), "project".to_string());

        let merged = merge_configs(Some(global), Some(project));
        assert_eq!(merged.namespace.as_deref(), Some("shop"));
        assert_eq!(merged.registry.as_deref(), Some("registry.global"));
        assert_eq!(merged.health.poll_interval_secs, Some(5));
        assert_eq!(merged.health.default_timeout_secs, Some(60));
        assert_eq!(merged.health.request_timeout_secs, Some(10));
        assert_eq!(merged.env["A"], "global");
        assert_eq!(merged.env["B"], "project");
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = StagectlConfig::new();
        config.namespace = Some("shop".to_string());
        config.image_tag = Some("v1".to_string());

        let vars: HashMap<&str, &str> = [(ENV_IMAGE_TAG, "v2"), (ENV_REGISTRY, "  ")]
            .into_iter()
            .collect();
        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.image_tag.as_deref(), Some("v2"));
        assert_eq!(config.namespace.as_deref(), Some("shop"));
        assert_eq!(config.registry, None);
    }

    #[test]
    fn test_env_namespace_is_validated() {
        let mut config = StagectlConfig::new();
        let result = apply_env_overrides(&mut config, |key| {
            (key == ENV_NAMESPACE).then(|| "Not Valid".to_string())
        });
        assert!(result.is_err());
    }
}
