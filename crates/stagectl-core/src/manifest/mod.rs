//! Manifest source: supplies the named resource definitions for each stage.
//!
//! Content is opaque to the orchestrator. The only transformation applied is
//! `${KEY}` placeholder substitution from the run context.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::context::RunContext;
use crate::error::ManifestError;
use crate::types::Manifest;

pub trait ManifestSource {
    /// Load and render the resource `resource` belonging to `stage`.
    fn load(&self, stage: &str, resource: &str, ctx: &RunContext)
    -> Result<Manifest, ManifestError>;
}

/// Reads manifests from a directory, one file per resource.
#[derive(Debug, Clone)]
pub struct DirManifestSource {
    root: PathBuf,
}

impl DirManifestSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ManifestSource for DirManifestSource {
    fn load(
        &self,
        _stage: &str,
        resource: &str,
        ctx: &RunContext,
    ) -> Result<Manifest, ManifestError> {
        let path = self.root.join(resource);
        if !path.is_file() {
            return Err(ManifestError::NotFound { path });
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| ManifestError::Read {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(Manifest::new(resource, render(&raw, &ctx.placeholders())))
    }
}

/// Replace `${KEY}` with its value. Unknown keys are left in place.
pub fn render(template: &str, values: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match values.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("${");
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Manifest for the run's namespace, labelled as managed.
pub fn namespace_manifest(namespace: &str, managed_label: &str) -> Manifest {
    let mut payload = format!(
        "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {}\n",
        namespace
    );
    if let Some((key, value)) = managed_label.split_once('=') {
        payload.push_str(&format!("  labels:\n    {}: \"{}\"\n", key, value));
    }
    Manifest::new(format!("namespace/{}", namespace), payload)
}
