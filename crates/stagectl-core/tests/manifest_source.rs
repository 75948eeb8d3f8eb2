use std::fs;

use tempfile::TempDir;

use stagectl_core::context::RunContext;
use stagectl_core::error::ManifestError;
use stagectl_core::manifest::{DirManifestSource, ManifestSource};

#[test]
fn renders_placeholders_from_the_run_context() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("backend.yaml"),
        "metadata:\n  namespace: ${NAMESPACE}\nimage: ${REGISTRY}/backend:${IMAGE_TAG}\nreplicas: ${REPLICAS}\n",
    )
    .unwrap();
    let source = DirManifestSource::new(temp.path());
    let ctx = RunContext::new("shop")
        .with_registry("registry.local/shop")
        .with_image_tag("v1.4.0")
        .with_env("REPLICAS", "3");

    let manifest = source.load("backend", "backend.yaml", &ctx).unwrap();

    assert_eq!(manifest.name, "backend.yaml");
    assert_eq!(
        manifest.payload,
        "metadata:\n  namespace: shop\nimage: registry.local/shop/backend:v1.4.0\nreplicas: 3\n"
    );
}

#[test]
fn missing_file_is_not_found() {
    let temp = TempDir::new().unwrap();
    let source = DirManifestSource::new(temp.path());

    let err = source
        .load("frontend", "frontend.yaml", &RunContext::new("shop"))
        .unwrap_err();

    assert!(matches!(err, ManifestError::NotFound { .. }));
    assert!(err.to_string().contains("frontend.yaml"));
}

#[test]
fn directories_are_not_manifests() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("nested.yaml")).unwrap();
    let source = DirManifestSource::new(temp.path());

    let err = source
        .load("config", "nested.yaml", &RunContext::new("shop"))
        .unwrap_err();

    assert!(matches!(err, ManifestError::NotFound { .. }));
}
