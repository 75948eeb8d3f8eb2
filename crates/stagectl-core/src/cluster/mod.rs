//! Cluster client boundary.
//!
//! The orchestrator only knows resources through selectors and readiness
//! states; everything kind-specific lives behind this trait.

pub mod kubectl;

use std::time::Duration;

use crate::error::ClusterError;
use crate::types::{GracePeriod, Manifest, ResourceHandle, Selector, WaitCondition, WaitOutcome};

pub use kubectl::KubectlClient;

pub trait ClusterClient {
    /// Declaratively apply one manifest into `namespace`.
    fn apply(&self, namespace: &str, manifest: &Manifest) -> Result<(), ClusterError>;

    /// Delete everything the selector matches. Absent resources are not an error.
    fn delete(&self, selector: &Selector, grace: GracePeriod) -> Result<(), ClusterError>;

    /// Delete the resources a manifest defines. Absent resources are not an error.
    fn delete_manifest(
        &self,
        namespace: &str,
        manifest: &Manifest,
        grace: GracePeriod,
    ) -> Result<(), ClusterError>;

    /// Fetch fresh state for everything the selector matches.
    fn get(&self, selector: &Selector) -> Result<Vec<ResourceHandle>, ClusterError>;

    /// Block cluster-side until the condition holds or `timeout` elapses.
    fn wait(
        &self,
        selector: &Selector,
        condition: WaitCondition,
        timeout: Duration,
    ) -> Result<WaitOutcome, ClusterError>;

    /// Resource kinds that can be listed and deleted inside a namespace.
    fn discover_deletable_kinds(&self) -> Result<Vec<String>, ClusterError>;
}
