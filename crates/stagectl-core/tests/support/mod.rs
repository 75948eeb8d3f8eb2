//! In-memory collaborators for orchestration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use stagectl_core::clock::{Clock, Interrupt};
use stagectl_core::cluster::ClusterClient;
use stagectl_core::confirm::Prompter;
use stagectl_core::context::RunContext;
use stagectl_core::error::{ClusterError, ManifestError};
use stagectl_core::manifest::ManifestSource;
use stagectl_core::orchestration::{Collaborators, RunSettings};
use stagectl_core::types::{
    GracePeriod, Manifest, ResourceHandle, ResourceState, Selector, WaitCondition, WaitOutcome,
};

/// One call made against the fake cluster, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Apply(String),
    Delete(String, GracePeriod),
    DeleteManifest(String, GracePeriod),
    Get(String),
    Wait(String, WaitCondition),
    Discover,
}

impl Call {
    /// Whether the call changes cluster state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::Apply(_) | Call::Delete(..) | Call::DeleteManifest(..)
        )
    }
}

pub fn handle(kind: &str, name: &str, state: ResourceState) -> ResourceHandle {
    ResourceHandle::new(kind, name, Some("shop"), state)
}

pub fn command_error(operation: &str) -> ClusterError {
    ClusterError::Command {
        operation: operation.to_string(),
        target: "fake".to_string(),
        stderr: "connection refused".to_string(),
    }
}

/// A tiny scripted cluster keyed by selector display form.
///
/// `get` first drains any queued responses for the selector, then returns
/// the steady state. Deleting a selector clears its steady state unless the
/// selector was marked stubborn. Applying a namespace manifest creates a
/// ready namespace.
#[derive(Default)]
pub struct FakeCluster {
    calls: RefCell<Vec<Call>>,
    steady: RefCell<HashMap<String, Vec<ResourceHandle>>>,
    queued: RefCell<HashMap<String, VecDeque<Result<Vec<ResourceHandle>, ClusterError>>>>,
    failing_applies: RefCell<HashSet<String>>,
    failing_manifest_deletes: RefCell<HashSet<String>>,
    stubborn: RefCell<HashSet<String>>,
    kinds: RefCell<Vec<String>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        let cluster = Self::default();
        *cluster.kinds.borrow_mut() = vec![
            "configmaps".to_string(),
            "events".to_string(),
            "persistentvolumeclaims".to_string(),
            "deployments.apps".to_string(),
        ];
        cluster
    }

    /// A cluster where the `shop` namespace already exists.
    pub fn with_namespace() -> Self {
        let cluster = Self::new();
        cluster.set(
            &Selector::namespace("shop"),
            vec![ResourceHandle::new(
                "namespace",
                "shop",
                None,
                ResourceState::Ready,
            )],
        );
        cluster
    }

    pub fn set(&self, selector: &Selector, handles: Vec<ResourceHandle>) {
        self.steady
            .borrow_mut()
            .insert(selector.to_string(), handles);
    }

    pub fn script(
        &self,
        selector: &Selector,
        responses: Vec<Result<Vec<ResourceHandle>, ClusterError>>,
    ) {
        self.queued
            .borrow_mut()
            .insert(selector.to_string(), responses.into());
    }

    pub fn fail_apply(&self, manifest: &str) {
        self.failing_applies
            .borrow_mut()
            .insert(manifest.to_string());
    }

    pub fn fail_delete_manifest(&self, manifest: &str) {
        self.failing_manifest_deletes
            .borrow_mut()
            .insert(manifest.to_string());
    }

    /// Deletes against this selector succeed but remove nothing.
    pub fn make_stubborn(&self, selector: &Selector) {
        self.stubborn.borrow_mut().insert(selector.to_string());
    }

    pub fn set_kinds(&self, kinds: &[&str]) {
        *self.kinds.borrow_mut() = kinds.iter().map(|k| k.to_string()).collect();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(Call::is_mutation)
            .collect()
    }

    pub fn applied(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Apply(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn gets_of(&self, selector: &Selector) -> usize {
        let key = selector.to_string();
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Get(s) if *s == key))
            .count()
    }

    pub fn deletes_of(&self, selector: &Selector) -> Vec<GracePeriod> {
        let key = selector.to_string();
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete(s, grace) if s == key => Some(grace),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl ClusterClient for FakeCluster {
    fn apply(&self, _namespace: &str, manifest: &Manifest) -> Result<(), ClusterError> {
        self.record(Call::Apply(manifest.name.clone()));
        if self.failing_applies.borrow().contains(&manifest.name) {
            return Err(command_error("apply"));
        }
        if let Some(ns) = manifest.name.strip_prefix("namespace/") {
            self.set(
                &Selector::namespace(ns),
                vec![ResourceHandle::new("namespace", ns, None, ResourceState::Ready)],
            );
        }
        Ok(())
    }

    fn delete(&self, selector: &Selector, grace: GracePeriod) -> Result<(), ClusterError> {
        let key = selector.to_string();
        self.record(Call::Delete(key.clone(), grace));
        if !self.stubborn.borrow().contains(&key) {
            self.steady.borrow_mut().remove(&key);
        }
        Ok(())
    }

    fn delete_manifest(
        &self,
        _namespace: &str,
        manifest: &Manifest,
        grace: GracePeriod,
    ) -> Result<(), ClusterError> {
        self.record(Call::DeleteManifest(manifest.name.clone(), grace));
        if self.failing_manifest_deletes.borrow().contains(&manifest.name) {
            return Err(command_error("delete"));
        }
        Ok(())
    }

    fn get(&self, selector: &Selector) -> Result<Vec<ResourceHandle>, ClusterError> {
        let key = selector.to_string();
        self.record(Call::Get(key.clone()));
        if let Some(queue) = self.queued.borrow_mut().get_mut(&key)
            && let Some(response) = queue.pop_front()
        {
            return response;
        }
        Ok(self.steady.borrow().get(&key).cloned().unwrap_or_default())
    }

    fn wait(
        &self,
        selector: &Selector,
        condition: WaitCondition,
        _timeout: Duration,
    ) -> Result<WaitOutcome, ClusterError> {
        let key = selector.to_string();
        self.record(Call::Wait(key.clone(), condition));
        let present = self
            .steady
            .borrow()
            .get(&key)
            .is_some_and(|handles| handles.iter().any(|h| h.state.is_present()));
        Ok(match (condition, present) {
            (WaitCondition::Deleted, false) => WaitOutcome::Met,
            (WaitCondition::Ready, true) => WaitOutcome::Met,
            _ => WaitOutcome::TimedOut,
        })
    }

    fn discover_deletable_kinds(&self) -> Result<Vec<String>, ClusterError> {
        self.record(Call::Discover);
        Ok(self.kinds.borrow().clone())
    }
}

/// Serves `stage/resource` manifests without touching the filesystem.
#[derive(Default)]
pub struct FakeManifests {
    missing: RefCell<HashSet<String>>,
}

impl FakeManifests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&self, stage: &str, resource: &str) {
        self.missing
            .borrow_mut()
            .insert(format!("{}/{}", stage, resource));
    }
}

impl ManifestSource for FakeManifests {
    fn load(
        &self,
        stage: &str,
        resource: &str,
        ctx: &RunContext,
    ) -> Result<Manifest, ManifestError> {
        let name = format!("{}/{}", stage, resource);
        if self.missing.borrow().contains(&name) {
            return Err(ManifestError::NotFound {
                path: name.clone().into(),
            });
        }
        Ok(Manifest::new(
            name,
            format!("# rendered for {}:{}", ctx.namespace, ctx.image_tag),
        ))
    }
}

/// Clock that only moves when slept on.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Manual clock that raises the interrupt on its first sleep, as a Ctrl-C
/// arriving mid-wait would.
#[derive(Debug)]
pub struct InterruptingClock {
    inner: ManualClock,
    interrupt: Interrupt,
}

impl InterruptingClock {
    pub fn new(interrupt: Interrupt) -> Self {
        Self {
            inner: ManualClock::new(),
            interrupt,
        }
    }
}

impl Clock for InterruptingClock {
    fn now(&self) -> Duration {
        self.inner.now()
    }

    fn sleep(&self, duration: Duration) {
        self.interrupt.trigger();
        self.inner.sleep(duration);
    }
}

/// Answers prompts from a script and records every question asked.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<bool>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().copied().collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, prompt: &str) -> anyhow::Result<bool> {
        self.asked.borrow_mut().push(prompt.to_string());
        Ok(self.answers.borrow_mut().pop_front().unwrap_or(false))
    }
}

pub const LABEL: &str = "app.kubernetes.io/part-of=shop";

/// Short, deterministic timings for orchestration tests.
pub fn settings() -> RunSettings {
    RunSettings {
        poll_interval: Duration::from_secs(2),
        namespace_timeout: Duration::from_secs(10),
        managed_label: LABEL.to_string(),
        retry_budget: 2,
        retry_interval: Duration::from_secs(1),
        pod_grace_period: Duration::from_secs(1),
    }
}

pub fn pods(label: &str) -> Selector {
    Selector::labeled("pods", "shop", label)
}

/// Every collaborator of a run, owned in one place.
pub struct Harness {
    pub cluster: FakeCluster,
    pub manifests: FakeManifests,
    pub prompter: ScriptedPrompter,
    pub clock: ManualClock,
    pub interrupt: Interrupt,
}

impl Harness {
    pub fn new(cluster: FakeCluster) -> Self {
        Self {
            cluster,
            manifests: FakeManifests::new(),
            prompter: ScriptedPrompter::default(),
            clock: ManualClock::new(),
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_answers(mut self, answers: &[bool]) -> Self {
        self.prompter = ScriptedPrompter::answering(answers);
        self
    }

    pub fn deps(&self) -> Collaborators<'_> {
        Collaborators {
            client: &self.cluster,
            manifests: &self.manifests,
            prompter: &self.prompter,
            clock: &self.clock,
            interrupt: &self.interrupt,
        }
    }
}
