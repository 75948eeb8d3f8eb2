//! Cluster client backed by the `kubectl` command line tool.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::ClusterClient;
use crate::error::ClusterError;
use crate::types::{
    GracePeriod, Manifest, ResourceHandle, ResourceState, Selector, Target, WaitCondition,
    WaitOutcome,
};

/// Server round-trip bound for every call except `wait`, which carries its own.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shells out to `kubectl`, feeding manifests through stdin.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    program: String,
    context: Option<String>,
    request_timeout: Duration,
}

impl KubectlClient {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            context: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Bound each API request so an unreachable server cannot hang a run.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Pin every call to a kubeconfig context instead of the current one.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument list for one invocation.
    fn command_args(&self, operation: &str, args: &[String]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 3);
        if let Some(context) = &self.context {
            full.push("--context".to_string());
            full.push(context.clone());
        }
        full.extend(args.iter().cloned());
        if operation != "wait" {
            full.push(format!(
                "--request-timeout={}s",
                self.request_timeout.as_secs().max(1)
            ));
        }
        full
    }

    fn run(
        &self,
        operation: &str,
        target: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<String, ClusterError> {
        let args = self.command_args(operation, args);
        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        debug!(program = %self.program, ?args, "running cluster command");
        let spawn_error = |err: std::io::Error| ClusterError::Spawn {
            program: self.program.clone(),
            message: err.to_string(),
        };
        let mut child = cmd.spawn().map_err(spawn_error)?;
        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input.as_bytes()).map_err(spawn_error)?;
        }
        let output = child.wait_with_output().map_err(spawn_error)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClusterError::Command {
                operation: operation.to_string(),
                target: target.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for KubectlClient {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl ClusterClient for KubectlClient {
    fn apply(&self, namespace: &str, manifest: &Manifest) -> Result<(), ClusterError> {
        let args = strings(&["apply", "-n", namespace, "-f", "-"]);
        self.run("apply", &manifest.name, &args, Some(&manifest.payload))?;
        Ok(())
    }

    fn delete(&self, selector: &Selector, grace: GracePeriod) -> Result<(), ClusterError> {
        let args = delete_args(selector, grace);
        self.run("delete", &selector.to_string(), &args, None)?;
        Ok(())
    }

    fn delete_manifest(
        &self,
        namespace: &str,
        manifest: &Manifest,
        grace: GracePeriod,
    ) -> Result<(), ClusterError> {
        let mut args = strings(&[
            "delete",
            "-n",
            namespace,
            "-f",
            "-",
            "--ignore-not-found",
            "--wait=false",
        ]);
        args.extend(grace_args(grace));
        self.run("delete", &manifest.name, &args, Some(&manifest.payload))?;
        Ok(())
    }

    fn get(&self, selector: &Selector) -> Result<Vec<ResourceHandle>, ClusterError> {
        let mut args = vec!["get".to_string()];
        args.extend(selector_args(selector, false));
        args.extend(strings(&["-o", "json", "--ignore-not-found"]));
        let stdout = self.run("get", &selector.to_string(), &args, None)?;
        parse_handles(&stdout, selector)
    }

    fn wait(
        &self,
        selector: &Selector,
        condition: WaitCondition,
        timeout: Duration,
    ) -> Result<WaitOutcome, ClusterError> {
        let mut args = vec!["wait".to_string()];
        args.extend(selector_args(selector, true));
        args.push(match condition {
            WaitCondition::Ready => "--for=condition=Ready".to_string(),
            WaitCondition::Deleted => "--for=delete".to_string(),
        });
        args.push(format!("--timeout={}s", timeout.as_secs().max(1)));

        match self.run("wait", &selector.to_string(), &args, None) {
            Ok(_) => Ok(WaitOutcome::Met),
            Err(ClusterError::Command { stderr, .. }) if stderr.contains("timed out") => {
                Ok(WaitOutcome::TimedOut)
            }
            Err(ClusterError::Command { stderr, .. })
                if condition == WaitCondition::Deleted && is_not_found(&stderr) =>
            {
                Ok(WaitOutcome::Met)
            }
            Err(err) => Err(err),
        }
    }

    fn discover_deletable_kinds(&self) -> Result<Vec<String>, ClusterError> {
        let args = strings(&[
            "api-resources",
            "--verbs=list,delete",
            "--namespaced=true",
            "-o",
            "name",
        ]);
        let stdout = self.run("api-resources", "namespaced kinds", &args, None)?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("NotFound") || stderr.contains("not found")
}

/// Positional selector arguments. `get` has no `--all`; listing the kind is enough.
fn selector_args(selector: &Selector, allow_all_flag: bool) -> Vec<String> {
    let mut args = vec![selector.kind.clone()];
    match &selector.target {
        Target::Name(name) => args.push(name.clone()),
        Target::Label(label) => {
            args.push("-l".to_string());
            args.push(label.clone());
        }
        Target::All => {
            if allow_all_flag {
                args.push("--all".to_string());
            }
        }
    }
    if let Some(ns) = &selector.namespace {
        args.push("-n".to_string());
        args.push(ns.clone());
    }
    args
}

fn grace_args(grace: GracePeriod) -> Vec<String> {
    match grace {
        GracePeriod::Default => Vec::new(),
        GracePeriod::Seconds(secs) => vec![format!("--grace-period={}", secs)],
        GracePeriod::Zero => strings(&["--grace-period=0", "--force"]),
    }
}

fn delete_args(selector: &Selector, grace: GracePeriod) -> Vec<String> {
    let mut args = vec!["delete".to_string()];
    args.extend(selector_args(selector, true));
    args.extend(strings(&["--ignore-not-found", "--wait=false"]));
    args.extend(grace_args(grace));
    args
}

/// Map `kubectl get -o json` output (single object or list) to handles.
fn parse_handles(stdout: &str, selector: &Selector) -> Result<Vec<ResourceHandle>, ClusterError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(trimmed).map_err(|e| ClusterError::Parse {
        operation: "get".to_string(),
        message: e.to_string(),
    })?;

    let is_list = value
        .get("kind")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.ends_with("List"));
    let objects: Vec<&Value> = if is_list {
        value
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().collect())
            .unwrap_or_default()
    } else {
        vec![&value]
    };

    Ok(objects
        .into_iter()
        .map(|obj| {
            let kind = obj
                .get("kind")
                .and_then(Value::as_str)
                .map(str::to_lowercase)
                .unwrap_or_else(|| selector.kind.clone());
            let name = obj
                .pointer("/metadata/name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let namespace = obj
                .pointer("/metadata/namespace")
                .and_then(Value::as_str)
                .or(selector.namespace.as_deref());
            ResourceHandle::new(kind, name, namespace, observe_state(obj))
        })
        .collect())
}

fn observe_state(obj: &Value) -> ResourceState {
    if obj.pointer("/metadata/deletionTimestamp").is_some() {
        return ResourceState::Terminating;
    }
    let kind = obj.get("kind").and_then(Value::as_str).unwrap_or_default();
    let status_str = |path: &str| obj.pointer(path).and_then(Value::as_str).unwrap_or_default();
    let status_u64 = |path: &str| obj.pointer(path).and_then(Value::as_u64);

    match kind {
        "Pod" => pod_state(obj),
        "Deployment" | "StatefulSet" | "ReplicaSet" => {
            let desired = status_u64("/spec/replicas").unwrap_or(1);
            let ready = status_u64("/status/readyReplicas").unwrap_or(0);
            ready_if(ready >= desired)
        }
        "DaemonSet" => {
            let desired = status_u64("/status/desiredNumberScheduled").unwrap_or(0);
            let ready = status_u64("/status/numberReady").unwrap_or(0);
            ready_if(desired > 0 && ready >= desired)
        }
        "Job" => {
            if status_u64("/status/succeeded").unwrap_or(0) > 0 {
                ResourceState::Ready
            } else if has_condition(obj, "Failed") {
                ResourceState::Error
            } else {
                ResourceState::Pending
            }
        }
        "PersistentVolumeClaim" => match status_str("/status/phase") {
            "Bound" => ResourceState::Ready,
            "Lost" => ResourceState::Error,
            _ => ResourceState::Pending,
        },
        "Namespace" => match status_str("/status/phase") {
            "Terminating" => ResourceState::Terminating,
            _ => ResourceState::Ready,
        },
        "Endpoints" => {
            let has_address = obj
                .get("subsets")
                .and_then(Value::as_array)
                .is_some_and(|subsets| {
                    subsets.iter().any(|subset| {
                        subset
                            .get("addresses")
                            .and_then(Value::as_array)
                            .is_some_and(|a| !a.is_empty())
                    })
                });
            ready_if(has_address)
        }
        _ => ResourceState::Ready,
    }
}

fn pod_state(obj: &Value) -> ResourceState {
    let phase = obj
        .pointer("/status/phase")
        .and_then(Value::as_str)
        .unwrap_or_default();
    match phase {
        "Succeeded" => return ResourceState::Ready,
        "Failed" => return ResourceState::Error,
        _ => {}
    }
    if has_condition(obj, "Ready") {
        return ResourceState::Ready;
    }
    let stuck = obj
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)
        .is_some_and(|statuses| {
            statuses.iter().any(|s| {
                matches!(
                    s.pointer("/state/waiting/reason").and_then(Value::as_str),
                    Some("CrashLoopBackOff" | "ImagePullBackOff" | "ErrImagePull")
                )
            })
        });
    if stuck {
        ResourceState::Error
    } else {
        ResourceState::Pending
    }
}

fn has_condition(obj: &Value, condition: &str) -> bool {
    obj.pointer("/status/conditions")
        .and_then(Value::as_array)
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some(condition)
                    && c.get("status").and_then(Value::as_str) == Some("True")
            })
        })
}

fn ready_if(ready: bool) -> ResourceState {
    if ready {
        ResourceState::Ready
    } else {
        ResourceState::Pending
    }
}
