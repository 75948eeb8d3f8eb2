//! Config store for loading the layered stagectl.toml.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{StagectlConfig, merge, parser, paths};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    global_path: Option<PathBuf>,
    project_path: PathBuf,
}

impl ConfigStore {
    /// Global file under the user config dir, project file in the working directory.
    pub fn from_default() -> anyhow::Result<Self> {
        let global_dir = paths::global_config_dir()?;
        let project_root = std::env::current_dir()?;
        Ok(Self::from_paths(global_dir, project_root))
    }

    pub fn from_paths(global_dir: PathBuf, project_root: PathBuf) -> Self {
        Self {
            global_path: Some(paths::config_file_in(&global_dir)),
            project_path: paths::config_file_in(&project_root),
        }
    }

    /// Use an explicit file as the project layer.
    pub fn with_project_file(mut self, path: PathBuf) -> Self {
        self.project_path = path;
        self
    }

    /// Ignore the global layer entirely.
    pub fn without_global(mut self) -> Self {
        self.global_path = None;
        self
    }

    pub fn global_path(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Merged file layers. Missing files contribute nothing.
    pub fn load(&self) -> anyhow::Result<StagectlConfig> {
        let global = match &self.global_path {
            Some(path) => load_layer(path)?,
            None => None,
        };
        let project = load_layer(&self.project_path)?;
        Ok(merge::merge_configs(global, project))
    }

    /// File layers plus `STAGECTL_*` overrides from the process environment.
    pub fn load_with_env(&self) -> anyhow::Result<StagectlConfig> {
        let mut config = self.load()?;
        merge::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        Ok(config)
    }
}

fn load_layer(path: &Path) -> anyhow::Result<Option<StagectlConfig>> {
    if !path.exists() {
        debug!(path = %path.display(), "config layer not present");
        return Ok(None);
    }
    debug!(path = %path.display(), "loading config layer");
    parser::parse_stagectl_toml(path).map(Some)
}
