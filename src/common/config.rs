use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

const MAX_WORKSPACES: usize = 32;

pub fn config_file() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".wsp.toml")
}

/// What happens to windows still assigned to a workspace when it is released.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReleasePolicy {
    /// Append them to the fallback workspace, reported as a batch move.
    #[default]
    MoveToFallback,
    /// Drop their association; they become unassigned until re-added.
    Detach,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub release_policy: ReleasePolicy,
    /// Whether moving the content of an empty workspace still emits the
    /// before/after notification pair (with empty window lists).
    #[serde(default = "yes")]
    pub emit_empty_batches: bool,
    /// Fallback tracing filter used when `RUST_LOG` is not set.
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            release_policy: ReleasePolicy::default(),
            emit_empty_batches: true,
            log_filter: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if let Some(filter) = &self.log_filter {
            if filter.trim().is_empty() {
                issues.push("log_filter must not be empty when set".to_string());
            }
        }
        issues
    }

    pub fn auto_fix_values(&mut self) -> usize {
        let mut fixes = 0;
        if self.log_filter.as_ref().is_some_and(|f| f.trim().is_empty()) {
            self.log_filter = None;
            fixes += 1;
        }
        fixes
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceSettings {
    /// Name of the always-present workspace that catches unplaced windows.
    #[serde(default = "default_fallback_name")]
    pub fallback_workspace_name: String,
    /// Workspaces created up front, in addition to the fallback.
    #[serde(default)]
    pub default_workspace_count: usize,
    #[serde(default)]
    pub workspace_names: Vec<String>,
    /// Make the first pre-created workspace active.
    #[serde(default = "no")]
    pub activate_first: bool,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            fallback_workspace_name: default_fallback_name(),
            default_workspace_count: 0,
            workspace_names: Vec::new(),
            activate_first: false,
        }
    }
}

impl WorkspaceSettings {
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.fallback_workspace_name.trim().is_empty() {
            issues.push("fallback_workspace_name must not be empty".to_string());
        }
        if self.default_workspace_count > MAX_WORKSPACES {
            issues.push(format!(
                "default_workspace_count should not exceed {}",
                MAX_WORKSPACES
            ));
        }
        if self.workspace_names.len() > self.default_workspace_count {
            issues.push("More workspace names provided than default_workspace_count".to_string());
        }
        if self.activate_first && self.default_workspace_count == 0 {
            issues.push("activate_first has no effect when default_workspace_count is 0".to_string());
        }

        let mut seen = crate::common::collections::HashSet::default();
        for (index, name) in self.workspace_names.iter().enumerate() {
            if name == &self.fallback_workspace_name {
                issues.push(format!(
                    "Workspace name {} ('{}') collides with the fallback workspace",
                    index, name
                ));
            }
            if !seen.insert(name) {
                issues.push(format!("Duplicate workspace name '{}' at {}", name, index));
            }
        }

        issues
    }

    pub fn auto_fix_values(&mut self) -> usize {
        let mut fixes = 0;

        if self.fallback_workspace_name.trim().is_empty() {
            self.fallback_workspace_name = default_fallback_name();
            fixes += 1;
        }
        if self.default_workspace_count > MAX_WORKSPACES {
            self.default_workspace_count = MAX_WORKSPACES;
            fixes += 1;
        }
        if self.workspace_names.len() > self.default_workspace_count {
            fixes += self.workspace_names.len() - self.default_workspace_count;
            self.workspace_names.truncate(self.default_workspace_count);
        }

        fixes
    }
}

fn yes() -> bool { true }

fn no() -> bool { false }

fn default_fallback_name() -> String { "Default".to_string() }

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    workspaces: WorkspaceSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub settings: Settings,
    pub workspaces: WorkspaceSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            workspaces: WorkspaceSettings::default(),
        }
    }
}

impl Config {
    pub fn read(path: &Path) -> anyhow::Result<Config> {
        let buf = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&buf)
    }

    /// The configuration shipped with the crate.
    pub fn bundled() -> anyhow::Result<Config> { Self::parse(include_str!("../../wsp.default.toml")) }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let config_file = ConfigFile {
            settings: self.settings.clone(),
            workspaces: self.workspaces.clone(),
        };

        let toml_string = toml::to_string_pretty(&config_file)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, toml_string.as_bytes())?;

        Ok(())
    }

    /// Validates the entire configuration and returns a list of issues found.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        issues.extend(self.settings.validate());
        issues.extend(self.workspaces.validate());
        issues
    }

    /// Returns the number of fixes applied.
    pub fn auto_fix_values(&mut self) -> usize {
        self.settings.auto_fix_values() + self.workspaces.auto_fix_values()
    }

    fn parse(buf: &str) -> anyhow::Result<Config> {
        let c: ConfigFile = toml::from_str(buf)?;
        Ok(Config {
            settings: c.settings,
            workspaces: c.workspaces,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;

    #[test]
    fn bundled_config_parses() {
        let config = Config::bundled().unwrap();
        assert!(config.validate().is_empty(), "{:?}", config.validate());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.settings.release_policy, ReleasePolicy::MoveToFallback);
        assert!(config.settings.emit_empty_batches);
        assert_eq!(config.workspaces.fallback_workspace_name, "Default");
    }

    #[test]
    fn parses_release_policy_and_workspaces() {
        let config = Config::parse(
            r#"
            [settings]
            release_policy = "detach"
            emit_empty_batches = false

            [workspaces]
            default_workspace_count = 2
            workspace_names = ["code", "web"]
            activate_first = true
            "#,
        )
        .unwrap();

        assert_eq!(config.settings.release_policy, ReleasePolicy::Detach);
        assert!(!config.settings.emit_empty_batches);
        assert_eq!(config.workspaces.workspace_names, vec!["code", "web"]);
        assert!(config.workspaces.activate_first);
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(Config::parse("[settings]\nmax_windows = 3\n").is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.workspaces.fallback_workspace_name = " ".to_string();
        config.workspaces.default_workspace_count = 40;
        config.workspaces.workspace_names = vec!["a".into(), "a".into()];
        config.settings.log_filter = Some(String::new());

        let issues = config.validate();
        assert_eq!(issues.len(), 4, "{issues:?}");
        assert!(issues.iter().any(|i| i.contains("fallback_workspace_name")));
        assert!(issues.iter().any(|i| i.contains("Duplicate workspace name 'a'")));

        let fixes = config.auto_fix_values();
        assert_eq!(fixes, 3);
        assert_eq!(config.workspaces.default_workspace_count, MAX_WORKSPACES);
        assert_eq!(config.workspaces.fallback_workspace_name, "Default");
        assert_eq!(config.settings.log_filter, None);
    }

    #[test]
    fn auto_fix_truncates_extra_names() {
        let mut workspaces = WorkspaceSettings {
            default_workspace_count: 1,
            workspace_names: vec!["one".into(), "two".into(), "three".into()],
            ..Default::default()
        };
        assert_eq!(workspaces.auto_fix_values(), 2);
        assert_eq!(workspaces.workspace_names, vec!["one"]);
        assert!(workspaces.validate().is_empty());
    }

    #[test]
    fn save_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("wsp.toml");

        let mut config = Config::default();
        config.settings.release_policy = ReleasePolicy::Detach;
        config.workspaces.default_workspace_count = 3;
        config.workspaces.workspace_names = vec!["mail".into()];
        config.save(&path).unwrap();

        assert_eq!(Config::read(&path).unwrap(), config);
    }
}
