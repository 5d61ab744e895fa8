//! Team configuration: project coordinates and the agent roster.
//!
//! Hosts usually load this from a YAML file checked into the project;
//! the default roster mirrors the standard five-role layout.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::core::errors::{OrchestratorError, Result};
use crate::state::AgentStatus;

fn default_project_path() -> String {
    ".".to_string()
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_data_dir() -> String {
    ".sprintflow".to_string()
}

fn default_max_sprints() -> u32 {
    8
}

fn default_provider() -> String {
    "anthropic".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub role: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub role_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub project_name: String,
    #[serde(default = "default_project_path")]
    pub project_path: String,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Upper bound on planning loop-backs before the run gives up.
    #[serde(default = "default_max_sprints")]
    pub max_sprints: u32,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

impl TeamConfig {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            project_path: default_project_path(),
            base_branch: default_base_branch(),
            data_dir: default_data_dir(),
            max_sprints: default_max_sprints(),
            agents: Self::default_roster(),
        }
    }

    fn default_roster() -> Vec<AgentConfig> {
        ["product_owner", "architect", "ui_developer", "backend_developer", "git_agent"]
            .into_iter()
            .map(|role| AgentConfig {
                id: role.to_string(),
                role: role.to_string(),
                provider: default_provider(),
                role_description: None,
            })
            .collect()
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| OrchestratorError::Config {
            message: format!("cannot read team config at {}", path.display()),
            source: Some(Box::new(e)),
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| OrchestratorError::Config {
            message: "invalid team config".to_string(),
            source: Some(Box::new(e)),
        })
    }

    /// The configured role description for a role, if any.
    pub fn role_description(&self, role: &str) -> Option<&str> {
        self.agents
            .iter()
            .find(|a| a.role == role)
            .and_then(|a| a.role_description.as_deref())
    }

    pub fn roles(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.role.clone()).collect()
    }

    /// Initial idle agent map for a fresh `ProjectState`.
    pub fn agent_statuses(&self) -> HashMap<String, AgentStatus> {
        self.agents
            .iter()
            .map(|a| {
                (
                    a.id.clone(),
                    AgentStatus::idle(&a.id, &a.role, &a.provider),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roster_has_five_roles() {
        let config = TeamConfig::new("demo");
        assert_eq!(config.agents.len(), 5);
        assert_eq!(config.base_branch, "main");
        assert!(config.roles().contains(&"backend_developer".to_string()));
        assert_eq!(config.agent_statuses().len(), 5);
    }

    #[test]
    fn yaml_with_defaults_parses() {
        let config = TeamConfig::from_yaml(
            r#"
project_name: widget-factory
base_branch: trunk
agents:
  - id: dev-1
    role: backend_developer
    role_description: "You write terse, well-tested Rust."
"#,
        )
        .unwrap();
        assert_eq!(config.project_name, "widget-factory");
        assert_eq!(config.base_branch, "trunk");
        assert_eq!(config.max_sprints, 8);
        assert_eq!(
            config.role_description("backend_developer"),
            Some("You write terse, well-tested Rust.")
        );
        assert_eq!(config.agents[0].provider, "anthropic");
    }

    #[test]
    fn invalid_yaml_is_a_config_error() {
        assert!(TeamConfig::from_yaml("project_name: [unclosed").is_err());
    }
}
