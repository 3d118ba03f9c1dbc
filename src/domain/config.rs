//! # Configuration
//!
//! Serde structs for the `drover.yaml` configuration file, with defaults so
//! the tool runs out of the box. Secrets never live here; tokens come from
//! the credential store or the environment.

use serde::Deserialize;
use std::collections::HashMap;

/// Main application configuration.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    /// Agent key -> remote agent id. "dev" is the default key for the run
    /// loop.
    #[serde(default)]
    pub agents: HashMap<String, String>,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Inference endpoint base; turns go to `{agent_base}/v1/agent/{id}/chat`.
    #[serde(default = "default_agent_base")]
    pub agent_base: String,
    /// Identity endpoint base; token grants go to
    /// `{idm_base}/{realm}/oidc/oauth/token`.
    #[serde(default = "default_idm_base")]
    pub idm_base: String,
    /// Account realm used when none is stored.
    #[serde(default)]
    pub realm: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            agent_base: default_agent_base(),
            idm_base: default_idm_base(),
            realm: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommandsConfig {
    /// Wall-clock bound on one shell command, in seconds.
    #[serde(default = "default_command_timeout")]
    pub timeout_secs: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_command_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Extension (without dot) -> diagnostics-only compiler command. The
    /// written file path is appended as the last argument.
    #[serde(default = "default_compilers")]
    pub compilers: HashMap<String, String>,
    /// Extensions checked with the markup tag-balance scan.
    #[serde(default = "default_markup_extensions")]
    pub markup_extensions: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            compilers: default_compilers(),
            markup_extensions: default_markup_extensions(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowConfig {
    /// Plan document driving the task loop.
    #[serde(default = "default_plan_path")]
    pub plan_path: String,
    /// Optional project-context markdown preloaded into the first prompt.
    #[serde(default = "default_context_path")]
    pub context_path: String,
    /// Safety limit on turns per command invocation.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            plan_path: default_plan_path(),
            context_path: default_context_path(),
            max_turns: default_max_turns(),
        }
    }
}

fn default_agent_base() -> String {
    "https://genai-inference-app.stackspot.com".to_string()
}
fn default_idm_base() -> String {
    "https://idm.stackspot.com".to_string()
}
fn default_command_timeout() -> u64 {
    300
}
fn default_true() -> bool {
    true
}
fn default_compilers() -> HashMap<String, String> {
    let mut map = HashMap::new();
    map.insert("ts".to_string(), "npx tsc --noEmit".to_string());
    map.insert("tsx".to_string(), "npx tsc --noEmit".to_string());
    map
}
fn default_markup_extensions() -> Vec<String> {
    vec!["html".to_string(), "xml".to_string(), "vue".to_string()]
}
fn default_plan_path() -> String {
    "tech-spec.md".to_string()
}
fn default_context_path() -> String {
    "project-context.md".to_string()
}
fn default_max_turns() -> u32 {
    25
}

impl AppConfig {
    /// Load from `drover.yaml` in the working directory, falling back to
    /// `~/.drover/config.yaml`, then to defaults. A malformed file is an
    /// error; a missing one is not.
    pub fn load() -> anyhow::Result<Self> {
        use anyhow::Context;

        let mut candidates = vec![std::path::PathBuf::from("drover.yaml")];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".drover").join("config.yaml"));
        }

        for path in candidates {
            if path.exists() {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let config: AppConfig = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                tracing::debug!("Loaded config from {}", path.display());
                return Ok(config);
            }
        }

        Ok(Self::default())
    }

    /// Resolve an agent key ("dev", "qa", ...) to its remote id, with
    /// `DROVER_AGENT_ID` as the environment override.
    pub fn agent_id(&self, key: &str) -> Option<String> {
        if let Ok(id) = std::env::var("DROVER_AGENT_ID") {
            if !id.is_empty() {
                return Some(id);
            }
        }
        self.agents.get(key).cloned()
    }
}
