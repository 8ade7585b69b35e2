use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub owner_name: String,
    pub timezone: String,
    pub data_dir: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Jarvis".to_string(),
            owner_name: String::new(),
            timezone: "Africa/Lagos".to_string(),
            data_dir: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    /// Base URL for the LLM provider's chat-completions API. Overridden at
    /// runtime by the `LLM_BASE_URL` environment variable when set.
    pub base_url: String,
    /// Never persisted to the config file; set via the `LLM_API_KEY`
    /// environment variable only.
    #[serde(skip)]
    pub api_key: String,
    pub max_tool_rounds: usize,
    pub max_tool_content_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            max_tool_rounds: 10,
            max_tool_content_chars: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub backend: String,
    pub recent_turns: usize,
    pub summary_window_turns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: "eventlog".to_string(),
            recent_turns: 10,
            summary_window_turns: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub max_scan: usize,
    pub list_page_size: usize,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            max_scan: 5000,
            list_page_size: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub calendar_id: String,
    pub timezone_override: Option<String>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            calendar_id: "primary".to_string(),
            timezone_override: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskBoardConfig {
    pub api_key: String,
    pub api_token: String,
    pub trusted: bool,
}

impl Default for TaskBoardConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_token: String::new(),
            trusted: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub max_total_items: usize,
    pub mail_max_per_turn_delete: usize,
    pub mail_max_per_turn_mark_read: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            min_batch_size: 5,
            max_batch_size: 20,
            max_total_items: 200,
            mail_max_per_turn_delete: 1000,
            mail_max_per_turn_mark_read: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    pub webhook_token: String,
    pub bind_addr: String,
    pub rate_limit_messages: u32,
    pub rate_limit_window_secs: u64,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            webhook_token: String::new(),
            bind_addr: "0.0.0.0:8080".to_string(),
            rate_limit_messages: 20,
            rate_limit_window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub trusted_domains: Vec<String>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            trusted_domains: vec!["task_board".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub mail: MailConfig,
    pub calendar: CalendarConfig,
    pub task_board: TaskBoardConfig,
    pub bulk: BulkConfig,
    pub ingress: IngressConfig,
    pub decision: DecisionConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(value) = env::var("LLM_BASE_URL") {
            if !value.is_empty() {
                config.llm.base_url = value;
            }
        }
        if let Ok(value) = env::var("LLM_API_KEY") {
            if !value.is_empty() {
                config.llm.api_key = value;
            }
        }
        if let Ok(value) = env::var("MAIL_REFRESH_TOKEN") {
            if !value.is_empty() {
                config.mail.refresh_token = value;
            }
        }
        if let Ok(value) = env::var("CALENDAR_REFRESH_TOKEN") {
            if !value.is_empty() {
                config.calendar.refresh_token = value;
            }
        }
        if let Ok(value) = env::var("TASK_BOARD_API_TOKEN") {
            if !value.is_empty() {
                config.task_board.api_token = value;
            }
        }
        if let Ok(value) = env::var("INGRESS_WEBHOOK_TOKEN") {
            if !value.is_empty() {
                config.ingress.webhook_token = value;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn data_dir(&self) -> &str {
        &self.agent.data_dir
    }

    pub fn is_trusted_domain(&self, domain: &str) -> bool {
        self.decision
            .trusted_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_bulk_limits() {
        let config = AppConfig::default();
        assert_eq!(config.bulk.min_batch_size, 5);
        assert_eq!(config.bulk.max_batch_size, 20);
        assert_eq!(config.bulk.max_total_items, 200);
    }

    #[test]
    fn load_from_missing_file_falls_back_to_default() {
        let config = AppConfig::load_from("/nonexistent/path/default.toml").unwrap();
        assert_eq!(config.agent.name, "Jarvis");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/default.toml");

        let mut config = AppConfig::default();
        config.agent.owner_name = "Ada".to_string();
        config.bulk.max_batch_size = 15;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.agent.owner_name, "Ada");
        assert_eq!(loaded.bulk.max_batch_size, 15);
    }

    #[test]
    fn trusted_domain_check_is_case_insensitive() {
        let config = AppConfig::default();
        assert!(config.is_trusted_domain("Task_Board"));
        assert!(!config.is_trusted_domain("mail"));
    }
}
