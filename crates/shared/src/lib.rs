pub mod format;
pub mod tokens;

pub mod settings {
    use serde::{Deserialize, Serialize};
    use std::fs;
    use std::path::{Path, PathBuf};

    pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
    pub const DEFAULT_MODEL: &str = "deepseek-r1:7b";

    fn default_base_url() -> String {
        DEFAULT_BASE_URL.to_string()
    }

    fn default_model() -> String {
        DEFAULT_MODEL.to_string()
    }

    fn default_token_limit() -> usize {
        2500
    }

    fn default_char_threshold() -> usize {
        5
    }

    fn default_timeout_secs() -> u64 {
        120
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ChatSettings {
        /// Ollama server root, e.g. "http://127.0.0.1:11434"
        #[serde(default = "default_base_url")]
        pub base_url: String,
        #[serde(default = "default_model")]
        pub model: String,
        /// Estimated tokens at which new requests are refused
        #[serde(default = "default_token_limit")]
        pub token_limit: usize,
        /// Characters accumulated before an incremental update is pushed
        #[serde(default = "default_char_threshold")]
        pub char_threshold: usize,
        #[serde(default = "default_timeout_secs")]
        pub timeout_secs: u64,
    }

    impl Default for ChatSettings {
        fn default() -> Self {
            Self {
                base_url: default_base_url(),
                model: default_model(),
                token_limit: default_token_limit(),
                char_threshold: default_char_threshold(),
                timeout_secs: default_timeout_secs(),
            }
        }
    }

    impl ChatSettings {
        /// Full URL of the chat endpoint.
        pub fn chat_url(&self) -> String {
            format!("{}/api/chat", self.base_url.trim_end_matches('/'))
        }

        /// Read settings from `path`, falling back to defaults when the file is
        /// missing or unreadable. Environment overrides are applied afterwards.
        pub fn load_from(path: &Path) -> Self {
            let mut settings = match fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<ChatSettings>(&bytes) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!("ignoring malformed settings at {}: {}", path.display(), e);
                        Self::default()
                    }
                },
                Err(_) => {
                    tracing::debug!("no settings at {}, using defaults", path.display());
                    Self::default()
                }
            };
            settings.apply_env();
            settings
        }

        /// Load from the per-user config directory.
        pub fn load() -> Self {
            match config_path() {
                Some(path) => Self::load_from(&path),
                None => {
                    let mut settings = Self::default();
                    settings.apply_env();
                    settings
                }
            }
        }

        fn apply_env(&mut self) {
            self.apply_overrides(
                std::env::var("OLLAMA_BASE_URL").ok(),
                std::env::var("CHAT_MODEL").ok(),
            );
        }

        fn apply_overrides(&mut self, base_url: Option<String>, model: Option<String>) {
            if let Some(url) = base_url.filter(|v| !v.trim().is_empty()) {
                self.base_url = url.trim().to_string();
            }
            if let Some(model) = model.filter(|v| !v.trim().is_empty()) {
                self.model = model.trim().to_string();
            }
        }
    }

    pub fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com.local", "DeepSeek", "ChatTool")
    }

    pub fn config_path() -> Option<PathBuf> {
        project_dirs().map(|p| p.config_dir().join("settings.json"))
    }

}

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: String, // "system" | "user" | "assistant"
        pub content: String,
    }

    impl ChatMessage {
        pub fn user(content: impl Into<String>) -> Self {
            Self {
                role: "user".to_string(),
                content: content.into(),
            }
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            Self {
                role: "assistant".to_string(),
                content: content.into(),
            }
        }

        pub fn is_user(&self) -> bool {
            self.role == "user"
        }
    }

    /// Events forwarded from a streaming provider to the UI.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StreamChunk {
        /// A batch of text ready to be appended to the visible reply
        Incremental(String),
        /// The whole reply, sent once when the stream ends
        Complete(String),
        /// Transport failure after streaming began
        Error(String),
    }
}
