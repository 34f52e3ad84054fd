//! chatterbot configuration loader.
//!
//! TOML file first, then environment overrides, then validation.

use cb_irc::ClientConfig;
use cb_llm::LlmClient;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PERSONA: &str = "You are a rude human chatter in a chat room who responds to {username}. You are rude and abuse anyone who talks to you. You speak tersely.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub twitch: TwitchConfig,
    #[serde(default)]
    pub responder: ResponderConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwitchConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub oauth_token: String,
    #[serde(default)]
    pub channels: Vec<String>,
    /// WebSocket URI override. Default: `wss://irc-ws.chat.twitch.tv:443`
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponderConfig {
    /// Substrings that make the bot answer. Empty means "the bot's own username".
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// `{username}` is replaced with the sender.
    #[serde(default = "default_persona")]
    pub persona: String,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            aliases: Vec::new(),
            cache_capacity: default_cache_capacity(),
            persona: default_persona(),
        }
    }
}

fn default_cache_capacity() -> usize {
    10
}

fn default_persona() -> String {
    DEFAULT_PERSONA.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            base_url: default_base_url(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.9
}

fn default_base_url() -> String {
    cb_llm::DEFAULT_BASE_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

impl BotConfig {
    /// Load from `path`, or from the default location when it exists.
    ///
    /// Without an explicit path a missing file is fine: everything can come
    /// from the environment.
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok()).await
    }

    async fn load_with(
        path: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let (mut cfg, path) = match path {
            Some(path) => (Self::read(&path).await?, Some(path)),
            None => {
                let path = default_config_path();
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    (Self::read(&path).await?, Some(path))
                } else {
                    (Self::default(), None)
                }
            }
        };

        cfg.apply_overrides(lookup);
        cfg.validate()?;
        tracing::debug!(
            config_path = ?path.as_ref().map(|p| p.display().to_string()),
            "config loaded"
        );
        Ok(cfg)
    }

    async fn read(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;
        toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("TWITCH_USERNAME") {
            self.twitch.username = v;
        }
        if let Some(v) = var("TWITCH_OAUTH_TOKEN") {
            self.twitch.oauth_token = v;
        }
        if let Some(v) = var("TWITCH_CHANNELS") {
            self.twitch.channels = v
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }
        if let Some(v) = var("TWITCH_WS_URI") {
            self.twitch.endpoint = Some(v);
        }
        if let Some(v) = var("OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = var("CHATTERBOT_MODEL") {
            self.llm.model = v;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.twitch.username.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "twitch.username is required (or set TWITCH_USERNAME)"
            ));
        }
        if self.twitch.oauth_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "twitch.oauth_token is required (or set TWITCH_OAUTH_TOKEN)"
            ));
        }
        if self.twitch.channels.iter().all(|c| c.trim().is_empty()) {
            return Err(anyhow::anyhow!(
                "twitch.channels must name at least one channel"
            ));
        }
        if let Some(endpoint) = self.twitch.endpoint.as_deref() {
            let endpoint = endpoint.trim();
            if !endpoint.starts_with("ws://") && !endpoint.starts_with("wss://") {
                return Err(anyhow::anyhow!(
                    "twitch.endpoint must be a ws:// or wss:// uri, got {endpoint:?}"
                ));
            }
        }
        if self.responder.cache_capacity == 0 {
            return Err(anyhow::anyhow!("responder.cache_capacity must be > 0"));
        }
        if self.responder.persona.trim().is_empty() {
            return Err(anyhow::anyhow!("responder.persona must not be empty"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(anyhow::anyhow!("llm.model is required"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow::anyhow!(
                "llm.temperature must be between 0 and 2, got {}",
                self.llm.temperature
            ));
        }
        if self.llm.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("llm.timeout_seconds must be > 0"));
        }
        if self.llm_api_key().is_none() {
            return Err(anyhow::anyhow!(
                "llm.api_key is required (or set OPENAI_API_KEY)"
            ));
        }
        Ok(())
    }

    pub fn llm_api_key(&self) -> Option<&str> {
        self.llm
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Trigger aliases, lower-cased. Falls back to the bot's username.
    pub fn aliases(&self) -> Vec<String> {
        let aliases: Vec<String> = self
            .responder
            .aliases
            .iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        if aliases.is_empty() {
            return vec![self.twitch.username.trim().to_lowercase()];
        }
        aliases
    }

    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let cfg = ClientConfig::new(
            &self.twitch.username,
            &self.twitch.oauth_token,
            &self.twitch.channels,
        )?;
        Ok(cfg.with_endpoint(self.twitch.endpoint.clone()))
    }

    pub fn llm_client(&self) -> anyhow::Result<LlmClient> {
        let api_key = self
            .llm_api_key()
            .ok_or_else(|| anyhow::anyhow!("llm.api_key is required"))?;
        let client = LlmClient::with_options(
            api_key,
            &self.llm.model,
            &self.llm.base_url,
            Duration::from_secs(self.llm.timeout_seconds),
        )?;
        Ok(client.with_temperature(self.llm.temperature))
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".chatterbot").join("config.toml")
}
