use crate::error::{IrcError, Result};
use crate::wire;

pub const DEFAULT_ENDPOINT: &str = "wss://irc-ws.chat.twitch.tv:443";

/// An outbound chat line waiting for the send duty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub channel: String,
    pub text: String,
}

impl SendRequest {
    pub fn new(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
        }
    }

    pub fn to_line(&self) -> String {
        wire::privmsg(&self.channel, &self.text)
    }
}

/// Who we are and where we go once connected.
#[derive(Clone)]
pub struct ClientConfig {
    identity: String,
    access_token: String,
    channels: Vec<String>,
    endpoint: String,
}

impl ClientConfig {
    pub fn new(identity: &str, access_token: &str, channels: &[String]) -> Result<Self> {
        let identity = identity.trim().to_ascii_lowercase();
        if identity.is_empty() {
            return Err(IrcError::InvalidConfig("identity is required".to_string()));
        }
        let access_token = access_token.trim();
        let access_token = access_token
            .strip_prefix("oauth:")
            .unwrap_or(access_token)
            .to_string();
        if access_token.is_empty() {
            return Err(IrcError::InvalidConfig("access token is required".to_string()));
        }
        let channels: Vec<String> = channels
            .iter()
            .map(|c| normalize_channel(c))
            .filter(|c| !c.is_empty())
            .collect();
        if channels.is_empty() {
            return Err(IrcError::InvalidConfig(
                "at least one channel is required".to_string(),
            ));
        }
        Ok(Self {
            identity,
            access_token,
            channels,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
        {
            self.endpoint = endpoint.to_string();
        }
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub(crate) fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("identity", &self.identity)
            .field("access_token", &"<redacted>")
            .field("channels", &self.channels)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

pub fn normalize_channel(channel: &str) -> String {
    channel.trim().trim_start_matches('#').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_normalizes_identity_token_and_channels() {
        let cfg = ClientConfig::new(
            " CannibalJeebus ",
            "oauth:secret",
            &["#TheBobbyV".to_string(), "  ".to_string(), "other".to_string()],
        )
        .expect("valid config");
        assert_eq!(cfg.identity(), "cannibaljeebus");
        assert_eq!(cfg.access_token(), "secret");
        assert_eq!(cfg.channels(), ["thebobbyv", "other"]);
        assert_eq!(cfg.endpoint(), DEFAULT_ENDPOINT);
        assert!(!format!("{cfg:?}").contains("secret"));
    }

    #[test]
    fn config_requires_identity_token_and_channel() {
        let channels = vec!["chan".to_string()];
        assert!(ClientConfig::new("", "tok", &channels).is_err());
        assert!(ClientConfig::new("bot", "oauth:", &channels).is_err());
        assert!(ClientConfig::new("bot", "tok", &[]).is_err());
    }

    #[test]
    fn endpoint_override_ignores_blank_values() {
        let cfg = ClientConfig::new("bot", "tok", &["chan".to_string()])
            .expect("valid config")
            .with_endpoint(Some("  ".to_string()));
        assert_eq!(cfg.endpoint(), DEFAULT_ENDPOINT);
        let cfg = cfg.with_endpoint(Some("ws://127.0.0.1:8765".to_string()));
        assert_eq!(cfg.endpoint(), "ws://127.0.0.1:8765");
    }

    #[test]
    fn send_request_renders_privmsg() {
        let req = SendRequest::new("chan", "@someone go away");
        assert_eq!(req.to_line(), "PRIVMSG #chan :@someone go away");
    }
}
