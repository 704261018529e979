use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BOT_ID: &str = "7593016536299028499";
const DEFAULT_API_URL: &str = "https://api.coze.cn/v3/chat";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_STATIC_DIR: &str = "public";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Process-wide settings, read once at startup and shared read-only afterwards.
#[derive(Clone)]
pub struct AppConfig {
    pub access_token: String,
    pub bot_id: String,
    pub port: u16,
    pub api_url: String,
    pub static_dir: PathBuf,
    /// Bounds connection setup only; streaming bodies are never cut off.
    pub connect_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            access_token: get("COZE_ACCESS_TOKEN").unwrap_or_default(),
            bot_id: get("COZE_BOT_ID").unwrap_or_else(|| DEFAULT_BOT_ID.to_string()),
            port: get("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(DEFAULT_PORT),
            api_url: get("COZE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            static_dir: get("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
            connect_timeout: Duration::from_secs(
                get("COZE_CONNECT_TIMEOUT_SECS")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
        }
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("access_token", &if self.has_access_token() { "<redacted>" } else { "<unset>" })
            .field("bot_id", &self.bot_id)
            .field("port", &self.port)
            .field("api_url", &self.api_url)
            .field("static_dir", &self.static_dir)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
