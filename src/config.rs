//! Environment configuration.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chat_protocol::url::DEFAULT_BASE_URL;
use chat_protocol::ChatApiConfig;
use session_store::default_history_dir;
use thiserror::Error;

/// Providers whose keys are read from `QUASAR_<PROVIDER>_KEYS`.
pub const KEYED_PROVIDERS: [&str; 3] = ["cerebras", "groq", "cloudflare"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    #[default]
    Http,
    /// Offline demo exchanges from the scripted transport.
    Mock,
}

impl TransportKind {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "mock" => Ok(Self::Mock),
            _ => Err(ConfigError::UnknownTransport {
                value: value.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported provider '{value}', expected 'http' or 'mock'")]
    UnknownTransport { value: String },

    #[error("invalid QUASAR_TIMEOUT_SEC '{value}', expected a positive number of seconds")]
    InvalidTimeout { value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub api_base_url: String,
    pub transport: TransportKind,
    pub workspace: Option<String>,
    pub history_dir: Option<PathBuf>,
    /// Keep history in memory only.
    pub ephemeral: bool,
    pub timeout: Option<Duration>,
    pub model: Option<String>,
    pub provider_keys: BTreeMap<String, Vec<String>>,
    pub ollama_url: Option<String>,
    pub log_filter: Option<String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_owned(),
            transport: TransportKind::Http,
            workspace: None,
            history_dir: None,
            ephemeral: false,
            timeout: None,
            model: None,
            provider_keys: BTreeMap::new(),
            ollama_url: None,
            log_filter: None,
        }
    }
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let transport = match env_string_opt("QUASAR_PROVIDER") {
            Some(value) => TransportKind::parse(&value)?,
            None => TransportKind::default(),
        };
        let timeout = env_string_opt("QUASAR_TIMEOUT_SEC")
            .map(|value| parse_timeout(&value))
            .transpose()?;

        let provider_keys = KEYED_PROVIDERS
            .iter()
            .filter_map(|provider| {
                let key = format!("QUASAR_{}_KEYS", provider.to_ascii_uppercase());
                let keys = split_keys(&env_string_opt(&key)?);
                (!keys.is_empty()).then(|| ((*provider).to_owned(), keys))
            })
            .collect();

        Ok(Self {
            api_base_url: env_string_opt("QUASAR_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            transport,
            workspace: env_string_opt("QUASAR_WORKSPACE"),
            history_dir: env_string_opt("QUASAR_HISTORY_DIR").map(PathBuf::from),
            ephemeral: env_flag("QUASAR_EPHEMERAL"),
            timeout,
            model: env_string_opt("QUASAR_MODEL"),
            provider_keys,
            ollama_url: env_string_opt("QUASAR_OLLAMA_URL"),
            log_filter: env_string_opt("QUASAR_LOG"),
        })
    }

    /// History directory, defaulting to `.quasar/history` under `cwd`.
    pub fn history_dir(&self, cwd: &Path) -> PathBuf {
        self.history_dir
            .clone()
            .unwrap_or_else(|| default_history_dir(cwd))
    }

    pub fn api_config(&self) -> ChatApiConfig {
        let mut config = ChatApiConfig::new(self.api_base_url.clone());
        for (provider, keys) in &self.provider_keys {
            config = config.with_provider_keys(provider, keys.clone());
        }
        if let Some(url) = &self.ollama_url {
            config = config.with_ollama_url(url.clone());
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        config
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value.trim().to_owned())
        }
    })
}

fn split_keys(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_timeout(value: &str) -> Result<Duration, ConfigError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|seconds| *seconds > 0.0)
        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
        .ok_or_else(|| ConfigError::InvalidTimeout {
            value: value.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EnvConfig, TransportKind};
    use std::env;
    use std::path::{Path, PathBuf};
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    const KEYS: [&str; 12] = [
        "QUASAR_API_BASE_URL",
        "QUASAR_PROVIDER",
        "QUASAR_WORKSPACE",
        "QUASAR_HISTORY_DIR",
        "QUASAR_EPHEMERAL",
        "QUASAR_TIMEOUT_SEC",
        "QUASAR_MODEL",
        "QUASAR_CEREBRAS_KEYS",
        "QUASAR_GROQ_KEYS",
        "QUASAR_CLOUDFLARE_KEYS",
        "QUASAR_OLLAMA_URL",
        "QUASAR_LOG",
    ];

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    fn clear_all() -> Vec<EnvGuard> {
        KEYS.iter().map(|key| set_env_guard(key, None)).collect()
    }

    #[test]
    fn defaults_without_environment() {
        let _lock = env_lock();
        let _guards = clear_all();

        let config = EnvConfig::from_env().expect("defaults parse");
        assert_eq!(config, EnvConfig::default());
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(
            config.history_dir(Path::new("/work")),
            PathBuf::from("/work/.quasar/history")
        );
    }

    #[test]
    fn variables_populate_config() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard("QUASAR_API_BASE_URL", Some("https://chat.example/api"));
        let _g2 = set_env_guard("QUASAR_PROVIDER", Some("Mock"));
        let _g3 = set_env_guard("QUASAR_GROQ_KEYS", Some("g1, ,g2"));
        let _g4 = set_env_guard("QUASAR_TIMEOUT_SEC", Some("2.5"));
        let _g5 = set_env_guard("QUASAR_EPHEMERAL", Some("1"));
        let _g6 = set_env_guard("QUASAR_HISTORY_DIR", Some("/tmp/quasar"));

        let config = EnvConfig::from_env().expect("config parses");
        assert_eq!(config.api_base_url, "https://chat.example/api");
        assert_eq!(config.transport, TransportKind::Mock);
        assert_eq!(
            config.provider_keys.get("groq"),
            Some(&vec!["g1".to_owned(), "g2".to_owned()])
        );
        assert!(!config.provider_keys.contains_key("cerebras"));
        assert_eq!(config.timeout, Some(Duration::from_millis(2500)));
        assert!(config.ephemeral);
        assert_eq!(
            config.history_dir(Path::new("/ignored")),
            PathBuf::from("/tmp/quasar")
        );

        let api = config.api_config();
        assert_eq!(api.base_url, "https://chat.example/api");
        assert_eq!(api.timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn invalid_values_are_reported() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard("QUASAR_PROVIDER", Some("carrier-pigeon"));
        assert!(matches!(
            EnvConfig::from_env(),
            Err(ConfigError::UnknownTransport { .. })
        ));

        let _g2 = set_env_guard("QUASAR_PROVIDER", None);
        for value in ["-1", "0", "NaN", "inf", "1e30", "soon"] {
            let _g3 = set_env_guard("QUASAR_TIMEOUT_SEC", Some(value));
            assert_eq!(
                EnvConfig::from_env(),
                Err(ConfigError::InvalidTimeout {
                    value: value.to_owned()
                }),
                "timeout {value}"
            );
        }
    }

    #[test]
    fn blank_values_are_ignored() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard("QUASAR_WORKSPACE", Some("  "));
        let _g2 = set_env_guard("QUASAR_EPHEMERAL", Some("yes"));

        let config = EnvConfig::from_env().expect("config parses");
        assert!(config.workspace.is_none());
        assert!(!config.ephemeral);
    }
}
