use std::net::SocketAddr;

pub const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub quiz_model: String,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            chat_model: "gemini-pro".to_string(),
            quiz_model: "gemini-1.5-flash".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub local_state_path: Option<String>,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    pub gemini: GeminiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            database_url: None,
            local_state_path: None,
            cors_origins: Vec::new(),
            gemini: GeminiConfig::default(),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_var)
    }

    /// Builds the config from any key lookup; unset or blank keys fall back
    /// to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        let gemini_defaults = defaults.gemini;

        let gemini = GeminiConfig {
            api_key: lookup("GEMINI_API_KEY"),
            base_url: lookup("GEMINI_BASE_URL").unwrap_or(gemini_defaults.base_url),
            chat_model: lookup("GEMINI_CHAT_MODEL").unwrap_or(gemini_defaults.chat_model),
            quiz_model: lookup("GEMINI_QUIZ_MODEL").unwrap_or(gemini_defaults.quiz_model),
            timeout_secs: lookup("GEMINI_TIMEOUT_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(gemini_defaults.timeout_secs),
        };

        Self {
            host: lookup("BACKEND_HOST").unwrap_or(defaults.host),
            port: lookup("BACKEND_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            database_url: lookup("DATABASE_URL"),
            local_state_path: lookup("LOCAL_STATE_PATH"),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            gemini,
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup_from(&[]));
        assert_eq!(config.port, 3001);
        assert!(config.database_url.is_none());
        assert!(config.gemini.api_key.is_none());
        assert_eq!(config.gemini.chat_model, "gemini-pro");
        assert_eq!(config.gemini.quiz_model, "gemini-1.5-flash");
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:3001");
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let config = Config::from_lookup(lookup_from(&[
            ("BACKEND_PORT", "not-a-port"),
            ("GEMINI_TIMEOUT_SECS", "5"),
            ("GEMINI_API_KEY", "secret"),
            ("CORS_ORIGINS", "http://localhost:5173, ,https://quiz.example"),
        ]));
        assert_eq!(config.port, 3001);
        assert_eq!(config.gemini.timeout_secs, 5);
        assert_eq!(config.gemini.api_key.as_deref(), Some("secret"));
        assert_eq!(config.cors_origins, vec!["http://localhost:5173", "https://quiz.example"]);
    }
}
