use anyhow::{anyhow, Context};

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub database_url: String,
    pub bind_addr: String,
    pub public_url: String,
    pub oauth_clients_file: Option<String>,
    pub serve: ServeSettings,
    pub log_json: bool,
}

/// Cookie and CORS settings applied around the router.
#[derive(Debug, Clone)]
pub struct ServeSettings {
    pub secure_cookies: bool,
    pub session_inactivity: time::Duration,
    pub permissive_cors: bool,
}

impl Default for ServeSettings {
    fn default() -> Self {
        Self {
            secure_cookies: false,
            session_inactivity: time::Duration::minutes(60),
            permissive_cors: false,
        }
    }
}

impl Config {
    /// Reads the process environment, after `.env` has been loaded.
    pub fn from_env() -> anyhow::Result<Config> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let api_base_url = var("API_BASE_URL")
            .or_else(|| var("API_URL"))
            .filter(|url| !url.trim().is_empty())
            .ok_or(anyhow!("API_BASE_URL (or API_URL) must be set"))?;

        let session_inactivity = match var("SESSION_INACTIVITY_MINUTES") {
            Some(minutes) => time::Duration::minutes(
                minutes.parse().context("SESSION_INACTIVITY_MINUTES must be a whole number")?,
            ),
            None => ServeSettings::default().session_inactivity,
        };

        Ok(Config {
            api_base_url: api_base_url.trim_end_matches('/').to_owned(),
            database_url: var("DATABASE_URL").unwrap_or("sqlite://turboform.db?mode=rwc".to_owned()),
            bind_addr: var("BIND_ADDR").unwrap_or("0.0.0.0:8080".to_owned()),
            public_url: var("PUBLIC_URL")
                .unwrap_or("http://localhost:8080".to_owned())
                .trim_end_matches('/')
                .to_owned(),
            oauth_clients_file: var("OAUTH_CLIENTS_FILE"),
            serve: ServeSettings {
                secure_cookies: flag(var("SESSION_SECURE"))?,
                session_inactivity,
                permissive_cors: flag(var("CORS_PERMISSIVE"))?,
            },
            log_json: var("LOG_FORMAT").is_some_and(|format| format.eq_ignore_ascii_case("json")),
        })
    }
}

fn flag(value: Option<String>) -> anyhow::Result<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => Err(anyhow!("expected a boolean, got {other}")),
    }
}
