use common::{MonitorConfig, MqAppConfig, PollConfig, TopicConfig};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub topic: TopicConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("OUTBOX_CONFIG").unwrap_or_else(|_| "config/config".into());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3100)?
            // Load from config/config.toml unless OUTBOX_CONFIG points elsewhere
            .add_source(File::with_name(path).required(false))
            // Override from environment (e.g., OUTBOX__DATABASE__URL)
            .add_source(Environment::with_prefix("OUTBOX").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
