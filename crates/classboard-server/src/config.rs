use std::env;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address to bind
    pub host: String,
    pub port: u16,
    /// Capacity of each classroom's broadcast channel
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3030,
            channel_capacity: 256,
        }
    }
}

impl Config {
    /// Load configuration from `CLASSBOARD_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let host = env::var("CLASSBOARD_HOST").unwrap_or(defaults.host);
        let port = match env::var("CLASSBOARD_PORT") {
            Ok(port) => port.parse()?,
            Err(_) => defaults.port,
        };
        let channel_capacity = match env::var("CLASSBOARD_CHANNEL_CAPACITY") {
            Ok(capacity) => capacity.parse()?,
            Err(_) => defaults.channel_capacity,
        };
        if channel_capacity == 0 {
            anyhow::bail!("CLASSBOARD_CHANNEL_CAPACITY must be greater than zero");
        }

        Ok(Self {
            host,
            port,
            channel_capacity,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
