use engine::EngineConfig;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_port: u16,
    pub metrics_port: u16,
    pub engine: EngineConfig,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()?,
            metrics_port: env::var("METRICS_PORT")
                .unwrap_or_else(|_| "9090".to_string())
                .parse()?,
            engine: EngineConfig::load()?,
        })
    }
}
