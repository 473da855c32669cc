use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub discovery_interval_secs: u64,
    pub fetch_worker_count: u32,
    pub queue_visibility_secs: u64,
    pub provider_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            jwt_secret: env::var("JWT_SECRET")?,
            spotify_client_id: env::var("SPOTIFY_CLIENT_ID")?,
            spotify_client_secret: env::var("SPOTIFY_CLIENT_SECRET")?,
            discovery_interval_secs: env::var("DISCOVERY_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            fetch_worker_count: env::var("FETCH_WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            queue_visibility_secs: env::var("QUEUE_VISIBILITY_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            provider_timeout_secs: env::var("PROVIDER_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        })
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    pub fn queue_visibility(&self) -> Duration {
        Duration::from_secs(self.queue_visibility_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}
