use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub asset_dir: String,
    pub model_id: String,
    pub cf_api_base: String,
    pub cf_account_id: String,
    pub cf_api_token: String,
    pub session_secret: String,
    pub session_ttl_seconds: u64,
    pub fallback_chunk_size: usize,
    pub fallback_chunk_delay_ms: u64,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "8787"),
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379"),
            asset_dir: try_load("ASSET_DIR", "public"),
            model_id: try_load("MODEL_ID", "@cf/meta/llama-3.1-8b-instruct"),
            cf_api_base: try_load("CF_API_BASE", "https://api.cloudflare.com/client/v4"),
            cf_account_id: try_load("CF_ACCOUNT_ID", "unset"),
            cf_api_token: read_secret("CF_API_TOKEN"),
            session_secret: read_secret("SESSION_SECRET"),
            session_ttl_seconds: try_load("SESSION_TTL_SECONDS", "2592000"),
            fallback_chunk_size: try_load("FALLBACK_CHUNK_SIZE", "64"),
            fallback_chunk_delay_ms: try_load("FALLBACK_CHUNK_DELAY_MS", "10"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

fn read_secret(secret_name: &str) -> String {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .expect("Secrets misconfigured!")
}
