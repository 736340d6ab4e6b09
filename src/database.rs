//! # Redis
//!
//! RAM database.
//!
//! Core purpose is the user table and the chat audit log. Sessions are not
//! stored here; the signed cookie is the session record.
//!
//! ## Layout
//!
//! - `users` hash: email → JSON user record
//! - `api_logs` list: JSON audit entries, appended fire-and-forget per chat
//! - `meta` hash: `schema_version`, written at most once per process through
//!   the init guard held in [`crate::state::AppState`]
use std::time::Duration;

use redis::{
    AsyncCommands, Client, RedisResult,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;

pub const USERS_KEY: &str = "users";
pub const AUDIT_LOG_KEY: &str = "api_logs";
pub const META_KEY: &str = "meta";
pub const SCHEMA_VERSION: &str = "1";

pub async fn init_redis(redis_url: &str) -> ConnectionManager {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url).unwrap();
    let connection_manager = client
        .get_connection_manager_with_config(config)
        .await
        .unwrap();

    connection_manager
}

/// Idempotent schema marker. Safe to call repeatedly; the init guard in
/// `AppState` makes sure it only runs once per process.
pub async fn ensure_schema(connection: &mut ConnectionManager) -> RedisResult<()> {
    let _: bool = connection
        .hset_nx(META_KEY, "schema_version", SCHEMA_VERSION)
        .await?;

    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserRecord {
    pub uid: String,
    pub email: String,
    pub password_digest: String,
    pub role: String,
    pub plan: String,
}

/// Returns false if the email is already taken.
pub async fn create_user(
    connection: &mut ConnectionManager,
    record: &UserRecord,
) -> Result<bool, AppError> {
    let raw = serde_json::to_string(record).map_err(|e| AppError::InternalError(e.into()))?;

    let stored: bool = connection.hset_nx(USERS_KEY, &record.email, raw).await?;

    Ok(stored)
}

pub async fn fetch_user(
    connection: &mut ConnectionManager,
    email: &str,
) -> Result<Option<UserRecord>, AppError> {
    let raw: Option<String> = connection.hget(USERS_KEY, email).await?;

    Ok(raw.and_then(|value| serde_json::from_str(&value).ok()))
}

#[derive(Serialize, Debug)]
pub struct AuditEntry {
    pub route: &'static str,
    pub guardrail_action: &'static str,
    pub lang: String,
    pub model: String,
    pub hybrid: bool,
}

pub async fn push_audit_entry(
    connection: &mut ConnectionManager,
    entry: &AuditEntry,
) -> RedisResult<()> {
    let raw = serde_json::to_string(entry).unwrap_or_default();

    let _: usize = connection.rpush(AUDIT_LOG_KEY, &raw).await?;

    #[cfg(feature = "verbose")]
    println!("Audit entry stored: {raw}");

    Ok(())
}

pub fn sha256_hex(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_digest() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn user_record_roundtrips_through_json() {
        let record = UserRecord {
            uid: "u1".to_string(),
            email: "a@b.c".to_string(),
            password_digest: sha256_hex("hunter22"),
            role: "member".to_string(),
            plan: "free".to_string(),
        };

        let raw = serde_json::to_string(&record).unwrap();
        let parsed: UserRecord = serde_json::from_str(&raw).unwrap();

        assert_eq!(parsed.email, record.email);
        assert_eq!(parsed.password_digest, record.password_digest);
    }
}
