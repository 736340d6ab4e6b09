use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Request, State, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::{
            CACHE_CONTROL, CONTENT_SECURITY_POLICY, CONTENT_TYPE, COOKIE, REFERRER_POLICY,
            SET_COOKIE, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
        },
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::{
    database::{AuditEntry, UserRecord, create_user, fetch_user, push_audit_entry, sha256_hex},
    error::AppError,
    guardrails::classify,
    i18n,
    model::{ChatMessage, ChatRole},
    session::{self, SESSION_COOKIE, SessionClaims, now_epoch},
    state::AppState,
    stream::{Provenance, to_event_stream},
    synth::synthesize,
};

pub const HYBRID_HEADER: &str = "x-abqeri-hybrid";

const CSP: &str = "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; \
                   img-src 'self' data:; connect-src 'self'; font-src 'self' data:; \
                   base-uri 'none'; frame-ancestors 'none'";

#[derive(Deserialize, Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_safety")]
    pub safety: String,
    #[serde(default = "default_lang")]
    pub lang: String,
}

fn default_mode() -> String {
    "General".to_string()
}

fn default_safety() -> String {
    "Moderate".to_string()
}

fn default_lang() -> String {
    "en".to_string()
}

fn is_hybrid(headers: &HeaderMap) -> bool {
    headers
        .get(HYBRID_HEADER)
        .is_some_and(|value| value.as_bytes() == b"1")
}

/// Latest user-authored message, or empty text if there is none.
fn latest_user_text(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|message| message.role == ChatRole::User)
        .map(|message| message.content.as_str())
        .unwrap_or("")
}

fn audit(state: &Arc<AppState>, action: &'static str, lang: &str, hybrid: bool) {
    let entry = AuditEntry {
        route: "/api/chat",
        guardrail_action: action,
        lang: lang.to_string(),
        model: state.config.model_id.clone(),
        hybrid,
    };
    let mut connection = state.redis_connection.clone();

    tokio::spawn(async move {
        if let Err(e) = push_audit_entry(&mut connection, &entry).await {
            warn!("Audit log write failed: {e}");
        }
    });
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|_| AppError::MalformedPayload)?;

    if request.messages.is_empty() {
        return Err(AppError::EmptyMessages);
    }

    let hybrid = is_hybrid(&headers);
    let provenance = Provenance {
        model: state.invoker.model_id().to_string(),
        hybrid,
    };

    let hits = classify(latest_user_text(&request.messages));
    let action: &'static str = if hits.is_empty() { "allow" } else { "restrict" };
    let guardrails_header = json!({ "action": action, "hits": hits }).to_string();
    let provenance_header =
        serde_json::to_string(&provenance).map_err(|e| AppError::InternalError(e.into()))?;

    let outcome = synthesize(
        hits,
        &request,
        &provenance,
        state.invoker.as_ref(),
        &state.config,
    )
    .await;

    state.ensure_schema_once().await;
    audit(&state, action, &request.lang, hybrid);

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/x-ndjson; charset=utf-8")
        .header(CACHE_CONTROL, "no-store")
        .header("x-guardrails", guardrails_header)
        .header("x-provenance", provenance_header)
        .body(to_event_stream(outcome, provenance))
        .map_err(|e| AppError::InternalError(e.into()))
}

pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let hybrid = is_hybrid(&headers);

    (
        [(CACHE_CONTROL, "no-store")],
        Json(json!({
            "hybrid": hybrid,
            "source": if hybrid { "hybrid-hardware" } else { "software-fallback" },
            "model": state.config.model_id,
        })),
    )
}

pub async fn i18n_handler(Path(lang): Path<String>) -> impl IntoResponse {
    let table: serde_json::Map<String, Value> = i18n::table(&lang)
        .iter()
        .map(|(key, text)| (key.to_string(), Value::String(text.to_string())))
        .collect();

    ([(CACHE_CONTROL, "no-store")], Json(Value::Object(table)))
}

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    fn validate(&self) -> Result<(), AppError> {
        if !self.email.contains('@') || self.password.len() < 8 {
            return Err(AppError::InvalidCredentials);
        }

        Ok(())
    }
}

fn new_uid() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

fn issue_session(state: &AppState, record: &UserRecord) -> Result<Response, AppError> {
    let claims = SessionClaims {
        uid: record.uid.clone(),
        email: record.email.clone(),
        role: record.role.clone(),
        plan: record.plan.clone(),
        iat: now_epoch(),
    };

    let cookie = format!(
        "{SESSION_COOKIE}={}; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age={}",
        session::encode(&claims, state.config.session_secret.as_bytes()),
        state.config.session_ttl_seconds
    );

    Ok(([(SET_COOKIE, cookie)], Json(claims)).into_response())
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(credentials) = payload.map_err(|_| AppError::MalformedPayload)?;
    credentials.validate()?;

    let record = UserRecord {
        uid: new_uid(),
        email: credentials.email,
        password_digest: sha256_hex(&credentials.password),
        role: "member".to_string(),
        plan: "free".to_string(),
    };

    let mut connection = state.redis_connection.clone();
    if !create_user(&mut connection, &record).await? {
        return Err(AppError::DuplicateEmail);
    }

    issue_session(&state, &record)
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(credentials) = payload.map_err(|_| AppError::MalformedPayload)?;
    credentials.validate()?;

    let mut connection = state.redis_connection.clone();
    let record = fetch_user(&mut connection, &credentials.email)
        .await?
        .ok_or(AppError::BadCredentials)?;

    if record.password_digest != sha256_hex(&credentials.password) {
        return Err(AppError::BadCredentials);
    }

    issue_session(&state, &record)
}

fn session_from_headers(headers: &HeaderMap, state: &AppState) -> Option<SessionClaims> {
    let raw = session::cookie_value(headers.get(COOKIE)?.to_str().ok()?)?;

    session::decode(
        raw,
        state.config.session_secret.as_bytes(),
        std::time::Duration::from_secs(state.config.session_ttl_seconds),
        now_epoch(),
    )
}

pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionClaims>, AppError> {
    let claims = session_from_headers(&headers, &state).ok_or(AppError::Unauthorized)?;

    Ok(Json(claims))
}

/// Security headers for HTML responses only; API and stream responses pass
/// through untouched.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.contains("text/html"));

    if is_html {
        let headers = response.headers_mut();
        headers.insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static(CSP));
        headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
        headers.insert(
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static(
                "camera=(), microphone=(), geolocation=(), interest-cohort=()",
            ),
        );
    }

    response
}
