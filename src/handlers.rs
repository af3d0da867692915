use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    AppState,
    advisor::AdviceSource,
    domain::{PublicUser, Summary, Transaction, User},
    error::AppError,
    model::TransactionInput,
    session::AuthUser,
};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Serialize)]
pub struct TransactionCreatedResponse {
    pub message: &'static str,
    pub transaction: Transaction,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: Summary,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    pub source: AdviceSource,
    pub timestamp: String,
}

/// Unwraps a JSON body, reporting malformed payloads as a client error.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::validation(rejection.body_text()))
}

fn auth_response(
    state: &AppState,
    user: &User,
    message: &'static str,
) -> Result<AuthResponse, AppError> {
    Ok(AuthResponse {
        message,
        token: state.sessions.issue(user.id, &user.username)?,
        user: PublicUser::from(user),
    })
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "message": "Finance Copilot backend is running",
        "status": "success",
        "features": ["Database", "Authentication", "AI Integration"],
        "endpoints": [
            "POST /api/register",
            "POST /api/login",
            "GET /api/transactions",
            "POST /api/transactions",
            "GET /api/summary",
            "POST /api/chat"
        ]
    }))
}

#[axum::debug_handler(state = Arc<AppState>)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let payload = json_body(payload)?;

    tracing::info!(
        "Registration attempt username={} email={}",
        &payload.username,
        &payload.email
    );

    let user = state
        .credentials
        .register(&payload.username, &payload.email, &payload.password)
        .await?;

    tracing::info!(
        "User registered successfully id={} username={}",
        user.id,
        &user.username
    );

    Ok((
        StatusCode::CREATED,
        Json(auth_response(
            &state,
            &user,
            "Account created successfully! Welcome to Finance Copilot!",
        )?),
    ))
}

#[axum::debug_handler(state = Arc<AppState>)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let payload = json_body(payload)?;

    tracing::info!("Login attempt email={}", &payload.email);

    let user = state
        .credentials
        .authenticate(&payload.email, &payload.password)
        .await?;

    tracing::info!(
        "Login successful id={} username={} registered_at={}",
        user.id,
        &user.username,
        user.created_at
    );

    Ok(Json(auth_response(&state, &user, "Welcome back!")?))
}

#[axum::debug_handler(state = Arc<AppState>)]
pub async fn get_transactions(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<TransactionsResponse>, AppError> {
    let transactions = state.ledger.list_by_user(claims.user_id).await?;

    Ok(Json(TransactionsResponse { transactions }))
}

#[axum::debug_handler(state = Arc<AppState>)]
pub async fn add_transaction(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    payload: Result<Json<TransactionInput>, JsonRejection>,
) -> Result<(StatusCode, Json<TransactionCreatedResponse>), AppError> {
    let payload = json_body(payload)?;

    let transaction = state.ledger.insert(claims.user_id, payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(TransactionCreatedResponse {
            message: "Transaction added successfully!",
            transaction,
        }),
    ))
}

#[axum::debug_handler(state = Arc<AppState>)]
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<SummaryResponse>, AppError> {
    let summary = state.ledger.summarize(claims.user_id).await?;

    Ok(Json(SummaryResponse { summary }))
}

#[axum::debug_handler(state = Arc<AppState>)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let payload = json_body(payload)?;

    tracing::info!("Chat message from user_id={}", claims.user_id);

    let advice = state
        .advisor
        .advise(claims.user_id, &payload.message)
        .await?;

    Ok(Json(ChatResponse {
        success: true,
        message: advice.text,
        source: advice.source,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

pub async fn not_found() -> AppError {
    AppError::NotFound
}
