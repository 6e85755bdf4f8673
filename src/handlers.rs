use crate::error::AppError;
use crate::models::{ChatTurn, Existence, MedalTally, NewUser, RatingOutcome, ScoreOutcome, SignupOutcome};
use crate::quiz::{parse_quiz_text, ParsedQuiz, QuizRequest};
use crate::state::AppState;
use argon2::{password_hash::SaltString, Argon2, PasswordHasher};
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use validator::Validate;

const CHAT_LIMIT_PER_MINUTE: u32 = 30;
const QUIZ_LIMIT_PER_MINUTE: u32 = 15;

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn client_key(headers: &HeaderMap) -> &str {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("local")
}

/// `Json` extractor whose rejections use the `AppError` envelope.
pub struct AppJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let req_id = request_id_from_headers(req.headers());
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(body_rejected(rejection, req_id)),
        }
    }
}

fn body_rejected(rejection: JsonRejection, req_id: String) -> AppError {
    warn!(request_id = %req_id, "rejected request body: {}", rejection.body_text());
    AppError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", rejection.body_text(), req_id)
}

fn rate_limited(req_id: String) -> AppError {
    AppError::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", "too many requests", req_id)
}

pub async fn index() -> &'static str {
    "Gemini Quiz Server is Running"
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatPayload {
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub message: String,
}

pub async fn gemini_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(payload): AppJson<ChatPayload>,
) -> Result<String, AppError> {
    let req_id = request_id_from_headers(&headers);
    if !state.check_rate_limit("gemini_chat", client_key(&headers), CHAT_LIMIT_PER_MINUTE) {
        return Err(rate_limited(req_id));
    }
    payload
        .validate()
        .map_err(|e| AppError::validation(&e, req_id.clone()))?;

    info!(
        history_turns = payload.history.len(),
        message_len = payload.message.len(),
        "chat request"
    );
    let reply = state
        .ai_client
        .chat(payload.history, payload.message)
        .await
        .map_err(|e| {
            error!(request_id = %req_id, "gemini chat failed: {:#}", e);
            AppError::internal(req_id.clone())
        })?;
    Ok(reply)
}

pub async fn gemini_quiz(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(payload): AppJson<QuizRequest>,
) -> Result<Json<ParsedQuiz>, AppError> {
    let req_id = request_id_from_headers(&headers);
    if !state.check_rate_limit("gemini_quiz", client_key(&headers), QUIZ_LIMIT_PER_MINUTE) {
        return Err(rate_limited(req_id));
    }
    payload
        .validate()
        .map_err(|e| AppError::validation(&e, req_id.clone()))?;

    let raw = state
        .ai_client
        .generate_quiz_text(&payload)
        .await
        .map_err(|e| {
            error!(request_id = %req_id, topic = %payload.topic, "gemini quiz generation failed: {:#}", e);
            AppError::internal(req_id.clone())
        })?;

    let quiz = parse_quiz_text(&raw);
    if quiz.dropped() > 0 {
        warn!(
            request_id = %req_id,
            dropped = quiz.dropped(),
            kept = quiz.len(),
            "quiz text had lines without a question/answer pair"
        );
    }
    info!(
        topic = %payload.topic,
        difficulty = %payload.difficulty,
        questions = quiz.len(),
        "quiz generated"
    );
    Ok(Json(quiz))
}

#[derive(Debug, Deserialize)]
pub struct EmailPayload {
    pub email: String,
}

pub async fn check_user(
    State(state): State<AppState>,
    AppJson(payload): AppJson<EmailPayload>,
) -> Json<Existence> {
    let outcome = match state.store.user_exists(&payload.email).await {
        Ok(true) => Existence::Exists,
        Ok(false) => Existence::NotExists,
        Err(e) => {
            error!("user lookup failed: {}", e);
            Existence::Failed
        }
    };
    Json(outcome)
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupPayload {
    #[validate(length(min = 1, max = 255, message = "must not be empty"))]
    pub name: String,
    #[validate(length(min = 1, max = 320, message = "must not be empty"))]
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hash failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// Replies `"notexist"` when the account was created and `"exist"` when the
/// email is already taken.
pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(payload): AppJson<SignupPayload>,
) -> Result<Json<Existence>, AppError> {
    let req_id = request_id_from_headers(&headers);
    payload
        .validate()
        .map_err(|e| AppError::validation(&e, req_id.clone()))?;

    let password_hash = match payload.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => match hash_password(password) {
            Ok(hash) => Some(hash),
            Err(e) => {
                error!(request_id = %req_id, "{}", e);
                return Ok(Json(Existence::Failed));
            }
        },
        None => None,
    };

    let new_user = NewUser {
        email: payload.email,
        name: payload.name,
        password_hash,
    };
    let outcome = match state.store.create_user(new_user).await {
        Ok(SignupOutcome::AlreadyExists) => Existence::Exists,
        Ok(SignupOutcome::Created) => Existence::NotExists,
        Err(e) => {
            error!(request_id = %req_id, "signup failed: {}", e);
            Existence::Failed
        }
    };
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
pub struct StatusOut {
    pub status: &'static str,
    pub message: &'static str,
}

impl StatusOut {
    fn success(message: &'static str) -> Json<Self> {
        Json(Self { status: "success", message })
    }
}

#[derive(Debug, Deserialize)]
pub struct RatingPayload {
    pub rating: f64,
    pub email: String,
}

pub async fn save_rating(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(payload): AppJson<RatingPayload>,
) -> Result<Json<StatusOut>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let outcome = state
        .store
        .save_rating(&payload.email, payload.rating)
        .await
        .map_err(|e| {
            error!(request_id = %req_id, "save rating failed: {}", e);
            AppError::internal(req_id.clone())
        })?;

    match outcome {
        RatingOutcome::Created => Ok(StatusOut::success("Rating saved successfully")),
        RatingOutcome::Updated => Ok(StatusOut::success("Rating updated successfully")),
        RatingOutcome::UserNotFound => Err(AppError::not_found("User not found", req_id)),
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ScorePayload {
    pub email: String,
    #[validate(range(min = 0, max = 10, message = "must be between 0 and 10"))]
    pub score: i64,
}

pub async fn save_score(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(payload): AppJson<ScorePayload>,
) -> Result<Json<StatusOut>, AppError> {
    let req_id = request_id_from_headers(&headers);
    payload
        .validate()
        .map_err(|e| AppError::validation(&e, req_id.clone()))?;

    let outcome = state
        .store
        .record_score(&payload.email, payload.score)
        .await
        .map_err(|e| {
            error!(request_id = %req_id, "save score failed: {}", e);
            AppError::internal(req_id.clone())
        })?;

    match outcome {
        ScoreOutcome::Updated(tally) => {
            info!(
                score = payload.score,
                gold = tally.gold,
                silver = tally.silver,
                bronze = tally.bronze,
                medals = tally.total(),
                "score saved"
            );
            Ok(StatusOut::success("Score and medals updated successfully"))
        }
        ScoreOutcome::NotFound => Err(AppError::not_found("User not found", req_id)),
    }
}

pub async fn medal_counts(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(payload): AppJson<EmailPayload>,
) -> Result<Json<MedalTally>, AppError> {
    let req_id = request_id_from_headers(&headers);
    state
        .store
        .medal_counts(&payload.email)
        .await
        .map_err(|e| {
            error!(request_id = %req_id, "medal lookup failed: {}", e);
            AppError::internal(req_id.clone())
        })?
        .map(Json)
        .ok_or_else(|| AppError::not_found("User not found", req_id))
}
