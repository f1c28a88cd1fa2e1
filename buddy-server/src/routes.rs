use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use buddy_common::non_api_structs::UserData;
use buddy_common::{ApiError, FriendRequest, RawUserRecord};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::config::ServerConfig;
use crate::credentials::{CredentialHasher, SaltedSha256, Sessions};
use crate::error::CoreError;
use crate::importer::ImportRecord;
use crate::ranker::{Scorer, WeightedJaccard};
use crate::store::{SledBackend, Store};

pub type Result<T> = std::result::Result<T, AppError>;

pub struct AppError(anyhow::Error);

/// Failures of the request itself rather than of the store.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("missing or invalid bearer token")]
    Unauthorized,
    #[error("invalid credentials")]
    InvalidCredentials,
}

/// A JSON request body whose rejections answer with the same error body as
/// every other failure.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Payload<T>(pub T);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(rejection) = self.0.downcast_ref::<JsonRejection>() {
            let status = rejection.status();
            return (status, Json(ApiError { code: String::from("INVALID_BODY"), message: rejection.body_text() })).into_response();
        }
        let (status, code) = match self.0.downcast_ref::<CoreError>() {
            Some(CoreError::DuplicateUsername(_)) => (StatusCode::CONFLICT, "DUPLICATE_USERNAME"),
            Some(CoreError::InvalidUsername(_)) => (StatusCode::BAD_REQUEST, "INVALID_USERNAME"),
            Some(CoreError::DuplicateFriendship(..)) => (StatusCode::CONFLICT, "DUPLICATE_FRIENDSHIP"),
            Some(CoreError::UserNotFound(_)) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            Some(CoreError::SelfFriendship) => (StatusCode::BAD_REQUEST, "SELF_FRIENDSHIP"),
            Some(CoreError::InvalidConfiguration(_)) => (StatusCode::BAD_REQUEST, "INVALID_CONFIGURATION"),
            Some(CoreError::ImportAborted(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "IMPORT_ABORTED"),
            Some(CoreError::Storage(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            None => match self.0.downcast_ref::<RequestError>() {
                Some(RequestError::Unauthorized) | Some(RequestError::InvalidCredentials) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
                None => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ApiError { code: code.to_string(), message: self.0.to_string() }),
        )
            .into_response()
    }
}

// This enables using `?` on functions that return `Result<_, anyhow::Error>` to turn them into
// `Result<_, AppError>`. That way you don't need to do that manually.
impl<E> From<E> for AppError
    where
        E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Clone)]
pub struct State {
    store: Arc<Store>,
    scorer: Arc<dyn Scorer>,
    hasher: Arc<dyn CredentialHasher>,
    sessions: Arc<Sessions>,
    feed_path: PathBuf,
    notify_url: Option<String>,
    reqwest_client: reqwest::Client,
}

impl State {
    pub fn new(store: Store, config: &ServerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            store: Arc::new(store),
            scorer: Arc::new(WeightedJaccard::new(config.weights)?),
            hasher: Arc::new(SaltedSha256),
            sessions: Arc::new(Sessions::new(config.session_ttl())),
            feed_path: config.feed_path.clone(),
            notify_url: config.notify_url.clone(),
            reqwest_client: Default::default(),
        })
    }
    /// State over the sled database named in `config`.
    pub fn open(config: &ServerConfig) -> anyhow::Result<Self> {
        Self::new(Store::new(SledBackend::open(&config.db_path)?), config)
    }
    /// Resolves the bearer token and checks it belongs to `username`.
    fn authorize(&self, headers: &HeaderMap, username: &str) -> Result<UserData> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(RequestError::Unauthorized)?;
        let caller = self.sessions.resolve(token).ok_or(RequestError::Unauthorized)?;
        let user = self.store.lookup_by_username(username)?;
        if user.id != caller {
            return Err(RequestError::Unauthorized.into());
        }
        Ok(user)
    }
    fn hash_records(&self, records: Vec<RawUserRecord>) -> Vec<ImportRecord> {
        records
            .into_iter()
            .map(|record| ImportRecord {
                credential_hash: self.hasher.hash(&record.password),
                username: record.username,
                attributes: record.attributes,
            })
            .collect()
    }
    /// Fire-and-forget; only ever called once the friendship is committed.
    fn notify(&self, request: FriendRequest) {
        if let Some(url) = self.notify_url.clone() {
            let client = self.reqwest_client.clone();
            tokio::spawn(async move {
                if let Err(err) = client.post(&url).json(&request).send().await {
                    warn!(%url, error = %err, "friendship notification failed");
                }
            });
        }
    }
}

pub fn app(state: State) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/users/:username", get(handlers::get_user))
        .route("/users/:username/friends", get(handlers::get_friends))
        .route("/attributes", post(handlers::update_attributes))
        .route("/friends", post(handlers::add_friend))
        .route("/rank", post(handlers::rank))
        .route("/import", post(handlers::import))
        .route("/load_json", post(handlers::load_json))
        .route("/quiz", post(handlers::submit_quiz))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

async fn root() -> &'static str {
    "Study buddy server"
}

mod handlers {
    use axum::body::Bytes;
    use axum::extract::Path;
    use buddy_common::non_api_structs::AttributeSets;
    use buddy_common::{AttributeUpdate, ImportReport, LoginRequest, LoginResponse, MatchResult, QuizSubmission, RankRequest, RegisterRequest, UserId, UserSummary};
    use tracing::info;

    use super::*;
    use crate::importer::{parse_feed, read_feed};

    pub async fn register(Extension(state): Extension<State>, Payload(payload): Payload<RegisterRequest>) -> Result<impl IntoResponse> {
        let credential_hash = state.hasher.hash(&payload.password);
        let attributes = AttributeSets::from_lists(&payload.attributes);
        let id = state.store.register(&payload.username, credential_hash, attributes)?;
        let user = state.store.lookup_by_id(id)?;
        Ok((StatusCode::CREATED, Json(UserSummary::from(&user))))
    }

    pub async fn login(Extension(state): Extension<State>, Payload(payload): Payload<LoginRequest>) -> Result<Json<LoginResponse>> {
        let user = match state.store.lookup_by_username(&payload.username) {
            Ok(user) => user,
            Err(CoreError::UserNotFound(_)) => return Err(RequestError::InvalidCredentials.into()),
            Err(err) => return Err(err.into()),
        };
        if !state.hasher.verify(&payload.password, &user.credential_hash) {
            return Err(RequestError::InvalidCredentials.into());
        }
        info!(user = %user.id, "login");
        Ok(Json(LoginResponse { user_id: user.id, token: state.sessions.issue(user.id) }))
    }

    pub async fn get_user(Extension(state): Extension<State>, Path(username): Path<String>) -> Result<Json<UserSummary>> {
        Ok(Json(UserSummary::from(&state.store.lookup_by_username(&username)?)))
    }

    pub async fn get_friends(Extension(state): Extension<State>, Path(username): Path<String>) -> Result<Json<Vec<UserSummary>>> {
        let user = state.store.lookup_by_username(&username)?;
        let friends = state.store
            .neighbors(user.id)?
            .into_iter()
            .map(|id| -> Result<UserSummary> { Ok(UserSummary::from(&state.store.lookup_by_id(id)?)) })
            .collect::<Result<Vec<_>>>()?;
        Ok(Json(friends))
    }

    pub async fn update_attributes(Extension(state): Extension<State>, headers: HeaderMap, Payload(payload): Payload<AttributeUpdate>) -> Result<Json<UserSummary>> {
        let user = state.authorize(&headers, &payload.username)?;
        let updated = state.store.update_attributes(user.id, AttributeSets::from_lists(&payload.attributes))?;
        Ok(Json(UserSummary::from(&updated)))
    }

    pub async fn add_friend(Extension(state): Extension<State>, headers: HeaderMap, Payload(payload): Payload<FriendRequest>) -> Result<impl IntoResponse> {
        let user = state.authorize(&headers, &payload.username)?;
        let friend = state.store.lookup_by_username(&payload.friend_username)?;
        state.store.add_friendship(user.id, friend.id)?;
        state.notify(payload);
        Ok(StatusCode::CREATED)
    }

    pub async fn rank(Extension(state): Extension<State>, headers: HeaderMap, Payload(payload): Payload<RankRequest>) -> Result<Json<MatchResult>> {
        let user = state.authorize(&headers, &payload.username)?;
        let pool: BTreeSet<_> = match &payload.candidates {
            Some(names) => names
                .iter()
                .map(|name| -> Result<UserId> { Ok(state.store.lookup_by_username(name)?.id) })
                .collect::<Result<_>>()?,
            None => state.store.user_ids()?.into_iter().collect(),
        };
        Ok(Json(state.store.rank(state.scorer.as_ref(), user.id, &pool, payload.k)?))
    }

    pub async fn import(Extension(state): Extension<State>, body: Bytes) -> Result<Json<ImportReport>> {
        let records = parse_feed(&body)?;
        Ok(Json(state.store.import_batch(state.hash_records(records))?))
    }

    pub async fn load_json(Extension(state): Extension<State>) -> Result<Json<ImportReport>> {
        let records = read_feed(&state.feed_path)?;
        Ok(Json(state.store.import_batch(state.hash_records(records))?))
    }

    pub async fn submit_quiz(Extension(state): Extension<State>, headers: HeaderMap, Payload(payload): Payload<QuizSubmission>) -> Result<impl IntoResponse> {
        let user = state.authorize(&headers, &payload.username)?;
        state.store.submit_quiz(user.id, payload.responses)?;
        Ok(StatusCode::NO_CONTENT)
    }
}
