use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use ecoimpact_common::error::{DataError, ErrorClass};
use ecoimpact_common::impact::{ImpactEvent, ImpactSummary, ImpactWindow};
use ecoimpact_common::record::Record;
use ecoimpact_common::schema::{
    EntitySchema, ALTERNATE_PRODUCTS, PASSWORD, PRODUCTS, PRODUCT_ID, PRODUCT_INFORMATION,
    USERNAME, USERS,
};
use ecoimpact_common::value::SqlValue;
use ecoimpact_store::auth::CredentialVerifier;
use ecoimpact_store::{Connector, Store};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub struct AppState<C, V> {
    pub store: Store<C>,
    pub credentials: V,
    /// Lookback used by `GET /users/{id}/impact`.
    pub window: ImpactWindow,
}

// ─── API types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct AuthenticatedResponse {
    #[serde(rename = "userID")]
    user_id: Value,
    message: &'static str,
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(rename = "Username")]
    username: String,
    #[serde(rename = "Password")]
    password: String,
}

type Reply = (StatusCode, Json<MessageResponse>);
type ApiError = Reply;
type ApiResult<T> = Result<T, ApiError>;
type Shared<C, V> = State<Arc<AppState<C, V>>>;

fn reply(status: StatusCode, message: impl Into<String>) -> Reply {
    (
        status,
        Json(MessageResponse {
            message: message.into(),
        }),
    )
}

fn not_found() -> ApiError {
    reply(StatusCode::NOT_FOUND, "Not found")
}

fn store_error(err: DataError) -> ApiError {
    match err.class() {
        ErrorClass::Invalid => {
            warn!(error = %err, "rejected request");
            reply(StatusCode::BAD_REQUEST, err.to_string())
        }
        ErrorClass::Internal => {
            error!(error = %err, "store call failed");
            reply(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn object(body: Value) -> ApiResult<Record> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(reply(StatusCode::BAD_REQUEST, "Expected a JSON object")),
    }
}

// ─── Handlers ────────────────────────────────────────────────────────────────

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn list_of<C: Connector>(
    store: &Store<C>,
    schema: &EntitySchema,
) -> ApiResult<Json<Vec<Record>>> {
    let mut records = store.list(schema).await.map_err(store_error)?;
    records.iter_mut().for_each(|record| schema.redact(record));
    Ok(Json(records))
}

async fn one_of<C: Connector>(
    store: &Store<C>,
    schema: &EntitySchema,
    id: i64,
) -> ApiResult<Json<Record>> {
    let mut record = store
        .get(schema, SqlValue::Int(id))
        .await
        .map_err(store_error)?
        .ok_or_else(not_found)?;
    schema.redact(&mut record);
    Ok(Json(record))
}

async fn alternates_for<C: Connector, V>(
    State(state): Shared<C, V>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Record>>> {
    let records = state
        .store
        .list_where(&ALTERNATE_PRODUCTS, PRODUCT_ID, SqlValue::Int(id))
        .await
        .map_err(store_error)?;
    Ok(Json(records))
}

async fn create_alternate<C: Connector, V>(
    State(state): Shared<C, V>,
    Json(body): Json<Value>,
) -> ApiResult<Reply> {
    let payload = object(body)?;
    state
        .store
        .create(&ALTERNATE_PRODUCTS, &payload)
        .await
        .map_err(store_error)?;
    info!(table = ALTERNATE_PRODUCTS.table, "record created");
    Ok(reply(StatusCode::CREATED, "Alternate product created"))
}

async fn create_user<C: Connector, V>(
    State(state): Shared<C, V>,
    Json(body): Json<Value>,
) -> ApiResult<Reply> {
    let payload = object(body)?;
    if !EntitySchema::has_value(&payload, USERNAME) || !EntitySchema::has_value(&payload, PASSWORD)
    {
        return Err(reply(
            StatusCode::BAD_REQUEST,
            "Username and Password are required",
        ));
    }
    state
        .store
        .create(&USERS, &payload)
        .await
        .map_err(store_error)?;
    info!(table = USERS.table, "record created");
    Ok(reply(StatusCode::CREATED, "User created"))
}

async fn authenticate<C, V: CredentialVerifier>(
    State(state): Shared<C, V>,
    Json(body): Json<Value>,
) -> ApiResult<Json<AuthenticatedResponse>> {
    let login: LoginRequest = serde_json::from_value(body).map_err(|_| {
        reply(
            StatusCode::BAD_REQUEST,
            "Username and Password are required",
        )
    })?;
    match state
        .credentials
        .verify(&login.username, &login.password)
        .await
        .map_err(store_error)?
    {
        Some(user_id) => Ok(Json(AuthenticatedResponse {
            user_id,
            message: "Authenticated",
        })),
        None => {
            info!("authentication rejected");
            Err(reply(StatusCode::UNAUTHORIZED, "Invalid credentials"))
        }
    }
}

async fn record_impact<C: Connector, V>(
    State(state): Shared<C, V>,
    Json(body): Json<Value>,
) -> ApiResult<Reply> {
    let event: ImpactEvent = serde_json::from_value(body).map_err(|_| {
        reply(
            StatusCode::BAD_REQUEST,
            "UserID, GHG and Water are required numbers",
        )
    })?;
    state
        .store
        .record_impact(&event)
        .await
        .map_err(store_error)?;
    Ok(reply(StatusCode::CREATED, "Impact recorded"))
}

async fn user_impact<C: Connector, V>(
    State(state): Shared<C, V>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ImpactSummary>> {
    let start = state.window.start_at(Utc::now());
    let summary = state
        .store
        .summarize_impact(id, start)
        .await
        .map_err(store_error)?;
    Ok(Json(summary))
}

// ─── Router ──────────────────────────────────────────────────────────────────

pub fn router<C, V>(state: AppState<C, V>) -> Router
where
    C: Connector + 'static,
    V: CredentialVerifier + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route(
            "/products",
            get(|State(state): Shared<C, V>| async move { list_of(&state.store, &PRODUCTS).await }),
        )
        .route(
            "/products/{id}",
            get(
                |State(state): Shared<C, V>, Path(id): Path<i64>| async move {
                    one_of(&state.store, &PRODUCTS, id).await
                },
            ),
        )
        .route("/products/{id}/alternates", get(alternates_for::<C, V>))
        .route(
            "/productinformation",
            get(|State(state): Shared<C, V>| async move {
                list_of(&state.store, &PRODUCT_INFORMATION).await
            }),
        )
        .route(
            "/productinformation/{id}",
            get(
                |State(state): Shared<C, V>, Path(id): Path<i64>| async move {
                    one_of(&state.store, &PRODUCT_INFORMATION, id).await
                },
            ),
        )
        .route(
            "/alternateproducts",
            get(|State(state): Shared<C, V>| async move {
                list_of(&state.store, &ALTERNATE_PRODUCTS).await
            })
            .post(create_alternate::<C, V>),
        )
        .route(
            "/alternateproducts/{id}",
            get(
                |State(state): Shared<C, V>, Path(id): Path<i64>| async move {
                    one_of(&state.store, &ALTERNATE_PRODUCTS, id).await
                },
            ),
        )
        .route(
            "/users",
            get(|State(state): Shared<C, V>| async move { list_of(&state.store, &USERS).await })
                .post(create_user::<C, V>),
        )
        .route(
            "/users/authenticate",
            axum::routing::post(authenticate::<C, V>),
        )
        .route(
            "/users/{id}",
            get(
                |State(state): Shared<C, V>, Path(id): Path<i64>| async move {
                    one_of(&state.store, &USERS, id).await
                },
            ),
        )
        .route("/users/{id}/impact", get(user_impact::<C, V>))
        .route("/userimpact", axum::routing::post(record_impact::<C, V>))
        .fallback(|| async { not_found() })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
