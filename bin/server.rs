// Campaign Keeper - Web Server
// REST API with Axum for the browser/mobile client

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use campaign_keeper::config::{self, Config};
use campaign_keeper::{
    checkout, dice, Cart, Catalog, Character, CharacterRepository, CheckoutError, CheckoutOptions,
    LedgerError, Money, Quantity, ShopItem, SqliteStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
struct AppState {
    characters: CharacterRepository,
    catalog: Arc<Catalog>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
    )
        .into_response()
}

fn internal_error(err: anyhow::Error) -> Response {
    tracing::error!(error = %err, "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::EmptyCart | CheckoutError::UnknownItem(_) => StatusCode::BAD_REQUEST,
        CheckoutError::Ledger(LedgerError::InvalidQuantity(_)) => StatusCode::BAD_REQUEST,
        CheckoutError::Ledger(LedgerError::Overflow) => StatusCode::BAD_REQUEST,
        CheckoutError::Ledger(_) => StatusCode::PAYMENT_REQUIRED,
        CheckoutError::CharacterNotFound(_) => StatusCode::NOT_FOUND,
        CheckoutError::VersionConflict(_) => StatusCode::CONFLICT,
        CheckoutError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Deserialize)]
struct NewCharacterRequest {
    name: String,
    class: String,
    #[serde(default = "default_level")]
    level: u32,
    max_hit_points: u32,
    #[serde(default)]
    purse: Money,
}

fn default_level() -> u32 {
    1
}

/// Quantities stay raw JSON until validated, so 1.5 or -2 are rejected, not truncated
#[derive(Deserialize)]
struct CheckoutLineRequest {
    item_id: String,
    quantity: serde_json::Value,
}

#[derive(Deserialize)]
struct CheckoutRequest {
    lines: Vec<CheckoutLineRequest>,
    #[serde(default)]
    exact_change: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/characters
async fn list_characters(State(state): State<AppState>) -> Response {
    match state.characters.list() {
        Ok(characters) => ApiResponse::ok(characters),
        Err(e) => internal_error(e),
    }
}

/// GET /api/characters/:id
async fn get_character(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.characters.get(&id) {
        Ok(Some(c)) => ApiResponse::ok(c),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("character not found: {}", id)),
        Err(e) => internal_error(e),
    }
}

/// POST /api/characters
async fn create_character(
    State(state): State<AppState>,
    Json(req): Json<NewCharacterRequest>,
) -> Response {
    let character = Character::new(&req.name, &req.class, req.level, req.max_hit_points).with_purse(req.purse);
    match state.characters.create(character) {
        Ok(c) => ApiResponse::ok(c),
        Err(e) => internal_error(e),
    }
}

/// GET /api/catalog
async fn get_catalog(State(state): State<AppState>) -> Response {
    let items: Vec<ShopItem> = state.catalog.items().cloned().collect();
    ApiResponse::ok(items)
}

/// POST /api/characters/:id/checkout
async fn post_checkout(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CheckoutRequest>,
) -> Response {
    let mut cart = Cart::new();
    for line in &req.lines {
        let quantity = match Quantity::from_json(&line.quantity)
            .and_then(|q| u32::try_from(q).map_err(|_| LedgerError::Overflow))
        {
            Ok(q) => q,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        };
        cart.add(&line.item_id, quantity);
    }

    let options = CheckoutOptions { exact_change: req.exact_change };
    match checkout(&state.characters, &state.catalog, &id, &cart, options) {
        Ok(receipt) => ApiResponse::ok(receipt),
        Err(e) => {
            let status = checkout_status(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!(error = %e, "checkout failed");
            }
            error_response(status, e.to_string())
        }
    }
}

/// GET /api/roll/:notation
async fn roll_dice(Path(notation): Path<String>) -> Response {
    match dice::roll(&notation, &mut rand::thread_rng()) {
        Ok(roll) => ApiResponse::ok(roll),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/characters", get(list_characters).post(create_character))
        .route("/characters/:id", get(get_character))
        .route("/characters/:id/checkout", post(post_checkout))
        .route("/catalog", get(get_catalog))
        .route("/roll/:notation", get(roll_dice))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_logging();
    let config = Config::from_env();

    println!("🌐 Campaign Keeper - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    let catalog = Catalog::load_csv(&config.catalog_path)?;
    println!("✓ Database opened: {:?}", config.db_path);
    println!("✓ Catalog loaded: {} items", catalog.len());

    let state = AppState {
        characters: CharacterRepository::new(store, &config.actor),
        catalog: Arc::new(catalog),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   API: http://{}/api/characters", config.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
