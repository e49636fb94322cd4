// House Cup - Web Server
// REST surface for admin actions and live displays.
//
// Displays combine two refresh paths: mutating handlers fire the
// ChangeNotifier, and clients also poll every POLL_FALLBACK seconds in
// case the push channel drops a signal.

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use house_cup::{
    apply_delta, current_state, delete_costume_entry, insert_costume_entry, leading_house,
    list_costume_entries, read_voting_settings, remove_capped, reset, standings, submit_ballot,
    tally, total_points, write_voting_settings, BallotDraft, ChangeNotifier, ChangeTopic,
    DuplicateChoice, House, LedgerState, Standing, SubmitOutcome, POLL_FALLBACK,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    notifier: ChangeNotifier,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: String) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message),
        }
    }
}

fn internal_error(e: anyhow::Error) -> axum::response::Response {
    eprintln!("Internal error: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::err("internal error".to_string())),
    )
        .into_response()
}

// ============================================================================
// Request / response payloads
// ============================================================================

#[derive(Deserialize)]
struct PointsRequest {
    house: House,
    points: i64,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Serialize)]
struct LeaderboardResponse {
    standings: Vec<Standing>,
    total_points: i64,
    leading_house: Option<House>,
}

impl From<&LedgerState> for LeaderboardResponse {
    fn from(state: &LedgerState) -> Self {
        Self {
            standings: standings(state),
            total_points: total_points(state),
            leading_house: leading_house(state),
        }
    }
}

#[derive(Deserialize)]
struct CostumeRequest {
    name: String,
    image_url: String,
}

#[derive(Deserialize)]
struct VoteRequest {
    voter_id: String,
    first_choice: Option<i64>,
    second_choice: Option<i64>,
    third_choice: Option<i64>,
}

#[derive(Deserialize)]
struct VotingRequest {
    enabled: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    poll_fallback_secs: u64,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "OK",
        version: house_cup::VERSION,
        poll_fallback_secs: POLL_FALLBACK.as_secs(),
    }))
}

/// GET /api/ledger - Full ledger snapshot (totals + log)
async fn get_ledger(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    match current_state(&conn) {
        Ok(ledger) => (StatusCode::OK, Json(ApiResponse::ok(ledger))).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/leaderboard - Ranked standings
async fn get_leaderboard(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    match current_state(&conn) {
        Ok(ledger) => (
            StatusCode::OK,
            Json(ApiResponse::ok(LeaderboardResponse::from(&ledger))),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/points - Apply a raw signed delta
async fn post_points(
    State(state): State<AppState>,
    Json(req): Json<PointsRequest>,
) -> impl IntoResponse {
    let result = {
        let mut conn = state.db.lock().unwrap();
        let reason = req.reason.as_deref().unwrap_or("Points awarded");
        apply_delta(&mut conn, req.house, req.points, reason)
    };

    match result {
        Ok(ledger) => {
            state.notifier.notify(ChangeTopic::Ledger);
            (StatusCode::OK, Json(ApiResponse::ok(ledger))).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// POST /api/points/remove - Guarded removal (floors at zero)
async fn post_points_remove(
    State(state): State<AppState>,
    Json(req): Json<PointsRequest>,
) -> impl IntoResponse {
    if req.points < 0 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::err("points must be non-negative".to_string())),
        )
            .into_response();
    }

    let result = {
        let mut conn = state.db.lock().unwrap();
        let reason = req.reason.as_deref().unwrap_or("Points removed");
        remove_capped(&mut conn, req.house, req.points, reason)
    };

    match result {
        Ok(ledger) => {
            state.notifier.notify(ChangeTopic::Ledger);
            (StatusCode::OK, Json(ApiResponse::ok(ledger))).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// POST /api/reset - Zero totals, discard the log
async fn post_reset(State(state): State<AppState>) -> impl IntoResponse {
    let result = {
        let mut conn = state.db.lock().unwrap();
        reset(&mut conn)
    };

    match result {
        Ok(ledger) => {
            state.notifier.notify(ChangeTopic::Ledger);
            (StatusCode::OK, Json(ApiResponse::ok(ledger))).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// GET /api/costumes - All contest entries
async fn get_costumes(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    match list_costume_entries(&conn) {
        Ok(entries) => (StatusCode::OK, Json(ApiResponse::ok(entries))).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/costumes - Add an entry (image already uploaded)
async fn post_costume(
    State(state): State<AppState>,
    Json(req): Json<CostumeRequest>,
) -> impl IntoResponse {
    let result = {
        let conn = state.db.lock().unwrap();
        insert_costume_entry(&conn, &req.name, &req.image_url)
    };

    match result {
        Ok(entry) => {
            state.notifier.notify(ChangeTopic::Costumes);
            (StatusCode::CREATED, Json(ApiResponse::ok(entry))).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/costumes/:id - Remove an entry (ballots stay)
async fn delete_costume(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> impl IntoResponse {
    let result = {
        let conn = state.db.lock().unwrap();
        delete_costume_entry(&conn, id)
    };

    match result {
        Ok(true) => {
            state.notifier.notify(ChangeTopic::Costumes);
            (StatusCode::OK, Json(ApiResponse::ok(id))).into_response()
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!("no costume entry {}", id))),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/results - Weighted contest tally
async fn get_results(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    match tally(&conn) {
        Ok(results) => (StatusCode::OK, Json(ApiResponse::ok(results))).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/votes - Submit one ballot for a resolved voter identity
async fn post_vote(
    State(state): State<AppState>,
    Json(req): Json<VoteRequest>,
) -> impl IntoResponse {
    let draft = BallotDraft {
        first: req.first_choice,
        second: req.second_choice,
        third: req.third_choice,
    };

    let result = {
        let conn = state.db.lock().unwrap();
        submit_ballot(&conn, &req.voter_id, draft)
    };

    match result {
        Ok(SubmitOutcome::Accepted(ballot)) => {
            state.notifier.notify(ChangeTopic::Votes);
            (StatusCode::OK, Json(ApiResponse::ok(ballot))).into_response()
        }
        Ok(SubmitOutcome::AlreadyVoted) => (
            StatusCode::CONFLICT,
            Json(ApiResponse::err("you have already voted".to_string())),
        )
            .into_response(),
        Ok(SubmitOutcome::NoSelection) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::err("select at least one costume".to_string())),
        )
            .into_response(),
        Ok(SubmitOutcome::VotingClosed) => (
            StatusCode::FORBIDDEN,
            Json(ApiResponse::err("voting is closed".to_string())),
        )
            .into_response(),
        Err(e) if e.downcast_ref::<DuplicateChoice>().is_some() => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::err(e.to_string())),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/voting - Current voting switch
async fn get_voting(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    match read_voting_settings(&conn) {
        Ok(settings) => (StatusCode::OK, Json(ApiResponse::ok(settings))).into_response(),
        Err(e) => internal_error(e),
    }
}

/// PUT /api/voting - Open or close ballot submission
async fn put_voting(
    State(state): State<AppState>,
    Json(req): Json<VotingRequest>,
) -> impl IntoResponse {
    let result = {
        let conn = state.db.lock().unwrap();
        write_voting_settings(&conn, req.enabled)
    };

    match result {
        Ok(settings) => {
            state.notifier.notify(ChangeTopic::Settings);
            (StatusCode::OK, Json(ApiResponse::ok(settings))).into_response()
        }
        Err(e) => internal_error(e),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    env_logger::init();

    println!("🏰 House Cup - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = std::env::var("HOUSE_CUP_DB").unwrap_or_else(|_| "house_cup.db".to_string());
    let media_dir = std::env::var("HOUSE_CUP_MEDIA").unwrap_or_else(|_| "media".to_string());

    let conn = house_cup::open_database(Path::new(&db_path)).expect("Failed to open database");
    println!("✓ Database ready: {}", db_path);

    let notifier = ChangeNotifier::new();
    // Server-side log of every change signal; display clients subscribe to
    // their own notifier instances over whatever transport fronts this API.
    let _log_sub = notifier.subscribe(|topic| {
        log::info!("state changed: {:?}", topic);
    });

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        notifier,
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ledger", get(get_ledger))
        .route("/leaderboard", get(get_leaderboard))
        .route("/points", post(post_points))
        .route("/points/remove", post(post_points_remove))
        .route("/reset", post(post_reset))
        .route("/costumes", get(get_costumes).post(post_costume))
        .route("/costumes/:id", delete(delete_costume))
        .route("/results", get(get_results))
        .route("/votes", post(post_vote))
        .route("/voting", get(get_voting).put(put_voting))
        .with_state(state.clone());

    // Build main router
    let app = Router::new()
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new(&media_dir))
        .layer(CorsLayer::permissive());

    // Start server
    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   API: http://localhost:3000/api/leaderboard");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
