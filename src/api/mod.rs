//! HTTP API for wallet, balance and fund actions
//!
//! Each mutating endpoint runs one user action: it takes the action guard
//! slot, executes against the connected session, and returns the ordered
//! status records produced along the way so callers can render the full
//! submitted/confirmed/failed trail.

use crate::config::ApiConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::fund::{CreateFundRequest, CreatedFund, FundOrchestrator, InvestRequest, RedeemRequest, SwapRequest};
use crate::metrics;
use crate::reader::{BalanceReader, FundReference, TokenSnapshot};
use crate::session::SessionManager;
use crate::status::{ActionGuard, MemorySink, StatusRecord, StatusReporter};
use crate::transfer::{TransferExecutor, TransferMode};
use crate::units;
use crate::wallet::TransactionOutcome;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use ethers::types::H256;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub reader: BalanceReader,
    pub transfer: Arc<TransferExecutor>,
    pub funds: Arc<FundOrchestrator>,
    pub guard: Arc<ActionGuard>,
}

/// Build the API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/balances", get(get_balances))
        .route("/funds", post(create_fund))
        .route("/funds/:comptroller", get(get_fund))
        .route("/funds/:comptroller/invest", post(invest))
        .route("/funds/:comptroller/redeem", post(redeem))
        .route("/funds/:comptroller/swap", post(swap))
        .route("/transfer", post(transfer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> OrchestratorResult<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| OrchestratorError::Internal(e.to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| OrchestratorError::Internal(e.to_string()))?;

    Ok(())
}

/// Response envelope for mutating actions
#[derive(Serialize)]
struct ActionResponse<T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    action_id: Option<uuid::Uuid>,
    statuses: Vec<StatusRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// Whether simply running the same action again is a sensible response
    retryable: bool,
}

impl<T: Serialize> ActionResponse<T> {
    fn success(
        action_id: uuid::Uuid,
        statuses: Vec<StatusRecord>,
        result: T,
    ) -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self {
                ok: true,
                action_id: Some(action_id),
                statuses,
                result: Some(result),
                error: None,
                retryable: false,
            }),
        )
    }

    fn failure(
        action_id: Option<uuid::Uuid>,
        statuses: Vec<StatusRecord>,
        err: &OrchestratorError,
    ) -> (StatusCode, Json<Self>) {
        (
            error_status(err),
            Json(Self {
                ok: false,
                action_id,
                statuses,
                result: None,
                error: Some(err.to_string()),
                retryable: err.is_user_retryable(),
            }),
        )
    }
}

/// Map action errors onto HTTP status codes
fn error_status(err: &OrchestratorError) -> StatusCode {
    match err {
        OrchestratorError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        OrchestratorError::ActionInFlight { .. } => StatusCode::CONFLICT,
        OrchestratorError::WalletUnavailable(_)
        | OrchestratorError::WrongNetwork { .. }
        | OrchestratorError::ChainUnrecognized { .. }
        | OrchestratorError::ChainConnection(_) => StatusCode::SERVICE_UNAVAILABLE,
        OrchestratorError::RemoteRejected(_) => StatusCode::BAD_GATEWAY,
        OrchestratorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Minimal on-chain receipt returned for submitted actions
#[derive(Serialize)]
struct Receipt {
    tx_hash: H256,
    block_number: u64,
}

impl From<TransactionOutcome> for Receipt {
    fn from(outcome: TransactionOutcome) -> Self {
        Self {
            tx_hash: outcome.tx_hash,
            block_number: outcome.block_number,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct StatusResponse {
    connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chain_id: Option<u64>,
    on_required_network: bool,
}

/// Session status
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.session.current().await {
        Ok(session) => Json(StatusResponse {
            connected: true,
            account: Some(format!("{:#x}", session.account)),
            chain_id: Some(session.chain_id),
            on_required_network: state.session.on_required_network().await,
        }),
        Err(_) => Json(StatusResponse {
            connected: false,
            account: None,
            chain_id: None,
            on_required_network: false,
        }),
    }
}

#[derive(Deserialize)]
struct BalanceQuery {
    token: Option<String>,
}

#[derive(Serialize)]
struct BalancesResponse {
    native: String,
    token: TokenSnapshot,
}

/// Native balance of the session account, plus an optional token snapshot
async fn get_balances(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalancesResponse>, (StatusCode, String)> {
    let session = state.session.current().await.map_err(reject)?;

    let native = state
        .reader
        .native_balance(session.account)
        .await
        .map_err(reject)?;
    let token = state
        .reader
        .token_snapshot(session.account, query.token.as_deref())
        .await
        .map_err(reject)?;

    Ok(Json(BalancesResponse {
        native: units::format_amount(native, 18),
        token,
    }))
}

/// Load a fund reference by comptroller address
async fn get_fund(
    State(state): State<AppState>,
    Path(comptroller): Path<String>,
) -> Result<Json<FundReference>, (StatusCode, String)> {
    let fund = state.reader.load_fund(&comptroller).await.map_err(reject)?;
    Ok(Json(fund))
}

fn reject(err: OrchestratorError) -> (StatusCode, String) {
    (error_status(&err), err.to_string())
}

#[derive(Deserialize)]
struct TransferRequest {
    recipient: String,
    amount: String,
    /// ERC-20 token address; absent means a native transfer
    #[serde(default)]
    token: Option<String>,
}

async fn transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> impl IntoResponse {
    let action = "transfer";
    let _permit = match state.guard.begin(action) {
        Ok(permit) => permit,
        Err(e) => return ActionResponse::<Receipt>::failure(None, vec![], &e),
    };

    let sink = Arc::new(MemorySink::new());
    let reporter = StatusReporter::new(action, sink.clone());

    let mode = match request.token {
        Some(token) => TransferMode::Token(token),
        None => TransferMode::Native,
    };

    let outcome = state
        .transfer
        .transfer(&request.recipient, &request.amount, mode, &reporter)
        .await;
    finish(action, sink, &reporter, outcome.map(Receipt::from))
}

async fn create_fund(
    State(state): State<AppState>,
    Json(request): Json<CreateFundRequest>,
) -> impl IntoResponse {
    let action = "create-fund";
    let _permit = match state.guard.begin(action) {
        Ok(permit) => permit,
        Err(e) => return ActionResponse::<CreatedFund>::failure(None, vec![], &e),
    };

    let sink = Arc::new(MemorySink::new());
    let reporter = StatusReporter::new(action, sink.clone());

    let result = match state.session.current().await {
        Ok(session) => {
            state
                .funds
                .create_fund(session.account, &request, &reporter)
                .await
        }
        Err(e) => Err(e),
    };
    finish(action, sink, &reporter, result)
}

async fn invest(
    State(state): State<AppState>,
    Path(comptroller): Path<String>,
    Json(request): Json<InvestRequest>,
) -> impl IntoResponse {
    let action = "invest";
    let _permit = match state.guard.begin(action) {
        Ok(permit) => permit,
        Err(e) => return ActionResponse::<Receipt>::failure(None, vec![], &e),
    };

    let sink = Arc::new(MemorySink::new());
    let reporter = StatusReporter::new(action, sink.clone());

    let result = match state.session.current().await {
        Ok(session) => {
            state
                .funds
                .invest(&comptroller, session.account, &request, &reporter)
                .await
        }
        Err(e) => Err(e),
    };
    finish(action, sink, &reporter, result.map(Receipt::from))
}

async fn redeem(
    State(state): State<AppState>,
    Path(comptroller): Path<String>,
    Json(request): Json<RedeemRequest>,
) -> impl IntoResponse {
    let action = "redeem";
    let _permit = match state.guard.begin(action) {
        Ok(permit) => permit,
        Err(e) => return ActionResponse::<Receipt>::failure(None, vec![], &e),
    };

    let sink = Arc::new(MemorySink::new());
    let reporter = StatusReporter::new(action, sink.clone());

    let result = match state.session.current().await {
        Ok(session) => {
            state
                .funds
                .redeem(&comptroller, session.account, &request, &reporter)
                .await
        }
        Err(e) => Err(e),
    };
    finish(action, sink, &reporter, result.map(Receipt::from))
}

async fn swap(
    State(state): State<AppState>,
    Path(comptroller): Path<String>,
    Json(request): Json<SwapRequest>,
) -> impl IntoResponse {
    let action = "swap";
    let _permit = match state.guard.begin(action) {
        Ok(permit) => permit,
        Err(e) => return ActionResponse::<Receipt>::failure(None, vec![], &e),
    };

    let sink = Arc::new(MemorySink::new());
    let reporter = StatusReporter::new(action, sink.clone());

    let result = match state.session.current().await {
        Ok(_) => state.funds.swap(&comptroller, &request, &reporter).await,
        Err(e) => Err(e),
    };
    finish(action, sink, &reporter, result.map(Receipt::from))
}

/// Close out an action: record the outcome, report terminal failures and
/// build the response envelope with the accumulated status trail.
fn finish<T: Serialize>(
    action: &str,
    sink: Arc<MemorySink>,
    reporter: &StatusReporter,
    result: OrchestratorResult<T>,
) -> (StatusCode, Json<ActionResponse<T>>) {
    match result {
        Ok(value) => {
            metrics::record_action(action, "success");
            ActionResponse::success(reporter.action_id(), sink.snapshot(), value)
        }
        Err(e) => {
            metrics::record_action(action, "failed");
            reporter.failed(e.to_string());
            ActionResponse::failure(Some(reporter.action_id()), sink.snapshot(), &e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::wallet::MockWalletGateway;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn network() -> NetworkConfig {
        NetworkConfig {
            chain_id: 11155111,
            name: "Sepolia".to_string(),
            rpc_urls: vec!["https://rpc.sepolia.org".to_string()],
            native_symbol: "ETH".to_string(),
            native_decimals: 18,
            explorer_url: "https://sepolia.etherscan.io".to_string(),
        }
    }

    fn state() -> AppState {
        let wallet: Arc<dyn crate::wallet::WalletGateway> = Arc::new(MockWalletGateway::new());
        AppState {
            session: SessionManager::new(wallet.clone(), network()),
            reader: BalanceReader::new(wallet.clone()),
            transfer: Arc::new(TransferExecutor::new(wallet.clone(), 18)),
            funds: Arc::new(FundOrchestrator::new(
                wallet,
                crate::fund::test_support::protocol_addresses(),
                &crate::fund::test_support::orchestrator_config(),
                18,
            )),
            guard: Arc::new(ActionGuard::new()),
        }
    }

    #[tokio::test]
    async fn health_endpoint_answers() {
        let app = build_router(state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn in_flight_action_conflicts() {
        let state = state();
        let _held = state.guard.begin("transfer").unwrap();

        let app = build_router(state);
        let body = serde_json::json!({
            "recipient": "0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14",
            "amount": "1",
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/transfer")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn invalid_transfer_input_is_unprocessable() {
        let app = build_router(state());
        let body = serde_json::json!({
            "recipient": "not-an-address",
            "amount": "1",
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/transfer")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(
            error_status(&OrchestratorError::InvalidInput("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            error_status(&OrchestratorError::ActionInFlight {
                action: "invest".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_status(&OrchestratorError::WrongNetwork {
                expected: 11155111,
                actual: 1
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            error_status(&OrchestratorError::RemoteRejected("revert".into())),
            StatusCode::BAD_GATEWAY
        );
    }
}
