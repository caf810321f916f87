use crate::config::{ApiConfig, Config, TlsConfig};
use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Request, State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use loggate_core::{
    AUTH_CHALLENGE, AuthDecision, Authenticator, BackendBuilder, CheckinOperation,
    CheckinOperationRequest, GateError, IngestOperation, IngestOperationOutcome,
    IngestOperationRequest, Result, SqliteCredentialStore, TransferResult,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const DIGEST_HEADER: &str = "digest";

pub struct ServerState {
    pub authenticator: Authenticator,
    pub ingest: IngestOperation,
    pub checkin: CheckinOperation,
}

impl ServerState {
    pub fn new(authenticator: Authenticator, ingest: IngestOperation) -> Self {
        Self {
            authenticator,
            ingest,
            checkin: CheckinOperation::new(),
        }
    }
}

/// Identity approved by the basic-auth middleware for this request.
#[derive(Debug, Clone)]
pub struct AuthenticatedLogger(pub String);

pub async fn run_server(config: Config) -> Result<()> {
    let store = Arc::new(SqliteCredentialStore::new(&config.db.connection)?);
    tracing::info!("Credential store at {:?}", config.db.connection);

    let authenticator = Authenticator::new(store)?;

    let backend = BackendBuilder::new()
        .provider(config.cloud.provider)
        .params(config.aws.clone())
        .build_configured()
        .await?;
    let ingest = IngestOperation::new(backend, config.aws.clone());

    let state = Arc::new(ServerState::new(authenticator, ingest));
    let app = build_router(state, &config.api);

    let bind_addr = config.api.bind_addr();
    let addr: SocketAddr = bind_addr.parse().map_err(|e| {
        GateError::Config(format!("invalid bind address {}: {}", bind_addr, e))
    })?;

    if config.tls.enabled {
        run_https_server(addr, app, &config.tls).await
    } else {
        tracing::warn!("TLS is disabled; credentials will cross the network in the clear");
        run_http_server(addr, app).await
    }
}

pub fn build_router(state: Arc<ServerState>, api: &ApiConfig) -> Router {
    let authenticated = Router::new()
        .route("/checkin", post(status_update))
        .route("/update", post(file_transfer))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            basic_auth_middleware,
        ));

    Router::new()
        .route("/", get(syntax))
        .merge(authenticated)
        .layer(DefaultBodyLimit::max(api.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            api.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn run_http_server(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn run_https_server(addr: SocketAddr, app: Router, tls: &TlsConfig) -> Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    // object_store and axum-server enable different rustls providers.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    tracing::info!("Loading TLS certificate from {:?}", tls.cert_file);
    tracing::info!("Loading TLS private key from {:?}", tls.key_file);
    let rustls_config = RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
        .await
        .map_err(|e| GateError::Config(format!("failed to load TLS certificate and key: {}", e)))?;

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(30)));
    });

    tracing::info!("Server listening on https://{}", addr);
    axum_server::bind_rustls(addr, rustls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", error);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("Failed to install SIGTERM handler: {}", error);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received terminate signal, starting graceful shutdown"),
    }
}

async fn basic_auth_middleware(
    State(state): State<Arc<ServerState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    match state
        .authenticator
        .authenticate(authorization.as_deref())
        .await
    {
        AuthDecision::Approved(identity) => {
            request.extensions_mut().insert(AuthenticatedLogger(identity));
            next.run(request).await
        }
        AuthDecision::Denied => (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, AUTH_CHALLENGE)],
            "Unauthorized\n",
        )
            .into_response(),
    }
}

async fn syntax() -> &'static str {
    "checkin\nupdate\n"
}

async fn status_update(
    State(state): State<Arc<ServerState>>,
    Extension(AuthenticatedLogger(identity)): Extension<AuthenticatedLogger>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::error!("failed to read status update body: {}", rejection);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match state.checkin.run(CheckinOperationRequest { identity, body }) {
        Ok(_) => StatusCode::OK.into_response(),
        Err(error) => status_of(&error).into_response(),
    }
}

async fn file_transfer(
    State(state): State<Arc<ServerState>>,
    Extension(AuthenticatedLogger(identity)): Extension<AuthenticatedLogger>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::error!("failed to read file body from logger {}: {}", identity, rejection);
            return transfer_response(StatusCode::BAD_REQUEST, TransferResult::failure());
        }
    };

    let digest_header = headers
        .get(DIGEST_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let request = IngestOperationRequest {
        identity,
        body,
        digest_header,
    };

    match state.ingest.run(request).await {
        Ok(outcome @ IngestOperationOutcome::Malformed(_)) => {
            transfer_response(StatusCode::BAD_REQUEST, TransferResult::from(&outcome))
        }
        Ok(outcome) => transfer_response(StatusCode::OK, TransferResult::from(&outcome)),
        Err(error) => transfer_response(status_of(&error), TransferResult::failure()),
    }
}

fn status_of(error: &GateError) -> StatusCode {
    StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn transfer_response(status: StatusCode, result: TransferResult) -> Response {
    (status, Json(result)).into_response()
}
