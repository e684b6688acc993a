use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use epic_bridge_auth::{
    CachingTokenSource, JwkSet, SigningCredential, TokenClientConfig, TokenExchangeClient,
    TokenSource,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::AppConfig, gateway::FhirGateway, handlers};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: Arc<dyn TokenSource>,
    pub gateway: Arc<FhirGateway>,
    pub jwks: Arc<JwkSet>,
}

impl AppState {
    /// Loads the signing key named in `config` and wires up the clients.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let credential = SigningCredential::from_pem_file(
            config.epic.client_id.clone(),
            &config.epic.private_key_path,
        )
        .with_context(|| {
            format!(
                "failed to load signing key from {}",
                config.epic.private_key_path.display()
            )
        })?;
        Self::with_credential(config, credential)
    }

    /// Wires up the clients around an already loaded credential.
    pub fn with_credential(
        config: AppConfig,
        credential: SigningCredential,
    ) -> anyhow::Result<Self> {
        let epic = &config.epic;

        let mut credential = credential;
        if let Some(issuer) = epic.issuer.as_deref().filter(|s| !s.is_empty()) {
            credential = credential.with_issuer(issuer);
        }
        if let Some(kid) = epic.key_id.as_deref().filter(|s| !s.is_empty()) {
            credential = credential.with_key_id(kid);
        }
        let jwks = JwkSet::for_credential(&credential);
        let credential = Arc::new(credential);

        let token_config = TokenClientConfig::new(epic.token_url().map_err(|e| anyhow!(e))?)
            .with_request_timeout(epic.request_timeout);
        let client = TokenExchangeClient::new(token_config, credential.clone())?;

        let tokens: Arc<dyn TokenSource> = if epic.token_cache.enabled {
            tracing::info!(
                refresh_skew = ?epic.token_cache.refresh_skew,
                "Access token cache enabled"
            );
            Arc::new(CachingTokenSource::with_refresh_skew(
                client,
                epic.token_cache.refresh_skew,
            ))
        } else {
            Arc::new(client)
        };

        let gateway = FhirGateway::new(epic.gateway_config().map_err(|e| anyhow!(e))?)?;

        tracing::info!(
            client_id = %credential.client_id(),
            kid = %credential.key_id(),
            r4_base = %gateway.r4_base(),
            "Epic client configured"
        );

        Ok(Self {
            config: Arc::new(config),
            tokens,
            gateway: Arc::new(gateway),
            jwks: Arc::new(jwks),
        })
    }
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/.well-known/jwks.json", get(handlers::jwks))
        // Patient
        .route("/patient", get(handlers::read_default_patient))
        .route("/patient-match", post(handlers::match_patient))
        .route("/patient-search", get(handlers::search_patients))
        // Scheduling
        .route("/appointments", get(handlers::search_appointments))
        .route("/scheduled-surgery/{id}", get(handlers::scheduled_surgery))
        .route("/appointment-find", post(handlers::find_appointments))
        .route("/observation", post(handlers::create_observation))
        // Documents
        .route("/upload-url", post(handlers::upload_url))
        .route("/document/{document_id}", get(handlers::read_document))
        // Bulk data
        .route("/bulk-export", get(handlers::bulk_export))
        .route("/bulk-status", get(handlers::bulk_status))
        .route("/bulk-download", get(handlers::bulk_download))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    // Path only: query strings carry patient identifiers.
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub struct EpicBridgeServer {
    addr: SocketAddr,
    app: Router,
}

#[derive(Default)]
pub struct ServerBuilder {
    config: AppConfig,
    credential: Option<SigningCredential>,
    addr: Option<SocketAddr>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Uses `credential` instead of reading `epic.private_key_path`.
    pub fn with_credential(mut self, credential: SigningCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    pub fn build(self) -> anyhow::Result<EpicBridgeServer> {
        let addr = match self.addr {
            Some(addr) => addr,
            None => self.config.addr().map_err(|e| anyhow!(e))?,
        };
        let state = match self.credential {
            Some(credential) => AppState::with_credential(self.config, credential)?,
            None => AppState::from_config(self.config)?,
        };

        Ok(EpicBridgeServer {
            addr,
            app: build_app(state),
        })
    }
}

impl EpicBridgeServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until Ctrl-C.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!("listening on {}", listener.local_addr()?);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
