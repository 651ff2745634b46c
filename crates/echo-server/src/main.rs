use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use echo_ai::EchoAi;
use echo_ai::config::AiConfig;
use echo_api::state::AppStateInner;
use echo_gateway::Projector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "echo_server=debug,echo_api=debug,echo_ai=info,echo_gateway=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    // Config
    let db_path = std::env::var("ECHO_DB_PATH").unwrap_or_else(|_| "echo-vault.db".into());
    let host = std::env::var("ECHO_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("ECHO_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let db = Arc::new(echo_db::Database::open(&PathBuf::from(&db_path))?);
    let ai = EchoAi::from_config(&AiConfig::from_env())?;
    let projector = Projector::new(db.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(projector);

    let app = Router::new()
        .merge(echo_api::router(AppStateInner::new(db, ai)))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Echo Vault listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(projector): State<Projector>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| echo_gateway::handle_connection(socket, projector))
}
