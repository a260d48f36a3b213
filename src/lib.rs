//! Rendezvous file relay.
//!
//! A sharer connects to `/ws` and gets a fresh room key back; receivers join
//! with `?key=<KEY>`, see the file list and pull files by 1-based index.
//! Everything lives in process memory.

pub mod config;
pub mod error;
pub mod protocol;
pub mod room;
pub mod routes;
pub mod state;
pub mod utils {
    pub mod clean;
    pub mod keygen;
}

use std::sync::Arc;

use axum::{Extension, Router};
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{config::Config, error::AppResult, state::RoomRegistry, utils::clean};

/// The upgrade request carries no body worth keeping.
const UPGRADE_BODY_LIMIT: usize = 16 * 1024;

pub fn app(rooms: RoomRegistry, cfg: Arc<Config>) -> Router {
    routes::router()
        .layer(Extension(rooms))
        .layer(Extension(cfg))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(UPGRADE_BODY_LIMIT))
}

/// Serves until the listener fails. Starts the room sweeper when a TTL is set.
pub async fn serve(listener: TcpListener, rooms: RoomRegistry, cfg: Config) -> AppResult<()> {
    if let Some(ttl) = cfg.room_ttl {
        tokio::spawn(clean::task(rooms.clone(), ttl, cfg.sweep_interval));
    }
    axum::serve(listener, app(rooms, Arc::new(cfg)).into_make_service()).await?;
    Ok(())
}
