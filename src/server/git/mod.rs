pub mod auth;
pub mod handlers;
pub mod process;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::ServerState;

pub fn git_router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/{namespace}/{repo}/info/refs", get(handlers::info_refs))
        .route(
            "/{namespace}/{repo}/git-upload-pack",
            post(handlers::upload_pack),
        )
        .route(
            "/{namespace}/{repo}/git-receive-pack",
            post(handlers::receive_pack),
        )
        .nest(
            "/{namespace}/{repo}/info/lfs",
            crate::server::lfs::lfs_router(),
        )
}
