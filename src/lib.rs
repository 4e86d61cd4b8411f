//! # Ephemeral
//!
//! A self-hosted Git server: smart HTTP transport, Git LFS, and a JSON API,
//! multi-tenanted across namespaces with token auth and an allow/deny
//! permission model. Usable as a standalone binary or as a library.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use ephemeral::config::ServerConfig;
//! use ephemeral::server::{ServerState, create_router};
//! use ephemeral::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::default();
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(ServerState::new(Arc::new(store), &config));
//! let router = create_router(state);
//! // Serve with axum...
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod lfs;
pub mod server;
pub mod store;
pub mod types;
