use std::fs;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use ephemeral::auth::{TokenGenerator, provision};
use ephemeral::config::ServerConfig;
use ephemeral::server::{ServerState, create_router};
use ephemeral::store::{SqliteStore, Store};

#[cfg(unix)]
fn set_restrictive_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("failed to set permissions on {}: {e}", path.display());
    }
}

/// First run: mint the admin token, print it once, and drop a copy next to
/// the database for operators that lose the terminal output.
fn bootstrap_admin_token(store: &SqliteStore, data_dir: &std::path::Path) -> anyhow::Result<()> {
    if store.has_admin_token()? {
        return Ok(());
    }

    let generator = TokenGenerator::new();
    let (_token, raw_token) = provision::generate_admin_token(store, &generator, None)?;

    let token_file = data_dir.join(".admin_token");
    fs::write(&token_file, &raw_token)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    println!("\n----------------------------------------");
    println!("Admin token (shown once, save it now):\n");
    println!("  {raw_token}\n");
    println!("A copy was written to {}", token_file.display());
    println!("----------------------------------------\n");

    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ephemeral=info".parse()?))
        .init();

    let config = ServerConfig::load()?;
    run_server(config)
}

#[tokio::main]
async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    fs::create_dir_all(&config.data_dir)?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    bootstrap_admin_token(&store, &config.data_dir)?;

    let state = Arc::new(ServerState::new(Arc::new(store), &config));
    let app = create_router(state);

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
