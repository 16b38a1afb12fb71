use anyhow::Result;
use log::info;

use export_bipartite::env_loader;
use export_bipartite::server;

#[tokio::main]
async fn main() -> Result<()> {
    env_loader::load_env();
    env_logger::init();

    let data_dir = env_loader::data_dir();
    let port = env_loader::server_port();
    info!(
        "Starting graph API server on port {} (data dir: {})",
        port,
        data_dir.display()
    );
    info!("API endpoint: http://localhost:{}/api/graph", port);

    let app = server::build_router(data_dir);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
