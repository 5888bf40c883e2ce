//! `jsoncmd serve`: Start the jsoncmd HTTP server.

use jsoncmd_core::DispatchConfig;

pub async fn run(
    host: String,
    port: u16,
    prefix: String,
    dispatch: DispatchConfig,
) -> Result<(), String> {
    let config = jsoncmd_server::ServerConfig {
        host: host.clone(),
        port,
        prefix,
        dispatch,
    };

    println!("Starting jsoncmd server on {}:{}...", host, port);

    let mount = config.mount_prefix().unwrap_or_default();
    let addr = jsoncmd_server::start_server(config).await?;
    println!("jsoncmd server listening on http://{}", addr);
    println!("Commands: http://{}{}/<target>/<operation>", addr, mount);

    // Keep the process running until interrupted
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    tracing::info!("[Server] Ctrl+C received, shutting down");
    println!("\nShutting down...");
    Ok(())
}
