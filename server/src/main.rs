use clap::Parser;
use env_logger::Env;
use log::{error, info};
use server::config::{ServerArgs, ServerConfig};
use server::network::{Server, ServerMessage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = ServerArgs::parse();
    let config = ServerConfig::from_args(args)?;

    info!("Starting server on {}", config.bind_addr);
    info!(
        "Max clients: {}, client timeout: {:?}",
        config.max_clients, config.client_timeout
    );

    let mut server = Server::new(config).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully...");
                let _ = shutdown.send(ServerMessage::Shutdown);
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    server.run().await?;

    Ok(())
}
