use clap::Parser;
use client::config::{ClientArgs, ClientConfig};
use client::input::ScriptedControls;
use client::network::Client;
use env_logger::Env;
use log::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = ClientArgs::parse();
    let config = ClientConfig::from_args(args)?;

    info!("Starting client...");
    info!("Connecting to: {}", config.server_addr);
    if !config.fake_ping.is_zero() {
        info!("Simulating {:?} latency", config.fake_ping);
    }
    if config.packet_loss > 0.0 {
        info!("Simulating {:.0}% upstream loss", config.packet_loss * 100.0);
    }

    let controls = Box::new(ScriptedControls::new(config.seed));
    let mut client = Client::new(config, controls).await?;

    client.run().await?;

    Ok(())
}
