mod api;
mod startup;
mod state;

use statuswatch_status::{McStatusClient, StatusSource};
use statuswatch_tracker::render;

fn load_config() -> statuswatch_core::Config {
    statuswatch_core::config::load_dotenv();
    statuswatch_core::Config::from_env()
}

/// One-shot status lookup, printed to stdout. No job is created and no
/// Discord credentials are needed.
async fn status(config: &statuswatch_core::Config, address: &str) -> anyhow::Result<()> {
    let client = McStatusClient::from_config(&config.status_api);
    let snapshot = client.fetch(address).await?;

    println!("{}", render::server_status_text(address, &snapshot));
    println!("{}", render::motd_text(&snapshot));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let config = load_config();
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            startup::serve(config).await?;
        }
        Some("status") => {
            let address = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("Usage: statuswatch status <server-address>"))?;
            status(&config, address).await?;
        }
        _ => {
            println!("statuswatch v{}", env!("CARGO_PKG_VERSION"));
            println!("Usage: statuswatch <command>");
            println!("  serve                     Recover persisted jobs and start the API");
            println!("  status <server-address>   One-shot status/MOTD lookup");
        }
    }

    Ok(())
}
