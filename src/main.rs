use clap::Parser;
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use orderpulse::cli::{Cli, Commands, WatchCliConfig};
use orderpulse::commands::run_watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!(
            "orderpulse={0},notifications={0},warn",
            cli.verbose
        )));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Watch {
            user,
            endpoint,
            api,
            token,
            poll_interval,
            heartbeat_interval,
            heartbeat_timeout,
            max_attempts,
            health_port,
            restaurants,
        } => {
            let config = WatchCliConfig {
                user,
                endpoint,
                api,
                token,
                poll_interval,
                heartbeat_interval,
                heartbeat_timeout,
                max_attempts,
                health_port,
                restaurants,
            };
            run_watch(config).await?;
        }
    }

    Ok(())
}
