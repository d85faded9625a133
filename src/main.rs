mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use mediafetch::config::Config;
use mediafetch::observability;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let mut config = Config::load_with(args.config)?;
            observability::init_tracing(&config.telemetry.log_filter);
            if let Some(address) = args.address {
                config.server.bind_addr = address;
            }
            mediafetch::api::run(config).await?;
        }
        Commands::Config(args) => {
            let config = Config::load_with(args.config)?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
