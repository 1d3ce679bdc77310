//! KripTik CLI entry point.

use clap::Parser;

use kriptik::cli::{commands, handle_error, Cli, Commands};
use kriptik::infrastructure::config::ConfigLoader;
use kriptik::infrastructure::logging::{prune_old_logs, LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Console logs only when RUST_LOG asks for them; files follow config.
    let _logger = match ConfigLoader::load() {
        Ok(config) => {
            let mut log_config = LogConfig::from(&config.logging);
            log_config.enable_console = std::env::var_os("RUST_LOG").is_some();
            if let Some(dir) = &log_config.log_dir {
                if let Err(err) = prune_old_logs(dir, log_config.retention_days).await {
                    eprintln!("warning: log retention failed: {err:#}");
                }
            }
            LoggerImpl::init(&log_config).ok()
        }
        Err(_) => None,
    };

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, cli.json).await,
        Commands::Report(args) => commands::report::execute(args, cli.json).await,
        Commands::Config(args) => commands::config::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
