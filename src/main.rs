use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use payslip::api::run_http_server;
use payslip::rules::{HttpRuleSource, ProviderConfig, RuleSetProvider};

#[derive(Parser, Debug)]
#[command(
    name = "payslip",
    about = "Salary tax breakdown engine (progressive slabs, regimes, withholding schedule)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long, help = "Base URL serving <fiscalYear>.json rule documents")]
        rules_url: Option<String>,
        #[arg(long, help = "Directory for resolved-ruleset audit snapshots")]
        snapshot_dir: Option<PathBuf>,
        #[arg(long, default_value_t = 7, help = "Ruleset cache TTL in days")]
        cache_ttl_days: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            port,
            rules_url,
            snapshot_dir,
            cache_ttl_days,
        } => {
            let remote = match rules_url {
                Some(url) => match HttpRuleSource::new(url) {
                    Ok(source) => Some(source),
                    Err(e) => {
                        eprintln!("Invalid rules URL: {e}");
                        std::process::exit(1);
                    }
                },
                None => None,
            };
            let config = ProviderConfig {
                ttl: std::time::Duration::from_secs(cache_ttl_days * 24 * 60 * 60),
                snapshot_dir,
            };
            let provider = Arc::new(RuleSetProvider::new(remote, config));

            if let Err(e) = run_http_server(port, provider).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
    }
}
