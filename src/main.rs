//! device-auth CLI binary entry point.

use device_auth::cli::{Cli, Commands};
use device_auth::config::DeviceAuthConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_tracing(cli.log_level.as_deref());

    let result = run(cli).await;
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(level: Option<&str>) {
    let directive = level
        .map(str::to_string)
        .or_else(|| std::env::var("DEVICE_AUTH_LOG").ok());
    let filter = match directive {
        Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> device_auth::error::Result<()> {
    let mut config = DeviceAuthConfig::resolve(cli.config.as_deref())?;
    if let Some(profile) = cli.profile {
        config.profile = profile;
    }

    match cli.command {
        Commands::Login(args) => device_auth::cli::auth::handle_login(&config, args.open).await,
        Commands::Status(args) => device_auth::cli::auth::handle_status(&config, args.json).await,
        Commands::Logout => device_auth::cli::auth::handle_logout(&config).await,
        Commands::Token => device_auth::cli::auth::handle_token(&config).await,
    }
}
