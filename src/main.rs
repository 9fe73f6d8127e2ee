use clap::Parser;
use gmailmd::app::{initialize_app, run_command};
use gmailmd::cli::{handle_keyring_clear, Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.clear_keyring {
        handle_keyring_clear().await?;
        return Ok(());
    }

    let command = cli.command.clone().unwrap_or(Command::Login);
    let config = cli.config();

    let ctx = match initialize_app(&config).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Application initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run_command(ctx, command).await {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
