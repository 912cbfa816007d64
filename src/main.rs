use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use voxnote::cli::{handle_record_command, handle_serve_command, Cli, CliCommand};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("voxnote {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Record(args)) => handle_record_command(args).await,
        Some(CliCommand::Serve(args)) => handle_serve_command(args).await,
        None => handle_serve_command(Default::default()).await,
    }
}
