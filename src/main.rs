use anyhow::Result;
use clap::Parser;
use parley::{
    cli::{
        handle_config_command, handle_personas_command, handle_run_command,
        handle_transcripts_command, Cli, CliCommand,
    },
    config::Config,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = cli.verbose || Config::peek().is_some_and(|config| config.logging.verbose);
    let log_level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    // Meeting text goes to stdout; keep diagnostics off it.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("Parley {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Personas) => handle_personas_command(),
        Some(CliCommand::Config(args)) => handle_config_command(args),
        Some(CliCommand::Transcripts(args)) => handle_transcripts_command(args),
        Some(CliCommand::Run(args)) => handle_run_command(args).await,
        None => handle_run_command(Default::default()).await,
    }
}
