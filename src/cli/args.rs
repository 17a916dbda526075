use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Simulated meetings between AI personas, with you in the room", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run a meeting (default when no subcommand is given)
    Run(RunCliArgs),
    /// List the personas available as participants
    Personas,
    /// Show configuration
    Config(ConfigCliArgs),
    /// List saved meeting transcripts
    Transcripts(TranscriptsCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug, Default)]
pub struct RunCliArgs {
    /// Agenda item (repeat for several items, in order)
    #[arg(short, long = "agenda", value_name = "ITEM")]
    pub agenda: Vec<String>,
    /// Meeting title (defaults to the first agenda item)
    #[arg(short, long)]
    pub title: Option<String>,
    /// Comma-separated persona ids; skips the moderator's own choice
    #[arg(short, long, value_delimiter = ',')]
    pub participants: Option<Vec<String>>,
    /// Watch only: no human turns, Ctrl-C ends the meeting
    #[arg(long)]
    pub observe: bool,
    /// Your display name in the meeting
    #[arg(long)]
    pub name: Option<String>,
    /// Seed for speaker selection
    #[arg(long)]
    pub seed: Option<u64>,
    /// Skip participant self-introductions
    #[arg(long)]
    pub no_introductions: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ConfigCliArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration (API key masked)
    Show,
    /// Print the configuration file path
    Path,
}

#[derive(ClapArgs, Debug)]
pub struct TranscriptsCliArgs {
    /// Maximum number of transcripts to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}
