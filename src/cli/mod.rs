use crate::app;
use crate::config::Config;
use crate::global;
use crate::meeting::MeetingOptions;
use crate::personas::PersonaDirectory;
use crate::transcript;
use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Input};
use std::io::{self, IsTerminal};
use tracing::info;

pub mod args;

pub use args::{
    Cli, CliCommand, ConfigCliArgs, ConfigCommand, RunCliArgs, TranscriptsCliArgs,
};

pub async fn handle_run_command(args: RunCliArgs) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(seed) = args.seed {
        config.meeting.seed = Some(seed);
    }
    if args.no_introductions {
        config.meeting.introductions = false;
    }

    let mut agenda = split_agenda(&args.agenda);
    if agenda.is_empty() && io::stdin().is_terminal() {
        agenda = prompt_agenda()?;
    }

    let options = MeetingOptions {
        title: args.title,
        agenda,
        participants: args.participants,
        human_name: args.name,
    };

    let outcome = app::run_meeting(config, options, args.observe).await?;

    println!();
    println!(
        "Meeting '{}' finished: {} turns{}",
        outcome.record.title,
        outcome.record.turns.len(),
        if outcome.record.concluded_early {
            " (ended early)"
        } else {
            ""
        }
    );
    println!("Transcript: {}", outcome.transcript_path.display());
    Ok(())
}

/// Flag values may themselves be comma separated.
fn split_agenda(items: &[String]) -> Vec<String> {
    items
        .iter()
        .flat_map(|item| item.split(','))
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn prompt_agenda() -> Result<Vec<String>> {
    let theme = ColorfulTheme::default();
    let value: String = Input::with_theme(&theme)
        .with_prompt("Agenda items (comma separated)")
        .allow_empty(true)
        .interact_text()?;
    Ok(split_agenda(&[value]))
}

pub fn handle_personas_command() -> Result<()> {
    let path = global::personas_file()?;
    let directory = PersonaDirectory::load_or_builtin(&path)?;

    println!("{} persona(s):\n", directory.all().len());
    for persona in directory.all() {
        let marker = if persona.moderator { " [moderator]" } else { "" };
        println!("{:<12} {} ({}){}", persona.id, persona.name, persona.role, marker);
    }

    if !path.exists() {
        println!("\nAdd your own personas in {}", path.display());
    }
    Ok(())
}

pub fn handle_config_command(args: ConfigCliArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let mut config = Config::load()?;
            let has_key = config.llm.resolved_api_key().is_some();
            if config.llm.api_key.is_some() {
                config.llm.api_key = Some("********".to_string());
            }
            println!("{}", toml::to_string_pretty(&config)?);
            if !has_key {
                println!("# No API key configured; set [llm].api_key or OPENAI_API_KEY");
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::config_path()?.display());
        }
    }
    Ok(())
}

pub fn handle_transcripts_command(args: TranscriptsCliArgs) -> Result<()> {
    let dir = match Config::peek() {
        Some(config) => config.meeting.transcript_dir()?,
        None => global::transcripts_dir()?,
    };
    info!("Listing transcripts in {:?}", dir);

    let entries = transcript::list_transcripts(&dir, args.limit)?;
    if entries.is_empty() {
        println!("No transcripts found in {}", dir.display());
        return Ok(());
    }

    println!("Found {} transcript(s):\n", entries.len());
    for entry in entries {
        println!("Title: {}", entry.title);
        println!("Date: {}", entry.modified.format("%Y-%m-%d %H:%M"));
        println!("Path: {}", entry.path.display());
        println!("---");
    }
    Ok(())
}
