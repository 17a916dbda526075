use crate::config::Config;
use crate::global;
use crate::llm::{OpenAiGenerator, TextGenerator};
use crate::meeting::{
    CtrlCInterrupts, HumanInput, MeetingMachine, MeetingOptions, MeetingOutcome, MeetingServices,
    MeetingSettings, PostMeetingHook, ShellCommandHook,
};
use crate::personas::PersonaDirectory;
use crate::ui::{TerminalInput, TerminalRenderer};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::meeting::meeting_machine::DEFAULT_HUMAN_NAME;

/// Wire the terminal, the configured model and the persona directory into a
/// meeting and run it to completion.
pub async fn run_meeting(
    config: Config,
    options: MeetingOptions,
    observe: bool,
) -> Result<MeetingOutcome> {
    info!("Starting meeting");

    let generator: Arc<dyn TextGenerator> =
        Arc::new(OpenAiGenerator::new(&config.llm, config.logging)?);
    info!("Using {} ({})", generator.name(), config.llm.model);

    let personas = PersonaDirectory::load_or_builtin(&global::personas_file()?)?;

    let human: Option<Arc<dyn HumanInput>> = if observe {
        None
    } else {
        let name = options
            .human_name
            .clone()
            .unwrap_or_else(|| DEFAULT_HUMAN_NAME.to_string());
        Some(Arc::new(TerminalInput::new(name)))
    };

    let services = MeetingServices {
        generator,
        interrupts: Arc::new(CtrlCInterrupts::install()),
        human,
        sink: Arc::new(TerminalRenderer::new()),
        hook: build_hook(&config),
    };

    let settings = MeetingSettings {
        transcript_dir: config.meeting.transcript_dir()?,
        meeting: config.meeting,
        max_tokens: config.llm.max_tokens,
        logging: config.logging,
    };

    let mut machine = MeetingMachine::new(services, &personas, settings)?;
    machine.run(options).await
}

fn build_hook(config: &Config) -> Option<Box<dyn PostMeetingHook>> {
    let command = config.meeting.post_command.trim();
    if command.is_empty() {
        return None;
    }
    Some(Box::new(ShellCommandHook::new(
        command.to_string(),
        config.meeting.post_command_timeout_seconds,
    )))
}
