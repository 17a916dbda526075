//! Meeting lifecycle orchestrator.
//!
//! Runs one meeting end to end:
//! roster → welcome → introductions → discussion rounds → closing → summary
//! → transcript → hook
//!
//! All dependencies are injected via constructor; no concrete clients are
//! created here.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{LoggingConfig, MeetingConfig};
use crate::llm::{GenerationRequest, RequestKind, TextGenerator};
use crate::personas::PersonaDirectory;
use crate::transcript;

use super::agenda::{AgendaStateMachine, Progression};
use super::conversation::{ConversationLog, Turn};
use super::interrupt::{HumanInput, InterruptSource, InterruptionController, TurnOutcome, TurnSink};
use super::moderator::{Moderator, MIN_PARTICIPANTS};
use super::participant::{Participant, ParticipantId};
use super::post_meeting_hook::{MeetingResult, PostMeetingHook};
use super::prompts;
use super::random::{source_for, RandomSource};
use super::retry::RetryPolicy;
use super::selector::SpeakerSelector;
use super::status::MeetingPhase;
use super::urgency::{Candidate, UrgencyEvaluator};

/// Turns of history each speaker sees when replying.
pub const HISTORY_WINDOW: usize = 20;

pub const DEFAULT_HUMAN_NAME: &str = "You";

/// Collaborators the machine talks to.
pub struct MeetingServices {
    pub generator: Arc<dyn TextGenerator>,
    pub interrupts: Arc<dyn InterruptSource>,
    /// `None` runs an agents-only meeting.
    pub human: Option<Arc<dyn HumanInput>>,
    pub sink: Arc<dyn TurnSink>,
    pub hook: Option<Box<dyn PostMeetingHook>>,
}

#[derive(Debug, Clone)]
pub struct MeetingSettings {
    pub meeting: MeetingConfig,
    /// Token budget for a spoken turn.
    pub max_tokens: u32,
    pub logging: LoggingConfig,
    pub transcript_dir: PathBuf,
}

/// Per-run choices.
#[derive(Debug, Clone, Default)]
pub struct MeetingOptions {
    pub title: Option<String>,
    pub agenda: Vec<String>,
    /// Explicit roster by persona id; skips the moderator's selection.
    pub participants: Option<Vec<String>>,
    pub human_name: Option<String>,
}

/// Everything that happened in one meeting.
#[derive(Debug, Clone)]
pub struct MeetingRecord {
    pub title: String,
    pub agenda: Vec<String>,
    pub roster: Vec<Participant>,
    pub human_name: Option<String>,
    pub turns: Vec<Turn>,
    pub summary: String,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
    pub concluded_early: bool,
}

pub struct MeetingOutcome {
    pub record: MeetingRecord,
    pub transcript_path: PathBuf,
}

pub struct MeetingMachine {
    generator: Arc<dyn TextGenerator>,
    moderator: Moderator,
    directory: Vec<Participant>,
    urgency: UrgencyEvaluator,
    selector: SpeakerSelector<Box<dyn RandomSource>>,
    controller: InterruptionController,
    hook: Option<Box<dyn PostMeetingHook>>,
    settings: MeetingSettings,
}

impl MeetingMachine {
    pub fn new(
        services: MeetingServices,
        personas: &PersonaDirectory,
        settings: MeetingSettings,
    ) -> Result<Self> {
        let retry = RetryPolicy::new(settings.meeting.retry_delay());

        let moderator = Moderator::new(
            Participant::from(personas.moderator()),
            Arc::clone(&services.generator),
            retry,
            settings.max_tokens,
            settings.logging,
        )?;

        let directory: Vec<Participant> = personas
            .candidates()
            .into_iter()
            .map(Participant::from)
            .collect();

        let urgency = UrgencyEvaluator::new(
            Arc::clone(&services.generator),
            retry,
            settings.meeting.urgency_window,
        )
        .context("Failed to build urgency parser")?;

        let selector = SpeakerSelector::new(source_for(settings.meeting.seed))
            .with_top_k(settings.meeting.top_k)
            .with_direct_pick_probability(settings.meeting.direct_pick_probability);

        let controller =
            InterruptionController::new(services.interrupts, services.human, services.sink, retry);

        Ok(Self {
            generator: services.generator,
            moderator,
            directory,
            urgency,
            selector,
            controller,
            hook: services.hook,
            settings,
        })
    }

    /// Run a full meeting, write its transcript and fire the hook.
    pub async fn run(&mut self, options: MeetingOptions) -> Result<MeetingOutcome> {
        let record = self.hold(options).await?;

        let transcript_path =
            transcript::write_transcript(&self.settings.transcript_dir, &record)?;
        info!("Transcript saved: {:?}", transcript_path);

        if let Some(hook) = &self.hook {
            let result = MeetingResult {
                title: record.title.clone(),
                agenda: record.agenda.clone(),
                turn_count: record.turns.len(),
                transcript_path: transcript_path.clone(),
                transcript_text: transcript::render_markdown(&record),
            };
            if let Err(e) = hook.execute(&result).await {
                warn!("Post-meeting hook failed: {}", e);
            }
        }

        Ok(MeetingOutcome {
            record,
            transcript_path,
        })
    }

    /// Run the meeting itself, from roster selection to summary.
    pub async fn hold(&mut self, options: MeetingOptions) -> Result<MeetingRecord> {
        let started_at = Local::now();
        let mut agenda = AgendaStateMachine::new(options.agenda)?;
        let title = options
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| default_title(agenda.items()));

        let roster = self
            .choose_roster(agenda.items(), options.participants.as_deref())
            .await?;

        let human_name = self.controller.has_human().then(|| {
            options
                .human_name
                .unwrap_or_else(|| DEFAULT_HUMAN_NAME.to_string())
        });

        let mut everyone = vec![self.moderator.participant().clone()];
        everyone.extend(roster.iter().cloned());
        let mut log = ConversationLog::new(
            everyone,
            human_name.clone().unwrap_or_else(|| DEFAULT_HUMAN_NAME.to_string()),
        );

        agenda.finalize_roster()?;
        info!(
            "Meeting '{}' starting with {} participants, {} agenda items",
            title,
            roster.len(),
            agenda.items().len()
        );

        let mut ended_early = !self
            .introductions(&mut log, &agenda, &roster, human_name.as_deref())
            .await;

        if ended_early {
            agenda.conclude_early()?;
        } else {
            agenda.begin_discussion()?;
            ended_early = !self.discuss(&mut log, &mut agenda).await?;
        }

        self.conclude(&mut log, agenda.items(), ended_early).await;
        let summary = self.moderator.summarize(agenda.items(), log.turns()).await;

        Ok(MeetingRecord {
            title,
            agenda: agenda.items().to_vec(),
            roster,
            human_name,
            turns: log.turns().to_vec(),
            summary,
            started_at,
            ended_at: Local::now(),
            concluded_early: ended_early,
        })
    }

    async fn choose_roster(
        &mut self,
        agenda: &[String],
        requested: Option<&[String]>,
    ) -> Result<Vec<Participant>> {
        let Some(ids) = requested else {
            let rng = &mut **self.selector.rng_mut();
            return Ok(self
                .moderator
                .select_participants(
                    agenda,
                    &self.directory,
                    self.settings.meeting.max_participants,
                    rng,
                )
                .await);
        };

        let mut roster: Vec<Participant> = Vec::new();
        for id in ids {
            let id = ParticipantId::new(id.trim());
            let Some(participant) = self.directory.iter().find(|p| p.id == id) else {
                bail!(
                    "Unknown participant '{}'. Run `parley personas` to list them.",
                    id
                );
            };
            if !roster.iter().any(|p| p.id == id) {
                roster.push(participant.clone());
            }
        }

        if roster.len() < MIN_PARTICIPANTS {
            bail!("A meeting needs at least {} participants", MIN_PARTICIPANTS);
        }
        Ok(roster)
    }

    /// Welcome, self-introductions and the opening of item one. Returns
    /// `false` when the human ended the meeting.
    async fn introductions(
        &self,
        log: &mut ConversationLog,
        agenda: &AgendaStateMachine,
        roster: &[Participant],
        human_name: Option<&str>,
    ) -> bool {
        let moderator = self.moderator.participant().clone();

        let welcome = self.moderator.welcome_request(agenda.items(), roster, human_name);
        if !self.speak(log, &moderator, welcome, None).await {
            return false;
        }

        if self.settings.meeting.introductions {
            for participant in roster {
                let request = GenerationRequest::new(
                    RequestKind::Introduction,
                    prompts::introduction_system(participant, agenda.items()),
                    self.settings.max_tokens,
                )
                .with_messages(prompts::history_for(
                    Some(&participant.id),
                    log.recent(HISTORY_WINDOW),
                ));
                if !self.speak(log, participant, request, None).await {
                    return false;
                }
            }
        }

        let first = agenda.items()[0].as_str();
        let open = self
            .moderator
            .open_item_request(first, 0, agenda.items().len());
        self.speak(log, &moderator, open, Some(0)).await
    }

    /// Discussion rounds until the agenda runs out. Returns `false` when the
    /// meeting ended early.
    async fn discuss(
        &mut self,
        log: &mut ConversationLog,
        agenda: &mut AgendaStateMachine,
    ) -> Result<bool> {
        let interval = self.settings.meeting.human_turn_interval;

        while !agenda.is_concluded() {
            if self.controller.end_requested() {
                info!("Early end requested");
                agenda.conclude_early()?;
                return Ok(false);
            }

            if self.controller.has_human() && interval > 0 && log.rounds_since_human() >= interval {
                let outcome = self
                    .controller
                    .prompt_human(
                        log,
                        agenda.turn_index(),
                        "Your turn (Enter to pass, 'end meeting' to finish)",
                    )
                    .await;
                if outcome == TurnOutcome::EndRequested {
                    agenda.conclude_early()?;
                    return Ok(false);
                }
                if outcome == TurnOutcome::HumanSpoke {
                    continue;
                }
            }

            if agenda.check_progression(log, &self.moderator).await {
                let from_label = agenda.current_label().unwrap_or_default().to_string();
                match agenda.advance()? {
                    Progression::Concluded => {
                        self.controller.sink().notice("All agenda items covered");
                        return Ok(true);
                    }
                    Progression::Advanced { from, to } => {
                        let next = agenda.items()[to].clone();
                        self.controller.sink().notice(&format!(
                            "Agenda item {} of {}: {}",
                            to + 1,
                            agenda.items().len(),
                            next
                        ));
                        let previous: Vec<Turn> =
                            log.turns_for_agenda(from).into_iter().cloned().collect();
                        let start = previous.len().saturating_sub(HISTORY_WINDOW);
                        let request = self.moderator.transition_request(
                            &from_label,
                            &next,
                            to,
                            agenda.items().len(),
                            &previous[start..],
                        );
                        let moderator = self.moderator.participant().clone();
                        if !self.speak(log, &moderator, request, Some(to)).await {
                            agenda.conclude_early()?;
                            return Ok(false);
                        }
                        continue;
                    }
                }
            }

            if !self.round(log, agenda).await {
                agenda.conclude_early()?;
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Score, select and hear one speaker. Returns `false` to end the meeting.
    async fn round(&mut self, log: &mut ConversationLog, agenda: &AgendaStateMachine) -> bool {
        let Some(label) = agenda.current_label().map(str::to_string) else {
            return true;
        };
        let restricted = log.restricted(agenda.phase());
        let window = self.urgency.window();

        let candidates: Vec<Candidate> = log
            .participants()
            .iter()
            .filter(|state| !state.is_moderator() && Some(state.id()) != restricted.as_ref())
            .map(|state| Candidate {
                participant: state.participant.clone(),
                turns_since_spoken: state.turns_since_spoken,
            })
            .collect();

        let mut scores = self
            .urgency
            .evaluate_all(candidates, log.recent(window), &label)
            .await;
        if let Some(id) = &restricted {
            scores.insert(id.clone(), 0.0);
        }

        let selection = self
            .selector
            .select(
                &scores,
                log.participants(),
                log.recent(window),
                restricted.as_ref(),
                &self.moderator,
            )
            .await;

        let Some(selection) = selection else {
            error!("No participant available to speak");
            return false;
        };

        let Some(speaker) = log
            .participant(&selection.speaker)
            .map(|state| state.participant.clone())
        else {
            error!("Selected unknown participant {}", selection.speaker);
            return false;
        };

        info!(
            "Next speaker: {} ({:?}, score {:.2})",
            speaker.name,
            selection.path,
            scores.get(&speaker.id).copied().unwrap_or_default()
        );

        let request = GenerationRequest::new(
            RequestKind::Response,
            prompts::participant_system(&speaker, &label),
            self.settings.max_tokens,
        )
        .with_messages(prompts::history_for(Some(&speaker.id), log.recent(HISTORY_WINDOW)));

        self.speak(log, &speaker, request, agenda.turn_index()).await
    }

    /// One interruptible turn. Returns `false` when the human ended the meeting.
    async fn speak(
        &self,
        log: &mut ConversationLog,
        speaker: &Participant,
        request: GenerationRequest,
        agenda_index: Option<usize>,
    ) -> bool {
        let outcome = self
            .controller
            .run_turn(log, speaker, Arc::clone(&self.generator), request, agenda_index)
            .await;
        outcome != TurnOutcome::EndRequested
    }

    async fn conclude(&self, log: &mut ConversationLog, agenda: &[String], ended_early: bool) {
        let sink = self.controller.sink();
        sink.notice(if ended_early {
            "Ending the meeting early"
        } else {
            "Wrapping up"
        });

        let window = self.settings.meeting.closing_window;
        let closing = self
            .moderator
            .closing(agenda, log.recent(window), ended_early)
            .await;

        let moderator = self.moderator.participant().id.clone();
        match log.append_participant(&moderator, closing, None) {
            Ok(turn) => sink.turn(turn),
            Err(e) => warn!("Failed to record closing: {}", e),
        }
        info!(
            "Meeting concluded after {} turns (phase {})",
            log.len(),
            MeetingPhase::Conclusion
        );
    }
}

fn default_title(agenda: &[String]) -> String {
    match agenda {
        [] => "Meeting".to_string(),
        [only] => only.clone(),
        [first, rest @ ..] => format!("{} (+{} more)", first, rest.len()),
    }
}
