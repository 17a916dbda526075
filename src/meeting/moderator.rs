//! The moderator: a participant with agenda, selection and summary duties.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::LoggingConfig;
use crate::llm::{GenerationRequest, RequestKind, TextGenerator};

use super::agenda::ProgressionOracle;
use super::conversation::Turn;
use super::participant::{ModeratorCapability, Participant, ParticipantId};
use super::prompts;
use super::random::{sample, RandomSource};
use super::retry::RetryPolicy;
use super::selector::{SelectionError, SpeakerDelegate};

/// Fewest discussants a meeting runs with.
pub const MIN_PARTICIPANTS: usize = 2;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("participant '{0}' has no moderator capability")]
pub struct NotAModerator(pub ParticipantId);

pub struct Moderator {
    participant: Participant,
    capability: ModeratorCapability,
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    max_tokens: u32,
    logging: LoggingConfig,
}

impl Moderator {
    pub fn new(
        participant: Participant,
        generator: Arc<dyn TextGenerator>,
        retry: RetryPolicy,
        max_tokens: u32,
        logging: LoggingConfig,
    ) -> Result<Self, NotAModerator> {
        let capability = participant
            .moderator
            .ok_or_else(|| NotAModerator(participant.id.clone()))?;

        Ok(Self {
            participant,
            capability,
            generator,
            retry,
            max_tokens,
            logging,
        })
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn generator(&self) -> Arc<dyn TextGenerator> {
        Arc::clone(&self.generator)
    }

    fn request(&self, kind: RequestKind, max_tokens: u32, prompt: String) -> GenerationRequest {
        GenerationRequest::new(kind, prompts::moderator_system(&self.participant), max_tokens)
            .with_user(prompt)
    }

    /// One-shot call with the retry policy; `None` when it still fails.
    async fn ask(&self, request: &GenerationRequest) -> Option<String> {
        let label = format!("{} {}", self.participant.name, request.kind);
        let generator = &self.generator;
        let reply = self
            .retry
            .run(&label, move || generator.generate(request))
            .await
            .ok()?;

        if self.logging.log_prompts {
            debug!("{} reply: {}", request.kind, reply);
        }
        Some(reply)
    }

    /// Choose who attends. Falls back to a random subset when the reply names
    /// fewer than two known participants.
    pub async fn select_participants(
        &self,
        agenda: &[String],
        directory: &[Participant],
        max_participants: usize,
        rng: &mut dyn RandomSource,
    ) -> Vec<Participant> {
        let upper = max_participants.max(MIN_PARTICIPANTS).min(directory.len());

        if self.capability.participant_selection {
            let request = self.request(
                RequestKind::ParticipantSelection,
                prompts::SELECTION_MAX_TOKENS,
                prompts::selection_prompt(agenda, directory),
            );
            if let Some(reply) = self.ask(&request).await {
                let chosen: Vec<Participant> = mentioned(&reply, directory)
                    .into_iter()
                    .take(upper)
                    .cloned()
                    .collect();
                if chosen.len() >= MIN_PARTICIPANTS {
                    info!(
                        "Moderator invited: {}",
                        chosen.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ")
                    );
                    return chosen;
                }
                warn!("Participant selection reply named too few participants: {}", reply);
            }
        }

        if upper <= MIN_PARTICIPANTS {
            return sample(rng, directory, upper);
        }
        let size = MIN_PARTICIPANTS + rng.index(upper - MIN_PARTICIPANTS + 1);
        info!("Inviting {} participants at random", size);
        sample(rng, directory, size)
    }

    pub fn welcome_request(
        &self,
        agenda: &[String],
        roster: &[Participant],
        human: Option<&str>,
    ) -> GenerationRequest {
        self.request(
            RequestKind::Opening,
            self.max_tokens,
            prompts::welcome_prompt(agenda, roster, human),
        )
    }

    pub fn open_item_request(&self, label: &str, index: usize, total: usize) -> GenerationRequest {
        self.request(
            RequestKind::Opening,
            self.max_tokens,
            prompts::open_item_prompt(label, index, total),
        )
    }

    pub fn transition_request(
        &self,
        previous: &str,
        next: &str,
        index: usize,
        total: usize,
        recent: &[Turn],
    ) -> GenerationRequest {
        self.request(
            RequestKind::Transition,
            self.max_tokens,
            prompts::transition_prompt(previous, next, index, total, recent),
        )
    }

    /// Closing synthesis. Not interruptible: the meeting is over either way.
    pub async fn closing(&self, agenda: &[String], recent: &[Turn], ended_early: bool) -> String {
        let request = self.request(
            RequestKind::Closing,
            self.max_tokens.saturating_mul(2),
            prompts::closing_prompt(agenda, recent, ended_early),
        );
        self.ask(&request)
            .await
            .unwrap_or_else(|| "Thank you all for your time. Let's pick this up again soon.".to_string())
    }

    /// Minutes for the transcript.
    pub async fn summarize(&self, agenda: &[String], turns: &[Turn]) -> String {
        if !self.capability.summaries {
            return fallback_summary(agenda, turns);
        }
        let request = self.request(
            RequestKind::Summary,
            self.max_tokens.saturating_mul(4),
            prompts::summary_prompt(agenda, turns),
        );
        match self.ask(&request).await {
            Some(summary) => summary,
            None => fallback_summary(agenda, turns),
        }
    }
}

#[async_trait]
impl SpeakerDelegate for Moderator {
    async fn choose_next_speaker(
        &self,
        eligible: &[Participant],
        recent: &[Turn],
        excluded: Option<&ParticipantId>,
    ) -> Result<ParticipantId, SelectionError> {
        let request = self.request(
            RequestKind::SpeakerChoice,
            prompts::SPEAKER_CHOICE_MAX_TOKENS,
            prompts::speaker_choice_prompt(eligible, recent, excluded),
        );
        let label = format!("{} speaker choice", self.participant.name);
        let generator = &self.generator;
        let request = &request;
        let reply = self
            .retry
            .run(&label, move || generator.generate(request))
            .await?;

        mentioned(&reply, eligible)
            .first()
            .map(|p| p.id.clone())
            .ok_or(SelectionError::Unrecognized(reply))
    }
}

#[async_trait]
impl ProgressionOracle for Moderator {
    async fn should_progress(&self, agenda_label: &str, relevant: &[Turn]) -> bool {
        if !self.capability.agenda_control {
            return false;
        }
        let request = self.request(
            RequestKind::Progression,
            prompts::PROGRESSION_MAX_TOKENS,
            prompts::progression_prompt(agenda_label, relevant),
        );
        match self.ask(&request).await {
            Some(reply) => is_affirmative(&reply),
            None => false,
        }
    }
}

/// Only an explicit yes counts.
pub fn is_affirmative(reply: &str) -> bool {
    reply
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
        .starts_with("yes")
}

/// Directory entries named in `reply` by id or display name, in the order
/// they first appear.
pub fn mentioned<'a>(reply: &str, directory: &'a [Participant]) -> Vec<&'a Participant> {
    let lower = reply.to_lowercase();
    let mut found: Vec<(usize, &Participant)> = directory
        .iter()
        .filter_map(|p| {
            let by_id = find_word(&lower, &p.id.as_str().to_lowercase());
            let by_name = find_word(&lower, &p.name.to_lowercase());
            match (by_id, by_name) {
                (Some(a), Some(b)) => Some((a.min(b), p)),
                (a, b) => a.or(b).map(|pos| (pos, p)),
            }
        })
        .collect();
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, p)| p).collect()
}

/// Position of `needle` in `haystack` as a whole word.
fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack.match_indices(needle).map(|(i, _)| i).find(|&i| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn fallback_summary(agenda: &[String], turns: &[Turn]) -> String {
    format!(
        "Summary unavailable. The meeting covered:\n{}\n\n{} turns were recorded.",
        prompts::numbered_agenda(agenda),
        turns.len()
    )
}
