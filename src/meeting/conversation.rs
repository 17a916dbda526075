//! Append-only record of what was said.
//!
//! The log is the only writer of [`ParticipantState`]: every append updates the
//! silence counters, so anything reading them sees a consistent view.

use serde::{Deserialize, Serialize};

use super::participant::{Participant, ParticipantId, ParticipantState};
use super::status::MeetingPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    Human,
    Participant,
}

/// One utterance. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub seq: usize,
    /// `None` for the human.
    pub speaker: Option<ParticipantId>,
    pub speaker_name: String,
    pub role: TurnRole,
    pub text: String,
    /// Agenda item that was current when the turn was appended.
    pub agenda_index: Option<usize>,
}

impl Turn {
    pub fn is_human(&self) -> bool {
        self.role == TurnRole::Human
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("unknown participant '{0}'")]
    UnknownParticipant(ParticipantId),
}

#[derive(Debug, Clone)]
pub struct ConversationLog {
    turns: Vec<Turn>,
    participants: Vec<ParticipantState>,
    human_name: String,
    rounds_since_human: u32,
}

impl ConversationLog {
    pub fn new(roster: Vec<Participant>, human_name: impl Into<String>) -> Self {
        Self {
            turns: Vec::new(),
            participants: roster.into_iter().map(ParticipantState::new).collect(),
            human_name: human_name.into(),
            rounds_since_human: 0,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn participants(&self) -> &[ParticipantState] {
        &self.participants
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&ParticipantState> {
        self.participants.iter().find(|p| p.id() == id)
    }

    pub fn human_name(&self) -> &str {
        &self.human_name
    }

    /// The last `n` turns (or all of them when fewer exist).
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Speaker of the last turn, if an agent produced it.
    pub fn last_speaker(&self) -> Option<&ParticipantId> {
        self.turns.last().and_then(|turn| turn.speaker.as_ref())
    }

    pub fn turns_for_agenda(&self, index: usize) -> Vec<&Turn> {
        self.turns
            .iter()
            .filter(|turn| turn.agenda_index == Some(index))
            .collect()
    }

    /// The participant barred from the next selection round: the previous
    /// speaker, unless that was the human or introductions are still running.
    pub fn restricted(&self, phase: MeetingPhase) -> Option<ParticipantId> {
        if phase <= MeetingPhase::Introductions {
            return None;
        }
        self.last_speaker().cloned()
    }

    /// Rounds since the human last spoke or passed.
    pub fn rounds_since_human(&self) -> u32 {
        self.rounds_since_human
    }

    /// The human was offered the floor and declined.
    pub fn human_passed(&mut self) {
        self.rounds_since_human = 0;
    }

    pub fn append_participant(
        &mut self,
        speaker: &ParticipantId,
        text: impl Into<String>,
        agenda_index: Option<usize>,
    ) -> Result<&Turn, ConversationError> {
        let name = self
            .participant(speaker)
            .map(|state| state.participant.name.clone())
            .ok_or_else(|| ConversationError::UnknownParticipant(speaker.clone()))?;

        self.update_silence(Some(speaker));
        self.rounds_since_human = self.rounds_since_human.saturating_add(1);

        let seq = self.turns.len();
        Ok(self.push(Turn {
            seq,
            speaker: Some(speaker.clone()),
            speaker_name: name,
            role: TurnRole::Participant,
            text: text.into(),
            agenda_index,
        }))
    }

    pub fn append_human(&mut self, text: impl Into<String>, agenda_index: Option<usize>) -> &Turn {
        self.update_silence(None);
        self.rounds_since_human = 0;

        let seq = self.turns.len();
        let speaker_name = self.human_name.clone();
        self.push(Turn {
            seq,
            speaker: None,
            speaker_name,
            role: TurnRole::Human,
            text: text.into(),
            agenda_index,
        })
    }

    fn push(&mut self, turn: Turn) -> &Turn {
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    fn update_silence(&mut self, speaker: Option<&ParticipantId>) {
        for state in &mut self.participants {
            if Some(state.id()) == speaker {
                state.turns_since_spoken = 0;
            } else if !state.is_moderator() {
                state.turns_since_spoken = state.turns_since_spoken.saturating_add(1);
            }
        }
    }
}
