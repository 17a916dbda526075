//! Agenda progress and meeting phase.

use async_trait::async_trait;
use tracing::{debug, info};

use super::conversation::{ConversationLog, Turn};
use super::status::MeetingPhase;

/// Below this many turns on an item the group never moves on.
pub const MIN_TURNS_BEFORE_PROGRESSION: usize = 5;
/// At this many turns the group always moves on.
pub const FORCED_PROGRESSION_TURNS: usize = 10;
/// How many of the item's turns the progression question sees.
pub const PROGRESSION_WINDOW: usize = 10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AgendaError {
    #[error("agenda is empty")]
    Empty,

    #[error("cannot move meeting from {from} to {to}")]
    InvalidTransition { from: MeetingPhase, to: MeetingPhase },
}

/// Result of moving past the current item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progression {
    Advanced { from: usize, to: usize },
    Concluded,
}

/// What the turn count alone says about moving on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionRule {
    Hold,
    Ask,
    Force,
}

impl ProgressionRule {
    pub fn for_count(turns_on_item: usize) -> Self {
        if turns_on_item < MIN_TURNS_BEFORE_PROGRESSION {
            Self::Hold
        } else if turns_on_item >= FORCED_PROGRESSION_TURNS {
            Self::Force
        } else {
            Self::Ask
        }
    }
}

/// Yes/no judgement on whether an item has been covered.
#[async_trait]
pub trait ProgressionOracle: Send + Sync {
    async fn should_progress(&self, agenda_label: &str, relevant: &[Turn]) -> bool;
}

#[derive(Debug, Clone)]
pub struct AgendaStateMachine {
    items: Vec<String>,
    index: usize,
    phase: MeetingPhase,
}

impl AgendaStateMachine {
    pub fn new(items: Vec<String>) -> Result<Self, AgendaError> {
        let items: Vec<String> = items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();

        if items.is_empty() {
            return Err(AgendaError::Empty);
        }

        Ok(Self {
            items,
            index: 0,
            phase: MeetingPhase::Setup,
        })
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn phase(&self) -> MeetingPhase {
        self.phase
    }

    pub fn is_concluded(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Label of the item under discussion; `None` once past the last item.
    pub fn current_label(&self) -> Option<&str> {
        self.items.get(self.index).map(String::as_str)
    }

    /// Agenda index to tag turns with. Only discussion turns belong to an item.
    pub fn turn_index(&self) -> Option<usize> {
        (self.phase == MeetingPhase::Discussion && self.index < self.items.len())
            .then_some(self.index)
    }

    /// Roster is fixed; introductions start.
    pub fn finalize_roster(&mut self) -> Result<(), AgendaError> {
        self.transition(MeetingPhase::Introductions)
    }

    /// The welcome turn is done; the first item is open.
    pub fn begin_discussion(&mut self) -> Result<(), AgendaError> {
        self.transition(MeetingPhase::Discussion)
    }

    /// Jump straight to conclusion from any live phase.
    pub fn conclude_early(&mut self) -> Result<(), AgendaError> {
        self.transition(MeetingPhase::Conclusion)
    }

    /// Move past the current item. Running off the end concludes the meeting.
    pub fn advance(&mut self) -> Result<Progression, AgendaError> {
        if self.phase != MeetingPhase::Discussion {
            return Err(AgendaError::InvalidTransition {
                from: self.phase,
                to: MeetingPhase::Discussion,
            });
        }

        let from = self.index;
        self.index += 1;

        if self.index >= self.items.len() {
            self.index = self.items.len();
            self.transition(MeetingPhase::Conclusion)?;
            info!("Agenda complete after {} items", self.items.len());
            return Ok(Progression::Concluded);
        }

        info!(
            "Agenda item {} -> {}: {}",
            from + 1,
            self.index + 1,
            self.items[self.index]
        );
        Ok(Progression::Advanced {
            from,
            to: self.index,
        })
    }

    /// Decide whether the current item is done. The oracle is consulted only
    /// when the turn count leaves the answer open.
    pub async fn check_progression(
        &self,
        log: &ConversationLog,
        oracle: &dyn ProgressionOracle,
    ) -> bool {
        let Some(label) = self.current_label() else {
            return true;
        };
        if self.phase != MeetingPhase::Discussion {
            return false;
        }

        let relevant = log.turns_for_agenda(self.index);
        match ProgressionRule::for_count(relevant.len()) {
            ProgressionRule::Hold => false,
            ProgressionRule::Force => {
                debug!("{} turns on '{}', moving on", relevant.len(), label);
                true
            }
            ProgressionRule::Ask => {
                let start = relevant.len().saturating_sub(PROGRESSION_WINDOW);
                let window: Vec<Turn> = relevant[start..].iter().map(|t| (*t).clone()).collect();
                oracle.should_progress(label, &window).await
            }
        }
    }

    fn transition(&mut self, to: MeetingPhase) -> Result<(), AgendaError> {
        if !self.phase.can_transition_to(to) {
            return Err(AgendaError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        debug!("Meeting phase {} -> {}", self.phase, to);
        self.phase = to;
        Ok(())
    }
}
