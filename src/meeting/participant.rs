//! Participants and the moderator capability.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::personas::Persona;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// What the moderator can do beyond speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorCapability {
    pub agenda_control: bool,
    pub participant_selection: bool,
    pub summaries: bool,
}

impl ModeratorCapability {
    pub fn full() -> Self {
        Self {
            agenda_control: true,
            participant_selection: true,
            summaries: true,
        }
    }
}

/// An agent in the room. The moderator is the same type with a capability
/// attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub role: String,
    pub background: String,
    pub moderator: Option<ModeratorCapability>,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: ParticipantId::new(id),
            name: name.into(),
            role: role.into(),
            background: String::new(),
            moderator: None,
        }
    }

    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = background.into();
        self
    }

    pub fn with_moderator(mut self, capability: ModeratorCapability) -> Self {
        self.moderator = Some(capability);
        self
    }

    pub fn is_moderator(&self) -> bool {
        self.moderator.is_some()
    }
}

impl From<&Persona> for Participant {
    fn from(persona: &Persona) -> Self {
        let participant = Participant::new(
            persona.id.clone(),
            persona.name.clone(),
            persona.role.clone(),
        )
        .with_background(persona.background.clone());

        if persona.moderator {
            participant.with_moderator(ModeratorCapability::full())
        } else {
            participant
        }
    }
}

/// Per-participant bookkeeping owned by the conversation log.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantState {
    pub participant: Participant,
    pub turns_since_spoken: u32,
}

impl ParticipantState {
    pub fn new(participant: Participant) -> Self {
        Self {
            participant,
            turns_since_spoken: 0,
        }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.participant.id
    }

    pub fn is_moderator(&self) -> bool {
        self.participant.is_moderator()
    }
}
