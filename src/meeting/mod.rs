//! Meeting orchestration.
//!
//! Agents (and optionally a human) discuss an agenda under a moderator. Each
//! round scores every eligible participant's urgency concurrently, picks a
//! speaker, and runs that speaker's generation while listening for a barge-in.

pub mod agenda;
pub mod conversation;
pub mod interrupt;
pub mod meeting_machine;
pub mod moderator;
pub mod participant;
pub mod post_meeting_hook;
pub mod prompts;
pub mod random;
pub mod retry;
pub mod selector;
pub mod status;
pub mod urgency;

pub use agenda::{AgendaError, AgendaStateMachine, Progression, ProgressionOracle};
pub use conversation::{ConversationLog, Turn, TurnRole};
pub use interrupt::{
    CtrlCInterrupts, HumanInput, InterruptScope, InterruptSource, InterruptionController,
    NeverInterrupt, TurnOutcome, TurnSink,
};
pub use meeting_machine::{
    MeetingMachine, MeetingOptions, MeetingOutcome, MeetingRecord, MeetingServices,
    MeetingSettings,
};
pub use moderator::Moderator;
pub use participant::{ModeratorCapability, Participant, ParticipantId, ParticipantState};
pub use post_meeting_hook::{MeetingResult, PostMeetingHook, ShellCommandHook};
pub use retry::RetryPolicy;
pub use selector::{Selection, SelectionError, SelectionPath, SpeakerDelegate, SpeakerSelector};
pub use status::MeetingPhase;
pub use urgency::UrgencyEvaluator;
