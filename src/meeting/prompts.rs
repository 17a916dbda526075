//! Prompt text for every request the meeting makes.

use crate::llm::ChatMessage;

use super::conversation::Turn;
use super::participant::{Participant, ParticipantId};

pub const URGENCY_MAX_TOKENS: u32 = 5;
pub const SPEAKER_CHOICE_MAX_TOKENS: u32 = 20;
pub const PROGRESSION_MAX_TOKENS: u32 = 5;
pub const SELECTION_MAX_TOKENS: u32 = 60;

/// Render turns as a chat history from `viewer`'s point of view: their own
/// lines are assistant messages, everyone else's are attributed user messages.
pub fn history_for(viewer: Option<&ParticipantId>, turns: &[Turn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .map(|turn| match (&turn.speaker, viewer) {
            (Some(speaker), Some(viewer)) if speaker == viewer => {
                ChatMessage::assistant(turn.text.clone())
            }
            _ => ChatMessage::user(format!("{}: {}", turn.speaker_name, turn.text)),
        })
        .collect()
}

/// Plain-text transcript excerpt for single-shot questions.
pub fn excerpt(turns: &[Turn]) -> String {
    if turns.is_empty() {
        return "(nothing has been said yet)".to_string();
    }
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.speaker_name, turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn numbered_agenda(agenda: &[String]) -> String {
    agenda
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn persona(participant: &Participant) -> String {
    let mut text = format!(
        "You are {}, {}, taking part in a meeting.",
        participant.name, participant.role
    );
    if !participant.background.is_empty() {
        text.push(' ');
        text.push_str(&participant.background);
    }
    text
}

pub fn participant_system(participant: &Participant, agenda_label: &str) -> String {
    format!(
        "{}\n\nThe current agenda item is: \"{}\".\n\
         Speak in the first person, in one short paragraph (two to four sentences). \
         Respond to what was just said, add something new, and do not repeat points already made. \
         Do not prefix your reply with your name.",
        persona(participant),
        agenda_label
    )
}

pub fn introduction_system(participant: &Participant, agenda: &[String]) -> String {
    format!(
        "{}\n\nThe meeting agenda is:\n{}\n\n\
         Introduce yourself to the room in one or two sentences: who you are and what you care about for this agenda. \
         Do not prefix your reply with your name.",
        persona(participant),
        numbered_agenda(agenda)
    )
}

pub fn urgency_system(participant: &Participant, agenda_label: &str, recent: &[Turn]) -> String {
    format!(
        "{}\n\nThe current agenda item is: \"{}\".\n\nRecent conversation:\n{}\n\n\
         On a scale of 1 to 5, how urgently do you need to speak next? \
         1 means you have nothing to add, 5 means you must respond right now. \
         Reply with a single number only.",
        persona(participant),
        agenda_label,
        excerpt(recent)
    )
}

pub fn moderator_system(moderator: &Participant) -> String {
    format!(
        "{} You are the moderator. Keep the meeting focused, fair and moving. \
         Be concise. Do not prefix your reply with your name.",
        persona(moderator)
    )
}

pub fn selection_prompt(agenda: &[String], candidates: &[Participant]) -> String {
    let directory = candidates
        .iter()
        .map(|p| format!("- {} ({}, {}): {}", p.id, p.name, p.role, p.background))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "The meeting agenda is:\n{}\n\nAvailable participants:\n{}\n\n\
         Choose the participants whose expertise is most relevant to this agenda. \
         Reply with their ids only, separated by commas.",
        numbered_agenda(agenda),
        directory
    )
}

pub fn welcome_prompt(agenda: &[String], roster: &[Participant], human: Option<&str>) -> String {
    let mut names: Vec<String> = roster
        .iter()
        .map(|p| format!("{} ({})", p.name, p.role))
        .collect();
    if let Some(human) = human {
        names.push(format!("{} (guest)", human));
    }
    format!(
        "Open the meeting. Welcome everyone present: {}.\n\nThe agenda is:\n{}\n\n\
         Keep it to three sentences and invite brief introductions.",
        names.join(", "),
        numbered_agenda(agenda)
    )
}

pub fn open_item_prompt(label: &str, index: usize, total: usize) -> String {
    format!(
        "Introduce agenda item {} of {}: \"{}\". Frame the question the group should answer \
         and invite the first contributions. Two or three sentences.",
        index + 1,
        total,
        label
    )
}

pub fn speaker_choice_prompt(
    candidates: &[Participant],
    recent: &[Turn],
    excluded: Option<&ParticipantId>,
) -> String {
    let list = candidates
        .iter()
        .map(|p| format!("- {} ({}, {})", p.id, p.name, p.role))
        .collect::<Vec<_>>()
        .join("\n");
    let exclusion = excluded
        .map(|id| format!(" Do not choose {}, who just spoke.", id))
        .unwrap_or_default();
    format!(
        "Recent conversation:\n{}\n\nWho should speak next? Candidates:\n{}\n\n\
         Reply with the id of exactly one candidate and nothing else.{}",
        excerpt(recent),
        list,
        exclusion
    )
}

pub fn progression_prompt(label: &str, relevant: &[Turn]) -> String {
    format!(
        "The group is discussing \"{}\".\n\nRecent discussion on this item:\n{}\n\n\
         Has this item been discussed enough to move on to the next one? Reply YES or NO.",
        label,
        excerpt(relevant)
    )
}

pub fn transition_prompt(previous: &str, next: &str, index: usize, total: usize, recent: &[Turn]) -> String {
    format!(
        "Discussion so far on \"{}\":\n{}\n\n\
         In two or three sentences, summarise where the group landed on \"{}\", then introduce agenda item {} of {}: \"{}\".",
        previous,
        excerpt(recent),
        previous,
        index + 1,
        total,
        next
    )
}

pub fn closing_prompt(agenda: &[String], recent: &[Turn], ended_early: bool) -> String {
    let reason = if ended_early {
        "The meeting is ending early at the guest's request."
    } else {
        "All agenda items have been covered."
    };
    format!(
        "{}\n\nAgenda:\n{}\n\nFinal part of the discussion:\n{}\n\n\
         Close the meeting: synthesise the key points and decisions, list any open actions, and thank everyone. \
         One short paragraph plus a few bullet points.",
        reason,
        numbered_agenda(agenda),
        excerpt(recent)
    )
}

pub fn summary_prompt(agenda: &[String], turns: &[Turn]) -> String {
    format!(
        "Agenda:\n{}\n\nFull transcript:\n{}\n\n\
         Write meeting minutes: a short overview, then one section per agenda item with decisions and open questions, \
         then a list of action items with owners where known. Use Markdown.",
        numbered_agenda(agenda),
        excerpt(turns)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meeting::conversation::TurnRole;

    fn turn(seq: usize, speaker: Option<&str>, name: &str, text: &str) -> Turn {
        Turn {
            seq,
            speaker: speaker.map(ParticipantId::new),
            speaker_name: name.to_string(),
            role: if speaker.is_some() {
                TurnRole::Participant
            } else {
                TurnRole::Human
            },
            text: text.to_string(),
            agenda_index: Some(0),
        }
    }

    #[test]
    fn test_history_marks_own_turns_as_assistant() {
        let turns = vec![
            turn(0, Some("alice"), "Alice", "We are over budget."),
            turn(1, None, "You", "By how much?"),
            turn(2, Some("bob"), "Bob", "Ten percent."),
        ];
        let alice = ParticipantId::new("alice");
        let history = history_for(Some(&alice), &turns);

        assert_eq!(history[0], ChatMessage::assistant("We are over budget."));
        assert_eq!(history[1], ChatMessage::user("You: By how much?"));
        assert_eq!(history[2], ChatMessage::user("Bob: Ten percent."));

        let outside = history_for(None, &turns);
        assert_eq!(outside[0], ChatMessage::user("Alice: We are over budget."));
    }

    #[test]
    fn test_excerpt_of_empty_window() {
        assert_eq!(excerpt(&[]), "(nothing has been said yet)");
    }

    #[test]
    fn test_speaker_choice_mentions_exclusion() {
        let candidates = vec![Participant::new("alice", "Alice", "Finance")];
        let bob = ParticipantId::new("bob");
        let prompt = speaker_choice_prompt(&candidates, &[], Some(&bob));
        assert!(prompt.contains("- alice (Alice, Finance)"));
        assert!(prompt.contains("Do not choose bob"));
    }

    #[test]
    fn test_numbered_agenda() {
        let agenda = vec!["Budget".to_string(), "Hiring".to_string()];
        assert_eq!(numbered_agenda(&agenda), "1. Budget\n2. Hiring");
    }
}
