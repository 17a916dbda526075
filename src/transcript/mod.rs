//! Markdown transcripts of finished meetings.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::meeting::MeetingRecord;

const EXTENSION: &str = "md";
const PREFIX: &str = "meeting-";

pub fn render_markdown(record: &MeetingRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", record.title);
    let _ = writeln!(
        out,
        "- Started: {}",
        record.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(
        out,
        "- Ended: {}{}",
        record.ended_at.format("%Y-%m-%d %H:%M:%S"),
        if record.concluded_early {
            " (ended early)"
        } else {
            ""
        }
    );

    let mut attendees: Vec<String> = record
        .roster
        .iter()
        .map(|p| format!("{} ({})", p.name, p.role))
        .collect();
    if let Some(human) = &record.human_name {
        attendees.push(format!("{} (guest)", human));
    }
    let _ = writeln!(out, "- Participants: {}\n", attendees.join(", "));

    let _ = writeln!(out, "## Agenda\n");
    for (i, item) in record.agenda.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, item);
    }

    let _ = writeln!(out, "\n## Summary\n\n{}\n", record.summary.trim());

    let _ = writeln!(out, "## Transcript");
    let mut section: Option<Option<usize>> = None;
    for turn in &record.turns {
        if section != Some(turn.agenda_index) {
            section = Some(turn.agenda_index);
            let heading = turn
                .agenda_index
                .and_then(|i| record.agenda.get(i).map(|item| (i, item)));
            match heading {
                Some((i, item)) => {
                    let _ = writeln!(out, "\n### {}. {}", i + 1, item);
                }
                None => {
                    let _ = writeln!(out);
                }
            }
        }
        let _ = writeln!(out, "\n**{}:** {}", turn.speaker_name, turn.text.trim());
    }

    out
}

/// Pick a free file name for a meeting that started at `started_at`.
pub fn transcript_path(dir: &Path, started_at: DateTime<Local>) -> PathBuf {
    let timestamp = started_at.format("%Y%m%d-%H%M%S");
    let path = dir.join(format!("{}{}.{}", PREFIX, timestamp, EXTENSION));
    if !path.exists() {
        return path;
    }

    // Handle collision by appending counter
    (1u32..)
        .map(|i| dir.join(format!("{}{}-{}.{}", PREFIX, timestamp, i, EXTENSION)))
        .find(|alt_path| !alt_path.exists())
        .unwrap_or(path)
}

pub fn write_transcript(dir: &Path, record: &MeetingRecord) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create transcript directory {:?}", dir))?;

    let path = transcript_path(dir, record.started_at);
    // create_new: never clobber a transcript that appeared in the meantime.
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("Failed to create transcript {:?}", path))?;
    file.write_all(render_markdown(record).as_bytes())
        .with_context(|| format!("Failed to write transcript {:?}", path))?;

    info!("Wrote transcript ({} turns) to {:?}", record.turns.len(), path);
    Ok(path)
}

#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub path: PathBuf,
    pub title: String,
    pub modified: DateTime<Local>,
}

/// Stored transcripts, newest first.
pub fn list_transcripts(dir: &Path, limit: usize) -> Result<Vec<TranscriptEntry>> {
    if !dir.exists() {
        debug!("Transcript directory {:?} does not exist yet", dir);
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {:?}", dir))? {
        let path = entry?.path();
        let is_transcript = path.extension().is_some_and(|ext| ext == EXTENSION)
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(PREFIX));
        if !is_transcript {
            continue;
        }

        let modified: DateTime<Local> = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(DateTime::from)
            .unwrap_or_else(|_| Local::now());
        let title = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .next()
                    .and_then(|line| line.strip_prefix("# "))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "(untitled)".to_string());

        entries.push(TranscriptEntry {
            path,
            title,
            modified,
        });
    }

    entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
    entries.truncate(limit);
    Ok(entries)
}
