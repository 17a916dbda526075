//! Persona directory.
//!
//! Personas are plain data: who a participant is and how they talk. The meeting
//! core never interprets these fields beyond passing them into prompts.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub role: String,
    pub background: String,
    #[serde(default)]
    pub moderator: bool,
}

impl Persona {
    fn new(id: &str, name: &str, role: &str, background: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            background: background.to_string(),
            moderator: false,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersonaFile {
    #[serde(default, rename = "persona")]
    personas: Vec<Persona>,
}

#[derive(Debug, Clone)]
pub struct PersonaDirectory {
    personas: Vec<Persona>,
}

impl PersonaDirectory {
    pub fn new(personas: Vec<Persona>) -> Result<Self> {
        let moderators = personas.iter().filter(|p| p.moderator).count();
        if moderators != 1 {
            bail!(
                "Persona directory needs exactly one moderator, found {}",
                moderators
            );
        }

        let mut seen = std::collections::HashSet::new();
        for persona in &personas {
            if !seen.insert(persona.id.as_str()) {
                bail!("Duplicate persona id '{}'", persona.id);
            }
        }

        if personas.len() < 3 {
            bail!("Persona directory needs a moderator and at least two participants");
        }

        Ok(Self { personas })
    }

    pub fn builtin() -> Self {
        let mut moderator = Persona::new(
            "moderator",
            "Morgan",
            "Meeting facilitator",
            "Keeps the discussion on the agenda, draws out quieter voices and summarises decisions.",
        );
        moderator.moderator = true;

        Self {
            personas: vec![
                moderator,
                Persona::new(
                    "cfo",
                    "Priya",
                    "Chief Financial Officer",
                    "Numbers first. Asks what things cost and how they will be measured.",
                ),
                Persona::new(
                    "engineer",
                    "Tomas",
                    "Staff Engineer",
                    "Pragmatic about complexity, worries about maintenance and on-call load.",
                ),
                Persona::new(
                    "designer",
                    "Alex",
                    "Product Designer",
                    "Argues from the user's point of view and pushes for small experiments.",
                ),
                Persona::new(
                    "sales",
                    "Jordan",
                    "Head of Sales",
                    "Brings customer anecdotes and deadline pressure from the field.",
                ),
                Persona::new(
                    "legal",
                    "Renata",
                    "General Counsel",
                    "Spots contractual and compliance risk early and asks who signs off.",
                ),
                Persona::new(
                    "ops",
                    "Sam",
                    "Operations Lead",
                    "Thinks about staffing, process and what happens on a bad day.",
                ),
            ],
        }
    }

    /// Load personas from a TOML file of `[[persona]]` tables, falling back to
    /// the built-in directory when the file does not exist.
    pub fn load_or_builtin(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::builtin());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read personas file {:?}", path))?;
        let file: PersonaFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse personas file {:?}", path))?;

        info!("Loaded {} personas from {:?}", file.personas.len(), path);
        Self::new(file.personas)
    }

    pub fn all(&self) -> &[Persona] {
        &self.personas
    }

    pub fn moderator(&self) -> &Persona {
        // `new` and `builtin` both guarantee exactly one moderator.
        self.personas
            .iter()
            .find(|p| p.moderator)
            .unwrap_or(&self.personas[0])
    }

    /// Everyone who can be invited to speak.
    pub fn candidates(&self) -> Vec<&Persona> {
        self.personas.iter().filter(|p| !p.moderator).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_has_one_moderator() {
        let directory = PersonaDirectory::builtin();
        assert_eq!(directory.moderator().id, "moderator");
        assert!(directory.candidates().len() >= 6);
        assert!(directory.candidates().iter().all(|p| !p.moderator));
    }

    #[test]
    fn test_builtin_passes_validation() {
        let directory = PersonaDirectory::builtin();
        assert!(PersonaDirectory::new(directory.all().to_vec()).is_ok());
    }

    #[test]
    fn test_rejects_missing_moderator() {
        let personas = vec![
            Persona::new("a", "A", "r", "b"),
            Persona::new("b", "B", "r", "b"),
            Persona::new("c", "C", "r", "b"),
        ];
        assert!(PersonaDirectory::new(personas).is_err());
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let mut moderator = Persona::new("m", "M", "r", "b");
        moderator.moderator = true;
        let personas = vec![
            moderator,
            Persona::new("a", "A", "r", "b"),
            Persona::new("a", "A2", "r", "b"),
        ];
        assert!(PersonaDirectory::new(personas).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[persona]]
id = "chair"
name = "Chair"
role = "Chairperson"
background = "Runs the board."
moderator = true

[[persona]]
id = "alice"
name = "Alice"
role = "Treasurer"
background = "Careful with money."

[[persona]]
id = "bob"
name = "Bob"
role = "Secretary"
background = "Keeps the minutes."
"#
        )
        .unwrap();

        let directory = PersonaDirectory::load_or_builtin(file.path()).unwrap();
        assert_eq!(directory.moderator().id, "chair");
        assert_eq!(directory.candidates().len(), 2);
        assert_eq!(directory.get("bob").map(|p| p.name.as_str()), Some("Bob"));
    }

    #[test]
    fn test_missing_file_falls_back_to_builtin() {
        let directory =
            PersonaDirectory::load_or_builtin(Path::new("/nonexistent/parley/personas.toml"))
                .unwrap();
        assert_eq!(directory.all().len(), PersonaDirectory::builtin().all().len());
    }
}
