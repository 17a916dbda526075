//! Urgency scoring: how badly each participant wants the floor.
//!
//! score = clamp(model self-assessment, 1, 5) + min(2, 0.2 * turns silent)

use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::llm::{GenerationRequest, RequestKind, TextGenerator};

use super::conversation::Turn;
use super::participant::{Participant, ParticipantId};
use super::prompts;
use super::retry::RetryPolicy;

pub const MIN_BASE: f64 = 1.0;
pub const MAX_BASE: f64 = 5.0;
pub const DEFAULT_BASE: f64 = 3.0;
pub const BOOST_PER_SILENT_TURN: f64 = 0.2;
pub const MAX_BOOST: f64 = 2.0;
pub const MIN_SCORE: f64 = MIN_BASE;
pub const MAX_SCORE: f64 = MAX_BASE + MAX_BOOST;

/// Outcome of reading a number out of a model reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreParse {
    Parsed(f64),
    Unparseable,
}

impl ScoreParse {
    pub fn or_default(self, default: f64) -> f64 {
        match self {
            Self::Parsed(value) => value,
            Self::Unparseable => default,
        }
    }
}

/// Reads the first number out of a free-text reply.
#[derive(Debug, Clone)]
pub struct ScoreParser {
    number: Regex,
}

impl ScoreParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            number: Regex::new(r"-?\d+(?:\.\d+)?")?,
        })
    }

    pub fn parse(&self, reply: &str) -> ScoreParse {
        self.number
            .find(reply)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .map_or(ScoreParse::Unparseable, ScoreParse::Parsed)
    }
}

pub fn silence_boost(turns_since_spoken: u32) -> f64 {
    (BOOST_PER_SILENT_TURN * f64::from(turns_since_spoken)).clamp(0.0, MAX_BOOST)
}

pub fn combine(base: f64, turns_since_spoken: u32) -> f64 {
    base.clamp(MIN_BASE, MAX_BASE) + silence_boost(turns_since_spoken)
}

/// One participant to score this round.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub participant: Participant,
    pub turns_since_spoken: u32,
}

#[derive(Clone)]
pub struct UrgencyEvaluator {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    parser: ScoreParser,
    window: usize,
}

impl UrgencyEvaluator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        retry: RetryPolicy,
        window: usize,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            generator,
            retry,
            parser: ScoreParser::new()?,
            window,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Score a single participant against the last `window` turns.
    pub async fn evaluate(
        &self,
        candidate: &Candidate,
        recent: &[Turn],
        agenda_label: &str,
    ) -> f64 {
        let start = recent.len().saturating_sub(self.window);
        let window = &recent[start..];
        let participant = &candidate.participant;

        let request = GenerationRequest::new(
            RequestKind::Urgency,
            prompts::urgency_system(participant, agenda_label, window),
            prompts::URGENCY_MAX_TOKENS,
        )
        .with_user("How urgently do you need to speak next (1-5)?");

        let label = format!("Urgency check for {}", participant.name);
        let (generator, parser, request) = (&self.generator, &self.parser, &request);
        let parsed = self
            .retry
            .run_or_else(
                &label,
                move || async move {
                    generator
                        .generate(request)
                        .await
                        .map(|reply| parser.parse(&reply))
                },
                |_| ScoreParse::Unparseable,
            )
            .await;

        if parsed == ScoreParse::Unparseable {
            debug!("No usable urgency from {}, using {}", participant.name, DEFAULT_BASE);
        }

        let score = combine(parsed.or_default(DEFAULT_BASE), candidate.turns_since_spoken);
        debug!(
            "Urgency for {}: {:.2} (silent {} turns)",
            participant.name, score, candidate.turns_since_spoken
        );
        score
    }

    /// Score every candidate concurrently. Each task owns its inputs and
    /// returns its own slot; the map is assembled after all tasks finish.
    pub async fn evaluate_all(
        &self,
        candidates: Vec<Candidate>,
        recent: &[Turn],
        agenda_label: &str,
    ) -> HashMap<ParticipantId, f64> {
        let recent: Arc<[Turn]> = Arc::from(recent.to_vec());
        let label: Arc<str> = Arc::from(agenda_label);
        let mut scores = HashMap::with_capacity(candidates.len());
        let mut tasks = JoinSet::new();

        for candidate in &candidates {
            let evaluator = self.clone();
            let candidate = candidate.clone();
            let recent = Arc::clone(&recent);
            let label = Arc::clone(&label);
            tasks.spawn(async move {
                let score = evaluator.evaluate(&candidate, &recent, &label).await;
                (candidate.participant.id, score)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, score)) => {
                    scores.insert(id, score);
                }
                Err(e) => warn!("Urgency task failed: {}", e),
            }
        }

        for candidate in candidates {
            scores
                .entry(candidate.participant.id)
                .or_insert_with(|| combine(DEFAULT_BASE, candidate.turns_since_spoken));
        }

        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::GenerationError;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedReply(&'static str);

    #[async_trait]
    impl TextGenerator for FixedReply {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl TextGenerator for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            Err(GenerationError::Unavailable("down".to_string()))
        }
    }

    fn evaluator(generator: Arc<dyn TextGenerator>) -> UrgencyEvaluator {
        UrgencyEvaluator::new(generator, RetryPolicy::new(Duration::from_millis(1)), 5).unwrap()
    }

    fn candidate(id: &str, silent: u32) -> Candidate {
        Candidate {
            participant: Participant::new(id, id, "Tester"),
            turns_since_spoken: silent,
        }
    }

    #[test]
    fn test_parse_score() {
        let parser = ScoreParser::new().unwrap();
        assert_eq!(parser.parse("4"), ScoreParse::Parsed(4.0));
        assert_eq!(parser.parse("I'd say 3.5 out of 5"), ScoreParse::Parsed(3.5));
        assert_eq!(parser.parse("urgent!"), ScoreParse::Unparseable);
        assert_eq!(parser.parse(""), ScoreParse::Unparseable);
        assert_eq!(ScoreParse::Unparseable.or_default(3.0), 3.0);
    }

    #[test]
    fn test_silence_boost_saturates() {
        assert_eq!(silence_boost(0), 0.0);
        assert!((silence_boost(3) - 0.6).abs() < 1e-9);
        assert!((silence_boost(10) - 2.0).abs() < 1e-9);
        assert_eq!(silence_boost(50), 2.0);
    }

    #[test]
    fn test_combined_score_bounds() {
        for base in [-10.0, 0.0, 1.0, 2.5, 5.0, 9.0, 1e9] {
            for silent in [0, 1, 5, 10, 1000] {
                let score = combine(base, silent);
                assert!((MIN_SCORE..=MAX_SCORE).contains(&score), "{base} {silent} -> {score}");
            }
        }
        assert_eq!(combine(9.0, 0), 5.0);
        assert_eq!(combine(0.0, 0), 1.0);
    }

    #[tokio::test]
    async fn test_evaluate_clamps_model_output() {
        let evaluator = evaluator(Arc::new(FixedReply("10")));
        let score = evaluator.evaluate(&candidate("alice", 2), &[], "Budget").await;
        assert!((score - 5.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unparseable_reply_defaults_to_three() {
        let evaluator = evaluator(Arc::new(FixedReply("very urgent")));
        let score = evaluator.evaluate(&candidate("alice", 0), &[], "Budget").await;
        assert_eq!(score, DEFAULT_BASE);
    }

    #[tokio::test]
    async fn test_call_failure_defaults_to_three() {
        let evaluator = evaluator(Arc::new(Failing));
        let score = evaluator.evaluate(&candidate("alice", 10), &[], "Budget").await;
        assert!((score - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_evaluate_all_returns_one_score_per_candidate() {
        let evaluator = evaluator(Arc::new(FixedReply("2")));
        let scores = evaluator
            .evaluate_all(
                vec![candidate("alice", 0), candidate("bob", 5), candidate("carol", 20)],
                &[],
                "Budget",
            )
            .await;

        assert_eq!(scores.len(), 3);
        assert_eq!(scores[&ParticipantId::new("alice")], 2.0);
        assert!((scores[&ParticipantId::new("bob")] - 3.0).abs() < 1e-9);
        assert!((scores[&ParticipantId::new("carol")] - 4.0).abs() < 1e-9);
    }
}
