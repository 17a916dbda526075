//! Next-speaker selection.
//!
//! Rank eligible participants by urgency, keep the top K, then either hand the
//! floor to the leader directly or let the moderator pick among the top K.
//! The previous speaker is never eligible.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::llm::GenerationError;

use super::conversation::Turn;
use super::participant::{Participant, ParticipantId, ParticipantState};
use super::random::RandomSource;

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_DIRECT_PICK_PROBABILITY: f64 = 0.7;

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("unrecognised speaker choice: {0:?}")]
    Unrecognized(String),
}

/// Moderator-style pick among a short list of candidates.
#[async_trait]
pub trait SpeakerDelegate: Send + Sync {
    async fn choose_next_speaker(
        &self,
        eligible: &[Participant],
        recent: &[Turn],
        excluded: Option<&ParticipantId>,
    ) -> Result<ParticipantId, SelectionError>;
}

/// How the speaker was reached. Logged, and handy in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPath {
    /// Highest urgency score.
    Direct,
    /// The delegate's own choice.
    Delegated,
    /// The delegate failed or answered badly; uniform pick instead.
    DelegateFallback,
    /// Nobody was eligible; any non-moderator was picked.
    EmptyFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub speaker: ParticipantId,
    pub path: SelectionPath,
}

pub struct SpeakerSelector<R: RandomSource> {
    rng: R,
    top_k: usize,
    direct_pick_probability: f64,
}

impl<R: RandomSource> SpeakerSelector<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            top_k: DEFAULT_TOP_K,
            direct_pick_probability: DEFAULT_DIRECT_PICK_PROBABILITY,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_direct_pick_probability(mut self, probability: f64) -> Self {
        self.direct_pick_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    /// Pick the next speaker. `None` only when the roster has no
    /// non-moderator participant at all.
    pub async fn select(
        &mut self,
        scores: &HashMap<ParticipantId, f64>,
        roster: &[ParticipantState],
        recent: &[Turn],
        restricted: Option<&ParticipantId>,
        delegate: &dyn SpeakerDelegate,
    ) -> Option<Selection> {
        let ranked = rank(scores, roster, restricted);
        if ranked.is_empty() {
            return self.fallback_pick(roster, restricted);
        }

        let top: Vec<Participant> = ranked
            .into_iter()
            .take(self.top_k)
            .map(|state| state.participant.clone())
            .collect();

        let roll = self.rng.unit();
        if roll < self.direct_pick_probability {
            debug!("Direct pick (roll {:.5}): {}", roll, top[0].id);
            return Some(Selection {
                speaker: top[0].id.clone(),
                path: SelectionPath::Direct,
            });
        }

        match delegate.choose_next_speaker(&top, recent, restricted).await {
            Ok(choice) if Some(&choice) == restricted => {
                warn!("Delegate chose restricted speaker {}, overriding", choice);
            }
            Ok(choice) if top.iter().any(|p| p.id == choice) => {
                info!("Delegate chose {}", choice);
                return Some(Selection {
                    speaker: choice,
                    path: SelectionPath::Delegated,
                });
            }
            Ok(choice) => warn!("Delegate chose ineligible speaker {}, overriding", choice),
            Err(e) => warn!("Delegate speaker choice failed: {}", e),
        }

        let pick = &top[self.rng.index(top.len())];
        Some(Selection {
            speaker: pick.id.clone(),
            path: SelectionPath::DelegateFallback,
        })
    }

    fn fallback_pick(
        &mut self,
        roster: &[ParticipantState],
        restricted: Option<&ParticipantId>,
    ) -> Option<Selection> {
        let unrestricted: Vec<&ParticipantState> = roster
            .iter()
            .filter(|state| !state.is_moderator() && Some(state.id()) != restricted)
            .collect();

        let pool = if unrestricted.is_empty() {
            roster.iter().filter(|state| !state.is_moderator()).collect()
        } else {
            unrestricted
        };

        if pool.is_empty() {
            return None;
        }

        let pick = pool[self.rng.index(pool.len())];
        warn!("No scored participants eligible, falling back to {}", pick.id());
        Some(Selection {
            speaker: pick.id().clone(),
            path: SelectionPath::EmptyFallback,
        })
    }
}

/// Eligible participants, highest score first. Ties keep roster order.
fn rank<'a>(
    scores: &HashMap<ParticipantId, f64>,
    roster: &'a [ParticipantState],
    restricted: Option<&ParticipantId>,
) -> Vec<&'a ParticipantState> {
    let mut eligible: Vec<(&ParticipantState, f64)> = roster
        .iter()
        .filter(|state| !state.is_moderator() && Some(state.id()) != restricted)
        .filter_map(|state| {
            scores
                .get(state.id())
                .copied()
                .filter(|score| *score > 0.0)
                .map(|score| (state, score))
        })
        .collect();

    eligible.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    eligible.into_iter().map(|(state, _)| state).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meeting::participant::ModeratorCapability;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Returns the same roll forever; index picks cycle from zero.
    struct FixedRandom {
        roll: f64,
    }

    impl RandomSource for FixedRandom {
        fn unit(&mut self) -> f64 {
            self.roll
        }

        fn index(&mut self, _len: usize) -> usize {
            0
        }
    }

    struct Delegate {
        reply: Result<&'static str, ()>,
        calls: AtomicUsize,
    }

    impl Delegate {
        fn replying(id: &'static str) -> Self {
            Self {
                reply: Ok(id),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SpeakerDelegate for Delegate {
        async fn choose_next_speaker(
            &self,
            _eligible: &[Participant],
            _recent: &[Turn],
            _excluded: Option<&ParticipantId>,
        ) -> Result<ParticipantId, SelectionError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            match self.reply {
                Ok(id) => Ok(ParticipantId::new(id)),
                Err(()) => Err(GenerationError::RateLimited.into()),
            }
        }
    }

    fn roster(ids: &[&str]) -> Vec<ParticipantState> {
        let mut roster = vec![ParticipantState::new(
            Participant::new("mod", "Morgan", "Facilitator").with_moderator(ModeratorCapability::full()),
        )];
        roster.extend(
            ids.iter()
                .map(|id| ParticipantState::new(Participant::new(*id, *id, "Tester"))),
        );
        roster
    }

    fn scores(pairs: &[(&str, f64)]) -> HashMap<ParticipantId, f64> {
        pairs
            .iter()
            .map(|(id, score)| (ParticipantId::new(*id), *score))
            .collect()
    }

    #[tokio::test]
    async fn test_restricted_participant_never_selected() {
        let roster = roster(&["alice", "bob"]);
        let scores = scores(&[("alice", 4.2), ("bob", 0.0)]);
        let bob = ParticipantId::new("bob");

        for roll in [0.0, 0.5, 0.69999, 0.70001, 0.99] {
            let delegate = Delegate::replying("bob");
            let mut selector = SpeakerSelector::new(FixedRandom { roll });
            let selection = selector
                .select(&scores, &roster, &[], Some(&bob), &delegate)
                .await
                .unwrap();
            assert_eq!(selection.speaker, ParticipantId::new("alice"));
        }
    }

    #[tokio::test]
    async fn test_probability_boundary() {
        let roster = roster(&["alice", "bob", "carol"]);
        let scores = scores(&[("alice", 4.5), ("bob", 3.0), ("carol", 2.0)]);

        let delegate = Delegate::replying("carol");
        let mut selector = SpeakerSelector::new(FixedRandom { roll: 0.69999 });
        let low = selector
            .select(&scores, &roster, &[], None, &delegate)
            .await
            .unwrap();
        assert_eq!(low.speaker, ParticipantId::new("alice"));
        assert_eq!(low.path, SelectionPath::Direct);
        assert_eq!(delegate.calls.load(AtomicOrdering::SeqCst), 0);

        let mut selector = SpeakerSelector::new(FixedRandom { roll: 0.70001 });
        let high = selector
            .select(&scores, &roster, &[], None, &delegate)
            .await
            .unwrap();
        assert_eq!(high.speaker, ParticipantId::new("carol"));
        assert_eq!(high.path, SelectionPath::Delegated);
        assert_eq!(delegate.calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delegate_failure_falls_back_to_eligible() {
        let roster = roster(&["alice", "bob"]);
        let scores = scores(&[("alice", 2.0), ("bob", 3.0)]);
        let delegate = Delegate::failing();
        let mut selector = SpeakerSelector::new(FixedRandom { roll: 0.9 });

        let selection = selector
            .select(&scores, &roster, &[], None, &delegate)
            .await
            .unwrap();
        assert_eq!(selection.path, SelectionPath::DelegateFallback);
        // FixedRandom picks index 0 of the ranked list.
        assert_eq!(selection.speaker, ParticipantId::new("bob"));
    }

    #[tokio::test]
    async fn test_delegate_choosing_restricted_is_overridden() {
        let roster = roster(&["alice", "bob", "carol"]);
        let scores = scores(&[("alice", 2.0), ("bob", 0.0), ("carol", 1.5)]);
        let bob = ParticipantId::new("bob");
        let delegate = Delegate::replying("bob");
        let mut selector = SpeakerSelector::new(FixedRandom { roll: 0.95 });

        let selection = selector
            .select(&scores, &roster, &[], Some(&bob), &delegate)
            .await
            .unwrap();
        assert_eq!(selection.path, SelectionPath::DelegateFallback);
        assert_ne!(selection.speaker, bob);
    }

    #[tokio::test]
    async fn test_delegate_choosing_unknown_is_overridden() {
        let roster = roster(&["alice", "bob"]);
        let scores = scores(&[("alice", 2.0), ("bob", 3.0)]);
        let delegate = Delegate::replying("mallory");
        let mut selector = SpeakerSelector::new(FixedRandom { roll: 0.95 });

        let selection = selector
            .select(&scores, &roster, &[], None, &delegate)
            .await
            .unwrap();
        assert_eq!(selection.path, SelectionPath::DelegateFallback);
    }

    #[tokio::test]
    async fn test_delegate_only_sees_top_k() {
        let roster = roster(&["a", "b", "c", "d", "e"]);
        let scores = scores(&[("a", 1.0), ("b", 5.0), ("c", 4.0), ("d", 3.0), ("e", 2.0)]);
        // "a" has the lowest score, so it is outside the top three.
        let delegate = Delegate::replying("a");
        let mut selector = SpeakerSelector::new(FixedRandom { roll: 0.95 });

        let selection = selector
            .select(&scores, &roster, &[], None, &delegate)
            .await
            .unwrap();
        assert_eq!(selection.path, SelectionPath::DelegateFallback);
        assert_eq!(selection.speaker, ParticipantId::new("b"));
    }

    #[tokio::test]
    async fn test_empty_scores_fall_back_to_unrestricted() {
        let roster = roster(&["alice", "bob"]);
        let alice = ParticipantId::new("alice");
        let delegate = Delegate::replying("alice");
        let mut selector = SpeakerSelector::new(FixedRandom { roll: 0.1 });

        let selection = selector
            .select(&HashMap::new(), &roster, &[], Some(&alice), &delegate)
            .await
            .unwrap();
        assert_eq!(selection.speaker, ParticipantId::new("bob"));
        assert_eq!(selection.path, SelectionPath::EmptyFallback);
    }

    #[tokio::test]
    async fn test_only_restricted_left_still_resolves() {
        let roster = roster(&["alice"]);
        let alice = ParticipantId::new("alice");
        let delegate = Delegate::replying("alice");
        let mut selector = SpeakerSelector::new(FixedRandom { roll: 0.1 });

        let selection = selector
            .select(&scores(&[("alice", 0.0)]), &roster, &[], Some(&alice), &delegate)
            .await
            .unwrap();
        assert_eq!(selection.speaker, alice);
    }

    #[tokio::test]
    async fn test_moderator_only_roster_yields_none() {
        let roster = roster(&[]);
        let delegate = Delegate::replying("mod");
        let mut selector = SpeakerSelector::new(FixedRandom { roll: 0.1 });

        let selection = selector
            .select(&scores(&[("mod", 5.0)]), &roster, &[], None, &delegate)
            .await;
        assert!(selection.is_none());
    }

    #[test]
    fn test_rank_orders_by_score_then_roster() {
        let roster = roster(&["alice", "bob", "carol"]);
        let scores = scores(&[("alice", 3.0), ("bob", 5.0), ("carol", 3.0), ("mod", 7.0)]);
        let ranked: Vec<&str> = rank(&scores, &roster, None)
            .into_iter()
            .map(|state| state.id().as_str())
            .collect();
        assert_eq!(ranked, vec!["bob", "alice", "carol"]);
    }
}
