//! Card matching and ranking.
//!
//! Matching finds every active card that covers the cart and whose owner is eligible for the request mode, computes
//! the discount each card would give, and orders the results. Ordering prefers the remote ranking collaborator's
//! model scores; when that service is down or unconfigured, a local activity heuristic takes over and the caller
//! never sees the difference.

mod features;
mod heuristic;

use cl_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use features::CandidateFeatures;
pub use heuristic::heuristic_score;

use crate::db_types::{cart_total, Card, Cardholder, Category, LineItem};

//--------------------------------------   RankingService     --------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum RankingError {
    #[error("No ranking service is configured")]
    NotConfigured,
    #[error("The ranking service is not accepting requests: {0}")]
    Unavailable(String),
    #[error("The ranking service returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// One scored row from the ranking collaborator. The service echoes the feature row back alongside the score; only
/// these fields matter here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteScore {
    pub cardholder_id: String,
    pub health_score: f64,
    pub rank: u32,
}

/// The seam to the external ranking model. Implementations live in the server crate; the engine only ever degrades
/// gracefully when a call fails.
#[allow(async_fn_in_trait)]
pub trait RankingService {
    /// Whether the collaborator is up and has its model loaded.
    async fn is_healthy(&self) -> bool;
    /// Score a batch of candidates. The result must contain one row per input candidate.
    async fn rank_batch(&self, candidates: &[CandidateFeatures]) -> Result<Vec<RemoteScore>, RankingError>;
}

/// The always-unavailable ranking service. Deployments without the collaborator use this and run purely on the local
/// heuristic.
#[derive(Debug, Clone, Default)]
pub struct NullRankingService;

impl RankingService for NullRankingService {
    async fn is_healthy(&self) -> bool {
        false
    }

    async fn rank_batch(&self, _candidates: &[CandidateFeatures]) -> Result<Vec<RemoteScore>, RankingError> {
        Err(RankingError::NotConfigured)
    }
}

//--------------------------------------     Candidates       --------------------------------------------------------

/// A raw eligible candidate as returned by the store: a card plus its owner and the owner's active card count.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub card: Card,
    pub cardholder: Cardholder,
    pub active_cards: usize,
}

/// Where a candidate's score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingSource {
    Model,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingMetadata {
    pub health_score: f64,
    pub rank: u32,
    pub source: RankingSource,
}

/// A match result ready to show the shopper. Card data is masked down to what the requester may see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub card_id: String,
    pub cardholder_email: String,
    pub cardholder_name: String,
    pub bank_name: String,
    pub card_type: String,
    pub last_four: String,
    pub categories: Vec<Category>,
    pub discount_pct: i64,
    pub discount_amount: Money,
    pub total_payable: Money,
    pub is_online: bool,
    pub ranking: RankingMetadata,
}

/// A candidate with its cart-specific discount computed, awaiting a score.
#[derive(Debug, Clone)]
pub struct CardOffer {
    pub candidate: MatchCandidate,
    pub discount_amount: Money,
    pub total_payable: Money,
}

/// Work out what each candidate card would take off this cart, dropping cards whose discount rounds to nothing and
/// cards whose monthly headroom cannot absorb the discounted total.
pub fn make_offers(candidates: Vec<MatchCandidate>, items: &[LineItem]) -> Vec<CardOffer> {
    let order_amount = cart_total(items);
    candidates
        .into_iter()
        .filter_map(|candidate| {
            let discount_amount = candidate.card.discount_for(items);
            if discount_amount.value() <= 0 {
                return None;
            }
            let total_payable = order_amount - discount_amount;
            let headroom = candidate.card.monthly_limit - candidate.card.current_month_spent;
            if total_payable > headroom {
                return None;
            }
            Some(CardOffer { candidate, discount_amount, total_payable })
        })
        .collect()
}

/// Turn scored offers into the final, ordered candidate list. Sorting is by the card's discount percentage first,
/// then by score, with the card id as a final tiebreak so the ordering is total and deterministic for a fixed input.
pub fn rank_offers(
    offers: Vec<CardOffer>,
    score_of: impl Fn(&CardOffer) -> f64,
    source: RankingSource,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<RankedCandidate> {
    let mut scored: Vec<(CardOffer, f64)> = offers.into_iter().map(|o| {
        let s = score_of(&o);
        (o, s)
    }).collect();
    scored.sort_by(|(a, sa), (b, sb)| {
        b.candidate
            .card
            .discount_pct
            .cmp(&a.candidate.card.discount_pct)
            .then(sb.partial_cmp(sa).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.candidate.card.id.cmp(&b.candidate.card.id))
    });
    scored
        .into_iter()
        .enumerate()
        .map(|(i, (offer, score))| {
            let MatchCandidate { card, cardholder, .. } = offer.candidate;
            RankedCandidate {
                card_id: card.id,
                cardholder_email: cardholder.email.clone(),
                cardholder_name: cardholder.name.clone(),
                bank_name: card.bank_name,
                card_type: card.card_type,
                last_four: card.last_four,
                categories: card.categories,
                discount_pct: card.discount_pct,
                discount_amount: offer.discount_amount,
                total_payable: offer.total_payable,
                is_online: cardholder.is_fresh(now),
                ranking: RankingMetadata { health_score: score, rank: (i + 1) as u32, source },
            }
        })
        .collect()
}
