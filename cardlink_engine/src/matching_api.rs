use std::{collections::HashMap, fmt::Debug};

use chrono::Utc;
use log::*;

use crate::{
    db_types::{Category, LineItem, RequestMode},
    matching::{
        heuristic_score,
        make_offers,
        rank_offers,
        CandidateFeatures,
        CardOffer,
        RankedCandidate,
        RankingService,
        RankingSource,
    },
    traits::{RequestFlowDatabase, RequestFlowError},
};

/// `MatchingApi` finds and orders candidate cards for a cart.
///
/// The remote ranking collaborator is consulted when it is healthy; any failure falls back to the local activity
/// heuristic without surfacing an error, so matching keeps working when the model service is down.
pub struct MatchingApi<B, R> {
    db: B,
    ranking: R,
}

impl<B, R> Debug for MatchingApi<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MatchingApi")
    }
}

impl<B, R> MatchingApi<B, R> {
    pub fn new(db: B, ranking: R) -> Self {
        Self { db, ranking }
    }
}

impl<B, R> MatchingApi<B, R>
where
    B: RequestFlowDatabase,
    R: RankingService,
{
    /// Every candidate card for the cart, ordered best-first. Cards must be active, cover at least one cart
    /// category, have monthly headroom for the discounted total, and (in immediate mode) belong to a recently-active
    /// owner.
    pub async fn match_cards(&self, items: &[LineItem], mode: RequestMode) -> Result<Vec<RankedCandidate>, RequestFlowError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let mut categories: Vec<Category> = Vec::new();
        for item in items {
            if !categories.contains(&item.category) {
                categories.push(item.category);
            }
        }
        let candidates = self.db.fetch_match_candidates(&categories, mode, now).await?;
        let offers = make_offers(candidates, items);
        if offers.is_empty() {
            debug!("🔀️ No candidate cards for this cart in {mode} mode");
            return Ok(Vec::new());
        }
        if self.ranking.is_healthy().await {
            match self.rank_remotely(&offers).await {
                Ok(scores) => {
                    debug!("🔀️ {} candidate(s) ordered by the ranking model", offers.len());
                    let ranked = rank_offers(
                        offers,
                        |o| scores.get(&o.candidate.cardholder.email).copied().unwrap_or(0.0),
                        RankingSource::Model,
                        now,
                    );
                    return Ok(ranked);
                },
                Err(e) => {
                    warn!("🔀️ Ranking service failed mid-flight, falling back to the local heuristic: {e}");
                },
            }
        } else {
            debug!("🔀️ Ranking service unavailable; using the local heuristic");
        }
        let ranked = rank_offers(
            offers,
            |o| heuristic_score(&o.candidate.cardholder, o.candidate.active_cards, now),
            RankingSource::Heuristic,
            now,
        );
        Ok(ranked)
    }

    /// Derive a feature row per candidate from their history and ask the collaborator to score the batch.
    async fn rank_remotely(&self, offers: &[CardOffer]) -> Result<HashMap<String, f64>, RequestFlowError> {
        let now = Utc::now();
        let mut features = Vec::with_capacity(offers.len());
        for offer in offers {
            let email = &offer.candidate.cardholder.email;
            let history = self.db.fetch_history_for_cardholder(email).await?;
            features.push(CandidateFeatures::derive(email, offer.candidate.card.monthly_limit, &history, now));
        }
        let scores = self
            .ranking
            .rank_batch(&features)
            .await
            .map_err(|e| RequestFlowError::RankingUnavailable(e.to_string()))?;
        Ok(scores.into_iter().map(|s| (s.cardholder_id, s.health_score)).collect())
    }
}
