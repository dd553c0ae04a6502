// In crates/advisory/src/scripted.rs

use crate::types::{AdvisoryAction, AdvisoryRole, EntryContext, PositionContext};
use crate::{AdvisoryClient, AdvisoryRecommendation, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// An advisory client that replays a queue of canned recommendations.
///
/// Used for paper runs and tests. When the queue runs dry it answers with a
/// zero-confidence ignore/maintain, which the policy threshold filters out,
/// so a drained script produces no side effects.
#[derive(Debug, Default)]
pub struct ScriptedAdvisoryClient {
    entry_queue: Mutex<VecDeque<AdvisoryRecommendation>>,
    conduct_queue: Mutex<VecDeque<AdvisoryRecommendation>>,
    entry_calls: AtomicUsize,
    conduct_calls: AtomicUsize,
}

impl ScriptedAdvisoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_entry(&self, recommendation: AdvisoryRecommendation) {
        self.entry_queue.lock().await.push_back(recommendation);
    }

    pub async fn push_conduct(&self, recommendation: AdvisoryRecommendation) {
        self.conduct_queue.lock().await.push_back(recommendation);
    }

    /// How many entry evaluations have been requested so far.
    pub fn entry_calls(&self) -> usize {
        self.entry_calls.load(Ordering::SeqCst)
    }

    /// How many position reviews have been requested so far.
    pub fn conduct_calls(&self) -> usize {
        self.conduct_calls.load(Ordering::SeqCst)
    }

    /// A recommendation that clears no confidence threshold.
    fn idle(role: AdvisoryRole) -> AdvisoryRecommendation {
        let action = match role {
            AdvisoryRole::EntryEvaluator => AdvisoryAction::Ignore,
            AdvisoryRole::TradeConductor => AdvisoryAction::Maintain,
        };
        AdvisoryRecommendation {
            timestamp: Utc::now(),
            role,
            confidence: 0.0,
            actions: vec![action],
            rationale: "scripted queue exhausted".to_string(),
        }
    }
}

#[async_trait]
impl AdvisoryClient for ScriptedAdvisoryClient {
    async fn evaluate_entry(&self, _context: &EntryContext) -> Result<AdvisoryRecommendation> {
        self.entry_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.entry_queue.lock().await.pop_front();
        match next {
            Some(rec) => rec.validated(AdvisoryRole::EntryEvaluator),
            None => Ok(Self::idle(AdvisoryRole::EntryEvaluator)),
        }
    }

    async fn conduct_position(
        &self,
        _context: &PositionContext,
    ) -> Result<AdvisoryRecommendation> {
        self.conduct_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.conduct_queue.lock().await.pop_front();
        match next {
            Some(rec) => rec.validated(AdvisoryRole::TradeConductor),
            None => Ok(Self::idle(AdvisoryRole::TradeConductor)),
        }
    }
}
