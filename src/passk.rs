//! pass@k estimation
//!
//! Unbiased pass@k over the outcomes table, grouped per problem OID. An
//! attempt counts as a pass when its original error line came back clean
//! (`line_is_clean == Some(true)`); unknown verdicts count as failures.

use crate::metrics::OutcomeRecord;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Unbiased estimator: 1 - C(n-c, k) / C(n, k), computed incrementally.
pub fn pass_at_k(n: usize, c: usize, k: usize) -> f64 {
    if n.saturating_sub(c) < k {
        return 1.0;
    }

    let mut prob_all_fail = 1.0f64;
    for i in 0..k {
        prob_all_fail *= (n - c - i) as f64 / (n - i) as f64;
    }
    1.0 - prob_all_fail
}

#[derive(Debug, Clone, Serialize)]
pub struct PassAtKScore {
    pub k: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassAtKReport {
    pub llm_name: String,
    pub problems: usize,
    pub attempts: usize,
    pub scores: Vec<PassAtKScore>,
}

/// Average pass@k across problems for one model's outcomes.
///
/// When `valid_oids` is given, outcomes for uncatalogued problems are
/// dropped first so the estimate covers exactly the defined problem set.
pub fn evaluate_outcomes(
    outcomes: &[OutcomeRecord],
    ks: &[usize],
    valid_oids: Option<&HashSet<String>>,
) -> PassAtKReport {
    let filtered: Vec<&OutcomeRecord> = outcomes
        .iter()
        .filter(|outcome| !outcome.oid.is_empty())
        .filter(|outcome| {
            valid_oids
                .map(|oids| oids.contains(&outcome.oid))
                .unwrap_or(true)
        })
        .collect();

    // (n, c) per problem; BTreeMap keeps report ordering stable.
    let mut per_problem: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for outcome in &filtered {
        let entry = per_problem.entry(outcome.oid.as_str()).or_insert((0, 0));
        entry.0 += 1;
        if outcome.line_is_clean == Some(true) {
            entry.1 += 1;
        }
    }

    let llm_name = filtered
        .first()
        .map(|outcome| outcome.llm_name.clone())
        .unwrap_or_default();

    let scores = ks
        .iter()
        .map(|&k| {
            let score = if per_problem.is_empty() {
                0.0
            } else {
                per_problem
                    .values()
                    .map(|&(n, c)| pass_at_k(n, c, k))
                    .sum::<f64>()
                    / per_problem.len() as f64
            };
            PassAtKScore { k, score }
        })
        .collect();

    PassAtKReport {
        llm_name,
        problems: per_problem.len(),
        attempts: filtered.len(),
        scores,
    }
}
