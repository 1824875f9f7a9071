//! Turns diagnostic signals into a ranked list of catalog actions.
//!
//! Four independent rules each propose candidates: the health score, the
//! recent failure count, critical compatibility issues (keyword matched) and
//! hypotheses (mapped by category). Candidates are merged, de-duplicated by
//! id keeping the first occurrence, then stably ranked by urgency and
//! expected success rate, both descending.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use remedy_core::types::{ActionType, ExecutionMode, RemediationAction, Urgency};
use serde_json::json;

use crate::catalog::{self, ActionCatalog};
use crate::signals::{CompatibilityReport, Hypothesis, HypothesisCategory};

/// Id of the synthesized action proposed when failures pile up.
pub const INVESTIGATE_HIGH_FAILURE_RATE: &str = "investigate_high_failure_rate";

/// Below this health score the most invasive repair is proposed.
const CRITICAL_HEALTH: f64 = 50.0;
/// Below this health score the mid-tier repairs are proposed.
const DEGRADED_HEALTH: f64 = 70.0;

/// Inputs collected from the collaborators and the history store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationSignals {
    pub health_score: Option<f64>,
    /// Failed executions in the last 24 hours.
    pub recent_failures: usize,
    pub compatibility: Option<CompatibilityReport>,
    pub hypotheses: Vec<Hypothesis>,
}

struct KeywordRule {
    regex: Regex,
    action_id: &'static str,
}

pub struct RecommendationAggregator {
    catalog: Arc<ActionCatalog>,
    failure_threshold: usize,
    keyword_rules: Vec<KeywordRule>,
}

impl RecommendationAggregator {
    pub fn new(catalog: Arc<ActionCatalog>, failure_threshold: usize) -> Self {
        let rules: [(&str, &'static str); 5] = [
            (r"(?i)encrypt|cipher", catalog::SQLITE_FALLBACK),
            (r"(?i)pragma", catalog::OPTIMIZE_PRAGMAS),
            (r"(?i)factory|initializ", catalog::RESET_DATABASE_FACTORY),
            (r"(?i)corrupt|malformed", catalog::RECREATE_DATABASE),
            (r"(?i)missing|dependenc|library", catalog::DEPENDENCY_CHECK),
        ];
        let keyword_rules = rules
            .iter()
            .map(|&(pattern, action_id)| KeywordRule {
                regex: Regex::new(pattern).expect("Invalid compatibility keyword regex"),
                action_id,
            })
            .collect();

        Self {
            catalog,
            failure_threshold,
            keyword_rules,
        }
    }

    /// Ranked, de-duplicated recommendations for `signals`.
    pub fn aggregate(&self, signals: &RecommendationSignals) -> Vec<RemediationAction> {
        let mut candidates = Vec::new();

        if let Some(score) = signals.health_score {
            candidates.extend(self.lookup(health_rule(score)));
        }

        if signals.recent_failures > self.failure_threshold {
            candidates.push(investigate_high_failure_rate(signals.recent_failures));
        }

        if let Some(ref report) = signals.compatibility {
            for issue in &report.critical_issues {
                candidates.extend(self.lookup(self.match_issue(issue)));
            }
        }

        let from_hypotheses: Vec<&str> = signals
            .hypotheses
            .iter()
            .filter_map(|h| action_for_category(h.category))
            .collect();
        candidates.extend(self.lookup(from_hypotheses));

        rank(candidates)
    }

    /// Catalog ids whose keywords appear in `issue`, in rule order.
    pub fn match_issue(&self, issue: &str) -> Vec<&'static str> {
        self.keyword_rules
            .iter()
            .filter(|rule| rule.regex.is_match(issue))
            .map(|rule| rule.action_id)
            .collect()
    }

    /// Resolve ids against the live catalog, skipping removed entries.
    fn lookup<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Vec<RemediationAction> {
        ids.into_iter().filter_map(|id| self.catalog.find(id)).collect()
    }
}

fn health_rule(score: f64) -> Vec<&'static str> {
    if score < CRITICAL_HEALTH {
        vec![catalog::RECREATE_DATABASE]
    } else if score < DEGRADED_HEALTH {
        vec![catalog::RESET_DATABASE_FACTORY, catalog::OPTIMIZE_PRAGMAS]
    } else {
        Vec::new()
    }
}

/// The catalog action that addresses a hypothesis category.
pub fn action_for_category(category: HypothesisCategory) -> Option<&'static str> {
    match category {
        HypothesisCategory::PlatformFactoryMismatch => Some(catalog::RESET_DATABASE_FACTORY),
        HypothesisCategory::PragmaCommandFailure => Some(catalog::OPTIMIZE_PRAGMAS),
        HypothesisCategory::EncryptedStorageCompatibility => Some(catalog::SQLITE_FALLBACK),
        HypothesisCategory::CorruptedDatabase => Some(catalog::RECREATE_DATABASE),
        HypothesisCategory::MissingDependencies => Some(catalog::DEPENDENCY_CHECK),
        HypothesisCategory::Other => None,
    }
}

/// Manual investigation proposal. Never registered in the catalog.
pub fn investigate_high_failure_rate(failures: usize) -> RemediationAction {
    let mut action = RemediationAction::new(
        INVESTIGATE_HIGH_FAILURE_RATE,
        "Investigate high failure rate",
        ActionType::Monitoring,
        Urgency::High,
        ExecutionMode::Manual,
        0.8,
    )
    .with_description(format!(
        "{} remediation attempts failed in the last 24 hours",
        failures
    ))
    .with_target_issue("repeated remediation failures")
    .with_parameter("failures_last_24h", json!(failures));
    action.steps = vec![
        "Review the failed results and their error messages".to_string(),
        "Check whether the same action keeps failing".to_string(),
    ];
    action
}

/// Drop repeated ids (first wins), then stable sort by urgency and success
/// rate, both descending.
pub fn rank(candidates: Vec<RemediationAction>) -> Vec<RemediationAction> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<RemediationAction> = candidates
        .into_iter()
        .filter(|action| seen.insert(action.id.clone()))
        .collect();
    ranked.sort_by(|a, b| {
        b.urgency
            .cmp(&a.urgency)
            .then_with(|| b.success_rate.total_cmp(&a.success_rate))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> RecommendationAggregator {
        RecommendationAggregator::new(Arc::new(ActionCatalog::with_builtin()), 3)
    }

    fn ids(actions: &[RemediationAction]) -> Vec<&str> {
        actions.iter().map(|a| a.id.as_str()).collect()
    }

    fn plain(id: &str, urgency: Urgency, success_rate: f64) -> RemediationAction {
        RemediationAction::new(
            id,
            id,
            ActionType::Monitoring,
            urgency,
            ExecutionMode::Manual,
            success_rate,
        )
    }

    #[test]
    fn test_rank_orders_by_urgency() {
        let ranked = rank(vec![
            plain("low", Urgency::Low, 0.9),
            plain("critical", Urgency::Critical, 0.9),
            plain("high", Urgency::High, 0.9),
        ]);
        assert_eq!(ids(&ranked), vec!["critical", "high", "low"]);
    }

    #[test]
    fn test_rank_ties_break_on_success_rate_then_stable() {
        let ranked = rank(vec![
            plain("a", Urgency::Normal, 0.5),
            plain("b", Urgency::Normal, 0.9),
            plain("c", Urgency::Normal, 0.5),
        ]);
        assert_eq!(ids(&ranked), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_rank_keeps_first_duplicate() {
        let ranked = rank(vec![
            plain("a", Urgency::Low, 0.1),
            plain("a", Urgency::Emergency, 1.0),
        ]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].urgency, Urgency::Low);
    }

    #[test]
    fn test_health_bands() {
        let agg = aggregator();
        let critical = agg.aggregate(&RecommendationSignals {
            health_score: Some(49.9),
            ..Default::default()
        });
        assert_eq!(ids(&critical), vec![catalog::RECREATE_DATABASE]);

        let degraded = agg.aggregate(&RecommendationSignals {
            health_score: Some(50.0),
            ..Default::default()
        });
        assert_eq!(
            ids(&degraded),
            vec![catalog::RESET_DATABASE_FACTORY, catalog::OPTIMIZE_PRAGMAS]
        );

        let healthy = agg.aggregate(&RecommendationSignals {
            health_score: Some(70.0),
            ..Default::default()
        });
        assert!(healthy.is_empty());
    }

    #[test]
    fn test_failure_threshold_is_exclusive() {
        let agg = aggregator();
        let at_threshold = agg.aggregate(&RecommendationSignals {
            recent_failures: 3,
            ..Default::default()
        });
        assert!(at_threshold.is_empty());

        let above = agg.aggregate(&RecommendationSignals {
            recent_failures: 4,
            ..Default::default()
        });
        assert_eq!(ids(&above), vec![INVESTIGATE_HIGH_FAILURE_RATE]);
        assert_eq!(above[0].execution_mode, ExecutionMode::Manual);
        assert!(agg.catalog.find(INVESTIGATE_HIGH_FAILURE_RATE).is_none());
    }

    #[test]
    fn test_keyword_matching_is_case_insensitive() {
        let agg = aggregator();
        assert_eq!(
            agg.match_issue("SQLCipher library failed to load"),
            vec![catalog::SQLITE_FALLBACK, catalog::DEPENDENCY_CHECK]
        );
        assert_eq!(
            agg.match_issue("PRAGMA journal_mode rejected"),
            vec![catalog::OPTIMIZE_PRAGMAS]
        );
        assert_eq!(
            agg.match_issue("Database factory not Initialized"),
            vec![catalog::RESET_DATABASE_FACTORY]
        );
        assert_eq!(
            agg.match_issue("database disk image is malformed"),
            vec![catalog::RECREATE_DATABASE]
        );
        assert!(agg.match_issue("slow query").is_empty());
    }

    #[test]
    fn test_hypotheses_map_by_category() {
        let agg = aggregator();
        let recommended = agg.aggregate(&RecommendationSignals {
            hypotheses: vec![
                Hypothesis::new(HypothesisCategory::MissingDependencies, "no ffi", 0.4),
                Hypothesis::new(HypothesisCategory::EncryptedStorageCompatibility, "cipher", 0.9),
                Hypothesis::new(HypothesisCategory::Other, "unknown", 0.2),
            ],
            ..Default::default()
        });
        assert_eq!(
            ids(&recommended),
            vec![catalog::SQLITE_FALLBACK, catalog::DEPENDENCY_CHECK]
        );
    }

    #[test]
    fn test_all_signals_merge_and_dedupe() {
        let agg = aggregator();
        let recommended = agg.aggregate(&RecommendationSignals {
            health_score: Some(60.0),
            recent_failures: 5,
            compatibility: Some(CompatibilityReport {
                is_compatible: false,
                compatibility_score: 20.0,
                critical_issues: vec!["pragma cipher_version unsupported".to_string()],
            }),
            hypotheses: vec![Hypothesis::new(
                HypothesisCategory::PlatformFactoryMismatch,
                "wrong factory",
                0.7,
            )],
        });
        assert_eq!(
            ids(&recommended),
            vec![
                catalog::RESET_DATABASE_FACTORY,
                catalog::SQLITE_FALLBACK,
                INVESTIGATE_HIGH_FAILURE_RATE,
                catalog::OPTIMIZE_PRAGMAS,
            ]
        );
    }

    #[test]
    fn test_removed_catalog_entries_are_skipped() {
        let catalog = Arc::new(ActionCatalog::with_builtin());
        catalog.remove(catalog::RECREATE_DATABASE);
        let agg = RecommendationAggregator::new(catalog, 3);
        let recommended = agg.aggregate(&RecommendationSignals {
            health_score: Some(10.0),
            ..Default::default()
        });
        assert!(recommended.is_empty());
    }
}
