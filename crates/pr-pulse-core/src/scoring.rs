//! Heuristic importance scoring for changelog and leaderboard ordering.
//!
//! Scores are only a sort key. Every matching rule contributes its delta;
//! rules are independent rather than first-match. The rule table is plain
//! data ([`ScoringRules`]) so variants are configuration, not code:
//!
//! ```toml
//! [scoring]
//! reaction_weight = 4
//! keywords = [
//!   { terms = ["security", "cve"], delta = 8 },
//!   { terms = ["chore"], delta = -2 },
//! ]
//! ```
//!
//! Terms match case-insensitively at the start of a word, so `"feat"`
//! matches `"feat:"` and `"feature"` but `"fix"` does not match `"prefix"`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::models::{Actor, CommitItem, SearchItem};

/// One scoring rule: any matching term applies `delta` once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRule {
    pub terms: Vec<String>,
    pub delta: i64,
}

impl TermRule {
    pub fn new(terms: &[&str], delta: i64) -> Self {
        Self {
            terms: terms.iter().map(|t| t.to_string()).collect(),
            delta,
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.terms
            .iter()
            .any(|term| contains_word_prefix(lowered, &term.to_lowercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    pub reaction_weight: i64,
    /// Flat base for direct commits, replacing engagement.
    pub commit_base: i64,
    pub bot_penalty: i64,
    /// Requested reviewers above this count earn `reviewer_bonus`.
    pub reviewer_threshold: u32,
    pub reviewer_bonus: i64,
    pub milestone_bonus: i64,
    /// Rules over lower-cased title and body text.
    pub keywords: Vec<TermRule>,
    /// Rules over label names.
    pub labels: Vec<TermRule>,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            reaction_weight: 4,
            commit_base: 7,
            bot_penalty: -3,
            reviewer_threshold: 2,
            reviewer_bonus: 1,
            milestone_bonus: 2,
            keywords: vec![
                TermRule::new(
                    &["security", "vulnerab", "cve-", "exploit", "xss", "csrf"],
                    8,
                ),
                TermRule::new(&["revert"], 4),
                TermRule::new(&["feat"], 4),
                TermRule::new(&["breaking", "refactor"], 3),
                TermRule::new(&["add", "introduce", "new ", "feature", "support"], 2),
                TermRule::new(&["perf", "optimiz", "faster", "speed up"], 1),
                TermRule::new(&["fix", "cleanup", "clean up", "test", "typo"], -1),
                TermRule::new(&["chore"], -2),
                TermRule::new(&["bump", "deps", "dependency", "dependencies"], -3),
            ],
            labels: vec![
                TermRule::new(&["breaking"], 3),
                TermRule::new(&["feature", "enhancement"], 2),
                TermRule::new(&["bug", "critical"], 1),
                TermRule::new(&["docs", "documentation"], -1),
            ],
        }
    }
}

/// Something the scorer can rank.
pub trait Scorable {
    /// Starting score before keyword and label rules.
    fn base_score(&self, rules: &ScoringRules) -> i64;

    fn text(&self) -> String;

    fn labels(&self) -> &[String] {
        &[]
    }

    fn author(&self) -> &Actor;

    fn bonus(&self, _rules: &ScoringRules) -> i64 {
        0
    }

    /// Secondary sort key, compared descending when scores tie.
    fn tie_break(&self) -> i64;
}

impl Scorable for SearchItem {
    fn base_score(&self, rules: &ScoringRules) -> i64 {
        i64::from(self.comments) + rules.reaction_weight * i64::from(self.reactions)
    }

    fn text(&self) -> String {
        match &self.body {
            Some(body) => format!("{}\n{}", self.title, body),
            None => self.title.clone(),
        }
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn author(&self) -> &Actor {
        &self.author
    }

    fn bonus(&self, rules: &ScoringRules) -> i64 {
        let Some(enrichment) = &self.enrichment else {
            return 0;
        };
        let mut bonus = 0;
        if enrichment.requested_reviewers > rules.reviewer_threshold {
            bonus += rules.reviewer_bonus;
        }
        if enrichment.milestone.is_some() {
            bonus += rules.milestone_bonus;
        }
        bonus
    }

    fn tie_break(&self) -> i64 {
        self.number as i64
    }
}

impl Scorable for CommitItem {
    fn base_score(&self, rules: &ScoringRules) -> i64 {
        rules.commit_base
    }

    fn text(&self) -> String {
        self.message.clone()
    }

    fn author(&self) -> &Actor {
        &self.author
    }

    fn tie_break(&self) -> i64 {
        self.committed_at.timestamp()
    }
}

impl ScoringRules {
    pub fn score<S: Scorable>(&self, item: &S) -> i64 {
        let mut score = item.base_score(self);

        let text = item.text().to_lowercase();
        score += self
            .keywords
            .iter()
            .filter(|rule| rule.matches(&text))
            .map(|rule| rule.delta)
            .sum::<i64>();

        for label in item.labels() {
            let label = label.to_lowercase();
            score += self
                .labels
                .iter()
                .filter(|rule| rule.matches(&label))
                .map(|rule| rule.delta)
                .sum::<i64>();
        }

        if item.author().is_bot() {
            score += self.bot_penalty;
        }

        score + item.bonus(self)
    }
}

/// An item with its transient importance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored<T> {
    pub score: i64,
    #[serde(flatten)]
    pub item: T,
}

/// Score every item and sort by score descending, then tie-break key
/// descending.
pub fn rank<S: Scorable>(items: Vec<S>, rules: &ScoringRules) -> Vec<Scored<S>> {
    let mut scored: Vec<Scored<S>> = items
        .into_iter()
        .map(|item| Scored {
            score: rules.score(&item),
            item,
        })
        .collect();
    scored.sort_by(|a, b| match b.score.cmp(&a.score) {
        Ordering::Equal => b.item.tie_break().cmp(&a.item.tie_break()),
        other => other,
    });
    scored
}

fn contains_word_prefix(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    haystack.match_indices(term).any(|(idx, _)| {
        haystack[..idx]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Enrichment;
    use chrono::{TimeZone, Utc};

    fn pr(number: u64, title: &str) -> SearchItem {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        SearchItem {
            id: number,
            number,
            title: title.to_string(),
            body: None,
            author: Actor::new("octocat"),
            created_at: ts,
            updated_at: ts,
            merged_at: Some(ts),
            labels: vec![],
            comments: 0,
            reactions: 0,
            repository: "acme/widgets".to_string(),
            draft: false,
            repository_inactive: false,
            enrichment: None,
        }
    }

    #[test]
    fn test_engagement_base() {
        let rules = ScoringRules::default();
        let mut item = pr(1, "Update readme wording");
        item.comments = 3;
        item.reactions = 2;
        assert_eq!(rules.score(&item), 3 + 8);
    }

    #[test]
    fn test_rules_stack_independently() {
        let rules = ScoringRules::default();
        // "feat" (+4) and "feature"/"add" (+2) both apply.
        assert_eq!(rules.score(&pr(1, "feat: add export feature")), 6);
        assert_eq!(rules.score(&pr(2, "Fix XSS in security headers")), 8 - 1);
        assert_eq!(rules.score(&pr(3, "chore(deps): bump serde")), -2 - 3);
    }

    #[test]
    fn test_word_prefix_matching() {
        let rules = ScoringRules::default();
        assert_eq!(rules.score(&pr(1, "Use latest prefix format")), 0);
        assert!(contains_word_prefix("feat: thing", "feat"));
        assert!(!contains_word_prefix("prefix", "fix"));
    }

    #[test]
    fn test_labels_bot_and_bonuses() {
        let rules = ScoringRules::default();
        let mut item = pr(1, "Rework scheduler");
        item.labels = vec!["Breaking Change".into(), "bug".into(), "docs".into()];
        assert_eq!(rules.score(&item), 3 + 1 - 1);

        item.author = Actor::new("renovate[bot]");
        assert_eq!(rules.score(&item), 3 + 1 - 1 - 3);

        let enriched = pr(2, "Rework scheduler").with_enrichment(Enrichment {
            requested_reviewers: 3,
            milestone: Some("v2.0".into()),
            ..Default::default()
        });
        assert_eq!(rules.score(&enriched), 1 + 2);
    }

    #[test]
    fn test_commit_flat_base() {
        let rules = ScoringRules::default();
        let commit = CommitItem {
            sha: "abc123".into(),
            message: "Revert broken release".into(),
            author: Actor::new("octocat"),
            committed_at: Utc::now(),
        };
        assert_eq!(rules.score(&commit), 7 + 4);
    }

    #[test]
    fn test_rank_ties_break_by_number_desc() {
        let rules = ScoringRules::default();
        let items = vec![
            pr(10, "Rename module"),
            pr(30, "Rename other module"),
            pr(20, "feat: new api"),
        ];
        let ranked = rank(items, &rules);
        let order: Vec<u64> = ranked.iter().map(|s| s.item.number).collect();
        assert_eq!(order, vec![20, 30, 10]);
    }

    #[test]
    fn test_partial_rule_override_keeps_defaults() {
        let rules: ScoringRules = serde_json::from_value(serde_json::json!({
            "reaction_weight": 1,
            "keywords": [{ "terms": ["urgent"], "delta": 5 }]
        }))
        .unwrap();
        assert_eq!(rules.commit_base, 7);
        assert!(rules.labels.len() == ScoringRules::default().labels.len());
        let mut item = pr(1, "URGENT hotfix");
        item.reactions = 2;
        assert_eq!(rules.score(&item), 2 + 5);
    }
}
