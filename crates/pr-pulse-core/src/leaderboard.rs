//! Contributor leaderboard over a set of pull requests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::SearchItem;
use crate::scoring::{ScoringRules, Scorable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorStat {
    pub login: String,
    pub prs: u64,
    /// Sum of importance scores of the contributor's pull requests.
    pub impact: i64,
    pub is_bot: bool,
}

/// Group items by author. Bots are dropped unless `include_bots` is set.
///
/// Sorted by PR count descending, then impact descending, then login.
pub fn build_leaderboard(
    items: &[SearchItem],
    include_bots: bool,
    rules: &ScoringRules,
) -> Vec<ContributorStat> {
    let mut by_login: HashMap<String, ContributorStat> = HashMap::new();

    for item in items {
        let is_bot = item.author().is_bot();
        if is_bot && !include_bots {
            continue;
        }
        let entry = by_login
            .entry(item.author.login.to_lowercase())
            .or_insert_with(|| ContributorStat {
                login: item.author.login.clone(),
                prs: 0,
                impact: 0,
                is_bot,
            });
        entry.prs += 1;
        entry.impact += rules.score(item);
    }

    let mut board: Vec<ContributorStat> = by_login.into_values().collect();
    board.sort_by(|a, b| {
        b.prs
            .cmp(&a.prs)
            .then(b.impact.cmp(&a.impact))
            .then_with(|| a.login.to_lowercase().cmp(&b.login.to_lowercase()))
    });
    board
}
