//! Search query grammar.
//!
//! Queries are space-joined qualifiers (logical AND) in a fixed order so the
//! wire form is stable for a given scope:
//!
//! ```text
//! type:pr is:open org:acme archived:false
//! type:pr is:merged author:octocat merged:>=2024-03-01 archived:false
//! ```
//!
//! The same string doubles as the cache scope discriminator for
//! aggregation-level entries.

use chrono::NaiveDate;
use std::fmt;

/// Pull request state qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrState {
    Open,
    Merged,
}

/// Whose pull requests a query covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Org(String),
    Author(String),
    /// A single `owner/name` repository.
    Repo(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub state: PrState,
    pub scope: Scope,
    pub merged_since: Option<NaiveDate>,
    pub exclude_archived: bool,
    /// Request `sort=updated&order=desc` paging parameters.
    pub sort_by_updated: bool,
}

impl SearchQuery {
    pub fn open(scope: Scope) -> Self {
        Self {
            state: PrState::Open,
            scope,
            merged_since: None,
            exclude_archived: true,
            sort_by_updated: true,
        }
    }

    pub fn merged(scope: Scope) -> Self {
        Self {
            state: PrState::Merged,
            ..Self::open(scope)
        }
    }

    pub fn merged_since(mut self, date: NaiveDate) -> Self {
        self.merged_since = Some(date);
        self
    }

    pub fn include_archived(mut self) -> Self {
        self.exclude_archived = false;
        self
    }

    pub fn unsorted(mut self) -> Self {
        self.sort_by_updated = false;
        self
    }

    /// Query-string parameters for one page of this search.
    pub fn page_params(&self, page: u32, per_page: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", self.to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ];
        if self.sort_by_updated {
            params.push(("sort", "updated".to_string()));
            params.push(("order", "desc".to_string()));
        }
        params
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type:pr")?;
        match self.state {
            PrState::Open => write!(f, " is:open")?,
            PrState::Merged => write!(f, " is:merged")?,
        }
        match &self.scope {
            Scope::Org(org) => write!(f, " org:{}", org)?,
            Scope::Author(user) => write!(f, " author:{}", user)?,
            Scope::Repo(repo) => write!(f, " repo:{}", repo)?,
        }
        if let Some(date) = self.merged_since {
            write!(f, " merged:>={}", date.format("%Y-%m-%d"))?;
        }
        if self.exclude_archived {
            write!(f, " archived:false")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_org_query() {
        let q = SearchQuery::open(Scope::Org("acme".into()));
        assert_eq!(q.to_string(), "type:pr is:open org:acme archived:false");
    }

    #[test]
    fn test_merged_author_query_with_window() {
        let q = SearchQuery::merged(Scope::Author("octocat".into()))
            .merged_since(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(
            q.to_string(),
            "type:pr is:merged author:octocat merged:>=2024-03-01 archived:false"
        );
    }

    #[test]
    fn test_page_params() {
        let q = SearchQuery::open(Scope::Repo("acme/widgets".into())).include_archived();
        let params = q.page_params(3, 100);
        assert_eq!(params[0], ("q", "type:pr is:open repo:acme/widgets".to_string()));
        assert!(params.contains(&("per_page", "100".to_string())));
        assert!(params.contains(&("page", "3".to_string())));
        assert!(params.contains(&("sort", "updated".to_string())));
        assert!(params.contains(&("order", "desc".to_string())));

        let unsorted = q.unsorted().page_params(1, 50);
        assert!(!unsorted.iter().any(|(k, _)| *k == "sort"));
    }
}
