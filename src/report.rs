//! Plain-text rendering for CLI output.
//!
//! Each `render_*` function returns the full text block so commands can
//! print it in one go and tests can assert on it. `--json` bypasses this
//! module entirely.

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::dashboard::{Changelog, Leaderboard, OrgStats, PrTurn, UserPrs};

pub fn render_org_stats(stats: &OrgStats, now: DateTime<Utc>) -> String {
    let s = &stats.snapshot;
    let mut out = String::new();
    let _ = writeln!(out, "{} — pull request health", stats.org);
    let _ = writeln!(out, "{}", "=".repeat(stats.org.len() + 24));
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  Window:       since {} ({})",
        stats.window_start.format("%Y-%m-%d"),
        format_relative(stats.window_start, now)
    );
    let _ = writeln!(out, "  Open PRs:     {}", format_number(s.open_count));
    let _ = writeln!(
        out,
        "  Stale:        {}{}",
        format_number(s.stale_count),
        if s.stale_extrapolated { " (estimated)" } else { "" }
    );
    let _ = writeln!(out, "  Merged:       {}", format_number(s.merged_in_window));
    let _ = writeln!(out, "  Avg open age: {}", format_days(s.average_open_age_days));
    let _ = writeln!(out, "  Avg cycle:    {}", format_days(s.average_cycle_time_days));
    let grade = s.grade.map(|g| g.label()).unwrap_or("no grade");
    let _ = writeln!(out, "  Health:       {} ({})", s.health_ratio, grade);
    if stats.open_sampled {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Open PRs were sampled; stale count is extrapolated.");
    }
    out
}

pub fn render_user_prs(prs: &UserPrs, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let result = &prs.result;
    let _ = writeln!(
        out,
        "{} open pull request{} by {}{}",
        format_number(result.total_count),
        if result.total_count == 1 { "" } else { "s" },
        prs.user,
        if result.sampled {
            format!(" (showing {})", result.sample_size)
        } else {
            String::new()
        }
    );
    if result.items.is_empty() {
        return out;
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "  {:<32} {:>7}  {:<48} UPDATED", "REPOSITORY", "#", "TITLE");
    let _ = writeln!(out, "  {}", "-".repeat(100));
    for item in &result.items {
        let _ = writeln!(
            out,
            "  {:<32} {:>7}  {:<48} {}",
            truncate(&item.repository, 32),
            item.number,
            truncate(&item.title, 48),
            format_relative(item.updated_at, now)
        );
    }
    if result.upstream_incomplete {
        let _ = writeln!(out);
        let _ = writeln!(out, "  GitHub search timed out; some pull requests may be missing.");
    }
    if let Some(partial) = &result.partial {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "  Incomplete: page {} failed ({})",
            partial.failed_page, partial.reason
        );
    }
    out
}

pub fn render_pr_turn(turn: &PrTurn) -> String {
    let d = &turn.details;
    let mut out = String::new();
    let _ = writeln!(out, "{}#{}", turn.repo, turn.number);
    let _ = writeln!(
        out,
        "  +{} -{} in {} file{}",
        format_number(d.additions),
        format_number(d.deletions),
        d.changed_files,
        if d.changed_files == 1 { "" } else { "s" }
    );
    let _ = writeln!(out, "  Reviewers requested: {}", d.requested_reviewers);
    if let Some(milestone) = &d.milestone {
        let _ = writeln!(out, "  Milestone: {}", milestone);
    }
    out
}

pub fn render_changelog(log: &Changelog, limit: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Pull requests ({})", log.prs.len());
    for entry in log.prs.iter().take(limit) {
        let _ = writeln!(
            out,
            "  {:>4}  #{:<6} {}  @{}",
            entry.score,
            entry.item.number,
            truncate(&entry.item.title, 64),
            entry.item.author.login
        );
    }
    let _ = writeln!(out);
    if log.commits_fetch_failed {
        let _ = writeln!(out, "Direct commits: unavailable (listing failed)");
        return out;
    }
    let _ = writeln!(out, "Direct commits ({})", log.commits.len());
    for entry in log.commits.iter().take(limit) {
        let subject = entry.item.message.lines().next().unwrap_or("");
        let short_sha: String = entry.item.sha.chars().take(7).collect();
        let _ = writeln!(
            out,
            "  {:>4}  {:<7} {}  @{}",
            entry.score,
            short_sha,
            truncate(subject, 64),
            entry.item.author.login
        );
    }
    out
}

pub fn render_leaderboard(board: &Leaderboard) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} — merged since {}{}",
        board.org,
        board.since,
        if board.sampled {
            format!(" (sampled from {})", format_number(board.total_count))
        } else {
            String::new()
        }
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "  {:>3}  {:<28} {:>5} {:>7}", "#", "CONTRIBUTOR", "PRS", "IMPACT");
    let _ = writeln!(out, "  {}", "-".repeat(48));
    for (rank, entry) in board.entries.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {:>3}  {:<28} {:>5} {:>7}",
            rank + 1,
            truncate(&entry.login, 28),
            entry.prs,
            entry.impact
        );
    }
    out
}

pub fn render_orgs(user: &str, orgs: &[String]) -> String {
    if orgs.is_empty() {
        return format!("{} has no public organization memberships\n", user);
    }
    let mut out = String::new();
    for org in orgs {
        let _ = writeln!(out, "{}", org);
    }
    out
}

/// `1234567` → `1,234,567`.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn format_days(days: Option<f64>) -> String {
    match days {
        Some(d) => format!("{:.1} days", d),
        None => "n/a".to_string(),
    }
}

/// Relative time string, e.g. "3 hours ago".
fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();

    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d").to_string()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
