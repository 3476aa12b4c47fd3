pub mod auth;
pub mod comment;
pub mod dashboard;
pub mod export;
pub mod init;
pub mod notifications;
pub mod project;
pub mod search;
pub mod task;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::io::{self, Write};

use crate::db::Database;
use crate::models::User;

/// The logged-in user, or an error telling the caller to log in.
pub fn require_user(db: &Database) -> Result<User> {
    match db.current_user()? {
        Some(user) => Ok(user),
        None => bail!("Not logged in. Run 'synergy login <email>' first."),
    }
}

/// Display name of a user, or a placeholder if the row is gone.
pub fn user_name(db: &Database, id: i64) -> Result<String> {
    Ok(db
        .get_user(id)?
        .map(|u| u.name)
        .unwrap_or_else(|| "(unknown)".to_string()))
}

/// Accepts `YYYY-MM-DD` (end of that day, UTC) or a full RFC 3339 timestamp.
pub fn parse_due_date(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(23, 59, 59) {
            return Ok(naive.and_utc());
        }
    }
    bail!(
        "Invalid due date '{}'. Use YYYY-MM-DD or an RFC 3339 timestamp",
        s
    )
}

/// Splits comma-separated tag arguments, trimming and dropping empties.
pub fn parse_tags(raw: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.iter().flat_map(|r| r.split(',')) {
        let tag = tag.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Asks a yes/no question on stdin. Anything but `y` means no.
pub fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
