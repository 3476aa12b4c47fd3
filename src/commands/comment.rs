use anyhow::{bail, Result};

use crate::commands::require_user;
use crate::db::Database;
use crate::notify;

pub fn run(db: &Database, task_id: i64, content: &str) -> Result<i64> {
    let author = require_user(db)?;

    let task = match db.get_task(task_id)? {
        Some(t) => t,
        None => bail!("Task #{} not found", task_id),
    };

    if content.trim().is_empty() {
        bail!("Comment cannot be empty");
    }

    let id = db.add_comment(task_id, author.id, content)?;
    notify::comment_added(db, &task, author.id)?;

    tracing::info!(comment_id = id, task_id, author_id = author.id, "added comment");
    println!("Added comment to task #{}", task_id);
    Ok(id)
}
