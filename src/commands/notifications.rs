use anyhow::{bail, Result};
use chrono::Utc;

use crate::commands::{require_user, truncate};
use crate::db::Database;
use crate::models::Notification;
use crate::notify;

/// How many already-read notifications the inbox shows.
const READ_HISTORY: usize = 5;

/// One-line description of what a notification points at.
fn describe(db: &Database, n: &Notification) -> Result<String> {
    if n.kind.references_task() {
        Ok(match db.get_task(n.reference_id)? {
            Some(task) => format!("task #{} {}", task.id, truncate(&task.title, 40)),
            None => format!("task #{} (deleted)", n.reference_id),
        })
    } else {
        Ok(match db.get_project(n.reference_id)? {
            Some(project) => format!("project #{} {}", project.id, truncate(&project.name, 40)),
            None => format!("project #{} (deleted)", n.reference_id),
        })
    }
}

fn print_notification(db: &Database, n: &Notification) -> Result<()> {
    println!(
        "  #{:<4} {:<18} {}  [{}]",
        n.id,
        n.kind.label(),
        describe(db, n)?,
        n.created_at.format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

/// Unread notifications plus the most recent read ones.
#[derive(Debug, Default)]
pub struct Inbox {
    pub unread: Vec<Notification>,
    pub read: Vec<Notification>,
}

/// Splits newest-first notifications into unread and read, keeping at most
/// `READ_HISTORY` read ones.
pub fn inbox(notifications: Vec<Notification>) -> Inbox {
    let (unread, mut read): (Vec<_>, Vec<_>) = notifications.into_iter().partition(|n| !n.read);
    read.truncate(READ_HISTORY);
    Inbox { unread, read }
}

pub fn list(db: &Database, all: bool) -> Result<()> {
    let user = require_user(db)?;
    let notifications = db.notifications_for_user(user.id, !all)?;

    if notifications.is_empty() {
        if all {
            println!("No notifications yet");
        } else {
            println!("No new notifications");
        }
        return Ok(());
    }

    let Inbox { unread, read } = inbox(notifications);

    if !unread.is_empty() {
        println!("Unread ({}):", unread.len());
        for n in &unread {
            print_notification(db, n)?;
        }
    }

    if !read.is_empty() {
        if !unread.is_empty() {
            println!();
        }
        println!("Earlier:");
        for n in &read {
            print_notification(db, n)?;
        }
    }

    Ok(())
}

pub fn mark_read(db: &Database, id: i64) -> Result<()> {
    let user = require_user(db)?;
    if db.mark_notification_read(id, user.id)? {
        println!("Marked notification #{} as read", id);
    } else {
        bail!("Notification #{} not found", id);
    }
    Ok(())
}

pub fn mark_all_read(db: &Database) -> Result<()> {
    let user = require_user(db)?;
    let count = db.mark_all_read(user.id)?;
    println!("Marked {} notification(s) as read", count);
    Ok(())
}

pub fn check_due(db: &Database) -> Result<()> {
    let report = notify::sweep_due_dates(db, Utc::now())?;
    println!(
        "Due-date check: {} overdue, {} due soon",
        report.overdue, report.due_soon
    );
    Ok(())
}
