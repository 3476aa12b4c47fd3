//! Notification side effects of store mutations.
//!
//! Every helper takes the acting user so that nobody is notified about their
//! own actions.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::db::{Database, TaskFilter};
use crate::models::{NotificationKind, Task, TaskStatus};

fn notify(db: &Database, kind: NotificationKind, reference_id: i64, user_id: i64) -> Result<()> {
    let id = db.create_notification(kind, reference_id, user_id)?;
    tracing::debug!(id, kind = kind.as_str(), reference_id, user_id, "notification emitted");
    Ok(())
}

/// A new task either goes to its assignee or is announced to the project.
pub fn task_created(db: &Database, task: &Task, actor_id: i64) -> Result<()> {
    match task.assignee_id {
        Some(assignee) => {
            if assignee != actor_id {
                notify(db, NotificationKind::TaskAssigned, task.id, assignee)?;
            }
        }
        None => {
            for member in db.get_members(task.project_id)? {
                if member.id != actor_id {
                    notify(db, NotificationKind::TaskAvailable, task.id, member.id)?;
                }
            }
        }
    }
    Ok(())
}

/// Called after an update; `previous_assignee` is the assignee before it.
pub fn task_reassigned(
    db: &Database,
    task: &Task,
    previous_assignee: Option<i64>,
    actor_id: i64,
) -> Result<()> {
    if task.assignee_id == previous_assignee {
        return Ok(());
    }
    if let Some(assignee) = task.assignee_id {
        if assignee != actor_id {
            notify(db, NotificationKind::TaskAssigned, task.id, assignee)?;
        }
    }
    Ok(())
}

pub fn comment_added(db: &Database, task: &Task, author_id: i64) -> Result<()> {
    if let Some(assignee) = task.assignee_id {
        if assignee != author_id {
            notify(db, NotificationKind::CommentAdded, task.id, assignee)?;
        }
    }
    Ok(())
}

pub fn project_updated(db: &Database, project_id: i64, actor_id: i64) -> Result<()> {
    for member in db.get_members(project_id)? {
        if member.id != actor_id {
            notify(db, NotificationKind::ProjectUpdated, project_id, member.id)?;
        }
    }
    Ok(())
}

/// Counts of notifications emitted by a due-date sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub overdue: usize,
    pub due_soon: usize,
}

/// Emits TASK_OVERDUE / TASK_DUE_SOON for assigned, unfinished tasks.
///
/// A given (kind, task, user) triple is only ever emitted once, so the sweep
/// can run as often as the caller likes.
pub fn sweep_due_dates(db: &Database, now: DateTime<Utc>) -> Result<SweepReport> {
    let mut report = SweepReport::default();

    for task in db.list_tasks(&TaskFilter::default())? {
        if task.status == TaskStatus::Done {
            continue;
        }
        let Some(assignee) = task.assignee_id else {
            continue;
        };

        let kind = if task.is_overdue(now) {
            NotificationKind::TaskOverdue
        } else if task.is_due_soon(now) {
            NotificationKind::TaskDueSoon
        } else {
            continue;
        };

        if db.notification_exists(kind, task.id, assignee)? {
            continue;
        }
        notify(db, kind, task.id, assignee)?;

        match kind {
            NotificationKind::TaskOverdue => report.overdue += 1,
            _ => report.due_soon += 1,
        }
    }

    if report.overdue + report.due_soon > 0 {
        tracing::info!(
            overdue = report.overdue,
            due_soon = report.due_soon,
            "due-date sweep emitted notifications"
        );
    }

    Ok(report)
}
