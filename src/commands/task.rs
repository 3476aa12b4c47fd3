use anyhow::{bail, Result};
use chrono::Utc;

use crate::commands::{confirm, parse_due_date, parse_tags, require_user, truncate, user_name};
use crate::db::{Database, NewTask, TaskFilter, TaskUpdate};
use crate::models::{Priority, Task, TaskStatus};
use crate::notify;

pub struct CreateArgs<'a> {
    pub project_id: i64,
    pub title: &'a str,
    pub description: &'a str,
    pub assignee: Option<i64>,
    pub due: Option<&'a str>,
    pub status: &'a str,
    pub priority: Option<&'a str>,
    pub role: Option<&'a str>,
    pub tags: &'a [String],
}

/// Raw update arguments as they come from the command line.
#[derive(Default)]
pub struct UpdateArgs<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub assignee: Option<i64>,
    pub unassign: bool,
    pub due: Option<&'a str>,
    pub clear_due: bool,
    pub status: Option<&'a str>,
    pub priority: Option<&'a str>,
    pub role: Option<&'a str>,
    pub tags: Option<&'a [String]>,
}

#[derive(Default)]
pub struct ListArgs<'a> {
    pub project_id: Option<i64>,
    pub assignee: Option<i64>,
    pub mine: bool,
    pub status: Option<&'a str>,
    pub overdue: bool,
}

/// An assignee must exist and belong to the project; non-members are added.
fn ensure_assignable(db: &Database, project_id: i64, user_id: i64) -> Result<()> {
    let user = match db.get_user(user_id)? {
        Some(u) => u,
        None => bail!("User #{} not found", user_id),
    };
    if db.add_member(project_id, user_id)? {
        tracing::info!(project_id, user_id, "assignee added to project");
        println!("Added {} to project #{}", user.name, project_id);
    }
    Ok(())
}

pub fn create(db: &Database, args: &CreateArgs<'_>) -> Result<i64> {
    let actor = require_user(db)?;

    let title = args.title.trim();
    if title.is_empty() {
        bail!("Task title cannot be empty");
    }
    if db.get_project(args.project_id)?.is_none() {
        bail!("Project #{} not found", args.project_id);
    }
    let status: TaskStatus = args.status.parse()?;
    let priority = args.priority.map(str::parse::<Priority>).transpose()?;
    let due_date = args.due.map(parse_due_date).transpose()?;

    if let Some(assignee) = args.assignee {
        ensure_assignable(db, args.project_id, assignee)?;
    }

    let id = db.create_task(&NewTask {
        project_id: args.project_id,
        title,
        description: args.description,
        assignee_id: args.assignee,
        due_date,
        status,
        priority,
        role: args.role,
    })?;

    let tags = parse_tags(args.tags);
    if !tags.is_empty() {
        db.set_task_tags(id, &tags)?;
    }

    if let Some(task) = db.get_task(id)? {
        notify::task_created(db, &task, actor.id)?;
    }

    tracing::info!(task_id = id, project_id = args.project_id, "created task");
    println!("Created task #{} in project #{}", id, args.project_id);
    Ok(id)
}

pub fn list(db: &Database, args: &ListArgs<'_>) -> Result<()> {
    let assignee = if args.mine {
        Some(require_user(db)?.id)
    } else {
        args.assignee
    };
    let status = args.status.map(str::parse::<TaskStatus>).transpose()?;

    let now = Utc::now();
    let tasks: Vec<Task> = db
        .list_tasks(&TaskFilter {
            project_id: args.project_id,
            assignee_id: assignee,
            status,
        })?
        .into_iter()
        .filter(|t| !args.overdue || t.is_overdue(now))
        .collect();

    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }

    for task in tasks {
        print_task_line(&task, now);
    }
    Ok(())
}

pub fn print_task_line(task: &Task, now: chrono::DateTime<Utc>) {
    let status_display = format!("[{}]", task.status);
    let due = match task.due_date {
        Some(d) => d.format("%Y-%m-%d").to_string(),
        None => "-".to_string(),
    };
    let flag = if task.is_overdue(now) {
        " OVERDUE"
    } else if task.is_due_soon(now) {
        " due soon"
    } else {
        ""
    };
    println!(
        "#{:<4} {:13} {:<40} {:6} p#{:<4} {}{}",
        task.id,
        status_display,
        truncate(&task.title, 40),
        task.priority.map(|p| p.as_str()).unwrap_or("-"),
        task.project_id,
        due,
        flag
    );
}

pub fn show(db: &Database, id: i64) -> Result<()> {
    let task = match db.get_task(id)? {
        Some(t) => t,
        None => bail!("Task #{} not found", id),
    };

    println!("Task #{}: {}", task.id, task.title);
    println!("Status: {}", task.status.label());
    if let Some(project) = db.get_project(task.project_id)? {
        println!("Project: #{} {}", project.id, project.name);
    }
    match task.assignee_id {
        Some(uid) => match db.get_user(uid)? {
            Some(user) => println!("Assignee: {} <{}>", user.name, user.email),
            None => println!("Assignee: #{}", uid),
        },
        None => println!("Assignee: (unassigned)"),
    }
    if let Some(priority) = task.priority {
        println!("Priority: {}", priority);
    }
    if let Some(role) = &task.role {
        println!("Role: {}", role);
    }
    if let Some(due) = task.due_date {
        let suffix = if task.is_overdue(Utc::now()) { " (overdue)" } else { "" };
        println!("Due: {}{}", due.format("%B %d, %Y"), suffix);
    }
    println!("Created: {}", task.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Updated: {}", task.updated_at.format("%Y-%m-%d %H:%M:%S"));

    let tags = db.get_task_tags(id)?;
    if !tags.is_empty() {
        println!("Tags: {}", tags.join(", "));
    }

    if !task.description.is_empty() {
        println!("\nDescription:");
        for line in task.description.lines() {
            println!("  {}", line);
        }
    }

    let comments = db.get_comments(id)?;
    println!("\nComments:");
    if comments.is_empty() {
        println!("  No comments yet");
    }
    for comment in comments {
        let author = user_name(db, comment.author_id)?;
        println!(
            "  [{}] {}: {}",
            comment.created_at.format("%Y-%m-%d %H:%M"),
            author,
            comment.content
        );
    }

    Ok(())
}

pub fn update(db: &Database, id: i64, args: &UpdateArgs<'_>) -> Result<()> {
    let actor = require_user(db)?;

    let existing = match db.get_task(id)? {
        Some(t) => t,
        None => bail!("Task #{} not found", id),
    };

    if args.assignee.is_some() && args.unassign {
        bail!("Use either --assignee or --unassign, not both");
    }
    if args.due.is_some() && args.clear_due {
        bail!("Use either --due or --clear-due, not both");
    }
    if let Some(t) = args.title {
        if t.trim().is_empty() {
            bail!("Task title cannot be empty");
        }
    }

    let assignee_id = match (args.assignee, args.unassign) {
        (Some(uid), _) => Some(Some(uid)),
        (None, true) => Some(None),
        (None, false) => None,
    };
    let due_date = match (args.due, args.clear_due) {
        (Some(d), _) => Some(Some(parse_due_date(d)?)),
        (None, true) => Some(None),
        (None, false) => None,
    };

    let update = TaskUpdate {
        title: args.title.map(str::trim),
        description: args.description,
        assignee_id,
        due_date,
        status: args.status.map(str::parse::<TaskStatus>).transpose()?,
        priority: args.priority.map(str::parse::<Priority>).transpose()?,
        role: args.role,
    };

    if update.is_empty() && args.tags.is_none() {
        bail!("Nothing to update. Use --title, --description, --assignee, --due, --status, --priority, --role or --tag");
    }

    if let Some(Some(uid)) = update.assignee_id {
        ensure_assignable(db, existing.project_id, uid)?;
    }
    if !db.update_task(id, &update)? {
        bail!("Task #{} not found", id);
    }
    if let Some(tags) = args.tags {
        db.set_task_tags(id, &parse_tags(tags))?;
    }

    if let Some(task) = db.get_task(id)? {
        notify::task_reassigned(db, &task, existing.assignee_id, actor.id)?;
    }

    tracing::info!(task_id = id, user_id = actor.id, "updated task");
    println!("Updated task #{}", id);
    Ok(())
}

pub fn delete(db: &Database, id: i64, force: bool) -> Result<()> {
    let task = match db.get_task(id)? {
        Some(t) => t,
        None => bail!("Task #{} not found", id),
    };

    if !force && !confirm(&format!("Delete task #{} \"{}\"?", id, task.title))? {
        println!("Cancelled.");
        return Ok(());
    }

    if db.delete_task(id)? {
        tracing::info!(task_id = id, project_id = task.project_id, "deleted task");
        println!("Deleted task #{}", id);
    } else {
        bail!("Failed to delete task #{}", id);
    }
    Ok(())
}

/// Internal function for testing without stdin interaction
#[cfg(test)]
pub fn delete_force(db: &Database, id: i64) -> Result<()> {
    delete(db, id, true)
}
