use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::commands::project::print_project_line;
use crate::commands::task::print_task_line;
use crate::commands::require_user;
use crate::db::Database;
use crate::models::{Task, TaskStatus};
use crate::notify;

/// Derived view of one user's workload.
#[derive(Debug, Default)]
pub struct Summary {
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
    pub due_soon: Vec<Task>,
    pub overdue: Vec<Task>,
}

pub fn summarize(tasks: &[Task], now: DateTime<Utc>) -> Summary {
    let mut summary = Summary::default();
    for task in tasks {
        match task.status {
            TaskStatus::Todo => summary.todo += 1,
            TaskStatus::InProgress => summary.in_progress += 1,
            TaskStatus::Done => summary.done += 1,
        }
        if task.is_overdue(now) {
            summary.overdue.push(task.clone());
        } else if task.is_due_soon(now) {
            summary.due_soon.push(task.clone());
        }
    }
    summary
}

pub fn run(db: &Database) -> Result<()> {
    let user = require_user(db)?;
    let now = Utc::now();
    notify::sweep_due_dates(db, now)?;

    let tasks = db.tasks_by_assignee(user.id)?;
    let summary = summarize(&tasks, now);

    println!("Welcome back, {}!", user.name);
    println!(
        "Unread notifications: {}",
        db.unread_count(user.id)?
    );

    println!();
    println!(
        "My tasks: {} total | {} to do | {} in progress | {} done",
        tasks.len(),
        summary.todo,
        summary.in_progress,
        summary.done
    );

    if !summary.overdue.is_empty() {
        println!("\nOverdue:");
        for task in &summary.overdue {
            print_task_line(task, now);
        }
    }
    if !summary.due_soon.is_empty() {
        println!("\nDue soon:");
        for task in &summary.due_soon {
            print_task_line(task, now);
        }
    }

    let projects = db.projects_for_member(user.id)?;
    println!("\nMy projects ({}):", projects.len());
    if projects.is_empty() {
        println!("  You are not a member of any project yet.");
    }
    for project in &projects {
        print_project_line(db, project)?;
    }

    let available = db.projects_not_joined(user.id)?;
    if !available.is_empty() {
        println!("\nAvailable to join ({}):", available.len());
        for project in &available {
            print_project_line(db, project)?;
        }
    }

    Ok(())
}

pub fn profile(db: &Database) -> Result<()> {
    let user = require_user(db)?;
    let tasks = db.tasks_by_assignee(user.id)?;
    let summary = summarize(&tasks, Utc::now());

    println!("{} <{}>", user.name, user.email);
    if let Some(avatar) = &user.avatar {
        println!("Avatar: {}", avatar);
    }
    println!(
        "Tasks: {} to do, {} in progress, {} completed",
        summary.todo, summary.in_progress, summary.done
    );

    let projects = db.projects_for_member(user.id)?;
    if projects.is_empty() {
        return Ok(());
    }

    println!("\nProjects:");
    for project in projects {
        let mine: Vec<_> = tasks.iter().filter(|t| t.project_id == project.id).collect();
        let completed = mine.iter().filter(|t| t.status == TaskStatus::Done).count();
        let percent = if mine.is_empty() {
            0
        } else {
            completed * 100 / mine.len()
        };
        println!(
            "  #{:<4} {:<40} {}/{} my tasks done ({}%)",
            project.id,
            project.name,
            completed,
            mine.len(),
            percent
        );
    }
    Ok(())
}
