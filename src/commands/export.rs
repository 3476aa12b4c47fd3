use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};

use crate::commands::user_name;
use crate::db::{Database, TaskFilter};
use crate::models::{Notification, Project, Task, TaskStatus, User};

const EXPORT_VERSION: i32 = 1;

#[derive(Serialize, Deserialize)]
pub struct ExportedProject {
    #[serde(flatten)]
    pub project: Project,
    pub tags: Vec<String>,
    pub members: Vec<i64>,
    pub tasks: Vec<i64>,
}

#[derive(Serialize, Deserialize)]
pub struct ExportedTask {
    #[serde(flatten)]
    pub task: Task,
    pub tags: Vec<String>,
    pub comments: Vec<ExportedComment>,
}

#[derive(Serialize, Deserialize)]
pub struct ExportedComment {
    pub id: i64,
    pub author_id: i64,
    pub content: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize)]
pub struct ExportData {
    pub version: i32,
    pub exported_at: String,
    pub users: Vec<User>,
    pub projects: Vec<ExportedProject>,
    pub tasks: Vec<ExportedTask>,
    pub notifications: Vec<Notification>,
}

fn export_project(db: &Database, project: Project) -> Result<ExportedProject> {
    let tags = db.get_project_tags(project.id)?;
    let members = db.get_members(project.id)?.into_iter().map(|u| u.id).collect();
    let tasks = db
        .tasks_by_project(project.id)?
        .into_iter()
        .map(|t| t.id)
        .collect();
    Ok(ExportedProject {
        project,
        tags,
        members,
        tasks,
    })
}

fn export_task(db: &Database, task: Task) -> Result<ExportedTask> {
    let tags = db.get_task_tags(task.id)?;
    let comments = db
        .get_comments(task.id)?
        .into_iter()
        .map(|c| ExportedComment {
            id: c.id,
            author_id: c.author_id,
            content: c.content,
            created_at: c.created_at.to_rfc3339(),
        })
        .collect();
    Ok(ExportedTask {
        task,
        tags,
        comments,
    })
}

/// Snapshot of the whole store. Passwords are never part of it.
pub fn collect(db: &Database) -> Result<ExportData> {
    let users = db.list_users()?;

    let projects = db
        .list_projects()?
        .into_iter()
        .map(|p| export_project(db, p))
        .collect::<Result<Vec<_>>>()?;

    let tasks = db
        .list_tasks(&TaskFilter::default())?
        .into_iter()
        .map(|t| export_task(db, t))
        .collect::<Result<Vec<_>>>()?;

    let mut notifications = Vec::new();
    for user in &users {
        notifications.extend(db.notifications_for_user(user.id, false)?);
    }

    Ok(ExportData {
        version: EXPORT_VERSION,
        exported_at: chrono::Utc::now().to_rfc3339(),
        users,
        projects,
        tasks,
        notifications,
    })
}

fn write_output(content: &str, output_path: Option<&str>, summary: &str) -> Result<()> {
    match output_path {
        Some(path) => {
            fs::write(path, content).context("Failed to write export file")?;
            eprintln!("Exported {} to {}", summary, path);
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", content)?;
        }
    }
    Ok(())
}

pub fn run_json(db: &Database, output_path: Option<&str>) -> Result<()> {
    let data = collect(db)?;
    let json = serde_json::to_string_pretty(&data)?;
    let summary = format!(
        "{} projects and {} tasks",
        data.projects.len(),
        data.tasks.len()
    );
    write_output(&json, output_path, &summary)
}

pub fn run_markdown(db: &Database, output_path: Option<&str>) -> Result<()> {
    let projects = db.list_projects()?;
    let mut md = String::new();

    md.push_str("# SynergySphere Export\n\n");
    md.push_str(&format!(
        "Exported: {}\n\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));

    for project in &projects {
        write_project_md(&mut md, db, project)?;
    }

    write_output(&md, output_path, &format!("{} projects", projects.len()))
}

fn write_project_md(md: &mut String, db: &Database, project: &Project) -> Result<()> {
    md.push_str(&format!("## #{}: {}\n\n", project.id, project.name));

    if let Some(manager) = &project.manager_name {
        md.push_str(&format!("- **Manager:** {}\n", manager));
    }
    let tags = db.get_project_tags(project.id)?;
    if !tags.is_empty() {
        md.push_str(&format!("- **Tags:** {}\n", tags.join(", ")));
    }
    let members: Vec<String> = db
        .get_members(project.id)?
        .into_iter()
        .map(|u| u.name)
        .collect();
    if !members.is_empty() {
        md.push_str(&format!("- **Members:** {}\n", members.join(", ")));
    }
    md.push_str(&format!(
        "- **Created:** {}\n",
        project.created_at.format("%Y-%m-%d")
    ));

    if !project.description.is_empty() {
        md.push_str(&format!("\n{}\n", project.description));
    }

    let tasks = db.tasks_by_project(project.id)?;
    if !tasks.is_empty() {
        md.push_str("\n**Tasks:**\n\n");
        for task in tasks {
            let checkbox = if task.status == TaskStatus::Done {
                "[x]"
            } else {
                "[ ]"
            };
            md.push_str(&format!("- {} #{} {} ({})", checkbox, task.id, task.title, task.status.label()));
            if let Some(due) = task.due_date {
                md.push_str(&format!(", due {}", due.format("%Y-%m-%d")));
            }
            md.push('\n');

            for comment in db.get_comments(task.id)? {
                md.push_str(&format!(
                    "  - [{}] {}: {}\n",
                    comment.created_at.format("%Y-%m-%d %H:%M"),
                    user_name(db, comment.author_id)?,
                    comment.content
                ));
            }
        }
    }

    md.push_str("\n---\n\n");
    Ok(())
}
