//! Demo data for a fresh workspace.

use anyhow::Result;
use chrono::{Duration, Utc};

use crate::commands::auth::avatar_for;
use crate::db::{Database, NewProject, NewTask};
use crate::models::TaskStatus;

pub const DEMO_PASSWORD: &str = "password123";

struct DemoUser {
    name: &'static str,
    email: &'static str,
    password: &'static str,
    seed: &'static str,
}

const USERS: [DemoUser; 4] = [
    DemoUser { name: "John Doe", email: "john@example.com", password: DEMO_PASSWORD, seed: "John" },
    DemoUser { name: "Jane Smith", email: "jane@example.com", password: DEMO_PASSWORD, seed: "Jane" },
    DemoUser { name: "Demo User 1", email: "abc@gmail.com", password: "demo", seed: "Demo1" },
    DemoUser { name: "Demo User 2", email: "xyz@gmail.com", password: "demo", seed: "Demo2" },
];

struct DemoTask {
    title: &'static str,
    description: &'static str,
    /// Index into `USERS`.
    assignee: usize,
    status: TaskStatus,
    /// Days from now; negative is in the past.
    due_in_days: i64,
}

struct DemoProject {
    name: &'static str,
    description: &'static str,
    banner: &'static str,
    /// Index into `USERS`.
    manager: usize,
    members: &'static [usize],
    tasks: &'static [DemoTask],
}

const PROJECTS: [DemoProject; 2] = [
    DemoProject {
        name: "Website Redesign",
        description: "Redesign the company website with modern UI/UX principles",
        banner: "https://images.unsplash.com/photo-1486312338219-ce68d2c6f44d?auto=format&fit=crop&w=1200&h=400&q=80",
        manager: 0,
        members: &[0, 1],
        tasks: &[
            DemoTask {
                title: "Design Homepage Wireframes",
                description: "Create wireframes for the new homepage design",
                assignee: 0,
                status: TaskStatus::InProgress,
                due_in_days: 3,
            },
            DemoTask {
                title: "Content Audit",
                description: "Perform a content audit of the existing website",
                assignee: 1,
                status: TaskStatus::Done,
                due_in_days: -1,
            },
        ],
    },
    DemoProject {
        name: "Mobile App Development",
        description: "Develop a cross-platform mobile application for our service",
        banner: "https://images.unsplash.com/photo-1481487196290-c152efe083f5?auto=format&fit=crop&w=1200&h=400&q=80",
        manager: 1,
        members: &[0, 1, 2],
        tasks: &[
            DemoTask {
                title: "API Integration",
                description: "Implement API integration for user authentication",
                assignee: 0,
                status: TaskStatus::Todo,
                due_in_days: 7,
            },
            DemoTask {
                title: "UI Design for Mobile",
                description: "Create UI mockups for the mobile application",
                assignee: 2,
                status: TaskStatus::InProgress,
                due_in_days: 5,
            },
        ],
    },
];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub projects: usize,
    pub tasks: usize,
}

/// Writes the demo users, projects and tasks. Due dates are relative to now.
pub fn populate(db: &Database) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    let now = Utc::now();
    let tx = db.transaction()?;

    let mut user_ids = Vec::with_capacity(USERS.len());
    for user in &USERS {
        let id = db.create_user(user.name, user.email, user.password, Some(&avatar_for(user.seed)))?;
        user_ids.push(id);
        report.users += 1;
    }

    for project in &PROJECTS {
        let manager = &USERS[project.manager];
        let project_id = db.create_project(&NewProject {
            name: project.name,
            description: project.description,
            image_banner: Some(project.banner),
            manager_name: Some(manager.name),
            manager_contact: Some(manager.email),
        })?;
        for &member in project.members {
            db.add_member(project_id, user_ids[member])?;
        }
        report.projects += 1;

        for task in project.tasks {
            db.create_task(&NewTask {
                project_id,
                title: task.title,
                description: task.description,
                assignee_id: Some(user_ids[task.assignee]),
                due_date: Some(now + Duration::days(task.due_in_days)),
                status: task.status,
                priority: None,
                role: None,
            })?;
            report.tasks += 1;
        }
    }

    tx.commit()?;
    tracing::info!(
        users = report.users,
        projects = report.projects,
        tasks = report.tasks,
        "seeded demo data"
    );
    Ok(report)
}
