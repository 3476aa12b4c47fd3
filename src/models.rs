use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub image_banner: Option<String>,
    pub manager_name: Option<String>,
    pub manager_contact: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub description: String,
    pub assignee_id: Option<i64>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub priority: Option<Priority>,
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How far ahead a due date counts as "due soon".
pub const DUE_SOON_DAYS: i64 = 3;

impl Task {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.due_date {
            Some(due) => due < now && self.status != TaskStatus::Done,
            None => false,
        }
    }

    pub fn is_due_soon(&self, now: DateTime<Utc>) -> bool {
        match self.due_date {
            Some(due) => {
                due > now
                    && due < now + chrono::Duration::days(DUE_SOON_DAYS)
                    && self.status != TaskStatus::Done
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub task_id: i64,
    pub author_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub kind: NotificationKind,
    pub reference_id: i64,
    pub user_id: i64,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Done => "DONE",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "To Do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Done => "Done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "TODO" | "TO_DO" => Ok(TaskStatus::Todo),
            "IN_PROGRESS" | "INPROGRESS" | "DOING" => Ok(TaskStatus::InProgress),
            "DONE" | "COMPLETED" => Ok(TaskStatus::Done),
            _ => bail!(
                "Invalid status '{}'. Must be one of: todo, in-progress, done",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "LOW" => Ok(Priority::Low),
            "MEDIUM" => Ok(Priority::Medium),
            "HIGH" => Ok(Priority::High),
            _ => bail!("Invalid priority '{}'. Must be one of: low, medium, high", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    TaskAssigned,
    TaskDueSoon,
    TaskOverdue,
    CommentAdded,
    ProjectUpdated,
    TaskAvailable,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TaskAssigned => "TASK_ASSIGNED",
            NotificationKind::TaskDueSoon => "TASK_DUE_SOON",
            NotificationKind::TaskOverdue => "TASK_OVERDUE",
            NotificationKind::CommentAdded => "COMMENT_ADDED",
            NotificationKind::ProjectUpdated => "PROJECT_UPDATED",
            NotificationKind::TaskAvailable => "TASK_AVAILABLE",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NotificationKind::TaskAssigned => "New Task Assigned",
            NotificationKind::TaskDueSoon => "Task Due Soon",
            NotificationKind::TaskOverdue => "Task Overdue",
            NotificationKind::CommentAdded => "New Comment",
            NotificationKind::ProjectUpdated => "Project Updated",
            NotificationKind::TaskAvailable => "New Task Available",
        }
    }

    /// Whether `reference_id` points at a task (otherwise a project).
    pub fn references_task(&self) -> bool {
        !matches!(self, NotificationKind::ProjectUpdated)
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "TASK_ASSIGNED" => Ok(NotificationKind::TaskAssigned),
            "TASK_DUE_SOON" => Ok(NotificationKind::TaskDueSoon),
            "TASK_OVERDUE" => Ok(NotificationKind::TaskOverdue),
            "COMMENT_ADDED" => Ok(NotificationKind::CommentAdded),
            "PROJECT_UPDATED" => Ok(NotificationKind::ProjectUpdated),
            "TASK_AVAILABLE" => Ok(NotificationKind::TaskAvailable),
            _ => bail!("Unknown notification kind '{}'", s),
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_uppercase().replace(['-', ' '], "_")
}
