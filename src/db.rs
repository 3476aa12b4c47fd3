use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::path::Path;

use crate::models::{
    Comment, Notification, NotificationKind, Priority, Project, Task, TaskStatus, User,
};

const SCHEMA_VERSION: i32 = 1;

const PROJECT_COLUMNS: &str =
    "p.id, p.name, p.description, p.image_banner, p.manager_name, p.manager_contact, p.created_at, p.updated_at";

const TASK_COLUMNS: &str =
    "t.id, t.project_id, t.title, t.description, t.assignee_id, t.due_date, t.status, t.priority, t.role, t.created_at, t.updated_at";

pub struct Database {
    conn: Connection,
}

/// Fields for a new project. Members and tags are attached separately.
#[derive(Debug, Default, Clone)]
pub struct NewProject<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub image_banner: Option<&'a str>,
    pub manager_name: Option<&'a str>,
    pub manager_contact: Option<&'a str>,
}

#[derive(Debug, Default, Clone)]
pub struct ProjectUpdate<'a> {
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub image_banner: Option<&'a str>,
    pub manager_name: Option<&'a str>,
    pub manager_contact: Option<&'a str>,
}

impl ProjectUpdate<'_> {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.image_banner.is_none()
            && self.manager_name.is_none()
            && self.manager_contact.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewTask<'a> {
    pub project_id: i64,
    pub title: &'a str,
    pub description: &'a str,
    pub assignee_id: Option<i64>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub priority: Option<Priority>,
    pub role: Option<&'a str>,
}

/// Partial task update. The doubly-optional fields distinguish "leave as is"
/// (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Default, Clone)]
pub struct TaskUpdate<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub assignee_id: Option<Option<i64>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub role: Option<&'a str>,
}

impl TaskUpdate<'_> {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.assignee_id.is_none()
            && self.due_date.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.role.is_none()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TaskFilter {
    pub project_id: Option<i64>,
    pub assignee_id: Option<i64>,
    pub status: Option<TaskStatus>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version < SCHEMA_VERSION {
            self.conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    password TEXT NOT NULL,
                    avatar TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    image_banner TEXT,
                    manager_name TEXT,
                    manager_contact TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                -- Membership (many-to-many)
                CREATE TABLE IF NOT EXISTS project_members (
                    project_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    joined_at TEXT NOT NULL,
                    PRIMARY KEY (project_id, user_id),
                    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS project_tags (
                    project_id INTEGER NOT NULL,
                    tag TEXT NOT NULL,
                    PRIMARY KEY (project_id, tag),
                    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    assignee_id INTEGER,
                    due_date TEXT,
                    status TEXT NOT NULL DEFAULT 'TODO',
                    priority TEXT,
                    role TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
                    FOREIGN KEY (assignee_id) REFERENCES users(id) ON DELETE SET NULL
                );

                CREATE TABLE IF NOT EXISTS task_tags (
                    task_id INTEGER NOT NULL,
                    tag TEXT NOT NULL,
                    PRIMARY KEY (task_id, tag),
                    FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS comments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    task_id INTEGER NOT NULL,
                    author_id INTEGER NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE,
                    FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
                );

                -- reference_id points at a task or a project depending on kind
                CREATE TABLE IF NOT EXISTS notifications (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    kind TEXT NOT NULL,
                    reference_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    read INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                -- Single-row table holding the logged-in user
                CREATE TABLE IF NOT EXISTS session (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    user_id INTEGER NOT NULL,
                    logged_in_at TEXT NOT NULL,
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_assignee ON tasks(assignee_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
                CREATE INDEX IF NOT EXISTS idx_members_user ON project_members(user_id);
                CREATE INDEX IF NOT EXISTS idx_comments_task ON comments(task_id);
                CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, read);
                CREATE INDEX IF NOT EXISTS idx_notifications_ref ON notifications(reference_id);
                "#,
            )?;

            self.conn
                .execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
            tracing::debug!(version = SCHEMA_VERSION, "initialized schema");
        }

        self.conn.execute("PRAGMA foreign_keys = ON", [])?;

        Ok(())
    }

    /// Transaction on the shared connection; store calls made while it is
    /// open join it. Do not call the tag setters or deletes inside one.
    pub fn transaction(&self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    // Users
    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        avatar: Option<&str>,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (name, email, password, avatar, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, email, password, avatar, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, name, email, avatar FROM users WHERE id = ?1",
                [id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, name, email, avatar FROM users WHERE email = ?1 COLLATE NOCASE",
                [email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, email, avatar FROM users ORDER BY id")?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Plaintext credential check. Returns the matching user, if any.
    pub fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, name, email, avatar FROM users WHERE email = ?1 COLLATE NOCASE AND password = ?2",
                params![email, password],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    // Session
    pub fn set_current_user(&self, user_id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO session (id, user_id, logged_in_at) VALUES (1, ?1, ?2)",
            params![user_id, now],
        )?;
        Ok(())
    }

    pub fn current_user(&self) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT u.id, u.name, u.email, u.avatar FROM session s JOIN users u ON u.id = s.user_id WHERE s.id = 1",
                [],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn clear_current_user(&self) -> Result<bool> {
        let rows = self.conn.execute("DELETE FROM session", [])?;
        Ok(rows > 0)
    }

    // Project CRUD
    pub fn create_project(&self, project: &NewProject<'_>) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO projects (name, description, image_banner, manager_name, manager_contact, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                project.name,
                project.description,
                project.image_banner,
                project.manager_name,
                project.manager_contact,
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let project = self
            .conn
            .query_row(
                &format!("SELECT {} FROM projects p WHERE p.id = ?1", PROJECT_COLUMNS),
                [id],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM projects p ORDER BY p.id", PROJECT_COLUMNS))?;
        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    pub fn projects_for_member(&self, user_id: i64) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM projects p JOIN project_members m ON m.project_id = p.id WHERE m.user_id = ?1 ORDER BY p.id",
            PROJECT_COLUMNS
        ))?;
        let projects = stmt
            .query_map([user_id], project_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    /// Projects the user has not joined yet.
    pub fn projects_not_joined(&self, user_id: i64) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM projects p
            WHERE NOT EXISTS (
                SELECT 1 FROM project_members m WHERE m.project_id = p.id AND m.user_id = ?1
            )
            ORDER BY p.id
            "#,
            PROJECT_COLUMNS
        ))?;
        let projects = stmt
            .query_map([user_id], project_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    pub fn update_project(&self, id: i64, update: &ProjectUpdate<'_>) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let mut updates = vec!["updated_at = ?1".to_string()];
        let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(now)];

        let fields = [
            ("name", update.name),
            ("description", update.description),
            ("image_banner", update.image_banner),
            ("manager_name", update.manager_name),
            ("manager_contact", update.manager_contact),
        ];
        for (column, value) in fields {
            if let Some(v) = value {
                updates.push(format!("{} = ?{}", column, params_vec.len() + 1));
                params_vec.push(Box::new(v.to_string()));
            }
        }

        params_vec.push(Box::new(id));
        let sql = format!(
            "UPDATE projects SET {} WHERE id = ?{}",
            updates.join(", "),
            params_vec.len()
        );

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = self.conn.execute(&sql, params_refs.as_slice())?;
        Ok(rows > 0)
    }

    fn touch_project(&self, id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        Ok(())
    }

    /// Deletes a project together with its tasks, their comments, and every
    /// notification pointing at any of them.
    pub fn delete_project(&self, id: i64) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            DELETE FROM notifications
            WHERE (kind = 'PROJECT_UPDATED' AND reference_id = ?1)
               OR (kind != 'PROJECT_UPDATED'
                   AND reference_id IN (SELECT id FROM tasks WHERE project_id = ?1))
            "#,
            [id],
        )?;
        let rows = tx.execute("DELETE FROM projects WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    // Membership
    pub fn add_member(&self, project_id: i64, user_id: i64) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let rows = self.conn.execute(
            "INSERT OR IGNORE INTO project_members (project_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            params![project_id, user_id, now],
        )?;
        Ok(rows > 0)
    }

    pub fn remove_member(&self, project_id: i64, user_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM project_members WHERE project_id = ?1 AND user_id = ?2",
            params![project_id, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn is_member(&self, project_id: i64, user_id: i64) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM project_members WHERE project_id = ?1 AND user_id = ?2)",
            params![project_id, user_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn get_members(&self, project_id: i64) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, u.name, u.email, u.avatar FROM project_members m JOIN users u ON u.id = m.user_id WHERE m.project_id = ?1 ORDER BY m.joined_at, u.id",
        )?;
        let members = stmt
            .query_map([project_id], user_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }

    // Tags
    pub fn set_project_tags(&self, project_id: i64, tags: &[String]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM project_tags WHERE project_id = ?1", [project_id])?;
        for tag in tags {
            tx.execute(
                "INSERT OR IGNORE INTO project_tags (project_id, tag) VALUES (?1, ?2)",
                params![project_id, tag],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_project_tags(&self, project_id: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM project_tags WHERE project_id = ?1 ORDER BY tag")?;
        let tags = stmt
            .query_map([project_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(tags)
    }

    pub fn set_task_tags(&self, task_id: i64, tags: &[String]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM task_tags WHERE task_id = ?1", [task_id])?;
        for tag in tags {
            tx.execute(
                "INSERT OR IGNORE INTO task_tags (task_id, tag) VALUES (?1, ?2)",
                params![task_id, tag],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_task_tags(&self, task_id: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM task_tags WHERE task_id = ?1 ORDER BY tag")?;
        let tags = stmt
            .query_map([task_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(tags)
    }

    // Task CRUD
    pub fn create_task(&self, task: &NewTask<'_>) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO tasks (project_id, title, description, assignee_id, due_date, status, priority, role, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                task.project_id,
                task.title,
                task.description,
                task.assignee_id,
                task.due_date.map(|d| d.to_rfc3339()),
                task.status,
                task.priority,
                task.role,
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.touch_project(task.project_id)?;
        Ok(id)
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let task = self
            .conn
            .query_row(
                &format!("SELECT {} FROM tasks t WHERE t.id = ?1", TASK_COLUMNS),
                [id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut sql = format!("SELECT {} FROM tasks t", TASK_COLUMNS);
        let mut conditions = Vec::new();
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(project_id) = filter.project_id {
            conditions.push("t.project_id = ?".to_string());
            params_vec.push(Box::new(project_id));
        }

        if let Some(assignee_id) = filter.assignee_id {
            conditions.push("t.assignee_id = ?".to_string());
            params_vec.push(Box::new(assignee_id));
        }

        if let Some(status) = filter.status {
            conditions.push("t.status = ?".to_string());
            params_vec.push(Box::new(status));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        sql.push_str(" ORDER BY t.id");

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        let tasks = stmt
            .query_map(params_refs.as_slice(), task_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    pub fn tasks_by_project(&self, project_id: i64) -> Result<Vec<Task>> {
        self.list_tasks(&TaskFilter {
            project_id: Some(project_id),
            ..TaskFilter::default()
        })
    }

    pub fn tasks_by_assignee(&self, user_id: i64) -> Result<Vec<Task>> {
        self.list_tasks(&TaskFilter {
            assignee_id: Some(user_id),
            ..TaskFilter::default()
        })
    }

    pub fn update_task(&self, id: i64, update: &TaskUpdate<'_>) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let mut updates = vec!["updated_at = ?1".to_string()];
        let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(now)];

        let mut set = |column: &str, value: Box<dyn ToSql>| {
            updates.push(format!("{} = ?{}", column, params_vec.len() + 1));
            params_vec.push(value);
        };

        if let Some(t) = update.title {
            set("title", Box::new(t.to_string()));
        }
        if let Some(d) = update.description {
            set("description", Box::new(d.to_string()));
        }
        if let Some(assignee) = update.assignee_id {
            set("assignee_id", Box::new(assignee));
        }
        if let Some(due) = update.due_date {
            set("due_date", Box::new(due.map(|d| d.to_rfc3339())));
        }
        if let Some(status) = update.status {
            set("status", Box::new(status));
        }
        if let Some(priority) = update.priority {
            set("priority", Box::new(priority));
        }
        if let Some(role) = update.role {
            set("role", Box::new(role.to_string()));
        }

        params_vec.push(Box::new(id));
        let sql = format!(
            "UPDATE tasks SET {} WHERE id = ?{}",
            updates.join(", "),
            params_vec.len()
        );

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = self.conn.execute(&sql, params_refs.as_slice())?;
        Ok(rows > 0)
    }

    /// Deletes a task, its comments and the notifications that point at it,
    /// and bumps the owning project's `updated_at`.
    pub fn delete_task(&self, id: i64) -> Result<bool> {
        let project_id: Option<i64> = self
            .conn
            .query_row("SELECT project_id FROM tasks WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;

        let Some(project_id) = project_id else {
            return Ok(false);
        };

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM notifications WHERE reference_id = ?1 AND kind != 'PROJECT_UPDATED'",
            [id],
        )?;
        let rows = tx.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
        tx.execute(
            "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), project_id],
        )?;
        tx.commit()?;
        Ok(rows > 0)
    }

    // Comments
    pub fn add_comment(&self, task_id: i64, author_id: i64, content: &str) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO comments (task_id, author_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![task_id, author_id, content, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_comments(&self, task_id: i64) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, author_id, content, created_at FROM comments WHERE task_id = ?1 ORDER BY created_at, id",
        )?;
        let comments = stmt
            .query_map([task_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    task_id: row.get(1)?,
                    author_id: row.get(2)?,
                    content: row.get(3)?,
                    created_at: parse_datetime(row.get::<_, String>(4)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    // Notifications
    pub fn create_notification(
        &self,
        kind: NotificationKind,
        reference_id: i64,
        user_id: i64,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO notifications (kind, reference_id, user_id, read, created_at) VALUES (?1, ?2, ?3, 0, ?4)",
            params![kind, reference_id, user_id, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn notification_exists(
        &self,
        kind: NotificationKind,
        reference_id: i64,
        user_id: i64,
    ) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM notifications WHERE kind = ?1 AND reference_id = ?2 AND user_id = ?3)",
            params![kind, reference_id, user_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Notifications for a user, newest first.
    pub fn notifications_for_user(&self, user_id: i64, unread_only: bool) -> Result<Vec<Notification>> {
        let sql = if unread_only {
            "SELECT id, kind, reference_id, user_id, read, created_at FROM notifications WHERE user_id = ?1 AND read = 0 ORDER BY created_at DESC, id DESC"
        } else {
            "SELECT id, kind, reference_id, user_id, read, created_at FROM notifications WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let notifications = stmt
            .query_map([user_id], |row| {
                Ok(Notification {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    reference_id: row.get(2)?,
                    user_id: row.get(3)?,
                    read: row.get(4)?,
                    created_at: parse_datetime(row.get::<_, String>(5)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    pub fn unread_count(&self, user_id: i64) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Marks one of the user's notifications as read.
    pub fn mark_notification_read(&self, id: i64, user_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn mark_all_read(&self, user_id: i64) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
            [user_id],
        )?;
        Ok(rows)
    }

    // Search
    pub fn search_projects(&self, query: &str) -> Result<Vec<Project>> {
        let needle = query.to_lowercase();
        let mut matches = Vec::new();
        for project in self.list_projects()? {
            let in_name = project.name.to_lowercase().contains(&needle);
            let in_tags = !in_name
                && self
                    .get_project_tags(project.id)?
                    .iter()
                    .any(|tag| tag.to_lowercase().contains(&needle));
            if in_name || in_tags {
                matches.push(project);
            }
        }
        Ok(matches)
    }

    pub fn search_tasks(&self, query: &str) -> Result<Vec<Task>> {
        let needle = query.to_lowercase();
        let tasks = self.list_tasks(&TaskFilter::default())?;
        Ok(tasks
            .into_iter()
            .filter(|t| t.title.to_lowercase().contains(&needle))
            .collect())
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        avatar: row.get(3)?,
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        image_banner: row.get(3)?,
        manager_name: row.get(4)?,
        manager_contact: row.get(5)?,
        created_at: parse_datetime(row.get::<_, String>(6)?),
        updated_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        assignee_id: row.get(4)?,
        due_date: row.get::<_, Option<String>>(5)?.map(parse_datetime),
        status: row.get(6)?,
        priority: row.get(7)?,
        role: row.get(8)?,
        created_at: parse_datetime(row.get::<_, String>(9)?),
        updated_at: parse_datetime(row.get::<_, String>(10)?),
    })
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

macro_rules! text_enum_sql {
    ($($ty:ty),*) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
            }
        }
    )*};
}

text_enum_sql!(TaskStatus, Priority, NotificationKind);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn setup_test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        (db, dir)
    }

    fn new_task(project_id: i64, title: &str, assignee_id: Option<i64>) -> NewTask<'_> {
        NewTask {
            project_id,
            title,
            description: "",
            assignee_id,
            due_date: None,
            status: TaskStatus::Todo,
            priority: None,
            role: None,
        }
    }

    fn project(db: &Database, name: &str) -> i64 {
        db.create_project(&NewProject {
            name,
            ..NewProject::default()
        })
        .unwrap()
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        {
            let db = Database::open(&db_path).unwrap();
            db.create_user("Ann", "ann@example.com", "pw", None).unwrap();
        }
        let db = Database::open(&db_path).unwrap();
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (db, _dir) = setup_test_db();
        db.create_user("Ann", "ann@example.com", "pw", None).unwrap();
        assert!(db.create_user("Other", "ann@example.com", "pw", None).is_err());
    }

    #[test]
    fn test_verify_credentials() {
        let (db, _dir) = setup_test_db();
        let id = db.create_user("Ann", "ann@example.com", "secret", None).unwrap();
        let user = db.verify_credentials("ANN@example.com", "secret").unwrap().unwrap();
        assert_eq!(user.id, id);
        assert!(db.verify_credentials("ann@example.com", "wrong").unwrap().is_none());
    }

    #[test]
    fn test_session_roundtrip() {
        let (db, _dir) = setup_test_db();
        let id = db.create_user("Ann", "ann@example.com", "pw", None).unwrap();
        assert!(db.current_user().unwrap().is_none());
        db.set_current_user(id).unwrap();
        assert_eq!(db.current_user().unwrap().unwrap().id, id);
        assert!(db.clear_current_user().unwrap());
        assert!(db.current_user().unwrap().is_none());
    }

    #[test]
    fn test_membership_views() {
        let (db, _dir) = setup_test_db();
        let ann = db.create_user("Ann", "ann@example.com", "pw", None).unwrap();
        let p1 = project(&db, "One");
        let p2 = project(&db, "Two");
        assert!(db.add_member(p1, ann).unwrap());
        assert!(!db.add_member(p1, ann).unwrap());

        let mine: Vec<i64> = db.projects_for_member(ann).unwrap().iter().map(|p| p.id).collect();
        let available: Vec<i64> = db.projects_not_joined(ann).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(mine, vec![p1]);
        assert_eq!(available, vec![p2]);
        assert!(db.is_member(p1, ann).unwrap());

        assert!(db.remove_member(p1, ann).unwrap());
        assert!(db.get_members(p1).unwrap().is_empty());
    }

    #[test]
    fn test_create_task_bumps_project() {
        let (db, _dir) = setup_test_db();
        let p = project(&db, "One");
        let before = db.get_project(p).unwrap().unwrap().updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        db.create_task(&new_task(p, "Task", None)).unwrap();
        let after = db.get_project(p).unwrap().unwrap().updated_at;
        assert!(after > before);
    }

    #[test]
    fn test_delete_task_bumps_project() {
        let (db, _dir) = setup_test_db();
        let p = project(&db, "One");
        let t = db.create_task(&new_task(p, "Task", None)).unwrap();
        let before = db.get_project(p).unwrap().unwrap().updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(db.delete_task(t).unwrap());
        let after = db.get_project(p).unwrap().unwrap().updated_at;
        assert!(after > before);
    }

    #[test]
    fn test_update_task_sets_updated_at() {
        let (db, _dir) = setup_test_db();
        let p = project(&db, "One");
        let t = db.create_task(&new_task(p, "Task", None)).unwrap();
        let created = db.get_task(t).unwrap().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        db.update_task(
            t,
            &TaskUpdate {
                title: Some("Renamed"),
                ..TaskUpdate::default()
            },
        )
        .unwrap();
        let updated = db.get_task(t).unwrap().unwrap();
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[test]
    fn test_update_project_sets_updated_at() {
        let (db, _dir) = setup_test_db();
        let p = project(&db, "One");
        let created = db.get_project(p).unwrap().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        db.update_project(
            p,
            &ProjectUpdate {
                description: Some("Changed"),
                ..ProjectUpdate::default()
            },
        )
        .unwrap();
        let updated = db.get_project(p).unwrap().unwrap();
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[test]
    fn test_task_filters() {
        let (db, _dir) = setup_test_db();
        let ann = db.create_user("Ann", "ann@example.com", "pw", None).unwrap();
        let p1 = project(&db, "One");
        let p2 = project(&db, "Two");
        let t1 = db.create_task(&new_task(p1, "A", Some(ann))).unwrap();
        db.create_task(&new_task(p1, "B", None)).unwrap();
        db.create_task(&new_task(p2, "C", Some(ann))).unwrap();
        db.update_task(
            t1,
            &TaskUpdate {
                status: Some(TaskStatus::Done),
                ..TaskUpdate::default()
            },
        )
        .unwrap();

        assert_eq!(db.tasks_by_project(p1).unwrap().len(), 2);
        assert_eq!(db.tasks_by_assignee(ann).unwrap().len(), 2);
        let done = db
            .list_tasks(&TaskFilter {
                assignee_id: Some(ann),
                status: Some(TaskStatus::Done),
                ..TaskFilter::default()
            })
            .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, t1);
    }

    #[test]
    fn test_update_task_clears_assignee_and_due() {
        let (db, _dir) = setup_test_db();
        let ann = db.create_user("Ann", "ann@example.com", "pw", None).unwrap();
        let p = project(&db, "One");
        let mut task = new_task(p, "A", Some(ann));
        task.due_date = Some(Utc::now());
        let id = db.create_task(&task).unwrap();

        db.update_task(
            id,
            &TaskUpdate {
                assignee_id: Some(None),
                due_date: Some(None),
                ..TaskUpdate::default()
            },
        )
        .unwrap();

        let task = db.get_task(id).unwrap().unwrap();
        assert_eq!(task.assignee_id, None);
        assert_eq!(task.due_date, None);
        assert_eq!(task.title, "A");
    }

    #[test]
    fn test_update_missing_task() {
        let (db, _dir) = setup_test_db();
        let updated = db
            .update_task(
                42,
                &TaskUpdate {
                    title: Some("x"),
                    ..TaskUpdate::default()
                },
            )
            .unwrap();
        assert!(!updated);
    }

    #[test]
    fn test_delete_task_cascades() {
        let (db, _dir) = setup_test_db();
        let ann = db.create_user("Ann", "ann@example.com", "pw", None).unwrap();
        let p = project(&db, "One");
        let t = db.create_task(&new_task(p, "A", Some(ann))).unwrap();
        db.add_comment(t, ann, "hello").unwrap();
        db.set_task_tags(t, &["Bug".to_string()]).unwrap();
        db.create_notification(NotificationKind::TaskAssigned, t, ann).unwrap();
        db.create_notification(NotificationKind::ProjectUpdated, p, ann).unwrap();

        assert!(db.delete_task(t).unwrap());
        assert!(db.get_task(t).unwrap().is_none());
        assert!(db.get_comments(t).unwrap().is_empty());
        assert!(db.get_task_tags(t).unwrap().is_empty());

        let remaining = db.notifications_for_user(ann, false).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].kind, NotificationKind::ProjectUpdated);
        assert!(!db.delete_task(t).unwrap());
    }

    #[test]
    fn test_delete_project_cascades() {
        let (db, _dir) = setup_test_db();
        let ann = db.create_user("Ann", "ann@example.com", "pw", None).unwrap();
        let p = project(&db, "One");
        let other = project(&db, "Two");
        db.add_member(p, ann).unwrap();
        db.set_project_tags(p, &["AI".to_string()]).unwrap();
        let t1 = db.create_task(&new_task(p, "A", Some(ann))).unwrap();
        let t2 = db.create_task(&new_task(p, "B", None)).unwrap();
        let kept = db.create_task(&new_task(other, "C", Some(ann))).unwrap();
        db.add_comment(t1, ann, "c").unwrap();
        db.create_notification(NotificationKind::TaskAssigned, t1, ann).unwrap();
        db.create_notification(NotificationKind::TaskAvailable, t2, ann).unwrap();
        db.create_notification(NotificationKind::ProjectUpdated, p, ann).unwrap();
        db.create_notification(NotificationKind::TaskAssigned, kept, ann).unwrap();

        assert!(db.delete_project(p).unwrap());
        assert!(db.get_project(p).unwrap().is_none());
        assert!(db.get_task(t1).unwrap().is_none());
        assert!(db.get_task(t2).unwrap().is_none());
        assert!(db.get_comments(t1).unwrap().is_empty());
        assert!(db.get_project_tags(p).unwrap().is_empty());
        assert!(db.get_task(kept).unwrap().is_some());

        let remaining = db.notifications_for_user(ann, false).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].reference_id, kept);
    }

    #[test]
    fn test_notifications_read_state() {
        let (db, _dir) = setup_test_db();
        let ann = db.create_user("Ann", "ann@example.com", "pw", None).unwrap();
        let bob = db.create_user("Bob", "bob@example.com", "pw", None).unwrap();
        let n1 = db.create_notification(NotificationKind::TaskAssigned, 1, ann).unwrap();
        let n2 = db.create_notification(NotificationKind::CommentAdded, 1, ann).unwrap();

        assert_eq!(db.unread_count(ann).unwrap(), 2);
        // Another user's notification cannot be marked
        assert!(!db.mark_notification_read(n1, bob).unwrap());
        assert!(db.mark_notification_read(n1, ann).unwrap());

        let unread = db.notifications_for_user(ann, true).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, n2);

        assert_eq!(db.mark_all_read(ann).unwrap(), 1);
        assert_eq!(db.unread_count(ann).unwrap(), 0);
        assert!(db.notification_exists(NotificationKind::TaskAssigned, 1, ann).unwrap());
        assert!(!db.notification_exists(NotificationKind::TaskAssigned, 1, bob).unwrap());
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let (db, _dir) = setup_test_db();
        let p = project(&db, "Website Redesign");
        let q = project(&db, "Backend");
        db.set_project_tags(q, &["Machine Learning".to_string()]).unwrap();
        db.create_task(&new_task(p, "Design Homepage", None)).unwrap();

        let projects: Vec<i64> = db.search_projects("WEB").unwrap().iter().map(|p| p.id).collect();
        assert_eq!(projects, vec![p]);
        let by_tag: Vec<i64> = db.search_projects("learning").unwrap().iter().map(|p| p.id).collect();
        assert_eq!(by_tag, vec![q]);
        assert_eq!(db.search_tasks("homepage").unwrap().len(), 1);
        assert!(db.search_tasks("nothing").unwrap().is_empty());
    }

    #[test]
    fn test_sql_injection_in_name() {
        let (db, _dir) = setup_test_db();
        let malicious = "'; DROP TABLE projects; --";
        let id = project(&db, malicious);
        assert_eq!(db.get_project(id).unwrap().unwrap().name, malicious);
        assert_eq!(db.list_projects().unwrap().len(), 1);
    }

    proptest! {
        #[test]
        fn prop_tags_roundtrip_sorted(
            tags in proptest::collection::btree_set("[a-zA-Z]{1,10}", 0..5)
        ) {
            let (db, _dir) = setup_test_db();
            let p = project(&db, "P");
            let tags: Vec<String> = tags.into_iter().collect();
            db.set_project_tags(p, &tags).unwrap();
            prop_assert_eq!(db.get_project_tags(p).unwrap(), tags);
        }

        #[test]
        fn prop_unicode_title_roundtrip(title in "[\\p{L}\\p{N} ]{1,60}") {
            let (db, _dir) = setup_test_db();
            let p = project(&db, "P");
            let id = db.create_task(&new_task(p, &title, None)).unwrap();
            prop_assert_eq!(db.get_task(id).unwrap().unwrap().title, title);
        }
    }
}
