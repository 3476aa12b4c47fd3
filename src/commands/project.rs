use anyhow::{bail, Result};

use crate::commands::{confirm, parse_tags, require_user, truncate, user_name};
use crate::db::{Database, NewProject, ProjectUpdate};
use crate::models::{Project, TaskStatus};
use crate::notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectScope {
    Mine,
    All,
    Available,
}

pub struct CreateArgs<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub image_banner: Option<&'a str>,
    pub manager_name: Option<&'a str>,
    pub manager_contact: Option<&'a str>,
    pub tags: &'a [String],
}

pub fn create(db: &Database, args: &CreateArgs<'_>) -> Result<i64> {
    let user = require_user(db)?;
    let name = args.name.trim();
    if name.is_empty() {
        bail!("Project name cannot be empty");
    }

    let id = db.create_project(&NewProject {
        name,
        description: args.description,
        image_banner: args.image_banner,
        manager_name: args.manager_name.or(Some(user.name.as_str())),
        manager_contact: args.manager_contact.or(Some(user.email.as_str())),
    })?;
    db.add_member(id, user.id)?;

    let tags = parse_tags(args.tags);
    if !tags.is_empty() {
        db.set_project_tags(id, &tags)?;
    }

    tracing::info!(project_id = id, user_id = user.id, "created project");
    println!("Created project #{}: {}", id, name);
    Ok(id)
}

/// Completed / total tasks of a project.
fn progress(db: &Database, project_id: i64) -> Result<(usize, usize)> {
    let tasks = db.tasks_by_project(project_id)?;
    let done = tasks.iter().filter(|t| t.status == TaskStatus::Done).count();
    Ok((done, tasks.len()))
}

pub fn print_project_line(db: &Database, project: &Project) -> Result<()> {
    let (done, total) = progress(db, project.id)?;
    let members = db.get_members(project.id)?.len();
    println!(
        "#{:<4} {:<40} {:>3} members  {}/{} tasks done",
        project.id,
        truncate(&project.name, 40),
        members,
        done,
        total
    );
    Ok(())
}

pub fn list(db: &Database, scope: ProjectScope) -> Result<()> {
    let projects = match scope {
        ProjectScope::All => db.list_projects()?,
        ProjectScope::Mine => db.projects_for_member(require_user(db)?.id)?,
        ProjectScope::Available => db.projects_not_joined(require_user(db)?.id)?,
    };

    if projects.is_empty() {
        match scope {
            ProjectScope::Available => println!("No available projects to join right now."),
            _ => println!("No projects found."),
        }
        return Ok(());
    }

    for project in &projects {
        print_project_line(db, project)?;
    }
    Ok(())
}

pub fn show(db: &Database, id: i64) -> Result<()> {
    let project = match db.get_project(id)? {
        Some(p) => p,
        None => bail!("Project #{} not found", id),
    };

    println!("Project #{}: {}", project.id, project.name);
    if let Some(manager) = &project.manager_name {
        match &project.manager_contact {
            Some(contact) => println!("Manager: {} <{}>", manager, contact),
            None => println!("Manager: {}", manager),
        }
    }
    if let Some(banner) = &project.image_banner {
        println!("Banner: {}", banner);
    }
    println!("Created: {}", project.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Updated: {}", project.updated_at.format("%Y-%m-%d %H:%M:%S"));

    let tags = db.get_project_tags(id)?;
    if !tags.is_empty() {
        println!("Tags: {}", tags.join(", "));
    }

    if !project.description.is_empty() {
        println!("\nDescription:");
        for line in project.description.lines() {
            println!("  {}", line);
        }
    }

    let members = db.get_members(id)?;
    println!("\nMembers ({}):", members.len());
    for member in &members {
        println!("  #{:<4} {} <{}>", member.id, member.name, member.email);
    }

    let tasks = db.tasks_by_project(id)?;
    let (done, total) = progress(db, id)?;
    println!("\nTasks ({}/{} done):", done, total);
    if tasks.is_empty() {
        println!("  (none)");
    }
    for status in TaskStatus::ALL {
        let group: Vec<_> = tasks.iter().filter(|t| t.status == status).collect();
        if group.is_empty() {
            continue;
        }
        println!("  {}:", status.label());
        for task in group {
            let assignee = match task.assignee_id {
                Some(uid) => user_name(db, uid)?,
                None => "unassigned".to_string(),
            };
            let due = task
                .due_date
                .map(|d| d.format("%b %d, %Y").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "    #{:<4} {:<36} {:<16} due {}",
                task.id,
                truncate(&task.title, 36),
                truncate(&assignee, 16),
                due
            );
        }
    }

    Ok(())
}

pub fn update(db: &Database, id: i64, update: &ProjectUpdate<'_>, tags: Option<&[String]>) -> Result<()> {
    let user = require_user(db)?;
    if update.is_empty() && tags.is_none() {
        bail!("Nothing to update. Use --name, --description, --banner, --manager-name, --manager-contact or --tag");
    }
    if let Some(name) = update.name {
        if name.trim().is_empty() {
            bail!("Project name cannot be empty");
        }
    }
    let update = ProjectUpdate {
        name: update.name.map(str::trim),
        ..update.clone()
    };

    if !db.update_project(id, &update)? {
        bail!("Project #{} not found", id);
    }
    if let Some(tags) = tags {
        db.set_project_tags(id, &parse_tags(tags))?;
    }

    notify::project_updated(db, id, user.id)?;
    tracing::info!(project_id = id, user_id = user.id, "updated project");
    println!("Updated project #{}", id);
    Ok(())
}

pub fn delete(db: &Database, id: i64, force: bool) -> Result<()> {
    let user = require_user(db)?;
    let project = match db.get_project(id)? {
        Some(p) => p,
        None => bail!("Project #{} not found", id),
    };

    if !force {
        let prompt = format!(
            "Delete project #{} \"{}\" and all associated tasks and comments?",
            id, project.name
        );
        if !confirm(&prompt)? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    if db.delete_project(id)? {
        tracing::info!(project_id = id, user_id = user.id, "deleted project");
        println!("Deleted project #{}", id);
    } else {
        bail!("Failed to delete project #{}", id);
    }
    Ok(())
}

/// The current user joins a project.
pub fn join(db: &Database, id: i64) -> Result<()> {
    let user = require_user(db)?;
    add_member(db, id, user.id)
}

pub fn add_member(db: &Database, project_id: i64, user_id: i64) -> Result<()> {
    require_user(db)?;
    if db.get_project(project_id)?.is_none() {
        bail!("Project #{} not found", project_id);
    }
    let user = match db.get_user(user_id)? {
        Some(u) => u,
        None => bail!("User #{} not found", user_id),
    };

    if db.add_member(project_id, user_id)? {
        tracing::info!(project_id, user_id, "added member");
        println!("{} joined project #{}", user.name, project_id);
    } else {
        println!("{} is already a member of project #{}", user.name, project_id);
    }
    Ok(())
}

/// Removes another member. Members cannot remove themselves.
pub fn remove_member(db: &Database, project_id: i64, user_id: i64, force: bool) -> Result<()> {
    let actor = require_user(db)?;
    if user_id == actor.id {
        bail!("You cannot remove yourself from project #{}", project_id);
    }
    let project = match db.get_project(project_id)? {
        Some(p) => p,
        None => bail!("Project #{} not found", project_id),
    };
    if !db.is_member(project_id, user_id)? {
        println!("User #{} is not a member of project #{}", user_id, project_id);
        return Ok(());
    }

    if !force {
        let name = user_name(db, user_id)?;
        let prompt = format!("Remove {} from project \"{}\"?", name, project.name);
        if !confirm(&prompt)? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    db.remove_member(project_id, user_id)?;
    tracing::info!(project_id, user_id, actor_id = actor.id, "removed member");
    println!("Removed user #{} from project #{}", user_id, project_id);
    Ok(())
}

/// Internal function for testing without stdin interaction
#[cfg(test)]
pub fn delete_force(db: &Database, id: i64) -> Result<()> {
    delete(db, id, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn setup_test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        (db, dir)
    }

    fn login_as(db: &Database, name: &str) -> i64 {
        let email = format!("{}@example.com", name.to_lowercase());
        let id = db.create_user(name, &email, "pw", None).unwrap();
        db.set_current_user(id).unwrap();
        id
    }

    fn args<'a>(name: &'a str, tags: &'a [String]) -> CreateArgs<'a> {
        CreateArgs {
            name,
            description: "",
            image_banner: None,
            manager_name: None,
            manager_contact: None,
            tags,
        }
    }

    #[test]
    fn test_create_requires_login() {
        let (db, _dir) = setup_test_db();
        let err = create(&db, &args("P", &[])).unwrap_err();
        assert!(err.to_string().contains("Not logged in"));
    }

    #[test]
    fn test_create_adds_creator_as_member() {
        let (db, _dir) = setup_test_db();
        let ann = login_as(&db, "Ann");
        let tags = vec!["AI, Cloud".to_string()];
        let id = create(&db, &args("Chatbot", &tags)).unwrap();

        let project = db.get_project(id).unwrap().unwrap();
        assert_eq!(project.manager_name.as_deref(), Some("Ann"));
        assert_eq!(project.manager_contact.as_deref(), Some("ann@example.com"));
        let members: Vec<i64> = db.get_members(id).unwrap().iter().map(|u| u.id).collect();
        assert_eq!(members, vec![ann]);
        assert_eq!(db.get_project_tags(id).unwrap(), vec!["AI", "Cloud"]);
    }

    #[test]
    fn test_create_empty_name() {
        let (db, _dir) = setup_test_db();
        login_as(&db, "Ann");
        assert!(create(&db, &args("   ", &[])).is_err());
    }

    #[test]
    fn test_update_notifies_other_members() {
        let (db, _dir) = setup_test_db();
        let bob = db.create_user("Bob", "bob@example.com", "pw", None).unwrap();
        let ann = login_as(&db, "Ann");
        let id = create(&db, &args("P", &[])).unwrap();
        db.add_member(id, bob).unwrap();

        let change = ProjectUpdate {
            description: Some("New scope"),
            ..ProjectUpdate::default()
        };
        update(&db, id, &change, None).unwrap();

        assert_eq!(db.get_project(id).unwrap().unwrap().description, "New scope");
        let bob_notes = db.notifications_for_user(bob, true).unwrap();
        assert_eq!(bob_notes.len(), 1);
        assert_eq!(bob_notes[0].kind, NotificationKind::ProjectUpdated);
        assert!(db.notifications_for_user(ann, false).unwrap().is_empty());
    }

    #[test]
    fn test_update_nothing_fails() {
        let (db, _dir) = setup_test_db();
        login_as(&db, "Ann");
        let id = create(&db, &args("P", &[])).unwrap();
        let err = update(&db, id, &ProjectUpdate::default(), None).unwrap_err();
        assert!(err.to_string().contains("Nothing to update"));
    }

    #[test]
    fn test_update_tags_only() {
        let (db, _dir) = setup_test_db();
        login_as(&db, "Ann");
        let id = create(&db, &args("P", &["Old".to_string()])).unwrap();
        let tags = vec!["New".to_string()];
        update(&db, id, &ProjectUpdate::default(), Some(&tags)).unwrap();
        assert_eq!(db.get_project_tags(id).unwrap(), vec!["New"]);
    }

    #[test]
    fn test_update_nonexistent() {
        let (db, _dir) = setup_test_db();
        login_as(&db, "Ann");
        let change = ProjectUpdate {
            name: Some("X"),
            ..ProjectUpdate::default()
        };
        let err = update(&db, 999, &change, None).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_join_is_idempotent() {
        let (db, _dir) = setup_test_db();
        login_as(&db, "Ann");
        let id = create(&db, &args("P", &[])).unwrap();
        let bob = login_as(&db, "Bob");

        join(&db, id).unwrap();
        join(&db, id).unwrap();
        assert!(db.is_member(id, bob).unwrap());
        assert_eq!(db.get_members(id).unwrap().len(), 2);
    }

    #[test]
    fn test_add_member_unknown_user() {
        let (db, _dir) = setup_test_db();
        login_as(&db, "Ann");
        let id = create(&db, &args("P", &[])).unwrap();
        assert!(add_member(&db, id, 999).is_err());
        assert!(add_member(&db, 999, 1).is_err());
    }

    #[test]
    fn test_delete_force() {
        let (db, _dir) = setup_test_db();
        login_as(&db, "Ann");
        let id = create(&db, &args("P", &[])).unwrap();
        delete_force(&db, id).unwrap();
        assert!(db.get_project(id).unwrap().is_none());
        assert!(delete_force(&db, id).is_err());
    }

    #[test]
    fn test_list_and_show_run() {
        let (db, _dir) = setup_test_db();
        login_as(&db, "Ann");
        let id = create(&db, &args("P", &[])).unwrap();
        assert!(list(&db, ProjectScope::Mine).is_ok());
        assert!(list(&db, ProjectScope::All).is_ok());
        assert!(list(&db, ProjectScope::Available).is_ok());
        assert!(show(&db, id).is_ok());
        assert!(show(&db, 999).is_err());
    }

    #[test]
    fn test_update_trims_name() {
        let (db, _dir) = setup_test_db();
        login_as(&db, "Ann");
        let id = create(&db, &args("P", &[])).unwrap();
        let change = ProjectUpdate {
            name: Some("  Renamed  "),
            ..ProjectUpdate::default()
        };
        update(&db, id, &change, None).unwrap();
        assert_eq!(db.get_project(id).unwrap().unwrap().name, "Renamed");
    }

    #[test]
    fn test_membership_changes_require_login() {
        let (db, _dir) = setup_test_db();
        login_as(&db, "Ann");
        let id = create(&db, &args("P", &[])).unwrap();
        let bob = db.create_user("Bob", "bob@example.com", "pw", None).unwrap();
        db.clear_current_user().unwrap();

        assert!(add_member(&db, id, bob).is_err());
        assert!(!db.is_member(id, bob).unwrap());
        assert!(remove_member(&db, id, 1, true).is_err());
        assert!(delete(&db, id, true).is_err());
        assert!(db.get_project(id).unwrap().is_some());
    }

    #[test]
    fn test_remove_member_rejects_self() {
        let (db, _dir) = setup_test_db();
        let ann = login_as(&db, "Ann");
        let id = create(&db, &args("P", &[])).unwrap();

        let err = remove_member(&db, id, ann, true).unwrap_err();
        assert!(err.to_string().contains("cannot remove yourself"));
        assert!(db.is_member(id, ann).unwrap());
    }

    #[test]
    fn test_remove_other_member() {
        let (db, _dir) = setup_test_db();
        let ann = login_as(&db, "Ann");
        let id = create(&db, &args("P", &[])).unwrap();
        let bob = db.create_user("Bob", "bob@example.com", "pw", None).unwrap();
        add_member(&db, id, bob).unwrap();

        remove_member(&db, id, bob, true).unwrap();
        let members: Vec<i64> = db.get_members(id).unwrap().iter().map(|u| u.id).collect();
        assert_eq!(members, vec![ann]);
        // not a member any more
        remove_member(&db, id, bob, true).unwrap();
        assert!(remove_member(&db, 999, bob, true).is_err());
    }

    proptest! {
        #[test]
        fn prop_create_roundtrip_name(name in "[a-zA-Z0-9][a-zA-Z0-9 ]{0,40}") {
            let (db, _dir) = setup_test_db();
            login_as(&db, "Ann");
            let id = create(&db, &args(&name, &[])).unwrap();
            prop_assert_eq!(db.get_project(id).unwrap().unwrap().name, name.trim());
        }
    }
}
