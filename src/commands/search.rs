use anyhow::{bail, Result};

use crate::commands::truncate;
use crate::db::Database;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchHit {
    Project { id: i64, name: String },
    Task { id: i64, title: String, project_id: i64 },
}

/// Projects (by name or tag) first, then tasks (by title).
pub fn find(db: &Database, query: &str) -> Result<Vec<SearchHit>> {
    let query = query.trim();
    if query.is_empty() {
        bail!("Search query cannot be empty");
    }

    let mut hits: Vec<SearchHit> = db
        .search_projects(query)?
        .into_iter()
        .map(|p| SearchHit::Project { id: p.id, name: p.name })
        .collect();
    hits.extend(db.search_tasks(query)?.into_iter().map(|t| SearchHit::Task {
        id: t.id,
        title: t.title,
        project_id: t.project_id,
    }));
    Ok(hits)
}

pub fn run(db: &Database, query: &str) -> Result<()> {
    let hits = find(db, query)?;

    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    for hit in hits {
        match hit {
            SearchHit::Project { id, name } => {
                println!("project #{:<4} {}", id, truncate(&name, 60));
            }
            SearchHit::Task { id, title, project_id } => {
                println!("task    #{:<4} {} (project #{})", id, truncate(&title, 60), project_id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewProject, NewTask};
    use crate::models::TaskStatus;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn setup_test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        (db, dir)
    }

    fn seed(db: &Database) -> (i64, i64) {
        let project = db
            .create_project(&NewProject {
                name: "Mobile App Launch",
                ..NewProject::default()
            })
            .unwrap();
        db.set_project_tags(project, &["Frontend".to_string()]).unwrap();
        let task = db
            .create_task(&NewTask {
                project_id: project,
                title: "Create Mobile Layout",
                description: "",
                assignee_id: None,
                due_date: None,
                status: TaskStatus::Todo,
                priority: None,
                role: None,
            })
            .unwrap();
        (project, task)
    }

    #[test]
    fn test_projects_before_tasks() {
        let (db, _dir) = setup_test_db();
        let (project, task) = seed(&db);
        let hits = find(&db, "mobile").unwrap();
        assert_eq!(
            hits,
            vec![
                SearchHit::Project {
                    id: project,
                    name: "Mobile App Launch".to_string()
                },
                SearchHit::Task {
                    id: task,
                    title: "Create Mobile Layout".to_string(),
                    project_id: project
                },
            ]
        );
    }

    #[test]
    fn test_tag_match() {
        let (db, _dir) = setup_test_db();
        let (project, _task) = seed(&db);
        let hits = find(&db, "FRONT").unwrap();
        assert_eq!(hits.len(), 1);
        assert!(matches!(hits[0], SearchHit::Project { id, .. } if id == project));
    }

    #[test]
    fn test_empty_query_rejected() {
        let (db, _dir) = setup_test_db();
        assert!(find(&db, "  ").is_err());
    }

    proptest! {
        #[test]
        fn prop_search_never_panics(query in "\\PC{1,20}") {
            let (db, _dir) = setup_test_db();
            seed(&db);
            let _ = run(&db, &query);
        }
    }
}
