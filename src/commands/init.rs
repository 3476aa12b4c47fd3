use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::db::Database;
use crate::seed;

pub const WORKSPACE_DIR: &str = ".synergy";
pub const DB_FILE: &str = "synergy.db";

pub fn run(path: &Path, force: bool, no_seed: bool) -> Result<()> {
    let workspace = path.join(WORKSPACE_DIR);
    let db_path = workspace.join(DB_FILE);

    if db_path.exists() && !force {
        println!("Already initialized at {}", path.display());
        println!("Use --force to start over with a fresh store.");
        return Ok(());
    }

    fs::create_dir_all(&workspace).context("Failed to create .synergy directory")?;
    if db_path.exists() {
        fs::remove_file(&db_path).context("Failed to remove existing database")?;
        tracing::warn!(path = %db_path.display(), "discarded existing store");
    }

    let db = Database::open(&db_path)?;
    println!("Created {}", workspace.display());

    if !no_seed {
        let report = seed::populate(&db)?;
        println!(
            "Seeded {} users, {} projects and {} tasks",
            report.users, report.projects, report.tasks
        );
        println!(
            "Log in with: synergy login john@example.com --password {}",
            seed::DEMO_PASSWORD
        );
    }

    Ok(())
}
