use anyhow::{bail, Result};

use crate::db::Database;

const AVATAR_BASE: &str = "https://api.dicebear.com/7.x/avataaars/svg?seed=";

pub fn avatar_for(seed: &str) -> String {
    let seed: String = seed.split_whitespace().collect::<Vec<_>>().join("");
    format!("{}{}", AVATAR_BASE, seed)
}

pub fn register(db: &Database, name: &str, email: &str, password: &str) -> Result<i64> {
    let name = name.trim();
    let email = email.trim();
    if name.is_empty() {
        bail!("Name cannot be empty");
    }
    if !email.contains('@') {
        bail!("Invalid email address '{}'", email);
    }
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    if db.get_user_by_email(email)?.is_some() {
        bail!("User already exists");
    }

    let id = db.create_user(name, email, password, Some(&avatar_for(name)))?;
    db.set_current_user(id)?;
    tracing::info!(user_id = id, "registered user");
    println!("Registered and logged in as {} <{}>", name, email);
    Ok(id)
}

pub fn login(db: &Database, email: &str, password: &str) -> Result<()> {
    let user = match db.verify_credentials(email.trim(), password)? {
        Some(u) => u,
        None => {
            tracing::warn!(email, "failed login");
            bail!("Invalid email or password");
        }
    };

    db.set_current_user(user.id)?;
    tracing::info!(user_id = user.id, "logged in");
    println!("Logged in as {} <{}>", user.name, user.email);
    Ok(())
}

pub fn logout(db: &Database) -> Result<()> {
    if db.clear_current_user()? {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

pub fn whoami(db: &Database) -> Result<()> {
    match db.current_user()? {
        Some(user) => {
            println!("#{} {} <{}>", user.id, user.name, user.email);
            if let Some(avatar) = &user.avatar {
                println!("Avatar: {}", avatar);
            }
        }
        None => println!("Not logged in."),
    }
    Ok(())
}

pub fn list_users(db: &Database) -> Result<()> {
    let users = db.list_users()?;
    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }
    for user in users {
        println!("#{:<4} {:<24} {}", user.id, user.name, user.email);
    }
    Ok(())
}
