//! SynergySphere: a local-first team collaboration store.
//!
//! Users, projects, tasks, comments and notifications live in a SQLite file
//! inside a `.synergy/` workspace directory. The `synergy` binary is a thin
//! clap front end over [`commands`].

pub mod commands;
pub mod db;
pub mod models;
pub mod notify;
pub mod seed;
