//! Server commands: `taskboard serve` and `taskboard init`.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use taskboard::config::{CliOverrides, Settings};
use taskboard::service::db::BoardDb;
use taskboard::service::server::{self, DEMO_USER_EMAIL, DEMO_USER_NAME};
use taskboard::telemetry;

pub async fn cmd_serve(config_path: Option<&Path>, overrides: &CliOverrides) -> Result<()> {
    let settings = Settings::load(config_path, overrides)?;
    let _guard = telemetry::init(&settings.logging)?;

    for warning in settings.validate() {
        warn!("{}", warning);
    }

    server::start_server(settings.server).await
}

pub fn cmd_init(config_path: Option<&Path>, overrides: &CliOverrides) -> Result<()> {
    let settings = Settings::load(config_path, overrides)?;
    let db_path = &settings.server.db_path;

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = BoardDb::new(db_path)?;
    println!("Database initialized at {}", db_path.display());

    if settings.server.seed_demo_user {
        let user = db.ensure_user(DEMO_USER_NAME, DEMO_USER_EMAIL)?;
        println!("Demo user {} <{}> has id {}", user.name, user.email, user.id);
    }
    Ok(())
}
