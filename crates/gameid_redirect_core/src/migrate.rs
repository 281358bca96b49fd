use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::store::StoreSettings;

pub const MIGRATIONS_POLICY_MESSAGE: &str =
    "Run `gameid-redirect db migrate` to apply pending schema migrations.";

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "page",
        sql: include_str!("migrations/v001_page.sql"),
    },
    Migration {
        version: 2,
        name: "missing_redirects",
        sql: include_str!("migrations/v002_missing_redirects.sql"),
    },
];

/// Report returned after running migrations.
#[derive(Debug, Clone)]
pub struct MigrateReport {
    pub applied: Vec<AppliedMigration>,
    pub current_version: u32,
}

#[derive(Debug, Clone)]
pub struct AppliedMigration {
    pub version: u32,
    pub name: String,
}

const SCHEMA_MIGRATIONS_SQL: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);";

/// Run all pending migrations against `settings.db_path`, creating the
/// database and its parent directories when needed.
pub fn run_migrations(settings: &StoreSettings) -> Result<MigrateReport> {
    ensure_db_parent(&settings.db_path)?;
    let mut connection = open_connection(settings)?;
    let current = applied_version(&connection)?;

    let mut applied = Vec::new();
    for migration in pending(current) {
        apply_migration(&mut connection, migration)?;
        applied.push(AppliedMigration {
            version: migration.version,
            name: migration.name.to_string(),
        });
    }

    Ok(MigrateReport {
        applied,
        current_version: applied_version(&connection)?,
    })
}

/// Returns the number of migrations that have not yet been applied.
pub fn pending_migration_count(settings: &StoreSettings) -> Result<usize> {
    if !settings.db_path.exists() {
        return Ok(MIGRATIONS.len());
    }
    let connection = open_connection(settings)?;
    Ok(pending(applied_version(&connection)?).count())
}

fn pending(current: u32) -> impl Iterator<Item = &'static Migration> {
    MIGRATIONS
        .iter()
        .filter(move |migration| migration.version > current)
}

/// Highest recorded migration version, 0 for a fresh database.
fn applied_version(connection: &Connection) -> Result<u32> {
    connection
        .execute_batch(SCHEMA_MIGRATIONS_SQL)
        .context("failed to create schema_migrations table")?;
    connection
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get::<_, u32>(0),
        )
        .context("failed to read schema version")
}

// The savepoint rolls back on drop, so a failing statement leaves neither the
// schema change nor its schema_migrations row behind.
fn apply_migration(connection: &mut Connection, migration: &Migration) -> Result<()> {
    let label = format!("v{:03}_{}", migration.version, migration.name);
    let savepoint = connection
        .savepoint()
        .with_context(|| format!("failed to open savepoint for {label}"))?;
    savepoint
        .execute_batch(migration.sql)
        .with_context(|| format!("failed to apply migration {label}"))?;

    let applied_at_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")?
        .as_secs();
    savepoint
        .execute(
            "INSERT INTO schema_migrations (version, name, applied_at_unix) VALUES (?1, ?2, ?3)",
            params![
                migration.version,
                migration.name,
                i64::try_from(applied_at_unix).context("timestamp does not fit into i64")?,
            ],
        )
        .with_context(|| format!("failed to record migration {label}"))?;
    savepoint
        .commit()
        .with_context(|| format!("failed to commit migration {label}"))
}

fn open_connection(settings: &StoreSettings) -> Result<Connection> {
    let connection = Connection::open(&settings.db_path)
        .with_context(|| format!("failed to open {}", settings.db_path.display()))?;
    connection
        .busy_timeout(settings.busy_timeout)
        .context("failed to set sqlite busy timeout")?;
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL journal mode")?;
    Ok(connection)
}

fn ensure_db_parent(db_path: &Path) -> Result<()> {
    let parent = db_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("db path has no parent: {}", db_path.display()))?;
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create database parent directory {}",
            parent.display()
        )
    })
}
