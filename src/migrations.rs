use anyhow::Result;
use rusqlite::params;
use tokio_rusqlite::Connection;
use tracing::info;

#[derive(Debug)]
struct Migration {
    name: &'static str,
    version: i32,
    up: fn(&rusqlite::Connection) -> rusqlite::Result<()>,
}

impl Migration {
    fn new(
        name: &'static str,
        version: i32,
        up: fn(&rusqlite::Connection) -> rusqlite::Result<()>,
    ) -> Self {
        Self { name, version, up }
    }
}

fn get_migrations() -> Vec<Migration> {
    vec![
        Migration::new("index_visits_timestamp", 1, |conn| {
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_visits_timestamp ON visits (timestamp)",
                [],
            )?;
            Ok(())
        }),
        Migration::new("index_visits_session_lookup", 2, |conn| {
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_visits_client_activity
                 ON visits (client_id, last_activity_at)",
                [],
            )?;
            Ok(())
        }),
        Migration::new("index_enquiries_timestamp", 3, |conn| {
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_enquiries_timestamp ON enquiries (timestamp)",
                [],
            )?;
            Ok(())
        }),
    ]
}

pub async fn initialize_database(db: &Connection) -> Result<()> {
    db.call(|conn| {
        // Create visits table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS visits (
                id INTEGER PRIMARY KEY,
                client_id TEXT NOT NULL,
                page_view_count INTEGER NOT NULL DEFAULT 1,
                time_on_site_seconds INTEGER NOT NULL DEFAULT 0,
                device_class TEXT NOT NULL,
                browser_family TEXT NOT NULL,
                path TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                last_activity_at INTEGER NOT NULL
            )",
            [],
        )?;

        // Create enquiries table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS enquiries (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                phone TEXT,
                message TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;

        // Create newsletter subscribers table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS newsletter_subscribers (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(())
    })
    .await?;

    // Create migrations table and run migrations in a transaction
    db.call(|conn| {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS migrations (
                id INTEGER PRIMARY KEY,
                version INTEGER NOT NULL UNIQUE,
                name TEXT NOT NULL,
                executed_at INTEGER NOT NULL
            )",
            [],
        )?;

        let migrations = get_migrations();

        let mut stmt = conn.prepare("SELECT version FROM migrations ORDER BY version DESC")?;
        let executed_versions: Vec<i32> = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(Result::ok)
            .collect();

        for migration in migrations {
            if !executed_versions.contains(&migration.version) {
                info!(
                    "Running migration {} ({})",
                    migration.version, migration.name
                );

                conn.execute("BEGIN TRANSACTION", [])?;

                (migration.up)(conn)?;

                conn.execute(
                    "INSERT INTO migrations (version, name, executed_at) VALUES (?1, ?2, unixepoch())",
                    params![&migration.version, &migration.name],
                )?;

                conn.execute("COMMIT", [])?;

                info!("Migration {} completed successfully", migration.version);
            }
        }

        Ok(())
    })
    .await?;

    info!("All database migrations completed successfully");
    Ok(())
}
