use log::info;
use rusqlite::Connection;
use rusqlite_migration::{M, Migrations};

use crate::error::Result;

/// Schema history. Append only; never edit a released step.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // v1: bikes and their rides
        M::up(
            r#"
            CREATE TABLE bikes (
                id TEXT PRIMARY KEY,
                bike_type INTEGER NOT NULL,
                name TEXT NOT NULL,
                color TEXT NOT NULL,
                wheel_size INTEGER NOT NULL,
                service_due_km REAL NOT NULL,
                is_default INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );

            CREATE TABLE rides (
                id TEXT PRIMARY KEY,
                bike_id TEXT NOT NULL,
                name TEXT NOT NULL,
                distance_km REAL NOT NULL,
                duration_minutes INTEGER NOT NULL CHECK (duration_minutes >= 0),
                date INTEGER NOT NULL,
                FOREIGN KEY (bike_id) REFERENCES bikes(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_rides_bike ON rides(bike_id);
            CREATE INDEX idx_rides_date ON rides(date);

            -- At most one default bike
            CREATE UNIQUE INDEX idx_bikes_single_default ON bikes(is_default) WHERE is_default = 1;
            "#,
        ),
        // v2: maintenance timestamp
        M::up("ALTER TABLE bikes ADD COLUMN latest_service INTEGER;"),
    ])
}

/// Bring the schema of `conn` up to date.
pub fn migrate_to_latest(conn: &mut Connection) -> Result<()> {
    info!("[Migrations] Applying schema migrations");
    migrations().to_latest(conn)?;
    info!("[Migrations] Schema is up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn test_migrate_twice_is_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate_to_latest(&mut conn).unwrap();
        migrate_to_latest(&mut conn).unwrap();

        let has_latest_service: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('bikes') WHERE name = 'latest_service'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(has_latest_service, 1);
    }
}
