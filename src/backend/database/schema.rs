use sqlx::SqliteConnection;

use super::func_key::destination_columns;
use crate::error::{AppError, AppResult};
use crate::models::func_key::{DestinationType, SPEEDDIAL_TYPE_ID};

const TABLES: &[(&str, &str)] = &[
    (
        "tenant",
        r#"
        CREATE TABLE IF NOT EXISTS tenant (
            uuid TEXT PRIMARY KEY,
            name TEXT
        )
        "#,
    ),
    (
        "endpoint_sip",
        r#"
        CREATE TABLE IF NOT EXISTS endpoint_sip (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            username TEXT,
            secret TEXT,
            callerid TEXT,
            context TEXT,
            host TEXT NOT NULL DEFAULT 'dynamic',
            category TEXT NOT NULL DEFAULT 'user'
        )
        "#,
    ),
    (
        "endpoint_sccp",
        r#"
        CREATE TABLE IF NOT EXISTS endpoint_sccp (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            context TEXT,
            cid_name TEXT,
            cid_num TEXT
        )
        "#,
    ),
    (
        "endpoint_iax",
        r#"
        CREATE TABLE IF NOT EXISTS endpoint_iax (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            type TEXT NOT NULL CHECK (type IN ('friend', 'peer', 'user')),
            host TEXT NOT NULL,
            category TEXT NOT NULL,
            context TEXT,
            callerid TEXT
        )
        "#,
    ),
    (
        "endpoint_custom",
        r#"
        CREATE TABLE IF NOT EXISTS endpoint_custom (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            interface TEXT NOT NULL,
            context TEXT,
            category TEXT NOT NULL DEFAULT 'user'
        )
        "#,
    ),
    (
        "linefeatures",
        r#"
        CREATE TABLE IF NOT EXISTS linefeatures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_uuid TEXT NOT NULL REFERENCES tenant (uuid) ON DELETE CASCADE,
            protocol TEXT CHECK (protocol IN ('sip', 'iax', 'sccp', 'custom')),
            protocolid INTEGER,
            device TEXT NOT NULL DEFAULT '',
            configregistrar TEXT NOT NULL DEFAULT 'default',
            name TEXT UNIQUE,
            number TEXT,
            context TEXT NOT NULL,
            provisioningid INTEGER NOT NULL DEFAULT 0,
            num INTEGER NOT NULL DEFAULT 1,
            commented INTEGER NOT NULL DEFAULT 0,
            description TEXT,
            CHECK ((protocol IS NULL) = (protocolid IS NULL)),
            UNIQUE (protocol, protocolid)
        )
        "#,
    ),
    (
        "trunkfeatures",
        r#"
        CREATE TABLE IF NOT EXISTS trunkfeatures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_uuid TEXT NOT NULL REFERENCES tenant (uuid) ON DELETE CASCADE,
            protocol TEXT CHECK (protocol IN ('sip', 'iax', 'custom')),
            protocolid INTEGER,
            name TEXT,
            context TEXT,
            description TEXT,
            CHECK ((protocol IS NULL) = (protocolid IS NULL)),
            UNIQUE (protocol, protocolid)
        )
        "#,
    ),
    (
        "extensions",
        r#"
        CREATE TABLE IF NOT EXISTS extensions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_uuid TEXT NOT NULL REFERENCES tenant (uuid) ON DELETE CASCADE,
            context TEXT NOT NULL,
            exten TEXT NOT NULL,
            commented INTEGER NOT NULL DEFAULT 0,
            type TEXT NOT NULL DEFAULT 'user',
            typeval TEXT NOT NULL DEFAULT '0',
            UNIQUE (exten, context)
        )
        "#,
    ),
    (
        "extension_association",
        r#"
        CREATE TABLE IF NOT EXISTS extension_association (
            owner_type TEXT NOT NULL
                CHECK (owner_type IN ('line', 'group', 'queue', 'conference', 'outcall')),
            owner_id INTEGER NOT NULL,
            extension_id INTEGER NOT NULL REFERENCES extensions (id),
            main_extension INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (owner_type, owner_id, extension_id)
        )
        "#,
    ),
    (
        "groupfeatures",
        r#"
        CREATE TABLE IF NOT EXISTS groupfeatures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_uuid TEXT NOT NULL REFERENCES tenant (uuid) ON DELETE CASCADE,
            name TEXT NOT NULL UNIQUE,
            number TEXT,
            context TEXT,
            timeout INTEGER,
            preprocess_subroutine TEXT,
            enabled INTEGER NOT NULL DEFAULT 1
        )
        "#,
    ),
    (
        "queuefeatures",
        r#"
        CREATE TABLE IF NOT EXISTS queuefeatures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_uuid TEXT NOT NULL REFERENCES tenant (uuid) ON DELETE CASCADE,
            name TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            number TEXT,
            context TEXT,
            timeout INTEGER,
            preprocess_subroutine TEXT,
            enabled INTEGER NOT NULL DEFAULT 1
        )
        "#,
    ),
    (
        "conference",
        r#"
        CREATE TABLE IF NOT EXISTS conference (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_uuid TEXT NOT NULL REFERENCES tenant (uuid) ON DELETE CASCADE,
            name TEXT,
            number TEXT,
            context TEXT,
            max_users INTEGER NOT NULL DEFAULT 50,
            pin TEXT
        )
        "#,
    ),
    (
        "outcall",
        r#"
        CREATE TABLE IF NOT EXISTS outcall (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_uuid TEXT NOT NULL REFERENCES tenant (uuid) ON DELETE CASCADE,
            name TEXT NOT NULL UNIQUE,
            context TEXT,
            internal_caller_id INTEGER NOT NULL DEFAULT 0,
            ring_time INTEGER,
            enabled INTEGER NOT NULL DEFAULT 1,
            description TEXT
        )
        "#,
    ),
    (
        "outcall_trunk",
        r#"
        CREATE TABLE IF NOT EXISTS outcall_trunk (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            outcall_id INTEGER NOT NULL REFERENCES outcall (id) ON DELETE CASCADE,
            trunk_id INTEGER NOT NULL REFERENCES trunkfeatures (id) ON DELETE CASCADE,
            priority INTEGER NOT NULL DEFAULT 0,
            UNIQUE (outcall_id, trunk_id)
        )
        "#,
    ),
    (
        "func_key_type",
        r#"
        CREATE TABLE IF NOT EXISTS func_key_type (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    ),
    (
        "func_key_destination_type",
        r#"
        CREATE TABLE IF NOT EXISTS func_key_destination_type (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    ),
    (
        "func_key",
        r#"
        CREATE TABLE IF NOT EXISTS func_key (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type_id INTEGER NOT NULL REFERENCES func_key_type (id),
            destination_type_id INTEGER NOT NULL REFERENCES func_key_destination_type (id),
            UNIQUE (id, destination_type_id)
        )
        "#,
    ),
];

const TEMPLATE_TABLES: &[(&str, &str)] = &[
    (
        "func_key_template",
        r#"
        CREATE TABLE IF NOT EXISTS func_key_template (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_uuid TEXT NOT NULL REFERENCES tenant (uuid) ON DELETE CASCADE,
            name TEXT,
            private INTEGER NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "func_key_mapping",
        r#"
        CREATE TABLE IF NOT EXISTS func_key_mapping (
            template_id INTEGER NOT NULL REFERENCES func_key_template (id) ON DELETE CASCADE,
            func_key_id INTEGER NOT NULL,
            destination_type_id INTEGER NOT NULL,
            label TEXT,
            position INTEGER NOT NULL CHECK (position > 0),
            blf INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (template_id, position),
            FOREIGN KEY (func_key_id, destination_type_id)
                REFERENCES func_key (id, destination_type_id)
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS extension_association__uidx__main ON extension_association (owner_type, owner_id) WHERE main_extension = 1",
    "CREATE INDEX IF NOT EXISTS extension_association__idx__extension_id ON extension_association (extension_id)",
    "CREATE INDEX IF NOT EXISTS linefeatures__idx__context ON linefeatures (context)",
    "CREATE INDEX IF NOT EXISTS linefeatures__idx__device ON linefeatures (device)",
    "CREATE INDEX IF NOT EXISTS linefeatures__idx__number ON linefeatures (number)",
    "CREATE INDEX IF NOT EXISTS linefeatures__idx__provisioningid ON linefeatures (provisioningid)",
    "CREATE INDEX IF NOT EXISTS extensions__idx__type_typeval ON extensions (type, typeval)",
    "CREATE INDEX IF NOT EXISTS func_key_mapping__idx__func_key_id ON func_key_mapping (func_key_id)",
    "CREATE INDEX IF NOT EXISTS outcall_trunk__idx__trunk_id ON outcall_trunk (trunk_id)",
];

/// SQL creating the destination table of one kind
///
/// The discriminator column is pinned to the kind's constant, and the
/// composite foreign key forces the parent func key to carry the same one.
pub fn destination_table_sql(destination_type: DestinationType) -> String {
    let columns = destination_columns(destination_type)
        .iter()
        .map(|(name, definition)| format!("            {} {},\n", name, definition))
        .collect::<String>();

    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            func_key_id INTEGER NOT NULL PRIMARY KEY,
            destination_type_id INTEGER NOT NULL DEFAULT {id} CHECK (destination_type_id = {id}),
{columns}            FOREIGN KEY (func_key_id, destination_type_id)
                REFERENCES func_key (id, destination_type_id) ON DELETE CASCADE
        )
        "#,
        table = destination_type.table(),
        id = destination_type.id(),
        columns = columns,
    )
}

async fn execute(conn: &mut SqliteConnection, sql: &str, what: &str) -> AppResult<()> {
    sqlx::query(sql)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create {}: {}", what, e)))?;
    Ok(())
}

/// Create every table, index and lookup row; safe to run repeatedly
pub async fn init_schema(conn: &mut SqliteConnection) -> AppResult<()> {
    for (name, sql) in TABLES {
        execute(conn, sql, name).await?;
    }

    for destination_type in DestinationType::ALL {
        let sql = destination_table_sql(destination_type);
        execute(conn, &sql, destination_type.table()).await?;
    }

    for (name, sql) in TEMPLATE_TABLES {
        execute(conn, sql, name).await?;
    }

    for sql in INDEXES {
        execute(conn, sql, "index").await?;
    }

    seed_lookup_tables(conn).await
}

async fn seed_lookup_tables(conn: &mut SqliteConnection) -> AppResult<()> {
    sqlx::query("INSERT OR IGNORE INTO func_key_type (id, name) VALUES (?, 'speeddial')")
        .bind(SPEEDDIAL_TYPE_ID)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to seed func_key_type: {}", e)))?;

    for destination_type in DestinationType::ALL {
        sqlx::query("INSERT OR IGNORE INTO func_key_destination_type (id, name) VALUES (?, ?)")
            .bind(destination_type.id())
            .bind(destination_type.name())
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to seed func_key_destination_type: {}", e))
            })?;
    }

    Ok(())
}

/// Drop every table, children first
pub async fn drop_schema(conn: &mut SqliteConnection) -> AppResult<()> {
    let mut tables: Vec<&str> = Vec::new();
    tables.extend(TEMPLATE_TABLES.iter().rev().map(|(name, _)| *name));
    tables.extend(DestinationType::ALL.iter().map(|t| t.table()));
    tables.extend(TABLES.iter().rev().map(|(name, _)| *name));

    for table in tables {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to drop {}: {}", table, e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        init_schema(&mut conn).await.unwrap();
        drop(conn);
        pool
    }

    #[tokio::test]
    async fn test_destination_discriminator_is_checked() {
        let pool = setup_pool().await;

        sqlx::query("INSERT INTO func_key (id, type_id, destination_type_id) VALUES (1, 1, 3)")
            .execute(&pool)
            .await
            .unwrap();

        // func key 1 is a queue key, it cannot get a user destination
        let result = sqlx::query(
            "INSERT INTO func_key_dest_user (func_key_id, destination_type_id, user_id) VALUES (1, 3, 42)",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());

        let result = sqlx::query(
            "INSERT INTO func_key_dest_user (func_key_id, user_id) VALUES (1, 42)",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_one_destination_per_func_key() {
        let pool = setup_pool().await;

        sqlx::query("INSERT INTO func_key (id, type_id, destination_type_id) VALUES (1, 1, 10)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO func_key_dest_custom (func_key_id, exten) VALUES (1, '*10')")
            .execute(&pool)
            .await
            .unwrap();
        let duplicate =
            sqlx::query("INSERT INTO func_key_dest_custom (func_key_id, exten) VALUES (1, '*11')")
                .execute(&pool)
                .await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_line_protocol_pair_is_checked() {
        let pool = setup_pool().await;
        sqlx::query("INSERT INTO tenant (uuid) VALUES ('t')")
            .execute(&pool)
            .await
            .unwrap();

        let result = sqlx::query(
            "INSERT INTO linefeatures (tenant_uuid, context, protocol) VALUES ('t', 'default', 'sip')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());

        sqlx::query(
            "INSERT INTO linefeatures (tenant_uuid, context, protocol, protocolid) VALUES ('t', 'default', 'sip', 1)",
        )
        .execute(&pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_single_main_extension_per_owner() {
        let pool = setup_pool().await;
        sqlx::query("INSERT INTO tenant (uuid) VALUES ('t')")
            .execute(&pool)
            .await
            .unwrap();
        for exten in ["1000", "1001"] {
            sqlx::query("INSERT INTO extensions (tenant_uuid, context, exten) VALUES ('t', 'default', ?)")
                .bind(exten)
                .execute(&pool)
                .await
                .unwrap();
        }

        sqlx::query("INSERT INTO extension_association (owner_type, owner_id, extension_id, main_extension) VALUES ('line', 1, 1, 1)")
            .execute(&pool)
            .await
            .unwrap();
        let second_main = sqlx::query("INSERT INTO extension_association (owner_type, owner_id, extension_id, main_extension) VALUES ('line', 1, 2, 1)")
            .execute(&pool)
            .await;
        assert!(second_main.is_err());
    }
}
