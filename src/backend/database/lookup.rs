//! Dialplan lookups between extensions and line interfaces

use sqlx::{Row, SqliteConnection};

use super::line::load_line;
use crate::error::{AppError, AppResult};
use crate::models::Protocol;

/// Interface of the line reached through `exten@context`
///
/// A line using the extension as its main one wins over a line sharing it.
/// Lines have no user owning them here, so `extension_association.main_extension`
/// stands in for the main line of the user.
pub async fn get_interface_from_exten_and_context(
    conn: &mut SqliteConnection,
    exten: &str,
    context: &str,
) -> AppResult<String> {
    let line_id: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT l.id
        FROM linefeatures l
        JOIN extension_association a ON a.owner_type = 'line' AND a.owner_id = l.id
        JOIN extensions e ON e.id = a.extension_id
        WHERE e.exten = ? AND e.context = ? AND l.protocol IS NOT NULL
        ORDER BY a.main_extension DESC, l.id
        LIMIT 1
        "#,
    )
    .bind(exten)
    .bind(context)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::Database(format!("Failed to find line interface: {}", e)))?;

    let not_found = || AppError::not_found("Line", [("exten", exten), ("context", context)]);
    let line = match line_id {
        Some(line_id) => load_line(conn, line_id).await?.ok_or_else(not_found)?,
        None => return Err(not_found()),
    };
    line.interface().ok_or_else(not_found)
}

/// `(exten, context)` of the main extension of the line named `interface`
pub async fn get_extension_from_protocol_interface(
    conn: &mut SqliteConnection,
    protocol: &str,
    interface: &str,
) -> AppResult<(String, String)> {
    let protocol: Protocol = protocol.parse()?;

    let row = sqlx::query(
        r#"
        SELECT e.exten, e.context
        FROM linefeatures l
        JOIN extension_association a
            ON a.owner_type = 'line' AND a.owner_id = l.id AND a.main_extension = 1
        JOIN extensions e ON e.id = a.extension_id
        WHERE l.protocol = ? AND l.name = ?
        "#,
    )
    .bind(protocol.as_str())
    .bind(interface)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::Database(format!("Failed to find line extension: {}", e)))?
    .ok_or_else(|| {
        AppError::not_found("Line", [("protocol", protocol.as_str()), ("name", interface)])
    })?;

    Ok((row.try_get("exten")?, row.try_get("context")?))
}

/// Protocol of a line, `None` while it has no endpoint
pub async fn get_protocol(conn: &mut SqliteConnection, line_id: i64) -> AppResult<Option<Protocol>> {
    let protocol: Option<Option<String>> =
        sqlx::query_scalar("SELECT protocol FROM linefeatures WHERE id = ?")
            .bind(line_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to find line protocol: {}", e)))?;

    match protocol {
        None => Err(AppError::not_found("Line", [("id", line_id)])),
        Some(None) => Ok(None),
        Some(Some(protocol)) => Ok(Some(protocol.parse()?)),
    }
}

/// `protocol/name` of the first line provisioned on `device_id`
pub async fn get_peer_name(conn: &mut SqliteConnection, device_id: &str) -> AppResult<String> {
    let row = sqlx::query(
        r#"
        SELECT protocol, name
        FROM linefeatures
        WHERE device = ? AND protocol IS NOT NULL AND name IS NOT NULL
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(device_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::Database(format!("Failed to find device line: {}", e)))?
    .ok_or_else(|| AppError::not_found("Line", [("device_id", device_id)]))?;

    let protocol: String = row.try_get("protocol")?;
    let name: String = row.try_get("name")?;
    Ok(format!("{}/{}", protocol, name))
}
