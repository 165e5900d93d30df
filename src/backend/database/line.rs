use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

use super::endpoint::{load_endpoint, update_endpoint_row};
use super::extension::release_owner;
use super::fixes::LineFixes;
use super::search::{Criteria, SearchConfig, SearchParameters, SearchResult};
use crate::error::{map_database_error, AppError, AppResult};
use crate::models::endpoint::{parse_protocol_pair, Endpoint};
use crate::models::{ExtensionOwnerKind, Line};

pub const LINE_SEARCH: SearchConfig = SearchConfig {
    table: "linefeatures",
    columns: &[
        ("id", "id"),
        ("tenant_uuid", "tenant_uuid"),
        ("name", "name"),
        ("number", "number"),
        ("context", "context"),
        ("protocol", "protocol"),
        ("protocol_id", "protocolid"),
        ("device_id", "device"),
        ("provisioning_code", "provisioningid"),
        ("position", "num"),
        ("registrar", "configregistrar"),
        ("enabled", "(commented = 0)"),
        ("description", "description"),
    ],
    search: &["name", "number", "context", "protocol", "provisioning_code", "description"],
    default_sort: "name",
    tenant_column: Some("tenant_uuid"),
};

const SELECT_LINE: &str = "SELECT id, tenant_uuid, protocol, protocolid, device, configregistrar, name, number, context, provisioningid, num, commented, description FROM linefeatures";

/// Load a line with its endpoint, ignoring tenant scope
pub(crate) async fn load_line(conn: &mut SqliteConnection, line_id: i64) -> AppResult<Option<Line>> {
    let sql = format!("{} WHERE id = ?", SELECT_LINE);
    let row = sqlx::query(&sql)
        .bind(line_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to find line: {}", e)))?;

    match row {
        Some(row) => Ok(Some(line_from_row(conn, &row).await?)),
        None => Ok(None),
    }
}

async fn line_from_row(conn: &mut SqliteConnection, row: &SqliteRow) -> AppResult<Line> {
    let id: i64 = row.try_get("id")?;
    let protocol: Option<String> = row.try_get("protocol")?;
    let protocol_id: Option<i64> = row.try_get("protocolid")?;

    let endpoint = match parse_protocol_pair(protocol.as_deref(), protocol_id)? {
        Some((protocol, protocol_id)) => Some(
            load_endpoint(conn, protocol, protocol_id)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "line {} references missing {} endpoint {}",
                        id, protocol, protocol_id
                    ))
                })?,
        ),
        None => None,
    };

    let device: String = row.try_get("device")?;
    let commented: i64 = row.try_get("commented")?;
    let mut line = Line::new(&row.try_get::<String, _>("tenant_uuid")?, &row.try_get::<String, _>("context")?);
    line.id = id;
    line.name = row.try_get("name")?;
    line.number = row.try_get("number")?;
    line.position = row.try_get("num")?;
    line.associate_device(&device);
    line.registrar = row.try_get("configregistrar")?;
    line.enabled = commented == 0;
    line.description = row.try_get("description")?;

    Ok(line.with_storage(row.try_get("provisioningid")?, endpoint))
}

/// Write the line columns, including its `(protocol, protocolid)` pair
pub(crate) async fn update_line_row(conn: &mut SqliteConnection, line: &Line) -> AppResult<()> {
    let result = sqlx::query(
        "UPDATE linefeatures SET protocol = ?, protocolid = ?, device = ?, configregistrar = ?, name = ?, number = ?, context = ?, provisioningid = ?, num = ?, commented = ?, description = ? WHERE id = ?",
    )
    .bind(line.protocol().map(|protocol| protocol.as_str()))
    .bind(line.protocol_id())
    .bind(line.device_id.as_deref().unwrap_or(""))
    .bind(&line.registrar)
    .bind(&line.name)
    .bind(&line.number)
    .bind(&line.context)
    .bind(line.provisioning_id())
    .bind(line.position)
    .bind(!line.enabled)
    .bind(&line.description)
    .bind(line.id)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_database_error(e, "Line"))?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Line", [("id", line.id)]));
    }
    Ok(())
}

/// Reject an endpoint already backing another line or a trunk
pub(crate) async fn ensure_endpoint_free(
    conn: &mut SqliteConnection,
    endpoint: &Endpoint,
    except_line: Option<i64>,
    except_trunk: Option<i64>,
) -> AppResult<()> {
    let protocol = endpoint.protocol().as_str();
    let lines: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM linefeatures WHERE protocol = ? AND protocolid = ? AND id IS NOT ?",
    )
    .bind(protocol)
    .bind(endpoint.id())
    .bind(except_line)
    .fetch_one(&mut *conn)
    .await?;
    let trunks: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM trunkfeatures WHERE protocol = ? AND protocolid = ? AND id IS NOT ?",
    )
    .bind(protocol)
    .bind(endpoint.id())
    .bind(except_trunk)
    .fetch_one(&mut *conn)
    .await?;

    if lines + trunks > 0 {
        return Err(AppError::input(format!(
            "Endpoint {} {} is already associated",
            protocol,
            endpoint.id()
        )));
    }
    Ok(())
}

pub struct LinePersistor<'c> {
    conn: &'c mut SqliteConnection,
    tenant_uuids: Option<Vec<String>>,
}

impl<'c> LinePersistor<'c> {
    pub fn new(conn: &'c mut SqliteConnection, tenant_uuids: Option<Vec<String>>) -> Self {
        Self { conn, tenant_uuids }
    }

    fn in_scope(&self, tenant_uuid: &str) -> bool {
        self.tenant_uuids
            .as_ref()
            .map_or(true, |uuids| uuids.iter().any(|uuid| uuid == tenant_uuid))
    }

    /// Insert a line; an attached endpoint must already be stored
    pub async fn create(&mut self, line: &Line) -> AppResult<Line> {
        if line.context.is_empty() {
            return Err(AppError::input("Line context cannot be empty"));
        }
        if let Some(endpoint) = line.endpoint() {
            ensure_endpoint_free(self.conn, endpoint, None, None).await?;
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO linefeatures (tenant_uuid, protocol, protocolid, device, configregistrar, context, provisioningid, num, commented, description) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&line.tenant_uuid)
        .bind(line.protocol().map(|protocol| protocol.as_str()))
        .bind(line.protocol_id())
        .bind(line.device_id.as_deref().unwrap_or(""))
        .bind(&line.registrar)
        .bind(&line.context)
        .bind(line.provisioning_id())
        .bind(line.position)
        .bind(!line.enabled)
        .bind(&line.description)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|e| map_database_error(e, "Line"))?;

        LineFixes::new(self.conn).fix(id).await?;
        info!(id, tenant_uuid = %line.tenant_uuid, "line created");
        self.get(id).await
    }

    pub async fn find(&mut self, line_id: i64) -> AppResult<Option<Line>> {
        let line = load_line(self.conn, line_id).await?;
        Ok(line.filter(|line| self.in_scope(&line.tenant_uuid)))
    }

    pub async fn get(&mut self, line_id: i64) -> AppResult<Line> {
        self.find(line_id)
            .await?
            .ok_or_else(|| AppError::not_found("Line", [("id", line_id)]))
    }

    pub async fn find_by(&mut self, criteria: &Criteria) -> AppResult<Option<Line>> {
        match LINE_SEARCH
            .find_id(self.conn, criteria, self.tenant_uuids.as_deref())
            .await?
        {
            Some(id) => self.find(id).await,
            None => Ok(None),
        }
    }

    pub async fn get_by(&mut self, criteria: &Criteria) -> AppResult<Line> {
        self.find_by(criteria)
            .await?
            .ok_or_else(|| AppError::not_found("Line", criteria.iter()))
    }

    pub async fn find_all_by(&mut self, criteria: &Criteria) -> AppResult<Vec<Line>> {
        let ids = LINE_SEARCH
            .find_ids(self.conn, criteria, self.tenant_uuids.as_deref())
            .await?;
        let mut lines = Vec::with_capacity(ids.len());
        for id in ids {
            lines.push(self.get(id).await?);
        }
        Ok(lines)
    }

    pub async fn search(&mut self, parameters: &SearchParameters) -> AppResult<SearchResult<Line>> {
        let (total, ids) = LINE_SEARCH
            .search_ids(self.conn, parameters, self.tenant_uuids.as_deref())
            .await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.push(self.get(id).await?);
        }
        Ok(SearchResult { total, items })
    }

    /// Save the line and its endpoint, then recompute the derived fields
    pub async fn edit(&mut self, line: &Line) -> AppResult<()> {
        self.get(line.id).await?;
        if let Some(endpoint) = line.endpoint() {
            ensure_endpoint_free(self.conn, endpoint, Some(line.id), None).await?;
            update_endpoint_row(self.conn, endpoint).await?;
        }
        update_line_row(self.conn, line).await?;
        LineFixes::new(self.conn).fix(line.id).await
    }

    /// Delete a line, releasing its extensions; the endpoint is kept
    pub async fn delete(&mut self, line: &Line) -> AppResult<()> {
        self.get(line.id).await?;
        release_owner(self.conn, ExtensionOwnerKind::Line, line.id).await?;

        sqlx::query("DELETE FROM linefeatures WHERE id = ?")
            .bind(line.id)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| map_database_error(e, "Line"))?;

        info!(id = line.id, "line deleted");
        Ok(())
    }

    pub async fn associate_endpoint(&mut self, line: &Line, endpoint: &Endpoint) -> AppResult<()> {
        let mut stored = self.get(line.id).await?;
        if stored.is_associated_with(endpoint) {
            return Ok(());
        }
        if stored.is_associated(None) {
            return Err(AppError::input(format!(
                "Line {} is already associated to an endpoint",
                line.id
            )));
        }
        let endpoint = load_endpoint(self.conn, endpoint.protocol(), endpoint.id())
            .await?
            .ok_or_else(|| AppError::not_found(endpoint.protocol().resource(), [("id", endpoint.id())]))?;
        ensure_endpoint_free(self.conn, &endpoint, Some(line.id), None).await?;

        debug!(line_id = line.id, protocol = %endpoint.protocol(), endpoint_id = endpoint.id(), "associating endpoint");
        stored.associate_endpoint(endpoint);
        update_line_row(self.conn, &stored).await?;
        LineFixes::new(self.conn).fix(line.id).await
    }

    /// No-op when the line is not using this endpoint
    pub async fn dissociate_endpoint(&mut self, line: &Line, endpoint: &Endpoint) -> AppResult<()> {
        let mut stored = self.get(line.id).await?;
        if !stored.is_associated_with(endpoint) {
            return Ok(());
        }

        debug!(line_id = line.id, protocol = %endpoint.protocol(), endpoint_id = endpoint.id(), "dissociating endpoint");
        stored.remove_endpoint();
        update_line_row(self.conn, &stored).await?;
        LineFixes::new(self.conn).fix(line.id).await
    }

    pub async fn associate_device(&mut self, line: &Line, device_id: &str) -> AppResult<()> {
        let mut stored = self.get(line.id).await?;
        stored.associate_device(device_id);
        update_line_row(self.conn, &stored).await
    }

    pub async fn dissociate_device(&mut self, line: &Line) -> AppResult<()> {
        let mut stored = self.get(line.id).await?;
        stored.remove_device();
        update_line_row(self.conn, &stored).await
    }
}
