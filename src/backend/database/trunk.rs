use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

use super::endpoint::{load_endpoint, update_endpoint_row};
use super::fixes::TrunkFixes;
use super::line::ensure_endpoint_free;
use super::search::{Criteria, SearchConfig, SearchParameters, SearchResult};
use crate::error::{map_database_error, AppError, AppResult};
use crate::models::endpoint::{parse_protocol_pair, Endpoint};
use crate::models::trunk::check_trunk_protocol;
use crate::models::Trunk;

pub const TRUNK_SEARCH: SearchConfig = SearchConfig {
    table: "trunkfeatures",
    columns: &[
        ("id", "id"),
        ("tenant_uuid", "tenant_uuid"),
        ("name", "name"),
        ("context", "context"),
        ("protocol", "protocol"),
        ("protocol_id", "protocolid"),
        ("description", "description"),
    ],
    search: &["name", "context", "protocol", "description"],
    default_sort: "name",
    tenant_column: Some("tenant_uuid"),
};

const SELECT_TRUNK: &str =
    "SELECT id, tenant_uuid, protocol, protocolid, name, context, description FROM trunkfeatures";

pub(crate) async fn load_trunk(conn: &mut SqliteConnection, trunk_id: i64) -> AppResult<Option<Trunk>> {
    let sql = format!("{} WHERE id = ?", SELECT_TRUNK);
    let row = sqlx::query(&sql)
        .bind(trunk_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to find trunk: {}", e)))?;

    match row {
        Some(row) => Ok(Some(trunk_from_row(conn, &row).await?)),
        None => Ok(None),
    }
}

async fn trunk_from_row(conn: &mut SqliteConnection, row: &SqliteRow) -> AppResult<Trunk> {
    let id: i64 = row.try_get("id")?;
    let protocol: Option<String> = row.try_get("protocol")?;
    let protocol_id: Option<i64> = row.try_get("protocolid")?;

    let endpoint = match parse_protocol_pair(protocol.as_deref(), protocol_id)? {
        Some((protocol, protocol_id)) => load_endpoint(conn, protocol, protocol_id).await?,
        None => None,
    };
    if protocol_id.is_some() && endpoint.is_none() {
        return Err(AppError::Internal(format!(
            "trunk {} references a missing endpoint",
            id
        )));
    }

    let mut trunk = Trunk::new(&row.try_get::<String, _>("tenant_uuid")?);
    trunk.id = id;
    trunk.name = row.try_get("name")?;
    trunk.context = row.try_get("context")?;
    trunk.description = row.try_get("description")?;
    Ok(trunk.with_endpoint(endpoint))
}

pub(crate) async fn update_trunk_row(conn: &mut SqliteConnection, trunk: &Trunk) -> AppResult<()> {
    let result = sqlx::query(
        "UPDATE trunkfeatures SET protocol = ?, protocolid = ?, name = ?, context = ?, description = ? WHERE id = ?",
    )
    .bind(trunk.protocol().map(|protocol| protocol.as_str()))
    .bind(trunk.protocol_id())
    .bind(&trunk.name)
    .bind(&trunk.context)
    .bind(&trunk.description)
    .bind(trunk.id)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_database_error(e, "Trunk"))?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Trunk", [("id", trunk.id)]));
    }
    Ok(())
}

pub struct TrunkPersistor<'c> {
    conn: &'c mut SqliteConnection,
    tenant_uuids: Option<Vec<String>>,
}

impl<'c> TrunkPersistor<'c> {
    pub fn new(conn: &'c mut SqliteConnection, tenant_uuids: Option<Vec<String>>) -> Self {
        Self { conn, tenant_uuids }
    }

    fn in_scope(&self, tenant_uuid: &str) -> bool {
        self.tenant_uuids
            .as_ref()
            .map_or(true, |uuids| uuids.iter().any(|uuid| uuid == tenant_uuid))
    }

    pub async fn create(&mut self, trunk: &Trunk) -> AppResult<Trunk> {
        if let Some(endpoint) = trunk.endpoint() {
            check_trunk_protocol(endpoint.protocol())?;
            ensure_endpoint_free(self.conn, endpoint, None, None).await?;
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO trunkfeatures (tenant_uuid, protocol, protocolid, context, description) VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&trunk.tenant_uuid)
        .bind(trunk.protocol().map(|protocol| protocol.as_str()))
        .bind(trunk.protocol_id())
        .bind(&trunk.context)
        .bind(&trunk.description)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|e| map_database_error(e, "Trunk"))?;

        TrunkFixes::new(self.conn).fix(id).await?;
        info!(id, tenant_uuid = %trunk.tenant_uuid, "trunk created");
        self.get(id).await
    }

    pub async fn find(&mut self, trunk_id: i64) -> AppResult<Option<Trunk>> {
        let trunk = load_trunk(self.conn, trunk_id).await?;
        Ok(trunk.filter(|trunk| self.in_scope(&trunk.tenant_uuid)))
    }

    pub async fn get(&mut self, trunk_id: i64) -> AppResult<Trunk> {
        self.find(trunk_id)
            .await?
            .ok_or_else(|| AppError::not_found("Trunk", [("id", trunk_id)]))
    }

    pub async fn find_by(&mut self, criteria: &Criteria) -> AppResult<Option<Trunk>> {
        match TRUNK_SEARCH
            .find_id(self.conn, criteria, self.tenant_uuids.as_deref())
            .await?
        {
            Some(id) => self.find(id).await,
            None => Ok(None),
        }
    }

    pub async fn get_by(&mut self, criteria: &Criteria) -> AppResult<Trunk> {
        self.find_by(criteria)
            .await?
            .ok_or_else(|| AppError::not_found("Trunk", criteria.iter()))
    }

    pub async fn find_all_by(&mut self, criteria: &Criteria) -> AppResult<Vec<Trunk>> {
        let ids = TRUNK_SEARCH
            .find_ids(self.conn, criteria, self.tenant_uuids.as_deref())
            .await?;
        let mut trunks = Vec::with_capacity(ids.len());
        for id in ids {
            trunks.push(self.get(id).await?);
        }
        Ok(trunks)
    }

    pub async fn search(&mut self, parameters: &SearchParameters) -> AppResult<SearchResult<Trunk>> {
        let (total, ids) = TRUNK_SEARCH
            .search_ids(self.conn, parameters, self.tenant_uuids.as_deref())
            .await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.push(self.get(id).await?);
        }
        Ok(SearchResult { total, items })
    }

    pub async fn edit(&mut self, trunk: &Trunk) -> AppResult<()> {
        self.get(trunk.id).await?;
        if let Some(endpoint) = trunk.endpoint() {
            check_trunk_protocol(endpoint.protocol())?;
            ensure_endpoint_free(self.conn, endpoint, None, Some(trunk.id)).await?;
            update_endpoint_row(self.conn, endpoint).await?;
        }
        update_trunk_row(self.conn, trunk).await?;
        TrunkFixes::new(self.conn).fix(trunk.id).await
    }

    pub async fn delete(&mut self, trunk: &Trunk) -> AppResult<()> {
        self.get(trunk.id).await?;
        sqlx::query("DELETE FROM trunkfeatures WHERE id = ?")
            .bind(trunk.id)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| map_database_error(e, "Trunk"))?;

        info!(id = trunk.id, "trunk deleted");
        Ok(())
    }

    pub async fn associate_endpoint(&mut self, trunk: &Trunk, endpoint: &Endpoint) -> AppResult<()> {
        check_trunk_protocol(endpoint.protocol())?;
        let mut stored = self.get(trunk.id).await?;
        if stored.is_associated_with(endpoint) {
            return Ok(());
        }
        if stored.is_associated() {
            return Err(AppError::input(format!(
                "Trunk {} is already associated to an endpoint",
                trunk.id
            )));
        }
        let endpoint = load_endpoint(self.conn, endpoint.protocol(), endpoint.id())
            .await?
            .ok_or_else(|| AppError::not_found(endpoint.protocol().resource(), [("id", endpoint.id())]))?;
        ensure_endpoint_free(self.conn, &endpoint, None, Some(trunk.id)).await?;

        debug!(trunk_id = trunk.id, protocol = %endpoint.protocol(), endpoint_id = endpoint.id(), "associating endpoint");
        stored.associate_endpoint(endpoint)?;
        update_trunk_row(self.conn, &stored).await?;
        TrunkFixes::new(self.conn).fix(trunk.id).await
    }

    pub async fn dissociate_endpoint(&mut self, trunk: &Trunk, endpoint: &Endpoint) -> AppResult<()> {
        let mut stored = self.get(trunk.id).await?;
        if !stored.is_associated_with(endpoint) {
            return Ok(());
        }

        debug!(trunk_id = trunk.id, protocol = %endpoint.protocol(), endpoint_id = endpoint.id(), "dissociating endpoint");
        stored.remove_endpoint();
        update_trunk_row(self.conn, &stored).await?;
        TrunkFixes::new(self.conn).fix(trunk.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::database::endpoint::EndpointPersistor;
    use crate::backend::database::tenant::TenantPersistor;
    use crate::backend::database::test_support::memory_backend;
    use crate::models::{EndpointCustom, EndpointIax, EndpointSccp, Protocol, Tenant};

    async fn tenant(conn: &mut SqliteConnection) -> String {
        let tenant = Tenant::new(None);
        TenantPersistor::new(conn).create(&tenant).await.unwrap();
        tenant.uuid
    }

    #[tokio::test]
    async fn test_trunk_follows_endpoint() {
        let backend = memory_backend().await;
        let mut conn = backend.pool().acquire().await.unwrap();
        let tenant_uuid = tenant(&mut conn).await;

        let iax = EndpointPersistor::new(&mut conn)
            .create(Endpoint::Iax(EndpointIax::new(Some("provider"))))
            .await
            .unwrap();

        let mut trunk = Trunk::new(&tenant_uuid);
        trunk.context = Some("to-extern".to_string());
        let mut persistor = TrunkPersistor::new(&mut conn, None);
        let trunk = persistor.create(&trunk).await.unwrap();
        assert_eq!(trunk.name, None);

        persistor.associate_endpoint(&trunk, &iax).await.unwrap();
        let trunk = persistor.get(trunk.id).await.unwrap();
        assert_eq!(trunk.name.as_deref(), Some("provider"));
        assert_eq!(trunk.protocol(), Some(Protocol::Iax));
        assert_eq!(trunk.interface().as_deref(), Some("IAX/provider"));
        assert_eq!(trunk.endpoint().and_then(Endpoint::context), Some("to-extern"));

        persistor.dissociate_endpoint(&trunk, &iax).await.unwrap();
        let trunk = persistor.get(trunk.id).await.unwrap();
        assert_eq!(trunk.name, None);
        assert!(!trunk.is_associated());
    }

    #[tokio::test]
    async fn test_sccp_endpoint_is_rejected() {
        let backend = memory_backend().await;
        let mut conn = backend.pool().acquire().await.unwrap();
        let tenant_uuid = tenant(&mut conn).await;

        let sccp = EndpointPersistor::new(&mut conn)
            .create(Endpoint::Sccp(EndpointSccp::new("SEP001122334455")))
            .await
            .unwrap();
        let mut persistor = TrunkPersistor::new(&mut conn, None);
        let trunk = persistor.create(&Trunk::new(&tenant_uuid)).await.unwrap();

        let err = persistor.associate_endpoint(&trunk, &sccp).await.unwrap_err();
        assert!(err.is_input_error());
    }

    #[tokio::test]
    async fn test_context_change_reaches_endpoint() {
        let backend = memory_backend().await;
        let mut conn = backend.pool().acquire().await.unwrap();
        let tenant_uuid = tenant(&mut conn).await;

        let custom = EndpointPersistor::new(&mut conn)
            .create(Endpoint::Custom(EndpointCustom::new("dahdi/g1")))
            .await
            .unwrap();
        let mut trunk = Trunk::new(&tenant_uuid);
        trunk.associate_endpoint(custom).unwrap();

        let mut persistor = TrunkPersistor::new(&mut conn, Some(vec![tenant_uuid.clone()]));
        let mut trunk = persistor.create(&trunk).await.unwrap();
        assert_eq!(trunk.interface().as_deref(), Some("dahdi/g1"));

        trunk.context = Some("from-extern".to_string());
        persistor.edit(&trunk).await.unwrap();
        let trunk = persistor.get(trunk.id).await.unwrap();
        assert_eq!(trunk.endpoint().and_then(Endpoint::context), Some("from-extern"));

        persistor.delete(&trunk).await.unwrap();
        assert!(persistor.find(trunk.id).await.unwrap().is_none());
    }
}
