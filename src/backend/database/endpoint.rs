//! SIP, SCCP, IAX and custom endpoint persistence
//!
//! Lines and trunks reference endpoints through a `(protocol, protocolid)`
//! pair. Editing or deleting an endpoint re-runs the fixes of whichever
//! line or trunk points at it, so the owner's derived name and context
//! stay in step with the endpoint.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use super::fixes::{LineFixes, TrunkFixes};
use super::search::{Criteria, SearchConfig, SearchParameters, SearchResult};
use crate::error::{map_database_error, AppError, AppResult};
use crate::models::endpoint::*;

const GENERATED_NAME_LENGTH: usize = 8;

pub const SIP_SEARCH: SearchConfig = SearchConfig {
    table: "endpoint_sip",
    columns: &[
        ("id", "id"),
        ("name", "name"),
        ("username", "username"),
        ("secret", "secret"),
        ("callerid", "callerid"),
        ("context", "context"),
        ("host", "host"),
        ("category", "category"),
    ],
    search: &["name", "username", "callerid", "context", "host"],
    default_sort: "name",
    tenant_column: None,
};

pub const SCCP_SEARCH: SearchConfig = SearchConfig {
    table: "endpoint_sccp",
    columns: &[
        ("id", "id"),
        ("name", "name"),
        ("context", "context"),
        ("cid_name", "cid_name"),
        ("cid_num", "cid_num"),
    ],
    search: &["name", "context", "cid_name", "cid_num"],
    default_sort: "name",
    tenant_column: None,
};

pub const IAX_SEARCH: SearchConfig = SearchConfig {
    table: "endpoint_iax",
    columns: &[
        ("id", "id"),
        ("name", "name"),
        ("type", "type"),
        ("host", "host"),
        ("category", "category"),
        ("context", "context"),
        ("callerid", "callerid"),
    ],
    search: &["name", "type", "host", "context", "callerid"],
    default_sort: "name",
    tenant_column: None,
};

pub const CUSTOM_SEARCH: SearchConfig = SearchConfig {
    table: "endpoint_custom",
    columns: &[
        ("id", "id"),
        ("interface", "interface"),
        ("context", "context"),
        ("category", "category"),
    ],
    search: &["interface", "context"],
    default_sort: "interface",
    tenant_column: None,
};

pub fn search_config(protocol: Protocol) -> &'static SearchConfig {
    match protocol {
        Protocol::Sip => &SIP_SEARCH,
        Protocol::Sccp => &SCCP_SEARCH,
        Protocol::Iax => &IAX_SEARCH,
        Protocol::Custom => &CUSTOM_SEARCH,
    }
}

/// Load one endpoint row without any fixes
pub(crate) async fn load_endpoint(
    conn: &mut SqliteConnection,
    protocol: Protocol,
    id: i64,
) -> AppResult<Option<Endpoint>> {
    let endpoint = match protocol {
        Protocol::Sip => sqlx::query_as::<_, EndpointSip>(
            "SELECT id, name, username, secret, callerid, context, host, category FROM endpoint_sip WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Endpoint::Sip),
        Protocol::Sccp => sqlx::query_as::<_, EndpointSccp>(
            "SELECT id, name, context, cid_name, cid_num FROM endpoint_sccp WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Endpoint::Sccp),
        Protocol::Iax => sqlx::query_as::<_, EndpointIax>(
            "SELECT id, name, type, host, category, context, callerid FROM endpoint_iax WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Endpoint::Iax),
        Protocol::Custom => sqlx::query_as::<_, EndpointCustom>(
            "SELECT id, interface, context, category FROM endpoint_custom WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Endpoint::Custom),
    };
    Ok(endpoint)
}

/// Write every column of an existing endpoint row
pub(crate) async fn update_endpoint_row(
    conn: &mut SqliteConnection,
    endpoint: &Endpoint,
) -> AppResult<()> {
    let protocol = endpoint.protocol();
    let result = match endpoint {
        Endpoint::Sip(e) => sqlx::query(
            "UPDATE endpoint_sip SET name = ?, username = ?, secret = ?, callerid = ?, context = ?, host = ?, category = ? WHERE id = ?",
        )
        .bind(&e.name)
        .bind(&e.username)
        .bind(&e.secret)
        .bind(&e.callerid)
        .bind(&e.context)
        .bind(&e.host)
        .bind(&e.category)
        .bind(e.id)
        .execute(&mut *conn)
        .await,
        Endpoint::Sccp(e) => sqlx::query(
            "UPDATE endpoint_sccp SET name = ?, context = ?, cid_name = ?, cid_num = ? WHERE id = ?",
        )
        .bind(&e.name)
        .bind(&e.context)
        .bind(&e.cid_name)
        .bind(&e.cid_num)
        .bind(e.id)
        .execute(&mut *conn)
        .await,
        Endpoint::Iax(e) => sqlx::query(
            "UPDATE endpoint_iax SET name = ?, type = ?, host = ?, category = ?, context = ?, callerid = ? WHERE id = ?",
        )
        .bind(&e.name)
        .bind(&e.type_)
        .bind(&e.host)
        .bind(&e.category)
        .bind(&e.context)
        .bind(&e.callerid)
        .bind(e.id)
        .execute(&mut *conn)
        .await,
        Endpoint::Custom(e) => sqlx::query(
            "UPDATE endpoint_custom SET interface = ?, context = ?, category = ? WHERE id = ?",
        )
        .bind(&e.interface)
        .bind(&e.context)
        .bind(&e.category)
        .bind(e.id)
        .execute(&mut *conn)
        .await,
    }
    .map_err(|e| map_database_error(e, protocol.resource()))?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found(protocol.resource(), [("id", endpoint.id())]));
    }
    Ok(())
}

pub struct EndpointPersistor<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> EndpointPersistor<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Insert an endpoint, filling defaults and generating a name when blank
    pub async fn create(&mut self, mut endpoint: Endpoint) -> AppResult<Endpoint> {
        let protocol = endpoint.protocol();
        match &mut endpoint {
            Endpoint::Sip(e) => {
                if e.name.is_empty() {
                    e.name = self.generate_name(protocol).await?;
                }
                if e.host.is_empty() {
                    e.host = "dynamic".to_string();
                }
                if e.category.is_empty() {
                    e.category = "user".to_string();
                }
            }
            Endpoint::Iax(e) => {
                if e.name.is_empty() {
                    e.name = self.generate_name(protocol).await?;
                }
                e.fill_default_values();
            }
            Endpoint::Custom(e) => {
                if e.interface.is_empty() {
                    return Err(AppError::input("Custom endpoint interface cannot be empty"));
                }
                if e.category.is_empty() {
                    e.category = "user".to_string();
                }
            }
            Endpoint::Sccp(e) => {
                if e.name.is_empty() {
                    return Err(AppError::input("SCCP endpoint name cannot be empty"));
                }
            }
        }

        let id: i64 = match &endpoint {
            Endpoint::Sip(e) => sqlx::query_scalar(
                "INSERT INTO endpoint_sip (name, username, secret, callerid, context, host, category) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(&e.name)
            .bind(&e.username)
            .bind(&e.secret)
            .bind(&e.callerid)
            .bind(&e.context)
            .bind(&e.host)
            .bind(&e.category)
            .fetch_one(&mut *self.conn)
            .await,
            Endpoint::Sccp(e) => sqlx::query_scalar(
                "INSERT INTO endpoint_sccp (name, context, cid_name, cid_num) VALUES (?, ?, ?, ?) RETURNING id",
            )
            .bind(&e.name)
            .bind(&e.context)
            .bind(&e.cid_name)
            .bind(&e.cid_num)
            .fetch_one(&mut *self.conn)
            .await,
            Endpoint::Iax(e) => sqlx::query_scalar(
                "INSERT INTO endpoint_iax (name, type, host, category, context, callerid) VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(&e.name)
            .bind(&e.type_)
            .bind(&e.host)
            .bind(&e.category)
            .bind(&e.context)
            .bind(&e.callerid)
            .fetch_one(&mut *self.conn)
            .await,
            Endpoint::Custom(e) => sqlx::query_scalar(
                "INSERT INTO endpoint_custom (interface, context, category) VALUES (?, ?, ?) RETURNING id",
            )
            .bind(&e.interface)
            .bind(&e.context)
            .bind(&e.category)
            .fetch_one(&mut *self.conn)
            .await,
        }
        .map_err(|e| map_database_error(e, protocol.resource()))?;

        endpoint.set_id(id);
        info!(%protocol, id, "endpoint created");
        Ok(endpoint)
    }

    async fn generate_name(&mut self, protocol: Protocol) -> AppResult<String> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE name = ?", protocol.table());
        loop {
            let candidate: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(GENERATED_NAME_LENGTH)
                .map(char::from)
                .collect::<String>()
                .to_lowercase();

            let taken: i64 = sqlx::query_scalar(&sql)
                .bind(&candidate)
                .fetch_one(&mut *self.conn)
                .await?;
            if taken == 0 {
                return Ok(candidate);
            }
        }
    }

    pub async fn find(&mut self, protocol: Protocol, id: i64) -> AppResult<Option<Endpoint>> {
        load_endpoint(self.conn, protocol, id).await
    }

    pub async fn get(&mut self, protocol: Protocol, id: i64) -> AppResult<Endpoint> {
        self.find(protocol, id)
            .await?
            .ok_or_else(|| AppError::not_found(protocol.resource(), [("id", id)]))
    }

    pub async fn find_by(&mut self, protocol: Protocol, criteria: &Criteria) -> AppResult<Option<Endpoint>> {
        match search_config(protocol).find_id(self.conn, criteria, None).await? {
            Some(id) => self.find(protocol, id).await,
            None => Ok(None),
        }
    }

    pub async fn get_by(&mut self, protocol: Protocol, criteria: &Criteria) -> AppResult<Endpoint> {
        self.find_by(protocol, criteria)
            .await?
            .ok_or_else(|| AppError::not_found(protocol.resource(), criteria.iter()))
    }

    pub async fn find_all_by(&mut self, protocol: Protocol, criteria: &Criteria) -> AppResult<Vec<Endpoint>> {
        let ids = search_config(protocol)
            .find_ids(self.conn, criteria, None)
            .await?;
        let mut endpoints = Vec::with_capacity(ids.len());
        for id in ids {
            endpoints.push(self.get(protocol, id).await?);
        }
        Ok(endpoints)
    }

    pub async fn search(
        &mut self,
        protocol: Protocol,
        parameters: &SearchParameters,
    ) -> AppResult<SearchResult<Endpoint>> {
        let (total, ids) = search_config(protocol)
            .search_ids(self.conn, parameters, None)
            .await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.push(self.get(protocol, id).await?);
        }
        Ok(SearchResult { total, items })
    }

    /// Save the endpoint, then refresh the line or trunk using it
    pub async fn edit(&mut self, endpoint: &Endpoint) -> AppResult<()> {
        update_endpoint_row(self.conn, endpoint).await?;
        self.fix_associated(endpoint).await
    }

    /// Detach the endpoint from its line or trunk, delete it and fix the owner
    pub async fn delete(&mut self, endpoint: &Endpoint) -> AppResult<()> {
        let protocol = endpoint.protocol();
        let line_ids = self.detach("linefeatures", endpoint).await?;
        let trunk_ids = self.detach("trunkfeatures", endpoint).await?;

        let sql = format!("DELETE FROM {} WHERE id = ?", protocol.table());
        let result = sqlx::query(&sql)
            .bind(endpoint.id())
            .execute(&mut *self.conn)
            .await
            .map_err(|e| map_database_error(e, protocol.resource()))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(protocol.resource(), [("id", endpoint.id())]));
        }

        for line_id in line_ids {
            LineFixes::new(self.conn).fix(line_id).await?;
        }
        for trunk_id in trunk_ids {
            TrunkFixes::new(self.conn).fix(trunk_id).await?;
        }
        info!(%protocol, id = endpoint.id(), "endpoint deleted");
        Ok(())
    }

    /// Clear the `(protocol, protocolid)` pair of the owners using the endpoint
    async fn detach(&mut self, table: &str, endpoint: &Endpoint) -> AppResult<Vec<i64>> {
        let sql = format!(
            "UPDATE {} SET protocol = NULL, protocolid = NULL WHERE protocol = ? AND protocolid = ? RETURNING id",
            table
        );
        let ids: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(endpoint.protocol().as_str())
            .bind(endpoint.id())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to detach endpoint: {}", e)))?;
        Ok(ids)
    }

    async fn fix_associated(&mut self, endpoint: &Endpoint) -> AppResult<()> {
        let protocol = endpoint.protocol().as_str();

        let line_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM linefeatures WHERE protocol = ? AND protocolid = ?")
                .bind(protocol)
                .bind(endpoint.id())
                .fetch_optional(&mut *self.conn)
                .await?;
        if let Some(line_id) = line_id {
            debug!(line_id, "fixing line of edited endpoint");
            LineFixes::new(self.conn).fix(line_id).await?;
        }

        let trunk_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM trunkfeatures WHERE protocol = ? AND protocolid = ?")
                .bind(protocol)
                .bind(endpoint.id())
                .fetch_optional(&mut *self.conn)
                .await?;
        if let Some(trunk_id) = trunk_id {
            debug!(trunk_id, "fixing trunk of edited endpoint");
            TrunkFixes::new(self.conn).fix(trunk_id).await?;
        }

        Ok(())
    }
}
