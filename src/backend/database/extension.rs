//! Extensions and their association to lines and other owners
//!
//! Each owner keeps its associations in `extension_association`, with a
//! partial unique index allowing a single main row per owner. Groups,
//! queues, conferences and outcalls also claim the extension through its
//! `type`/`typeval` columns; lines only share free extensions.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::{debug, info, warn};

use super::fixes::{ExtensionFixes, OwnerFixes};
use super::search::{push_tenant_filter, Criteria, SearchConfig, SearchParameters, SearchResult};
use crate::error::{map_database_error, AppError, AppResult};
use crate::models::extension::*;
use crate::models::{Conference, ForwardType, Group, Line, Outcall, Queue};

pub const EXTENSION_SEARCH: SearchConfig = SearchConfig {
    table: "extensions",
    columns: &[
        ("id", "id"),
        ("tenant_uuid", "tenant_uuid"),
        ("exten", "exten"),
        ("context", "context"),
        ("type", "type"),
        ("typeval", "typeval"),
        ("enabled", "(commented = 0)"),
    ],
    search: &["exten", "context"],
    default_sort: "exten",
    tenant_column: Some("tenant_uuid"),
};

const SELECT_EXTENSION: &str =
    "SELECT id, tenant_uuid, context, exten, commented, type, typeval FROM extensions";

/// Table holding the owners of one kind
pub(crate) fn owner_table(kind: ExtensionOwnerKind) -> &'static str {
    match kind {
        ExtensionOwnerKind::Line => "linefeatures",
        ExtensionOwnerKind::Group => "groupfeatures",
        ExtensionOwnerKind::Queue => "queuefeatures",
        ExtensionOwnerKind::Conference => "conference",
        ExtensionOwnerKind::Outcall => "outcall",
    }
}

fn owner_resource(kind: ExtensionOwnerKind) -> &'static str {
    match kind {
        ExtensionOwnerKind::Line => "Line",
        ExtensionOwnerKind::Group => "Group",
        ExtensionOwnerKind::Queue => "Queue",
        ExtensionOwnerKind::Conference => "Conference",
        ExtensionOwnerKind::Outcall => "Outcall",
    }
}

fn extension_from_row(row: &SqliteRow) -> AppResult<Extension> {
    let commented: i64 = row.try_get("commented")?;
    Ok(Extension {
        id: row.try_get("id")?,
        tenant_uuid: row.try_get("tenant_uuid")?,
        context: row.try_get("context")?,
        exten: row.try_get("exten")?,
        enabled: commented == 0,
        type_: row.try_get("type")?,
        typeval: row.try_get("typeval")?,
    })
}

pub(crate) async fn load_extension(
    conn: &mut SqliteConnection,
    extension_id: i64,
) -> AppResult<Option<Extension>> {
    let sql = format!("{} WHERE id = ?", SELECT_EXTENSION);
    let row = sqlx::query(&sql)
        .bind(extension_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to find extension: {}", e)))?;
    row.as_ref().map(extension_from_row).transpose()
}

pub(crate) async fn load_associations(
    conn: &mut SqliteConnection,
    kind: ExtensionOwnerKind,
    owner_id: i64,
) -> AppResult<ExtensionAssociations> {
    let entries = sqlx::query_as::<_, ExtensionAssociation>(
        "SELECT extension_id, main_extension FROM extension_association WHERE owner_type = ? AND owner_id = ? ORDER BY extension_id",
    )
    .bind(kind.as_str())
    .bind(owner_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::Database(format!("Failed to load extension associations: {}", e)))?;
    Ok(ExtensionAssociations::new(entries))
}

/// The main extension of an owner, if it has any extension at all
pub(crate) async fn main_extension(
    conn: &mut SqliteConnection,
    kind: ExtensionOwnerKind,
    owner_id: i64,
) -> AppResult<Option<Extension>> {
    let extension_id: Option<i64> = sqlx::query_scalar(
        "SELECT extension_id FROM extension_association WHERE owner_type = ? AND owner_id = ? AND main_extension = 1",
    )
    .bind(kind.as_str())
    .bind(owner_id)
    .fetch_optional(&mut *conn)
    .await?;

    match extension_id {
        Some(extension_id) => load_extension(conn, extension_id).await,
        None => Ok(None),
    }
}

/// Owners associated with an extension
pub(crate) async fn extension_owners(
    conn: &mut SqliteConnection,
    extension_id: i64,
) -> AppResult<Vec<(ExtensionOwnerKind, i64)>> {
    let rows = sqlx::query(
        "SELECT owner_type, owner_id FROM extension_association WHERE extension_id = ? ORDER BY owner_type, owner_id",
    )
    .bind(extension_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| -> AppResult<(ExtensionOwnerKind, i64)> {
            let owner_type: String = row.try_get("owner_type")?;
            Ok((owner_type.parse()?, row.try_get("owner_id")?))
        })
        .collect()
}

async fn store_owner(conn: &mut SqliteConnection, extension: &Extension) -> AppResult<()> {
    sqlx::query("UPDATE extensions SET type = ?, typeval = ? WHERE id = ?")
        .bind(&extension.type_)
        .bind(&extension.typeval)
        .bind(extension.id)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_database_error(e, "Extension"))?;
    Ok(())
}

async fn ensure_owner_exists(
    conn: &mut SqliteConnection,
    kind: ExtensionOwnerKind,
    owner_id: i64,
) -> AppResult<()> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", owner_table(kind));
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(owner_id)
        .fetch_one(&mut *conn)
        .await?;
    if count == 0 {
        return Err(AppError::not_found(owner_resource(kind), [("id", owner_id)]));
    }
    Ok(())
}

/// Associate an extension to an owner and refresh the owner's cached fields
pub(crate) async fn associate(
    conn: &mut SqliteConnection,
    kind: ExtensionOwnerKind,
    owner_id: i64,
    extension_id: i64,
) -> AppResult<ExtensionAssociation> {
    ensure_owner_exists(conn, kind, owner_id).await?;
    let mut extension = load_extension(conn, extension_id)
        .await?
        .ok_or_else(|| AppError::not_found("Extension", [("id", extension_id)]))?;

    let mut associations = load_associations(conn, kind, owner_id).await?;
    let association = associations.associate(extension_id)?;

    extension.claim(kind, owner_id)?;
    if kind.claims_extension() {
        store_owner(conn, &extension).await?;
    }

    sqlx::query(
        "INSERT INTO extension_association (owner_type, owner_id, extension_id, main_extension) VALUES (?, ?, ?, ?)",
    )
    .bind(kind.as_str())
    .bind(owner_id)
    .bind(extension_id)
    .bind(association.main_extension)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_database_error(e, kind.resource()))?;

    debug!(%kind, owner_id, extension_id, main = association.main_extension, "extension associated");
    OwnerFixes::new(conn).fix(kind, owner_id).await?;
    Ok(association)
}

/// Remove an association, promoting another extension when the main one goes
pub(crate) async fn dissociate(
    conn: &mut SqliteConnection,
    kind: ExtensionOwnerKind,
    owner_id: i64,
    extension_id: i64,
) -> AppResult<Dissociation> {
    let mut associations = load_associations(conn, kind, owner_id).await?;
    let dissociation = associations.dissociate(extension_id)?;

    sqlx::query(
        "DELETE FROM extension_association WHERE owner_type = ? AND owner_id = ? AND extension_id = ?",
    )
    .bind(kind.as_str())
    .bind(owner_id)
    .bind(extension_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_database_error(e, kind.resource()))?;

    if let Some(promoted) = dissociation.promoted {
        sqlx::query(
            "UPDATE extension_association SET main_extension = 1 WHERE owner_type = ? AND owner_id = ? AND extension_id = ?",
        )
        .bind(kind.as_str())
        .bind(owner_id)
        .bind(promoted)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_database_error(e, kind.resource()))?;
        debug!(%kind, owner_id, extension_id = promoted, "extension promoted to main");
    } else if dissociation.removed.main_extension {
        warn!(%kind, owner_id, "no extension left to promote to main");
    }

    if let Some(mut extension) = load_extension(conn, extension_id).await? {
        if extension.owner() == Some((kind, owner_id)) {
            extension.release();
            store_owner(conn, &extension).await?;
        }
    }

    OwnerFixes::new(conn).fix(kind, owner_id).await?;
    Ok(dissociation)
}

/// Drop every association of an owner about to be deleted
pub(crate) async fn release_owner(
    conn: &mut SqliteConnection,
    kind: ExtensionOwnerKind,
    owner_id: i64,
) -> AppResult<()> {
    sqlx::query("DELETE FROM extension_association WHERE owner_type = ? AND owner_id = ?")
        .bind(kind.as_str())
        .bind(owner_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_database_error(e, kind.resource()))?;

    if kind.claims_extension() {
        sqlx::query("UPDATE extensions SET type = ?, typeval = ? WHERE type = ? AND typeval = ?")
            .bind(FREE_OWNER_TYPE)
            .bind(FREE_OWNER_VALUE)
            .bind(kind.as_str())
            .bind(owner_id.to_string())
            .execute(&mut *conn)
            .await
            .map_err(|e| map_database_error(e, "Extension"))?;
    }
    Ok(())
}

pub struct ExtensionPersistor<'c> {
    conn: &'c mut SqliteConnection,
    tenant_uuids: Option<Vec<String>>,
}

impl<'c> ExtensionPersistor<'c> {
    pub fn new(conn: &'c mut SqliteConnection, tenant_uuids: Option<Vec<String>>) -> Self {
        Self { conn, tenant_uuids }
    }

    fn in_scope(&self, tenant_uuid: &str) -> bool {
        self.tenant_uuids
            .as_ref()
            .map_or(true, |uuids| uuids.iter().any(|uuid| uuid == tenant_uuid))
    }

    pub async fn create(&mut self, extension: &Extension) -> AppResult<Extension> {
        if extension.exten.is_empty() {
            return Err(AppError::input("Extension exten cannot be empty"));
        }
        let (owner_type, owner_value) = if extension.is_feature() {
            if extension.typeval.is_empty() {
                return Err(AppError::input("Feature extension must name its feature"));
            }
            (FEATURE_OWNER_TYPE, extension.typeval.as_str())
        } else {
            (FREE_OWNER_TYPE, FREE_OWNER_VALUE)
        };

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO extensions (tenant_uuid, context, exten, commented, type, typeval) VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&extension.tenant_uuid)
        .bind(&extension.context)
        .bind(&extension.exten)
        .bind(!extension.enabled)
        .bind(owner_type)
        .bind(owner_value)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|e| map_database_error(e, "Extension"))?;

        info!(id, exten = %extension.exten, context = %extension.context, "extension created");
        self.get(id).await
    }

    pub async fn find(&mut self, extension_id: i64) -> AppResult<Option<Extension>> {
        let extension = load_extension(self.conn, extension_id).await?;
        Ok(extension.filter(|extension| self.in_scope(&extension.tenant_uuid)))
    }

    pub async fn get(&mut self, extension_id: i64) -> AppResult<Extension> {
        self.find(extension_id)
            .await?
            .ok_or_else(|| AppError::not_found("Extension", [("id", extension_id)]))
    }

    pub async fn find_by(&mut self, criteria: &Criteria) -> AppResult<Option<Extension>> {
        match EXTENSION_SEARCH
            .find_id(self.conn, criteria, self.tenant_uuids.as_deref())
            .await?
        {
            Some(id) => self.find(id).await,
            None => Ok(None),
        }
    }

    pub async fn get_by(&mut self, criteria: &Criteria) -> AppResult<Extension> {
        self.find_by(criteria)
            .await?
            .ok_or_else(|| AppError::not_found("Extension", criteria.iter()))
    }

    pub async fn find_all_by(&mut self, criteria: &Criteria) -> AppResult<Vec<Extension>> {
        let ids = EXTENSION_SEARCH
            .find_ids(self.conn, criteria, self.tenant_uuids.as_deref())
            .await?;
        let mut extensions = Vec::with_capacity(ids.len());
        for id in ids {
            extensions.push(self.get(id).await?);
        }
        Ok(extensions)
    }

    pub async fn search(&mut self, parameters: &SearchParameters) -> AppResult<SearchResult<Extension>> {
        let (total, ids) = EXTENSION_SEARCH
            .search_ids(self.conn, parameters, self.tenant_uuids.as_deref())
            .await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.push(self.get(id).await?);
        }
        Ok(SearchResult { total, items })
    }

    /// Feature extensions a service func key can point at
    pub async fn find_all_service_extensions(&mut self) -> AppResult<Vec<ServiceExtension>> {
        let rows = self.feature_rows(SERVICE_FEATURES).await?;
        Ok(rows
            .into_iter()
            .map(|(id, exten, service)| ServiceExtension {
                id,
                exten: clean_feature_exten(&exten),
                service,
            })
            .collect())
    }

    /// Feature extensions a forward func key can point at
    pub async fn find_all_forward_extensions(&mut self) -> AppResult<Vec<ForwardExtension>> {
        let features = ForwardType::ALL.map(ForwardType::db_name);
        let rows = self.feature_rows(&features).await?;
        rows.into_iter()
            .map(|(id, exten, typeval)| {
                Ok(ForwardExtension {
                    id,
                    exten: clean_feature_exten(&exten),
                    forward: ForwardType::from_db(&typeval)?,
                })
            })
            .collect()
    }

    async fn feature_rows(&mut self, features: &[&str]) -> AppResult<Vec<(i64, String, String)>> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT id, exten, typeval FROM extensions WHERE type = ");
        query.push_bind(FEATURE_OWNER_TYPE);
        push_tenant_filter(&mut query, "tenant_uuid", self.tenant_uuids.as_deref());
        query.push(" AND typeval IN (");
        {
            let mut separated = query.separated(", ");
            for feature in features {
                separated.push_bind(feature.to_string());
            }
        }
        query.push(") ORDER BY id");

        query
            .build_query_as::<(i64, String, String)>()
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to find feature extensions: {}", e)))
    }

    /// Save exten, context and state; owners caching the extension follow
    pub async fn edit(&mut self, extension: &Extension) -> AppResult<()> {
        self.get(extension.id).await?;

        sqlx::query("UPDATE extensions SET context = ?, exten = ?, commented = ? WHERE id = ?")
            .bind(&extension.context)
            .bind(&extension.exten)
            .bind(!extension.enabled)
            .bind(extension.id)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| map_database_error(e, "Extension"))?;

        ExtensionFixes::new(self.conn).fix(extension.id).await
    }

    /// Dissociate the extension from every owner, then delete it
    pub async fn delete(&mut self, extension: &Extension) -> AppResult<()> {
        self.get(extension.id).await?;

        for (kind, owner_id) in extension_owners(self.conn, extension.id).await? {
            dissociate(self.conn, kind, owner_id, extension.id).await?;
        }

        sqlx::query("DELETE FROM extensions WHERE id = ?")
            .bind(extension.id)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| map_database_error(e, "Extension"))?;

        info!(id = extension.id, "extension deleted");
        Ok(())
    }

    pub async fn associations(
        &mut self,
        kind: ExtensionOwnerKind,
        owner_id: i64,
    ) -> AppResult<ExtensionAssociations> {
        load_associations(self.conn, kind, owner_id).await
    }

    pub async fn associate(
        &mut self,
        kind: ExtensionOwnerKind,
        owner_id: i64,
        extension: &Extension,
    ) -> AppResult<ExtensionAssociation> {
        self.get(extension.id).await?;
        associate(self.conn, kind, owner_id, extension.id).await
    }

    pub async fn dissociate(
        &mut self,
        kind: ExtensionOwnerKind,
        owner_id: i64,
        extension: &Extension,
    ) -> AppResult<Dissociation> {
        self.get(extension.id).await?;
        dissociate(self.conn, kind, owner_id, extension.id).await
    }

    pub async fn associate_line(&mut self, line: &Line, extension: &Extension) -> AppResult<ExtensionAssociation> {
        self.associate(ExtensionOwnerKind::Line, line.id, extension).await
    }

    pub async fn dissociate_line(&mut self, line: &Line, extension: &Extension) -> AppResult<Dissociation> {
        self.dissociate(ExtensionOwnerKind::Line, line.id, extension).await
    }

    pub async fn associate_group(&mut self, group: &Group, extension: &Extension) -> AppResult<ExtensionAssociation> {
        self.associate(ExtensionOwnerKind::Group, group.id, extension).await
    }

    pub async fn dissociate_group(&mut self, group: &Group, extension: &Extension) -> AppResult<Dissociation> {
        self.dissociate(ExtensionOwnerKind::Group, group.id, extension).await
    }

    pub async fn associate_queue(&mut self, queue: &Queue, extension: &Extension) -> AppResult<ExtensionAssociation> {
        self.associate(ExtensionOwnerKind::Queue, queue.id, extension).await
    }

    pub async fn dissociate_queue(&mut self, queue: &Queue, extension: &Extension) -> AppResult<Dissociation> {
        self.dissociate(ExtensionOwnerKind::Queue, queue.id, extension).await
    }

    pub async fn associate_conference(
        &mut self,
        conference: &Conference,
        extension: &Extension,
    ) -> AppResult<ExtensionAssociation> {
        self.associate(ExtensionOwnerKind::Conference, conference.id, extension)
            .await
    }

    pub async fn dissociate_conference(
        &mut self,
        conference: &Conference,
        extension: &Extension,
    ) -> AppResult<Dissociation> {
        self.dissociate(ExtensionOwnerKind::Conference, conference.id, extension)
            .await
    }

    pub async fn associate_outcall(&mut self, outcall: &Outcall, extension: &Extension) -> AppResult<ExtensionAssociation> {
        self.associate(ExtensionOwnerKind::Outcall, outcall.id, extension).await
    }

    pub async fn dissociate_outcall(&mut self, outcall: &Outcall, extension: &Extension) -> AppResult<Dissociation> {
        self.dissociate(ExtensionOwnerKind::Outcall, outcall.id, extension).await
    }
}
