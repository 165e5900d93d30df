use sqlx::{Connection, Row, SqliteConnection};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::func_key::FuncKeyPersistor;
use super::search::{SearchConfig, SearchParameters, SearchResult};
use crate::error::{map_database_error, AppError, AppResult};
use crate::models::func_key::DestinationType;
use crate::models::{FuncKeyMapping, FuncKeyTemplate};

pub const TEMPLATE_SEARCH: SearchConfig = SearchConfig {
    table: "func_key_template",
    columns: &[
        ("id", "id"),
        ("tenant_uuid", "tenant_uuid"),
        ("name", "name"),
        ("private", "private"),
    ],
    search: &["name"],
    default_sort: "name",
    tenant_column: Some("tenant_uuid"),
};

pub struct FuncKeyTemplatePersistor<'c> {
    conn: &'c mut SqliteConnection,
    tenant_uuids: Option<Vec<String>>,
}

impl<'c> FuncKeyTemplatePersistor<'c> {
    pub fn new(conn: &'c mut SqliteConnection, tenant_uuids: Option<Vec<String>>) -> Self {
        Self { conn, tenant_uuids }
    }

    fn in_scope(&self, tenant_uuid: &str) -> bool {
        self.tenant_uuids
            .as_ref()
            .map_or(true, |uuids| uuids.iter().any(|uuid| uuid == tenant_uuid))
    }

    pub async fn create(&mut self, template: &FuncKeyTemplate) -> AppResult<FuncKeyTemplate> {
        check_positions(&template.keys)?;

        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin savepoint: {}", e)))?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO func_key_template (tenant_uuid, name, private) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(&template.tenant_uuid)
        .bind(&template.name)
        .bind(template.private)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_database_error(e, "FuncKeyTemplate"))?;

        insert_mappings(&mut *tx, id, &template.keys).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit func key template: {}", e)))?;

        info!(id, keys = template.keys.len(), "func key template created");
        self.get(id).await
    }

    pub async fn find(&mut self, template_id: i64) -> AppResult<Option<FuncKeyTemplate>> {
        let row = sqlx::query("SELECT id, tenant_uuid, name, private FROM func_key_template WHERE id = ?")
            .bind(template_id)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to find func key template: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let tenant_uuid: String = row.try_get("tenant_uuid")?;
        if !self.in_scope(&tenant_uuid) {
            return Ok(None);
        }

        let mut template = FuncKeyTemplate::new(&tenant_uuid, None);
        template.id = row.try_get("id")?;
        template.name = row.try_get("name")?;
        template.private = row.try_get("private")?;
        template.keys = self.load_mappings(template_id).await?;
        Ok(Some(template))
    }

    pub async fn get(&mut self, template_id: i64) -> AppResult<FuncKeyTemplate> {
        self.find(template_id)
            .await?
            .ok_or_else(|| AppError::not_found("FuncKeyTemplate", [("id", template_id)]))
    }

    pub async fn search(&mut self, parameters: &SearchParameters) -> AppResult<SearchResult<FuncKeyTemplate>> {
        let (total, ids) = TEMPLATE_SEARCH
            .search_ids(self.conn, parameters, self.tenant_uuids.as_deref())
            .await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.push(self.get(id).await?);
        }
        Ok(SearchResult { total, items })
    }

    /// Save name and privacy and replace every mapping
    pub async fn edit(&mut self, template: &FuncKeyTemplate) -> AppResult<()> {
        check_positions(&template.keys)?;
        self.get(template.id).await?;

        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin savepoint: {}", e)))?;
        sqlx::query("UPDATE func_key_template SET name = ?, private = ? WHERE id = ?")
            .bind(&template.name)
            .bind(template.private)
            .bind(template.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_database_error(e, "FuncKeyTemplate"))?;

        let previous = delete_mappings(&mut *tx, template.id).await?;
        insert_mappings(&mut *tx, template.id, &template.keys).await?;
        delete_unused_func_keys(&mut *tx, previous).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit func key template: {}", e)))
    }

    /// Delete the template with its mappings and the func keys they used
    pub async fn delete(&mut self, template: &FuncKeyTemplate) -> AppResult<()> {
        self.get(template.id).await?;

        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin savepoint: {}", e)))?;
        let previous = delete_mappings(&mut *tx, template.id).await?;
        sqlx::query("DELETE FROM func_key_template WHERE id = ?")
            .bind(template.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_database_error(e, "FuncKeyTemplate"))?;
        delete_unused_func_keys(&mut *tx, previous).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit func key template: {}", e)))?;

        info!(id = template.id, "func key template deleted");
        Ok(())
    }

    async fn load_mappings(&mut self, template_id: i64) -> AppResult<BTreeMap<u32, FuncKeyMapping>> {
        let rows = sqlx::query(
            "SELECT func_key_id, label, position, blf FROM func_key_mapping WHERE template_id = ? ORDER BY position",
        )
        .bind(template_id)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to load func key mappings: {}", e)))?;

        let mut keys = BTreeMap::new();
        for row in rows {
            let position: i64 = row.try_get("position")?;
            let position = u32::try_from(position)
                .map_err(|_| AppError::Internal(format!("invalid func key position {}", position)))?;
            let func_key = FuncKeyPersistor::new(self.conn)
                .get(row.try_get("func_key_id")?)
                .await?;

            keys.insert(
                position,
                FuncKeyMapping {
                    label: row.try_get("label")?,
                    blf: row.try_get("blf")?,
                    destination: func_key.destination().clone(),
                },
            );
        }
        Ok(keys)
    }
}

/// Positions start at 1
fn check_positions(keys: &BTreeMap<u32, FuncKeyMapping>) -> AppResult<()> {
    if keys.contains_key(&0) {
        return Err(AppError::input("func key position must be greater than 0"));
    }
    Ok(())
}

async fn insert_mappings(
    conn: &mut SqliteConnection,
    template_id: i64,
    keys: &BTreeMap<u32, FuncKeyMapping>,
) -> AppResult<()> {
    for (position, mapping) in keys {
        let mut func_keys = FuncKeyPersistor::new(&mut *conn);
        let func_key = match func_keys.find_by_destination(&mapping.destination).await? {
            Some(func_key) => func_key,
            None => func_keys.create(&mapping.destination).await?,
        };

        sqlx::query(
            "INSERT INTO func_key_mapping (template_id, func_key_id, destination_type_id, label, position, blf) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(template_id)
        .bind(func_key.id)
        .bind(func_key.destination_type_id())
        .bind(&mapping.label)
        .bind(*position)
        .bind(mapping.blf)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_database_error(e, "FuncKeyMapping"))?;
    }
    Ok(())
}

/// Remove the mappings of a template, returning the func keys they used
async fn delete_mappings(conn: &mut SqliteConnection, template_id: i64) -> AppResult<Vec<i64>> {
    let func_key_ids: Vec<i64> = sqlx::query_scalar(
        "DELETE FROM func_key_mapping WHERE template_id = ? RETURNING func_key_id",
    )
    .bind(template_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::Database(format!("Failed to delete func key mappings: {}", e)))?;
    Ok(func_key_ids)
}

/// User keys are shared with the user itself and always stay
async fn delete_unused_func_keys(conn: &mut SqliteConnection, mut func_key_ids: Vec<i64>) -> AppResult<()> {
    func_key_ids.sort_unstable();
    func_key_ids.dedup();

    for func_key_id in func_key_ids {
        let used: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM func_key_mapping WHERE func_key_id = ?")
            .bind(func_key_id)
            .fetch_one(&mut *conn)
            .await?;
        if used > 0 {
            continue;
        }

        let mut func_keys = FuncKeyPersistor::new(&mut *conn);
        let Some(func_key) = func_keys.find(func_key_id).await? else {
            continue;
        };
        if func_key.destination_type() != DestinationType::User {
            func_keys.delete(func_key_id).await?;
            debug!(func_key_id, "unused func key removed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::database::tenant::TenantPersistor;
    use crate::backend::database::test_support::memory_backend;
    use crate::models::func_key::{CustomDestination, GroupDestination, UserDestination};
    use crate::models::{Destination, Tenant};

    fn custom(exten: &str) -> Destination {
        Destination::Custom(CustomDestination {
            exten: exten.to_string(),
        })
    }

    async fn tenant(conn: &mut SqliteConnection) -> String {
        let tenant = Tenant::new(None);
        TenantPersistor::new(conn).create(&tenant).await.unwrap();
        tenant.uuid
    }

    #[tokio::test]
    async fn test_create_and_get_template() {
        let backend = memory_backend().await;
        let mut conn = backend.pool().acquire().await.unwrap();
        let tenant_uuid = tenant(&mut conn).await;
        let mut persistor = FuncKeyTemplatePersistor::new(&mut conn, None);

        let mut labelled = FuncKeyMapping::new(custom("*98"));
        labelled.label = Some("voicemail".to_string());
        labelled.blf = false;
        let template = FuncKeyTemplate::new(&tenant_uuid, Some("reception"))
            .with_key(1, labelled.clone())
            .with_key(3, FuncKeyMapping::new(Destination::User(UserDestination { user_id: 42 })));

        let created = persistor.create(&template).await.unwrap();
        assert!(created.id > 0);
        assert_eq!(created.name.as_deref(), Some("reception"));
        assert_eq!(created.keys.len(), 2);
        assert_eq!(created.keys[&1], labelled);
        assert!(created.keys[&3].blf);
    }

    #[tokio::test]
    async fn test_position_zero_is_rejected() {
        let backend = memory_backend().await;
        let mut conn = backend.pool().acquire().await.unwrap();
        let tenant_uuid = tenant(&mut conn).await;

        let template = FuncKeyTemplate::new(&tenant_uuid, None).with_key(0, FuncKeyMapping::new(custom("1")));
        let err = FuncKeyTemplatePersistor::new(&mut conn, None)
            .create(&template)
            .await
            .unwrap_err();
        assert!(err.is_input_error());

        let templates: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM func_key_template")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(templates, 0);
    }

    #[tokio::test]
    async fn test_failed_mapping_leaves_nothing_behind() {
        let backend = memory_backend().await;
        let mut conn = backend.pool().acquire().await.unwrap();
        let tenant_uuid = tenant(&mut conn).await;

        let template = FuncKeyTemplate::new(&tenant_uuid, Some("broken"))
            .with_key(1, FuncKeyMapping::new(custom("*10")))
            .with_key(
                2,
                FuncKeyMapping::new(Destination::Group(GroupDestination { group_id: 404 })),
            );
        let err = FuncKeyTemplatePersistor::new(&mut conn, None)
            .create(&template)
            .await
            .unwrap_err();
        assert!(err.is_input_error());

        for table in ["func_key_template", "func_key_mapping", "func_key"] {
            let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&mut *conn)
                .await
                .unwrap();
            assert_eq!(rows, 0, "{} should be empty", table);
        }
    }

    #[tokio::test]
    async fn test_edit_replaces_mappings() {
        let backend = memory_backend().await;
        let mut conn = backend.pool().acquire().await.unwrap();
        let tenant_uuid = tenant(&mut conn).await;
        let mut persistor = FuncKeyTemplatePersistor::new(&mut conn, None);

        let template = FuncKeyTemplate::new(&tenant_uuid, Some("sales"))
            .with_key(1, FuncKeyMapping::new(custom("1234")))
            .with_key(2, FuncKeyMapping::new(custom("5678")));
        let mut template = persistor.create(&template).await.unwrap();

        template.keys.remove(&2);
        template.keys.insert(4, FuncKeyMapping::new(custom("9999")));
        template.private = true;
        persistor.edit(&template).await.unwrap();

        let loaded = persistor.get(template.id).await.unwrap();
        assert!(loaded.private);
        assert_eq!(loaded.keys.keys().copied().collect::<Vec<_>>(), vec![1, 4]);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM func_key")
            .fetch_one(&mut *persistor.conn)
            .await
            .unwrap();
        assert_eq!(remaining, 2);
    }

    #[tokio::test]
    async fn test_delete_keeps_user_func_keys() {
        let backend = memory_backend().await;
        let mut conn = backend.pool().acquire().await.unwrap();
        let tenant_uuid = tenant(&mut conn).await;
        let mut persistor = FuncKeyTemplatePersistor::new(&mut conn, None);

        let template = FuncKeyTemplate::new(&tenant_uuid, None)
            .with_key(1, FuncKeyMapping::new(custom("1234")))
            .with_key(2, FuncKeyMapping::new(Destination::User(UserDestination { user_id: 7 })));
        let template = persistor.create(&template).await.unwrap();
        persistor.delete(&template).await.unwrap();
        assert!(persistor.get(template.id).await.unwrap_err().is_not_found());

        let mut func_keys = FuncKeyPersistor::new(&mut *persistor.conn);
        let users = func_keys
            .find_all_by_destination_type(DestinationType::User)
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        assert!(func_keys
            .find_all_by_destination_type(DestinationType::Custom)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_search_is_tenant_scoped() {
        let backend = memory_backend().await;
        let mut conn = backend.pool().acquire().await.unwrap();
        let tenant_uuid = tenant(&mut conn).await;

        FuncKeyTemplatePersistor::new(&mut conn, None)
            .create(&FuncKeyTemplate::new(&tenant_uuid, Some("lobby")))
            .await
            .unwrap();

        let mut own = FuncKeyTemplatePersistor::new(&mut conn, Some(vec![tenant_uuid]));
        assert_eq!(own.search(&SearchParameters::term("lob")).await.unwrap().total, 1);

        let mut other = FuncKeyTemplatePersistor::new(&mut conn, Some(vec!["other".to_string()]));
        assert_eq!(other.search(&SearchParameters::default()).await.unwrap().total, 0);
    }
}
