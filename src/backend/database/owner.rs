//! Group, queue, conference and outcall persistence
//!
//! The four owners only differ by their table and columns, so they share
//! one persistor generic over [`OwnerRecord`].

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqliteConnection};
use std::marker::PhantomData;
use tracing::{debug, info};

use super::extension::{main_extension, release_owner};
use super::func_key::FuncKeyPersistor;
use super::search::{Criteria, SearchConfig, SearchParameters, SearchResult};
use crate::error::{map_database_error, AppError, AppResult};
use crate::models::{Conference, ExtensionOwner, Group, Outcall, Queue};

/// Storage of one owner kind
#[async_trait]
pub trait OwnerRecord:
    ExtensionOwner + for<'r> FromRow<'r, SqliteRow> + Send + Sync + Unpin
{
    const RESOURCE: &'static str;
    const SELECT: &'static str;
    const SEARCH: SearchConfig;

    fn tenant_uuid(&self) -> &str;

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error>;

    async fn update(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error>;

    /// Remove what targets the owner before its row goes away
    async fn delete_dependents(_conn: &mut SqliteConnection, _owner_id: i64) -> AppResult<()> {
        Ok(())
    }
}

pub(crate) async fn load_owner<T: OwnerRecord>(
    conn: &mut SqliteConnection,
    owner_id: i64,
) -> AppResult<Option<T>> {
    let sql = format!("{} WHERE id = ?", T::SELECT);
    sqlx::query_as::<_, T>(&sql)
        .bind(owner_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to find {}: {}", T::RESOURCE, e)))
}

/// Copy the main extension into the owner's cached fields
pub(crate) async fn fix_owner<T: OwnerRecord>(conn: &mut SqliteConnection, owner_id: i64) -> AppResult<()> {
    let Some(mut owner) = load_owner::<T>(conn, owner_id).await? else {
        debug!(resource = T::RESOURCE, owner_id, "nothing to fix, owner is gone");
        return Ok(());
    };

    let main = main_extension(conn, T::KIND, owner_id).await?;
    owner.fix_main_extension(main.as_ref());
    owner
        .update(conn)
        .await
        .map_err(|e| map_database_error(e, T::RESOURCE))?;
    debug!(resource = T::RESOURCE, owner_id, "owner fixed");
    Ok(())
}

pub struct OwnerPersistor<'c, T> {
    conn: &'c mut SqliteConnection,
    tenant_uuids: Option<Vec<String>>,
    _owner: PhantomData<T>,
}

pub type GroupPersistor<'c> = OwnerPersistor<'c, Group>;
pub type QueuePersistor<'c> = OwnerPersistor<'c, Queue>;
pub type ConferencePersistor<'c> = OwnerPersistor<'c, Conference>;
pub type OutcallPersistor<'c> = OwnerPersistor<'c, Outcall>;

impl<'c, T: OwnerRecord> OwnerPersistor<'c, T> {
    pub fn new(conn: &'c mut SqliteConnection, tenant_uuids: Option<Vec<String>>) -> Self {
        Self {
            conn,
            tenant_uuids,
            _owner: PhantomData,
        }
    }

    fn in_scope(&self, tenant_uuid: &str) -> bool {
        self.tenant_uuids
            .as_ref()
            .map_or(true, |uuids| uuids.iter().any(|uuid| uuid == tenant_uuid))
    }

    pub async fn create(&mut self, owner: &T) -> AppResult<T> {
        let id = owner
            .insert(self.conn)
            .await
            .map_err(|e| map_database_error(e, T::RESOURCE))?;
        info!(resource = T::RESOURCE, id, "owner created");
        self.get(id).await
    }

    pub async fn find(&mut self, owner_id: i64) -> AppResult<Option<T>> {
        let owner = load_owner::<T>(self.conn, owner_id).await?;
        Ok(owner.filter(|owner| self.in_scope(owner.tenant_uuid())))
    }

    pub async fn get(&mut self, owner_id: i64) -> AppResult<T> {
        self.find(owner_id)
            .await?
            .ok_or_else(|| AppError::not_found(T::RESOURCE, [("id", owner_id)]))
    }

    pub async fn find_by(&mut self, criteria: &Criteria) -> AppResult<Option<T>> {
        match T::SEARCH
            .find_id(self.conn, criteria, self.tenant_uuids.as_deref())
            .await?
        {
            Some(id) => self.find(id).await,
            None => Ok(None),
        }
    }

    pub async fn get_by(&mut self, criteria: &Criteria) -> AppResult<T> {
        self.find_by(criteria)
            .await?
            .ok_or_else(|| AppError::not_found(T::RESOURCE, criteria.iter()))
    }

    pub async fn find_all_by(&mut self, criteria: &Criteria) -> AppResult<Vec<T>> {
        let ids = T::SEARCH
            .find_ids(self.conn, criteria, self.tenant_uuids.as_deref())
            .await?;
        let mut owners = Vec::with_capacity(ids.len());
        for id in ids {
            owners.push(self.get(id).await?);
        }
        Ok(owners)
    }

    pub async fn search(&mut self, parameters: &SearchParameters) -> AppResult<SearchResult<T>> {
        let (total, ids) = T::SEARCH
            .search_ids(self.conn, parameters, self.tenant_uuids.as_deref())
            .await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.push(self.get(id).await?);
        }
        Ok(SearchResult { total, items })
    }

    /// Save the owner; fields cached from the main extension are recomputed
    pub async fn edit(&mut self, owner: &T) -> AppResult<()> {
        self.get(owner.owner_id()).await?;
        owner
            .update(self.conn)
            .await
            .map_err(|e| map_database_error(e, T::RESOURCE))?;
        fix_owner::<T>(self.conn, owner.owner_id()).await
    }

    pub async fn delete(&mut self, owner: &T) -> AppResult<()> {
        let owner_id = owner.owner_id();
        self.get(owner_id).await?;

        release_owner(self.conn, T::KIND, owner_id).await?;
        T::delete_dependents(self.conn, owner_id).await?;

        let sql = format!("DELETE FROM {} WHERE id = ?", T::SEARCH.table);
        sqlx::query(&sql)
            .bind(owner_id)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| map_database_error(e, T::RESOURCE))?;

        info!(resource = T::RESOURCE, id = owner_id, "owner deleted");
        Ok(())
    }
}

#[async_trait]
impl OwnerRecord for Group {
    const RESOURCE: &'static str = "Group";
    const SELECT: &'static str = "SELECT id, tenant_uuid, name, number, context, timeout, preprocess_subroutine, enabled FROM groupfeatures";
    const SEARCH: SearchConfig = SearchConfig {
        table: "groupfeatures",
        columns: &[
            ("id", "id"),
            ("tenant_uuid", "tenant_uuid"),
            ("name", "name"),
            ("number", "number"),
            ("context", "context"),
            ("timeout", "timeout"),
            ("enabled", "enabled"),
        ],
        search: &["name", "number", "context"],
        default_sort: "name",
        tenant_column: Some("tenant_uuid"),
    };

    fn tenant_uuid(&self) -> &str {
        &self.tenant_uuid
    }

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO groupfeatures (tenant_uuid, name, timeout, preprocess_subroutine, enabled) VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&self.tenant_uuid)
        .bind(&self.name)
        .bind(self.timeout)
        .bind(&self.preprocess_subroutine)
        .bind(self.enabled)
        .fetch_one(&mut *conn)
        .await
    }

    async fn update(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE groupfeatures SET name = ?, number = ?, context = ?, timeout = ?, preprocess_subroutine = ?, enabled = ? WHERE id = ?",
        )
        .bind(&self.name)
        .bind(&self.number)
        .bind(&self.context)
        .bind(self.timeout)
        .bind(&self.preprocess_subroutine)
        .bind(self.enabled)
        .bind(self.id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_dependents(conn: &mut SqliteConnection, owner_id: i64) -> AppResult<()> {
        FuncKeyPersistor::new(conn)
            .delete_group_destinations(owner_id)
            .await
    }
}

#[async_trait]
impl OwnerRecord for Queue {
    const RESOURCE: &'static str = "Queue";
    const SELECT: &'static str = "SELECT id, tenant_uuid, name, display_name, number, context, timeout, preprocess_subroutine, enabled FROM queuefeatures";
    const SEARCH: SearchConfig = SearchConfig {
        table: "queuefeatures",
        columns: &[
            ("id", "id"),
            ("tenant_uuid", "tenant_uuid"),
            ("name", "name"),
            ("display_name", "display_name"),
            ("number", "number"),
            ("context", "context"),
            ("timeout", "timeout"),
            ("enabled", "enabled"),
        ],
        search: &["name", "display_name", "number", "context"],
        default_sort: "name",
        tenant_column: Some("tenant_uuid"),
    };

    fn tenant_uuid(&self) -> &str {
        &self.tenant_uuid
    }

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO queuefeatures (tenant_uuid, name, display_name, timeout, preprocess_subroutine, enabled) VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&self.tenant_uuid)
        .bind(&self.name)
        .bind(&self.display_name)
        .bind(self.timeout)
        .bind(&self.preprocess_subroutine)
        .bind(self.enabled)
        .fetch_one(&mut *conn)
        .await
    }

    async fn update(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE queuefeatures SET name = ?, display_name = ?, number = ?, context = ?, timeout = ?, preprocess_subroutine = ?, enabled = ? WHERE id = ?",
        )
        .bind(&self.name)
        .bind(&self.display_name)
        .bind(&self.number)
        .bind(&self.context)
        .bind(self.timeout)
        .bind(&self.preprocess_subroutine)
        .bind(self.enabled)
        .bind(self.id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_dependents(conn: &mut SqliteConnection, owner_id: i64) -> AppResult<()> {
        FuncKeyPersistor::new(conn)
            .delete_queue_destinations(owner_id)
            .await
    }
}

#[async_trait]
impl OwnerRecord for Conference {
    const RESOURCE: &'static str = "Conference";
    const SELECT: &'static str =
        "SELECT id, tenant_uuid, name, number, context, max_users, pin FROM conference";
    const SEARCH: SearchConfig = SearchConfig {
        table: "conference",
        columns: &[
            ("id", "id"),
            ("tenant_uuid", "tenant_uuid"),
            ("name", "name"),
            ("number", "number"),
            ("context", "context"),
            ("max_users", "max_users"),
        ],
        search: &["name", "number", "context"],
        default_sort: "name",
        tenant_column: Some("tenant_uuid"),
    };

    fn tenant_uuid(&self) -> &str {
        &self.tenant_uuid
    }

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO conference (tenant_uuid, name, max_users, pin) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&self.tenant_uuid)
        .bind(&self.name)
        .bind(self.max_users)
        .bind(&self.pin)
        .fetch_one(&mut *conn)
        .await
    }

    async fn update(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE conference SET name = ?, number = ?, context = ?, max_users = ?, pin = ? WHERE id = ?",
        )
        .bind(&self.name)
        .bind(&self.number)
        .bind(&self.context)
        .bind(self.max_users)
        .bind(&self.pin)
        .bind(self.id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_dependents(conn: &mut SqliteConnection, owner_id: i64) -> AppResult<()> {
        FuncKeyPersistor::new(conn)
            .delete_conference_destinations(owner_id)
            .await
    }
}

#[async_trait]
impl OwnerRecord for Outcall {
    const RESOURCE: &'static str = "Outcall";
    const SELECT: &'static str = "SELECT id, tenant_uuid, name, context, internal_caller_id, ring_time, enabled, description FROM outcall";
    const SEARCH: SearchConfig = SearchConfig {
        table: "outcall",
        columns: &[
            ("id", "id"),
            ("tenant_uuid", "tenant_uuid"),
            ("name", "name"),
            ("context", "context"),
            ("internal_caller_id", "internal_caller_id"),
            ("ring_time", "ring_time"),
            ("enabled", "enabled"),
            ("description", "description"),
        ],
        search: &["name", "context", "description"],
        default_sort: "name",
        tenant_column: Some("tenant_uuid"),
    };

    fn tenant_uuid(&self) -> &str {
        &self.tenant_uuid
    }

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO outcall (tenant_uuid, name, internal_caller_id, ring_time, enabled, description) VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&self.tenant_uuid)
        .bind(&self.name)
        .bind(self.internal_caller_id)
        .bind(self.ring_time)
        .bind(self.enabled)
        .bind(&self.description)
        .fetch_one(&mut *conn)
        .await
    }

    async fn update(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE outcall SET name = ?, context = ?, internal_caller_id = ?, ring_time = ?, enabled = ?, description = ? WHERE id = ?",
        )
        .bind(&self.name)
        .bind(&self.context)
        .bind(self.internal_caller_id)
        .bind(self.ring_time)
        .bind(self.enabled)
        .bind(&self.description)
        .bind(self.id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::database::search::criteria;
    use crate::backend::database::tenant::TenantPersistor;
    use crate::backend::database::test_support::memory_backend;
    use crate::models::Tenant;
    use serde_json::json;

    async fn tenant(conn: &mut SqliteConnection) -> String {
        let tenant = Tenant::new(None);
        TenantPersistor::new(conn).create(&tenant).await.unwrap();
        tenant.uuid
    }

    #[tokio::test]
    async fn test_group_crud() {
        let backend = memory_backend().await;
        let mut conn = backend.pool().acquire().await.unwrap();
        let tenant_uuid = tenant(&mut conn).await;
        let mut persistor = GroupPersistor::new(&mut conn, None);

        let mut group = Group::new(&tenant_uuid, "sales");
        group.timeout = Some(30);
        let mut group = persistor.create(&group).await.unwrap();
        assert!(group.id > 0);
        assert_eq!(group.number, None);

        group.enabled = false;
        persistor.edit(&group).await.unwrap();
        let found = persistor
            .get_by(&criteria([("name", json!("sales"))]))
            .await
            .unwrap();
        assert!(!found.enabled);
        assert_eq!(found.timeout, Some(30));

        persistor.delete(&found).await.unwrap();
        let err = persistor.get(found.id).await.unwrap_err();
        assert_eq!(err.to_string(), format!("Group was not found ('id': {})", found.id));
    }

    #[tokio::test]
    async fn test_duplicate_queue_name() {
        let backend = memory_backend().await;
        let mut conn = backend.pool().acquire().await.unwrap();
        let tenant_uuid = tenant(&mut conn).await;
        let mut persistor = QueuePersistor::new(&mut conn, None);

        persistor.create(&Queue::new(&tenant_uuid, "support")).await.unwrap();
        let err = persistor
            .create(&Queue::new(&tenant_uuid, "support"))
            .await
            .unwrap_err();
        assert!(err.is_input_error());
    }

    #[tokio::test]
    async fn test_conference_search_and_scope() {
        let backend = memory_backend().await;
        let mut conn = backend.pool().acquire().await.unwrap();
        let tenant_uuid = tenant(&mut conn).await;

        {
            let mut persistor = ConferencePersistor::new(&mut conn, None);
            for name in ["board", "all hands", "standup"] {
                persistor
                    .create(&Conference::new(&tenant_uuid, Some(name)))
                    .await
                    .unwrap();
            }
        }

        let mut scoped = ConferencePersistor::new(&mut conn, Some(vec![tenant_uuid.clone()]));
        let result = scoped
            .search(&SearchParameters::term("a").with_order("name", "desc"))
            .await
            .unwrap();
        let names: Vec<_> = result.items.iter().filter_map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["standup", "board", "all hands"]);
        assert_eq!(result.items[0].max_users, 50);

        let mut other = ConferencePersistor::new(&mut conn, Some(vec!["other".to_string()]));
        assert!(other.find_all_by(&Criteria::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outcall_crud() {
        let backend = memory_backend().await;
        let mut conn = backend.pool().acquire().await.unwrap();
        let tenant_uuid = tenant(&mut conn).await;
        let mut persistor = OutcallPersistor::new(&mut conn, None);

        let mut outcall = Outcall::new(&tenant_uuid, "international");
        outcall.internal_caller_id = true;
        outcall.ring_time = Some(20);
        let outcall = persistor.create(&outcall).await.unwrap();

        let found = persistor.get(outcall.id).await.unwrap();
        assert!(found.internal_caller_id);
        assert_eq!(found.ring_time, Some(20));
        assert_eq!(found.context, None);
    }
}
