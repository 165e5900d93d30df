use sqlx::SqliteConnection;
use tracing::info;

use crate::error::{map_database_error, AppError, AppResult};
use crate::models::Tenant;

pub struct TenantPersistor<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> TenantPersistor<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&mut self, tenant: &Tenant) -> AppResult<Tenant> {
        sqlx::query("INSERT INTO tenant (uuid, name) VALUES (?, ?)")
            .bind(&tenant.uuid)
            .bind(&tenant.name)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| map_database_error(e, "Tenant"))?;

        info!(uuid = %tenant.uuid, "tenant created");
        Ok(tenant.clone())
    }

    pub async fn find(&mut self, uuid: &str) -> AppResult<Option<Tenant>> {
        sqlx::query_as::<_, Tenant>("SELECT uuid, name FROM tenant WHERE uuid = ?")
            .bind(uuid)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to find tenant: {}", e)))
    }

    pub async fn get(&mut self, uuid: &str) -> AppResult<Tenant> {
        self.find(uuid)
            .await?
            .ok_or_else(|| AppError::not_found("Tenant", [("uuid", uuid)]))
    }

    pub async fn find_all(&mut self) -> AppResult<Vec<Tenant>> {
        sqlx::query_as::<_, Tenant>("SELECT uuid, name FROM tenant ORDER BY name, uuid")
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list tenants: {}", e)))
    }

    /// Delete a tenant and, through cascades, everything it owns
    pub async fn delete(&mut self, uuid: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM tenant WHERE uuid = ?")
            .bind(uuid)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| map_database_error(e, "Tenant"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Tenant", [("uuid", uuid)]));
        }
        info!(uuid, "tenant deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::database::test_support::memory_backend;

    #[tokio::test]
    async fn test_tenant_crud() {
        let backend = memory_backend().await;
        let mut conn = backend.pool().acquire().await.unwrap();
        let mut persistor = TenantPersistor::new(&mut conn);

        let tenant = persistor.create(&Tenant::new(Some("acme"))).await.unwrap();
        assert_eq!(uuid::Uuid::parse_str(&tenant.uuid).unwrap().get_version_num(), 4);
        assert_eq!(persistor.get(&tenant.uuid).await.unwrap(), tenant);

        let duplicate = persistor.create(&tenant).await.unwrap_err();
        assert!(duplicate.is_input_error());

        persistor.delete(&tenant.uuid).await.unwrap();
        assert!(persistor.get(&tenant.uuid).await.unwrap_err().is_not_found());
        assert!(persistor.find_all().await.unwrap().is_empty());
    }
}
