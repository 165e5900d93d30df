//! Ordered trunks of an outcall
//!
//! The position of a trunk in the list handed to
//! [`OutcallTrunkPersistor::associate_all_trunks`] becomes its priority,
//! starting at 0. Deleting an outcall or a trunk drops its rows through the
//! foreign keys.

use sqlx::{Connection, SqliteConnection};
use tracing::{debug, info};

use super::owner::load_owner;
use super::search::{Criteria, SearchConfig};
use super::trunk::load_trunk;
use crate::error::{map_database_error, AppError, AppResult};
use crate::models::{Outcall, OutcallTrunk, Trunk};

pub const OUTCALL_TRUNK_SEARCH: SearchConfig = SearchConfig {
    table: "outcall_trunk",
    columns: &[
        ("outcall_id", "outcall_id"),
        ("trunk_id", "trunk_id"),
        ("priority", "priority"),
    ],
    search: &[],
    default_sort: "priority",
    tenant_column: None,
};

pub struct OutcallTrunkPersistor<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> OutcallTrunkPersistor<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    async fn load(&mut self, row_id: i64) -> AppResult<OutcallTrunk> {
        sqlx::query_as::<_, OutcallTrunk>(
            "SELECT outcall_id, trunk_id, priority FROM outcall_trunk WHERE id = ?",
        )
        .bind(row_id)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to load outcall trunk: {}", e)))
    }

    pub async fn find_by(&mut self, criteria: &Criteria) -> AppResult<Option<OutcallTrunk>> {
        match OUTCALL_TRUNK_SEARCH.find_id(self.conn, criteria, None).await? {
            Some(row_id) => Ok(Some(self.load(row_id).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_by(&mut self, criteria: &Criteria) -> AppResult<OutcallTrunk> {
        self.find_by(criteria)
            .await?
            .ok_or_else(|| AppError::not_found("OutcallTrunk", criteria.iter()))
    }

    pub async fn find_all_by(&mut self, criteria: &Criteria) -> AppResult<Vec<OutcallTrunk>> {
        let row_ids = OUTCALL_TRUNK_SEARCH.find_ids(self.conn, criteria, None).await?;
        let mut rows = Vec::with_capacity(row_ids.len());
        for row_id in row_ids {
            rows.push(self.load(row_id).await?);
        }
        rows.sort_by_key(|row| (row.outcall_id, row.priority));
        Ok(rows)
    }

    /// Trunks of an outcall, highest priority first
    pub async fn trunks(&mut self, outcall: &Outcall) -> AppResult<Vec<Trunk>> {
        let trunk_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT trunk_id FROM outcall_trunk WHERE outcall_id = ? ORDER BY priority, id",
        )
        .bind(outcall.id)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to load outcall trunks: {}", e)))?;

        let mut trunks = Vec::with_capacity(trunk_ids.len());
        for trunk_id in trunk_ids {
            let trunk = load_trunk(self.conn, trunk_id)
                .await?
                .ok_or_else(|| AppError::Internal(format!("outcall trunk {} is gone", trunk_id)))?;
            trunks.push(trunk);
        }
        Ok(trunks)
    }

    /// Replace the trunks of an outcall, keeping the given order
    pub async fn associate_all_trunks(&mut self, outcall: &Outcall, trunks: &[Trunk]) -> AppResult<()> {
        load_owner::<Outcall>(self.conn, outcall.id)
            .await?
            .ok_or_else(|| AppError::not_found("Outcall", [("id", outcall.id)]))?;
        for (i, trunk) in trunks.iter().enumerate() {
            if trunks[..i].iter().any(|previous| previous.id == trunk.id) {
                return Err(AppError::input(format!(
                    "Trunk {} is listed twice for outcall {}",
                    trunk.id, outcall.id
                )));
            }
        }

        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin savepoint: {}", e)))?;
        sqlx::query("DELETE FROM outcall_trunk WHERE outcall_id = ?")
            .bind(outcall.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_database_error(e, "OutcallTrunk"))?;

        for (priority, trunk) in trunks.iter().enumerate() {
            if load_trunk(&mut *tx, trunk.id).await?.is_none() {
                return Err(AppError::not_found("Trunk", [("id", trunk.id)]));
            }
            sqlx::query("INSERT INTO outcall_trunk (outcall_id, trunk_id, priority) VALUES (?, ?, ?)")
                .bind(outcall.id)
                .bind(trunk.id)
                .bind(priority as i64)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_database_error(e, "OutcallTrunk"))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit outcall trunks: {}", e)))?;
        info!(outcall_id = outcall.id, trunks = trunks.len(), "outcall trunks replaced");
        Ok(())
    }

    pub async fn dissociate_all_by_outcall(&mut self, outcall: &Outcall) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM outcall_trunk WHERE outcall_id = ?")
            .bind(outcall.id)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| map_database_error(e, "OutcallTrunk"))?;
        debug!(outcall_id = outcall.id, removed = result.rows_affected(), "outcall trunks dissociated");
        Ok(())
    }
}
