//! Persistence of func keys and their per-kind destination rows

use sqlx::sqlite::SqliteRow;
use sqlx::{Connection, QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::{debug, info};

use crate::error::{map_database_error, AppError, AppResult};
use crate::models::func_key::*;

/// Columns of each destination table besides the `(func_key_id, destination_type_id)` key
pub fn destination_columns(destination_type: DestinationType) -> &'static [(&'static str, &'static str)] {
    match destination_type {
        DestinationType::User => &[("user_id", "INTEGER NOT NULL")],
        DestinationType::Group => &[("group_id", "INTEGER NOT NULL REFERENCES groupfeatures (id)")],
        DestinationType::Queue => &[("queue_id", "INTEGER NOT NULL REFERENCES queuefeatures (id)")],
        DestinationType::Conference => {
            &[("conference_id", "INTEGER NOT NULL REFERENCES conference (id)")]
        }
        DestinationType::Service => {
            &[("extension_id", "INTEGER NOT NULL REFERENCES extensions (id)")]
        }
        DestinationType::Forward => &[
            ("extension_id", "INTEGER NOT NULL REFERENCES extensions (id)"),
            ("number", "TEXT"),
        ],
        DestinationType::ParkPosition => &[
            ("parking_lot_id", "INTEGER NOT NULL"),
            ("park_position", "TEXT NOT NULL"),
        ],
        DestinationType::Features => &[("features_id", "INTEGER NOT NULL")],
        DestinationType::Paging => &[("paging_id", "INTEGER NOT NULL")],
        DestinationType::Custom => &[("exten", "TEXT NOT NULL")],
        DestinationType::Agent => &[
            ("agent_id", "INTEGER NOT NULL"),
            ("extension_id", "INTEGER NOT NULL REFERENCES extensions (id)"),
        ],
        DestinationType::BsFilter => &[("filter_member_id", "INTEGER NOT NULL")],
        DestinationType::GroupMember => &[
            ("group_id", "INTEGER NOT NULL REFERENCES groupfeatures (id)"),
            ("extension_id", "INTEGER NOT NULL REFERENCES extensions (id)"),
        ],
    }
}

enum ColumnValue {
    Integer(i64),
    Text(Option<String>),
}

/// Column values in the order of [`destination_columns`]
fn destination_values(destination: &Destination) -> Vec<ColumnValue> {
    use ColumnValue::{Integer, Text};

    match destination {
        Destination::User(d) => vec![Integer(d.user_id)],
        Destination::Group(d) => vec![Integer(d.group_id)],
        Destination::Queue(d) => vec![Integer(d.queue_id)],
        Destination::Conference(d) => vec![Integer(d.conference_id)],
        Destination::Service(d) => vec![Integer(d.extension_id)],
        Destination::Forward(d) => vec![Integer(d.extension_id), Text(d.number.clone())],
        Destination::ParkPosition(d) => vec![
            Integer(d.parking_lot_id),
            Text(Some(d.park_position.clone())),
        ],
        Destination::Features(d) => vec![Integer(d.features_id)],
        Destination::Paging(d) => vec![Integer(d.paging_id)],
        Destination::Custom(d) => vec![Text(Some(d.exten.clone()))],
        Destination::Agent(d) => vec![Integer(d.agent_id), Integer(d.extension_id)],
        Destination::BsFilter(d) => vec![Integer(d.filter_member_id)],
        Destination::GroupMember(d) => vec![Integer(d.group_id), Integer(d.extension_id)],
    }
}

fn push_value<'a>(query: &mut QueryBuilder<'a, Sqlite>, value: ColumnValue) {
    match value {
        ColumnValue::Integer(i) => {
            query.push_bind(i);
        }
        ColumnValue::Text(s) => {
            query.push_bind(s);
        }
    }
}

fn destination_from_row(destination_type: DestinationType, row: &SqliteRow) -> Result<Destination, sqlx::Error> {
    let destination = match destination_type {
        DestinationType::User => Destination::User(UserDestination {
            user_id: row.try_get("user_id")?,
        }),
        DestinationType::Group => Destination::Group(GroupDestination {
            group_id: row.try_get("group_id")?,
        }),
        DestinationType::Queue => Destination::Queue(QueueDestination {
            queue_id: row.try_get("queue_id")?,
        }),
        DestinationType::Conference => Destination::Conference(ConferenceDestination {
            conference_id: row.try_get("conference_id")?,
        }),
        DestinationType::Service => Destination::Service(ServiceDestination {
            extension_id: row.try_get("extension_id")?,
        }),
        DestinationType::Forward => Destination::Forward(ForwardDestination {
            extension_id: row.try_get("extension_id")?,
            number: row.try_get("number")?,
        }),
        DestinationType::ParkPosition => Destination::ParkPosition(ParkPositionDestination {
            parking_lot_id: row.try_get("parking_lot_id")?,
            park_position: row.try_get("park_position")?,
        }),
        DestinationType::Features => Destination::Features(FeaturesDestination {
            features_id: row.try_get("features_id")?,
        }),
        DestinationType::Paging => Destination::Paging(PagingDestination {
            paging_id: row.try_get("paging_id")?,
        }),
        DestinationType::Custom => Destination::Custom(CustomDestination {
            exten: row.try_get("exten")?,
        }),
        DestinationType::Agent => Destination::Agent(AgentDestination {
            agent_id: row.try_get("agent_id")?,
            extension_id: row.try_get("extension_id")?,
        }),
        DestinationType::BsFilter => Destination::BsFilter(BsFilterDestination {
            filter_member_id: row.try_get("filter_member_id")?,
        }),
        DestinationType::GroupMember => Destination::GroupMember(GroupMemberDestination {
            group_id: row.try_get("group_id")?,
            extension_id: row.try_get("extension_id")?,
        }),
    };
    Ok(destination)
}

pub struct FuncKeyPersistor<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> FuncKeyPersistor<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Insert the func key row, then its destination row
    ///
    /// Both rows are written inside a savepoint; a rejected destination
    /// leaves no func key behind.
    pub async fn create(&mut self, destination: &Destination) -> AppResult<FuncKey> {
        let destination_type = destination.destination_type();
        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin savepoint: {}", e)))?;

        let func_key_id: i64 = sqlx::query_scalar(
            "INSERT INTO func_key (type_id, destination_type_id) VALUES (?, ?) RETURNING id",
        )
        .bind(SPEEDDIAL_TYPE_ID)
        .bind(destination_type.id())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_database_error(e, "FuncKey"))?;

        let columns = destination_columns(destination_type);
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "INSERT INTO {} (func_key_id, destination_type_id",
            destination_type.table()
        ));
        for (name, _) in columns {
            query.push(", ").push(*name);
        }
        query
            .push(") VALUES (")
            .push_bind(func_key_id)
            .push(", ")
            .push_bind(destination_type.id());
        for value in destination_values(destination) {
            query.push(", ");
            push_value(&mut query, value);
        }
        query.push(")");

        query
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| map_database_error(e, "FuncKeyDestination"))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit func key: {}", e)))?;

        info!(func_key_id, destination = %destination_type, "func key created");
        Ok(FuncKey::from_parts(
            func_key_id,
            SPEEDDIAL_TYPE_ID,
            destination.clone(),
        ))
    }

    pub async fn find(&mut self, func_key_id: i64) -> AppResult<Option<FuncKey>> {
        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT type_id, destination_type_id FROM func_key WHERE id = ?")
                .bind(func_key_id)
                .fetch_optional(&mut *self.conn)
                .await
                .map_err(|e| AppError::Database(format!("Failed to find func key: {}", e)))?;

        let (type_id, destination_type_id) = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let destination_type = DestinationType::from_id(destination_type_id)?;
        let sql = format!("SELECT * FROM {} WHERE func_key_id = ?", destination_type.table());
        let row = sqlx::query(&sql)
            .bind(func_key_id)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to find func key destination: {}", e)))?
            .ok_or_else(|| {
                AppError::Internal(format!("func key {} has no destination", func_key_id))
            })?;

        let destination = destination_from_row(destination_type, &row)?;
        Ok(Some(FuncKey::from_parts(func_key_id, type_id, destination)))
    }

    pub async fn get(&mut self, func_key_id: i64) -> AppResult<FuncKey> {
        self.find(func_key_id)
            .await?
            .ok_or_else(|| AppError::not_found("FuncKey", [("id", func_key_id)]))
    }

    /// The func key already pointing at an identical destination
    pub async fn find_by_destination(&mut self, destination: &Destination) -> AppResult<Option<FuncKey>> {
        let destination_type = destination.destination_type();
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT func_key_id FROM {} WHERE 1 = 1",
            destination_type.table()
        ));
        let columns = destination_columns(destination_type);
        for ((name, _), value) in columns.iter().zip(destination_values(destination)) {
            query.push(" AND ").push(*name).push(" IS ");
            push_value(&mut query, value);
        }
        query.push(" ORDER BY func_key_id");

        let ids = query
            .build_query_scalar::<i64>()
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to find func key: {}", e)))?;

        let wanted = destination.to_tuple();
        for id in ids {
            let func_key = self.get(id).await?;
            if func_key.destination().to_tuple() == wanted {
                return Ok(Some(func_key));
            }
        }
        Ok(None)
    }

    pub async fn find_all_by_destination_type(
        &mut self,
        destination_type: DestinationType,
    ) -> AppResult<Vec<FuncKey>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM func_key WHERE destination_type_id = ? ORDER BY id")
                .bind(destination_type.id())
                .fetch_all(&mut *self.conn)
                .await
                .map_err(|e| AppError::Database(format!("Failed to find func keys: {}", e)))?;

        let mut func_keys = Vec::with_capacity(ids.len());
        for id in ids {
            func_keys.push(self.get(id).await?);
        }
        Ok(func_keys)
    }

    /// Delete a func key; its destination row goes with it
    pub async fn delete(&mut self, func_key_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM func_key WHERE id = ?")
            .bind(func_key_id)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| map_database_error(e, "FuncKey"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("FuncKey", [("id", func_key_id)]));
        }
        info!(func_key_id, "func key deleted");
        Ok(())
    }

    pub async fn create_user_destination(&mut self, user_id: i64) -> AppResult<FuncKey> {
        let destination = Destination::User(UserDestination { user_id });
        match self.find_by_destination(&destination).await? {
            Some(func_key) => Ok(func_key),
            None => self.create(&destination).await,
        }
    }

    pub async fn delete_user_destination(&mut self, user_id: i64) -> AppResult<()> {
        self.delete_destinations(DestinationType::User, "user_id", user_id)
            .await
    }

    /// Delete the group keys and the group member keys of a group
    pub async fn delete_group_destinations(&mut self, group_id: i64) -> AppResult<()> {
        self.delete_destinations(DestinationType::Group, "group_id", group_id)
            .await?;
        self.delete_destinations(DestinationType::GroupMember, "group_id", group_id)
            .await
    }

    pub async fn delete_queue_destinations(&mut self, queue_id: i64) -> AppResult<()> {
        self.delete_destinations(DestinationType::Queue, "queue_id", queue_id)
            .await
    }

    pub async fn delete_conference_destinations(&mut self, conference_id: i64) -> AppResult<()> {
        self.delete_destinations(DestinationType::Conference, "conference_id", conference_id)
            .await
    }

    /// Remove the func keys targeting a deleted entity, unmapping them from templates first
    async fn delete_destinations(
        &mut self,
        destination_type: DestinationType,
        column: &str,
        target_id: i64,
    ) -> AppResult<()> {
        let sql = format!(
            "SELECT func_key_id FROM {} WHERE {} = ?",
            destination_type.table(),
            column
        );
        let func_key_ids: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(target_id)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to find func keys: {}", e)))?;

        for func_key_id in &func_key_ids {
            sqlx::query("DELETE FROM func_key_mapping WHERE func_key_id = ?")
                .bind(*func_key_id)
                .execute(&mut *self.conn)
                .await
                .map_err(|e| AppError::Database(format!("Failed to delete func key mapping: {}", e)))?;
            self.delete(*func_key_id).await?;
        }

        debug!(
            destination = %destination_type,
            target_id,
            count = func_key_ids.len(),
            "func keys of deleted target removed"
        );
        Ok(())
    }
}
