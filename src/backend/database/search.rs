//! Criteria and search query construction over a declarative column map
//!
//! Every searchable resource describes its table with a [`SearchConfig`]:
//! public column names mapped to SQL expressions, the columns a free-text
//! term is matched against and the default sort column. Lookups first
//! resolve matching ids, then load each entity through its persistor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};

/// Equality criteria keyed by public column name
pub type Criteria = BTreeMap<String, Value>;

pub fn criteria<'a, I>(pairs: I) -> Criteria
where
    I: IntoIterator<Item = (&'a str, Value)>,
{
    pairs
        .into_iter()
        .map(|(column, value)| (column.to_string(), value))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn parse(direction: &str) -> AppResult<Self> {
        match direction.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Ascending),
            "desc" => Ok(SortOrder::Descending),
            other => Err(AppError::input(format!(
                "direction must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub table: &'static str,
    /// `(public name, SQL expression)` pairs accepted in criteria and sorting
    pub columns: &'static [(&'static str, &'static str)],
    /// Public names matched by the free-text term
    pub search: &'static [&'static str],
    pub default_sort: &'static str,
    pub tenant_column: Option<&'static str>,
}

impl SearchConfig {
    pub fn column(&self, name: &str) -> AppResult<&'static str> {
        self.columns
            .iter()
            .find(|(public, _)| *public == name)
            .map(|(_, sql)| *sql)
            .ok_or_else(|| {
                AppError::input(format!("{}: unknown column '{}'", self.table, name))
            })
    }

    fn validate_criteria(&self, criteria: &Criteria) -> AppResult<()> {
        for (column, value) in criteria {
            self.column(column)?;
            if matches!(value, Value::Array(_) | Value::Object(_)) {
                return Err(AppError::input(format!(
                    "criteria '{}' must be a scalar value",
                    column
                )));
            }
        }
        Ok(())
    }

    fn push_conditions<'a>(
        &self,
        query: &mut QueryBuilder<'a, Sqlite>,
        criteria: &Criteria,
        term: Option<&str>,
        tenant_uuids: Option<&[String]>,
    ) -> AppResult<()> {
        query.push(" FROM ").push(self.table).push(" WHERE 1 = 1");

        if let Some(column) = self.tenant_column {
            push_tenant_filter(query, column, tenant_uuids);
        }

        for (name, value) in criteria {
            let column = self.column(name)?;
            query.push(" AND ").push(column);
            push_equals(query, value);
        }

        if let Some(term) = term.filter(|term| !term.is_empty()) {
            let pattern = format!("%{}%", term.to_lowercase());
            query.push(" AND (");
            for (i, name) in self.search.iter().enumerate() {
                if i > 0 {
                    query.push(" OR ");
                }
                query
                    .push("LOWER(CAST(")
                    .push(self.column(name)?)
                    .push(" AS TEXT)) LIKE ")
                    .push_bind(pattern.clone());
            }
            query.push(")");
        }

        Ok(())
    }

    /// Ids of every row matching the criteria, lowest first
    pub async fn find_ids(
        &self,
        conn: &mut SqliteConnection,
        criteria: &Criteria,
        tenant_uuids: Option<&[String]>,
    ) -> AppResult<Vec<i64>> {
        self.validate_criteria(criteria)?;

        let mut query = QueryBuilder::<Sqlite>::new("SELECT id");
        self.push_conditions(&mut query, criteria, None, tenant_uuids)?;
        query.push(" ORDER BY id");

        let ids = query
            .build_query_scalar::<i64>()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to query {}: {}", self.table, e)))?;
        Ok(ids)
    }

    pub async fn find_id(
        &self,
        conn: &mut SqliteConnection,
        criteria: &Criteria,
        tenant_uuids: Option<&[String]>,
    ) -> AppResult<Option<i64>> {
        Ok(self
            .find_ids(conn, criteria, tenant_uuids)
            .await?
            .into_iter()
            .next())
    }

    /// Total match count and the ids of the requested page
    pub async fn search_ids(
        &self,
        conn: &mut SqliteConnection,
        parameters: &SearchParameters,
        tenant_uuids: Option<&[String]>,
    ) -> AppResult<(i64, Vec<i64>)> {
        self.validate_criteria(&parameters.filters)?;
        let order_column = self.column(parameters.order.as_deref().unwrap_or(self.default_sort))?;
        let direction = match parameters.direction.as_deref() {
            Some(direction) => SortOrder::parse(direction)?,
            None => SortOrder::Ascending,
        };
        if parameters.limit.map_or(false, |limit| limit < 0) {
            return Err(AppError::input("limit must be a positive number"));
        }
        if parameters.offset.map_or(false, |offset| offset < 0) {
            return Err(AppError::input("offset must be a positive number"));
        }
        let term = parameters.search.as_deref();

        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
        self.push_conditions(&mut count_query, &parameters.filters, term, tenant_uuids)?;
        let total = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count {}: {}", self.table, e)))?;

        let mut query = QueryBuilder::<Sqlite>::new("SELECT id");
        self.push_conditions(&mut query, &parameters.filters, term, tenant_uuids)?;
        query
            .push(" ORDER BY ")
            .push(order_column)
            .push(" ")
            .push(direction.as_sql())
            .push(", id");
        query
            .push(" LIMIT ")
            .push_bind(parameters.limit.unwrap_or(-1))
            .push(" OFFSET ")
            .push_bind(parameters.offset.unwrap_or(0));

        let ids = query
            .build_query_scalar::<i64>()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to search {}: {}", self.table, e)))?;

        Ok((total, ids))
    }
}

/// `None` is unrestricted, an empty list matches nothing
pub(crate) fn push_tenant_filter<'a>(
    query: &mut QueryBuilder<'a, Sqlite>,
    column: &str,
    tenant_uuids: Option<&[String]>,
) {
    match tenant_uuids {
        None => {}
        Some([]) => {
            query.push(" AND 1 = 0");
        }
        Some(uuids) => {
            query.push(" AND ").push(column).push(" IN (");
            {
                let mut separated = query.separated(", ");
                for uuid in uuids {
                    separated.push_bind(uuid.clone());
                }
            }
            query.push(")");
        }
    }
}

fn push_equals<'a>(query: &mut QueryBuilder<'a, Sqlite>, value: &Value) {
    match value {
        Value::Null => {
            query.push(" IS NULL");
        }
        Value::Bool(b) => {
            query.push(" = ").push_bind(*b);
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) => {
                query.push(" = ").push_bind(i);
            }
            None => {
                query.push(" = ").push_bind(n.as_f64().unwrap_or_default());
            }
        },
        Value::String(s) => {
            query.push(" = ").push_bind(s.clone());
        }
        // never matches, validate_criteria rejects these first
        Value::Array(_) | Value::Object(_) => {
            query.push(" IS NULL AND 1 = 0");
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParameters {
    pub search: Option<String>,
    pub order: Option<String>,
    pub direction: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub filters: Criteria,
}

impl SearchParameters {
    pub fn term(search: &str) -> Self {
        Self {
            search: Some(search.to_string()),
            ..Default::default()
        }
    }

    pub fn with_order(mut self, order: &str, direction: &str) -> Self {
        self.order = Some(order.to_string());
        self.direction = Some(direction.to_string());
        self
    }

    pub fn with_page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    pub fn with_filter(mut self, column: &str, value: Value) -> Self {
        self.filters.insert(column.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult<T> {
    pub total: i64,
    pub items: Vec<T>,
}
