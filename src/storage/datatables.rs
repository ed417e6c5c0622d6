//! DataTables 1.10 server-side processing.
//!
//! Feeds declare a whitelist of columns (exposed name, SQL expression,
//! searchable/orderable flags); the engine parses the flattened request
//! parameters (`draw`, `start`, `length`, `search[value]`,
//! `order[i][column]`, `order[i][dir]`), builds the filtered/ordered/paged
//! query plus the two counts, and emits the standard response envelope.
//!
//! Unknown column references and malformed indices are ignored rather than
//! rejected; `length = -1` disables paging.

use crate::db::DbPool;
use crate::error::WebError;
use crate::sql::bind_marker;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::Row;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    fn as_sql(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// Parsed request parameters.
#[derive(Debug, Clone)]
pub struct DataTablesParams {
    pub draw: String,
    pub start: i64,
    pub length: i64,
    pub search: String,
    pub order: Vec<(usize, SortDir)>,
}

impl Default for DataTablesParams {
    fn default() -> Self {
        Self {
            draw: "0".to_string(),
            start: 0,
            length: -1,
            search: String::new(),
            order: Vec::new(),
        }
    }
}

impl DataTablesParams {
    /// Parse from flattened key/value pairs (query string or form body).
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut params = Self::default();
        // order clauses arrive as order[i][column] / order[i][dir]
        let mut order: BTreeMap<usize, (Option<usize>, SortDir)> = BTreeMap::new();

        for (key, value) in pairs {
            match key.as_str() {
                "draw" => params.draw = value.clone(),
                "start" => params.start = value.parse().unwrap_or(0).max(0),
                "length" => params.length = value.parse().unwrap_or(-1),
                "search[value]" => params.search = value.clone(),
                _ => {
                    if let Some(rest) = key.strip_prefix("order[")
                        && let Some((index, field)) = rest.split_once("][")
                        && let Ok(index) = index.parse::<usize>()
                    {
                        let entry = order.entry(index).or_insert((None, SortDir::Asc));
                        match field {
                            "column]" => entry.0 = value.parse().ok(),
                            "dir]" => {
                                entry.1 = if value.eq_ignore_ascii_case("desc") {
                                    SortDir::Desc
                                } else {
                                    SortDir::Asc
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        params.order = order
            .into_values()
            .filter_map(|(column, dir)| column.map(|c| (c, dir)))
            .collect();
        params
    }
}

/// How to decode the selected expression from a row.
#[derive(Debug, Clone, Copy)]
pub enum ColumnKind {
    Integer,
    Text,
}

/// One whitelisted feed column.
pub struct Column {
    /// Exposed name; also the key in each data row.
    pub data: &'static str,
    /// SQL expression the name maps to.
    pub expr: &'static str,
    /// Expression used in ORDER BY when it differs from `expr`
    /// (e.g. ranking severities instead of sorting them alphabetically).
    pub order_expr: Option<&'static str>,
    pub kind: ColumnKind,
    pub searchable: bool,
    pub orderable: bool,
}

impl Column {
    pub const fn new(data: &'static str, expr: &'static str, kind: ColumnKind) -> Self {
        Self {
            data,
            expr,
            order_expr: None,
            kind,
            searchable: true,
            orderable: true,
        }
    }

    /// Exclude this column from global search (counts and other synthetic
    /// columns).
    pub const fn not_searchable(mut self) -> Self {
        self.searchable = false;
        self
    }

    pub const fn order_by(mut self, expr: &'static str) -> Self {
        self.order_expr = Some(expr);
        self
    }
}

/// A server-side feed: FROM clause plus column whitelist.
pub struct DataTablesFeed {
    /// Table or join clause following `FROM`.
    pub from: &'static str,
    pub columns: &'static [Column],
}

/// Standard response envelope.
#[derive(Debug, Serialize)]
pub struct DataTablesResponse {
    pub draw: String,
    #[serde(rename = "recordsTotal")]
    pub records_total: i64,
    #[serde(rename = "recordsFiltered")]
    pub records_filtered: i64,
    pub data: Vec<Map<String, Value>>,
}

impl DataTablesFeed {
    /// WHERE clause for the global search, one LIKE per searchable column.
    /// Returns the clause and the bind values.
    fn search_clause(&self, params: &DataTablesParams) -> (String, Vec<String>) {
        if params.search.is_empty() {
            return (String::new(), Vec::new());
        }

        let needle = format!("%{}%", params.search.to_lowercase());
        let mut terms = Vec::new();
        let mut binds = Vec::new();

        for column in self.columns.iter().filter(|c| c.searchable) {
            terms.push(format!(
                "lower(CAST({} AS TEXT)) LIKE {}",
                column.expr,
                bind_marker(binds.len() + 1)
            ));
            binds.push(needle.clone());
        }

        if terms.is_empty() {
            (String::new(), Vec::new())
        } else {
            (format!(" WHERE ({})", terms.join(" OR ")), binds)
        }
    }

    /// ORDER BY clause from the requested column indices; unknown or
    /// non-orderable columns are dropped. Falls back to the first column so
    /// paging stays deterministic.
    fn order_clause(&self, params: &DataTablesParams) -> String {
        let mut terms: Vec<String> = params
            .order
            .iter()
            .filter_map(|(index, dir)| {
                self.columns
                    .get(*index)
                    .filter(|c| c.orderable)
                    .map(|c| format!("{} {}", c.order_expr.unwrap_or(c.expr), dir.as_sql()))
            })
            .collect();

        if terms.is_empty()
            && let Some(first) = self.columns.first()
        {
            terms.push(format!("{} ASC", first.expr));
        }

        if terms.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", terms.join(", "))
        }
    }

    /// Assemble the data query. Exposed for unit tests.
    fn select_sql(&self, params: &DataTablesParams) -> (String, Vec<String>) {
        let select_list: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} AS {}", c.expr, c.data))
            .collect();

        let (where_clause, binds) = self.search_clause(params);
        let mut sql = format!(
            "SELECT {} FROM {}{}{}",
            select_list.join(", "),
            self.from,
            where_clause,
            self.order_clause(params)
        );

        if params.length >= 0 {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", params.length, params.start));
        }

        (sql, binds)
    }

    /// Run the feed and build the response envelope.
    pub async fn fetch(
        &self,
        pool: &DbPool,
        params: &DataTablesParams,
    ) -> Result<DataTablesResponse, WebError> {
        let total_sql = format!("SELECT COUNT(*) FROM {}", self.from);
        let records_total: i64 = sqlx::query_scalar(&total_sql).fetch_one(pool).await?;

        let (where_clause, count_binds) = self.search_clause(params);
        let records_filtered = if where_clause.is_empty() {
            records_total
        } else {
            let filtered_sql = format!("SELECT COUNT(*) FROM {}{}", self.from, where_clause);
            let mut query = sqlx::query_scalar(&filtered_sql);
            for bind in &count_binds {
                query = query.bind(bind);
            }
            query.fetch_one(pool).await?
        };

        let (data_sql, binds) = self.select_sql(params);
        let mut query = sqlx::query(&data_sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(pool).await?;

        let mut data = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = Map::new();
            for column in self.columns {
                let value = match column.kind {
                    ColumnKind::Integer => row
                        .try_get::<Option<i64>, _>(column.data)
                        .map(|v| v.map(Value::from).unwrap_or(Value::Null)),
                    ColumnKind::Text => row
                        .try_get::<Option<String>, _>(column.data)
                        .map(|v| v.map(Value::from).unwrap_or(Value::Null)),
                };
                record.insert(column.data.to_string(), value.map_err(WebError::Database)?);
            }
            data.push(record);
        }

        Ok(DataTablesResponse {
            draw: params.draw.clone(),
            records_total,
            records_filtered,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const FEED: DataTablesFeed = DataTablesFeed {
        from: "hosts",
        columns: &[
            Column::new("id", "id", ColumnKind::Integer),
            Column::new("address", "address", ColumnKind::Text),
            Column::new(
                "nr_svcs",
                "(SELECT COUNT(*) FROM services WHERE services.host_id = hosts.id)",
                ColumnKind::Integer,
            )
            .not_searchable(),
        ],
    };

    #[test]
    fn test_parse_request_params() {
        let params = DataTablesParams::from_pairs(&pairs(&[
            ("draw", "3"),
            ("start", "20"),
            ("length", "10"),
            ("search[value]", "example"),
            ("order[0][column]", "1"),
            ("order[0][dir]", "desc"),
            ("order[1][column]", "0"),
            ("order[1][dir]", "asc"),
        ]));

        assert_eq!(params.draw, "3");
        assert_eq!(params.start, 20);
        assert_eq!(params.length, 10);
        assert_eq!(params.search, "example");
        assert_eq!(
            params.order,
            vec![(1, SortDir::Desc), (0, SortDir::Asc)]
        );
    }

    #[test]
    fn test_parse_defaults_and_garbage() {
        let params = DataTablesParams::from_pairs(&pairs(&[
            ("start", "-5"),
            ("length", "bogus"),
            ("order[zz][column]", "1"),
            ("order[0][column]", "notanumber"),
        ]));

        assert_eq!(params.start, 0);
        assert_eq!(params.length, -1);
        assert!(params.order.is_empty());
    }

    #[test]
    fn test_select_sql_without_search_has_no_where() {
        let (sql, binds) = FEED.select_sql(&DataTablesParams::default());
        assert!(!sql.contains("WHERE"));
        assert!(sql.contains("ORDER BY id ASC")); // deterministic fallback
        assert!(!sql.contains("LIMIT"));
        assert!(binds.is_empty());
    }

    #[test]
    fn test_select_sql_search_skips_unsearchable_columns() {
        let params = DataTablesParams {
            search: "NeedLe".to_string(),
            ..Default::default()
        };
        let (sql, binds) = FEED.select_sql(&params);

        assert!(sql.contains("lower(CAST(id AS TEXT)) LIKE"));
        assert!(sql.contains("lower(CAST(address AS TEXT)) LIKE"));
        // the count subselect appears in the select list but not the search
        assert!(!sql.contains("CAST((SELECT"));
        assert_eq!(binds, vec!["%needle%".to_string(), "%needle%".to_string()]);
    }

    #[test]
    fn test_select_sql_order_whitelist() {
        let params = DataTablesParams {
            order: vec![(1, SortDir::Desc), (99, SortDir::Asc)],
            ..Default::default()
        };
        let (sql, _) = FEED.select_sql(&params);
        assert!(sql.contains("ORDER BY address DESC"));
        assert!(!sql.contains("99"));
    }

    #[test]
    fn test_select_sql_paging() {
        let params = DataTablesParams {
            start: 40,
            length: 20,
            ..Default::default()
        };
        let (sql, _) = FEED.select_sql(&params);
        assert!(sql.ends_with("LIMIT 20 OFFSET 40"));
    }

    #[cfg(feature = "sqlite")]
    mod live {
        use super::*;
        use sqlx::sqlite::SqlitePoolOptions;

        const NAMES: DataTablesFeed = DataTablesFeed {
            from: "t",
            columns: &[
                Column::new("id", "id", ColumnKind::Integer),
                Column::new("name", "name", ColumnKind::Text),
            ],
        };

        async fn seeded_pool() -> crate::db::DbPool {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .unwrap();
            sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
                .execute(&pool)
                .await
                .unwrap();
            for (id, name) in [(1, "alpha"), (2, "beta"), (3, "alphabet"), (4, "gamma")] {
                sqlx::query("INSERT INTO t (id, name) VALUES (?, ?)")
                    .bind(id)
                    .bind(name)
                    .execute(&pool)
                    .await
                    .unwrap();
            }
            pool
        }

        #[tokio::test]
        async fn test_fetch_counts_and_filtering() {
            let pool = seeded_pool().await;
            let params = DataTablesParams {
                draw: "7".to_string(),
                search: "ALPHA".to_string(),
                ..Default::default()
            };

            let response = NAMES.fetch(&pool, &params).await.unwrap();
            assert_eq!(response.draw, "7");
            assert_eq!(response.records_total, 4);
            assert_eq!(response.records_filtered, 2);
            let names: Vec<&str> = response
                .data
                .iter()
                .map(|r| r.get("name").unwrap().as_str().unwrap())
                .collect();
            assert_eq!(names, vec!["alpha", "alphabet"]);
        }

        #[tokio::test]
        async fn test_fetch_paging_window() {
            let pool = seeded_pool().await;
            let params = DataTablesParams {
                start: 1,
                length: 2,
                ..Default::default()
            };

            let response = NAMES.fetch(&pool, &params).await.unwrap();
            assert_eq!(response.records_total, 4);
            assert_eq!(response.records_filtered, 4);
            assert_eq!(response.data.len(), 2);
            assert_eq!(response.data[0].get("id").unwrap(), &Value::from(2));
        }
    }
}
