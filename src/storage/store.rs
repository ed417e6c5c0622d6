//! Database-backed storage for the inventory entities.
//!
//! CRUD plus the list-screen bulk operations (annotate, tag/untag and
//! delete across a selection). Table names in dynamic statements always
//! come from the [`Entity`] enum, never from request input.

use crate::db::{DbPool, DbRow};
use crate::sql::{self, bind_marker};
use crate::storage::models::{
    Host, Note, Service, Severity, Vuln, normalize_tags, tags_from_json, tags_to_json,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;

/// Inventory entity selector for the generic bulk operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Host,
    Service,
    Note,
    Vuln,
}

impl Entity {
    pub fn table(self) -> &'static str {
        match self {
            Entity::Host => "hosts",
            Entity::Service => "services",
            Entity::Note => "notes",
            Entity::Vuln => "vulns",
        }
    }
}

/// Add or remove a tag in a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAction {
    Set,
    Unset,
}

/// New/updated host fields.
#[derive(Debug, Clone, Default)]
pub struct HostFields {
    pub address: String,
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceFields {
    pub host_id: i64,
    pub proto: String,
    pub port: i64,
    pub state: Option<String>,
    pub name: Option<String>,
    pub info: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NoteFields {
    pub host_id: i64,
    pub service_id: Option<i64>,
    pub ntype: Option<String>,
    pub data: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VulnFields {
    pub host_id: i64,
    pub service_id: Option<i64>,
    pub name: String,
    pub xtype: Option<String>,
    pub severity: Severity,
    pub descr: Option<String>,
    pub data: Option<String>,
    pub refs: Vec<String>,
}

#[derive(Clone)]
pub struct StorageStore {
    pool: DbPool,
}

impl StorageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    // -- hosts --------------------------------------------------------------

    pub async fn create_host(&self, fields: &HostFields) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let id: i64 = sqlx::query_scalar(sql::INSERT_HOST)
            .bind(&fields.address)
            .bind(&fields.hostname)
            .bind(&fields.os)
            .bind(&fields.comment)
            .bind("[]")
            .bind(&now)
            .bind(&now)
            .fetch_one(&self.pool)
            .await
            .context("Failed to create host")?;
        Ok(id)
    }

    pub async fn get_host(&self, id: i64) -> Result<Option<Host>> {
        let row = sqlx::query(sql::SELECT_HOST)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query host")?;
        row.map(row_to_host).transpose()
    }

    pub async fn update_host(&self, id: i64, fields: &HostFields) -> Result<()> {
        sqlx::query(sql::UPDATE_HOST)
            .bind(&fields.address)
            .bind(&fields.hostname)
            .bind(&fields.os)
            .bind(&fields.comment)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update host")?;
        Ok(())
    }

    pub async fn delete_host(&self, id: i64) -> Result<()> {
        sqlx::query(sql::DELETE_HOST)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete host")?;
        Ok(())
    }

    /// All non-empty hostnames, for the DNS tree.
    pub async fn hostnames(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(sql::SELECT_ALL_HOSTNAMES)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query hostnames")?;
        Ok(rows.into_iter().map(|r| r.get("hostname")).collect())
    }

    // -- services -----------------------------------------------------------

    pub async fn create_service(&self, fields: &ServiceFields) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let id: i64 = sqlx::query_scalar(sql::INSERT_SERVICE)
            .bind(fields.host_id)
            .bind(&fields.proto)
            .bind(fields.port)
            .bind(&fields.state)
            .bind(&fields.name)
            .bind(&fields.info)
            .bind(&fields.comment)
            .bind("[]")
            .bind(&now)
            .bind(&now)
            .fetch_one(&self.pool)
            .await
            .context("Failed to create service")?;
        Ok(id)
    }

    pub async fn get_service(&self, id: i64) -> Result<Option<Service>> {
        let row = sqlx::query(sql::SELECT_SERVICE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query service")?;
        row.map(row_to_service).transpose()
    }

    pub async fn services_by_host(&self, host_id: i64) -> Result<Vec<Service>> {
        let rows = sqlx::query(sql::SELECT_SERVICES_BY_HOST)
            .bind(host_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query services")?;
        rows.into_iter().map(row_to_service).collect()
    }

    pub async fn update_service(&self, id: i64, fields: &ServiceFields) -> Result<()> {
        sqlx::query(sql::UPDATE_SERVICE)
            .bind(fields.host_id)
            .bind(&fields.proto)
            .bind(fields.port)
            .bind(&fields.state)
            .bind(&fields.name)
            .bind(&fields.info)
            .bind(&fields.comment)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update service")?;
        Ok(())
    }

    pub async fn delete_service(&self, id: i64) -> Result<()> {
        sqlx::query(sql::DELETE_SERVICE)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete service")?;
        Ok(())
    }

    // -- notes --------------------------------------------------------------

    pub async fn create_note(&self, fields: &NoteFields) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let id: i64 = sqlx::query_scalar(sql::INSERT_NOTE)
            .bind(fields.host_id)
            .bind(fields.service_id)
            .bind(&fields.ntype)
            .bind(&fields.data)
            .bind(&fields.comment)
            .bind("[]")
            .bind(&now)
            .bind(&now)
            .fetch_one(&self.pool)
            .await
            .context("Failed to create note")?;
        Ok(id)
    }

    pub async fn get_note(&self, id: i64) -> Result<Option<Note>> {
        let row = sqlx::query(sql::SELECT_NOTE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query note")?;
        row.map(row_to_note).transpose()
    }

    pub async fn notes_by_host(&self, host_id: i64) -> Result<Vec<Note>> {
        let rows = sqlx::query(sql::SELECT_NOTES_BY_HOST)
            .bind(host_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query notes")?;
        rows.into_iter().map(row_to_note).collect()
    }

    pub async fn update_note(&self, id: i64, fields: &NoteFields) -> Result<()> {
        sqlx::query(sql::UPDATE_NOTE)
            .bind(fields.host_id)
            .bind(fields.service_id)
            .bind(&fields.ntype)
            .bind(&fields.data)
            .bind(&fields.comment)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update note")?;
        Ok(())
    }

    pub async fn delete_note(&self, id: i64) -> Result<()> {
        sqlx::query(sql::DELETE_NOTE)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete note")?;
        Ok(())
    }

    // -- vulns --------------------------------------------------------------

    pub async fn create_vuln(&self, fields: &VulnFields) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let id: i64 = sqlx::query_scalar(sql::INSERT_VULN)
            .bind(fields.host_id)
            .bind(fields.service_id)
            .bind(&fields.name)
            .bind(&fields.xtype)
            .bind(fields.severity.as_db_value())
            .bind(&fields.descr)
            .bind(&fields.data)
            .bind(tags_to_json(&fields.refs))
            .bind("[]")
            .bind(None::<String>) // comment
            .bind(&now)
            .bind(&now)
            .fetch_one(&self.pool)
            .await
            .context("Failed to create vuln")?;
        Ok(id)
    }

    pub async fn get_vuln(&self, id: i64) -> Result<Option<Vuln>> {
        let row = sqlx::query(sql::SELECT_VULN)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query vuln")?;
        row.map(row_to_vuln).transpose()
    }

    pub async fn vulns_by_host(&self, host_id: i64) -> Result<Vec<Vuln>> {
        let rows = sqlx::query(sql::SELECT_VULNS_BY_HOST)
            .bind(host_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query vulns")?;
        rows.into_iter().map(row_to_vuln).collect()
    }

    pub async fn update_vuln(&self, id: i64, fields: &VulnFields) -> Result<()> {
        sqlx::query(sql::UPDATE_VULN)
            .bind(fields.host_id)
            .bind(fields.service_id)
            .bind(&fields.name)
            .bind(&fields.xtype)
            .bind(fields.severity.as_db_value())
            .bind(&fields.descr)
            .bind(&fields.data)
            .bind(tags_to_json(&fields.refs))
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update vuln")?;
        Ok(())
    }

    pub async fn delete_vuln(&self, id: i64) -> Result<()> {
        sqlx::query(sql::DELETE_VULN)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete vuln")?;
        Ok(())
    }

    // -- bulk operations ----------------------------------------------------

    /// Update only comment and tags of one row (in-table annotation).
    pub async fn annotate(
        &self,
        entity: Entity,
        id: i64,
        comment: Option<&str>,
        tags: &[String],
    ) -> Result<()> {
        let tags = normalize_tags(tags);
        let statement = format!(
            "UPDATE {} SET comment = {}, tags = {}, modified_at = {} WHERE id = {}",
            entity.table(),
            bind_marker(1),
            bind_marker(2),
            bind_marker(3),
            bind_marker(4),
        );

        sqlx::query(&statement)
            .bind(comment)
            .bind(tags_to_json(&tags))
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to annotate row")?;
        Ok(())
    }

    /// Add or remove one tag across a selection of rows.
    pub async fn tag_multiid(
        &self,
        entity: Entity,
        action: TagAction,
        ids: &[i64],
        tag: &str,
    ) -> Result<()> {
        let normalized = normalize_tags([tag]);
        let Some(tag) = normalized.first() else {
            return Ok(());
        };

        let select = format!(
            "SELECT tags FROM {} WHERE id = {}",
            entity.table(),
            bind_marker(1)
        );
        let update = format!(
            "UPDATE {} SET tags = {}, modified_at = {} WHERE id = {}",
            entity.table(),
            bind_marker(1),
            bind_marker(2),
            bind_marker(3),
        );

        let mut tx = self.pool.begin().await?;
        for id in ids {
            let row = sqlx::query(&select).bind(id).fetch_optional(&mut *tx).await?;
            let Some(row) = row else {
                continue;
            };

            let mut tags = tags_from_json(row.get("tags"));
            match action {
                TagAction::Set => tags.push(tag.clone()),
                TagAction::Unset => tags.retain(|t| t != tag),
            }
            let tags = normalize_tags(tags);

            sqlx::query(&update)
                .bind(tags_to_json(&tags))
                .bind(Utc::now().to_rfc3339())
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await.context("Failed to commit tag update")?;
        Ok(())
    }

    /// Delete a selection of rows.
    pub async fn delete_multiid(&self, entity: Entity, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let markers: Vec<String> = (1..=ids.len()).map(bind_marker).collect();
        let statement = format!(
            "DELETE FROM {} WHERE id IN ({})",
            entity.table(),
            markers.join(", ")
        );

        let mut query = sqlx::query(&statement);
        for id in ids {
            query = query.bind(id);
        }
        let result = query
            .execute(&self.pool)
            .await
            .context("Failed to delete rows")?;
        Ok(result.rows_affected())
    }

    /// Row count for the dashboard.
    pub async fn count(&self, entity: Entity) -> Result<i64> {
        let statement = match entity {
            Entity::Host => sql::COUNT_HOSTS,
            Entity::Service => sql::COUNT_SERVICES,
            Entity::Note => sql::COUNT_NOTES,
            Entity::Vuln => sql::COUNT_VULNS,
        };
        let count: i64 = sqlx::query_scalar(statement)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count rows")?;
        Ok(count)
    }
}

fn parse_timestamp(row: &DbRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.get(column);
    Ok(DateTime::parse_from_rfc3339(&raw)
        .with_context(|| format!("Invalid {column} timestamp"))?
        .with_timezone(&Utc))
}

fn row_to_host(row: DbRow) -> Result<Host> {
    Ok(Host {
        id: row.get("id"),
        address: row.get("address"),
        hostname: row.get("hostname"),
        os: row.get("os"),
        comment: row.get("comment"),
        tags: tags_from_json(row.get("tags")),
        created_at: parse_timestamp(&row, "created_at")?,
        modified_at: parse_timestamp(&row, "modified_at")?,
    })
}

fn row_to_service(row: DbRow) -> Result<Service> {
    Ok(Service {
        id: row.get("id"),
        host_id: row.get("host_id"),
        proto: row.get("proto"),
        port: row.get("port"),
        state: row.get("state"),
        name: row.get("name"),
        info: row.get("info"),
        comment: row.get("comment"),
        tags: tags_from_json(row.get("tags")),
        created_at: parse_timestamp(&row, "created_at")?,
        modified_at: parse_timestamp(&row, "modified_at")?,
    })
}

fn row_to_note(row: DbRow) -> Result<Note> {
    Ok(Note {
        id: row.get("id"),
        host_id: row.get("host_id"),
        service_id: row.get("service_id"),
        ntype: row.get("ntype"),
        data: row.get("data"),
        comment: row.get("comment"),
        tags: tags_from_json(row.get("tags")),
        created_at: parse_timestamp(&row, "created_at")?,
        modified_at: parse_timestamp(&row, "modified_at")?,
    })
}

fn row_to_vuln(row: DbRow) -> Result<Vuln> {
    let severity: String = row.get("severity");
    Ok(Vuln {
        id: row.get("id"),
        host_id: row.get("host_id"),
        service_id: row.get("service_id"),
        name: row.get("name"),
        xtype: row.get("xtype"),
        severity: severity.parse().unwrap_or_default(),
        descr: row.get("descr"),
        data: row.get("data"),
        refs: tags_from_json(row.get("refs")),
        tags: tags_from_json(row.get("tags")),
        comment: row.get("comment"),
        created_at: parse_timestamp(&row, "created_at")?,
        modified_at: parse_timestamp(&row, "modified_at")?,
    })
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> StorageStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations/shared").run(&pool).await.unwrap();
        StorageStore::new(pool)
    }

    async fn seed_host(store: &StorageStore, address: &str, hostname: Option<&str>) -> i64 {
        store
            .create_host(&HostFields {
                address: address.to_string(),
                hostname: hostname.map(str::to_string),
                os: None,
                comment: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_host_crud_roundtrip() {
        let store = test_store().await;
        let id = seed_host(&store, "192.0.2.1", Some("www.example.org")).await;

        let host = store.get_host(id).await.unwrap().unwrap();
        assert_eq!(host.address, "192.0.2.1");
        assert_eq!(host.hostname.as_deref(), Some("www.example.org"));

        store
            .update_host(
                id,
                &HostFields {
                    address: "192.0.2.1".to_string(),
                    hostname: Some("www.example.org".to_string()),
                    os: Some("linux".to_string()),
                    comment: Some("edge".to_string()),
                },
            )
            .await
            .unwrap();
        let host = store.get_host(id).await.unwrap().unwrap();
        assert_eq!(host.os.as_deref(), Some("linux"));

        store.delete_host(id).await.unwrap();
        assert!(store.get_host(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deleting_host_cascades() {
        let store = test_store().await;
        let host_id = seed_host(&store, "192.0.2.2", None).await;
        let service_id = store
            .create_service(&ServiceFields {
                host_id,
                proto: "tcp".to_string(),
                port: 443,
                state: Some("open".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        store.delete_host(host_id).await.unwrap();
        assert!(store.get_service(service_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tag_multiid_set_and_unset() {
        let store = test_store().await;
        let host_id = seed_host(&store, "192.0.2.3", None).await;
        let mut vuln_ids = Vec::new();
        for i in 0..3 {
            vuln_ids.push(
                store
                    .create_vuln(&VulnFields {
                        host_id,
                        name: format!("vuln {i}"),
                        severity: Severity::High,
                        ..Default::default()
                    })
                    .await
                    .unwrap(),
            );
        }

        // Tag only the first two
        store
            .tag_multiid(Entity::Vuln, TagAction::Set, &vuln_ids[..2], "Reviewed")
            .await
            .unwrap();

        let tagged = store.get_vuln(vuln_ids[0]).await.unwrap().unwrap();
        assert_eq!(tagged.tags, vec!["reviewed".to_string()]);
        let untouched = store.get_vuln(vuln_ids[2]).await.unwrap().unwrap();
        assert!(untouched.tags.is_empty());

        // Setting the same tag twice does not duplicate it
        store
            .tag_multiid(Entity::Vuln, TagAction::Set, &vuln_ids[..1], "reviewed")
            .await
            .unwrap();
        let tagged = store.get_vuln(vuln_ids[0]).await.unwrap().unwrap();
        assert_eq!(tagged.tags, vec!["reviewed".to_string()]);

        store
            .tag_multiid(Entity::Vuln, TagAction::Unset, &vuln_ids, "reviewed")
            .await
            .unwrap();
        for id in &vuln_ids {
            assert!(store.get_vuln(*id).await.unwrap().unwrap().tags.is_empty());
        }
    }

    #[tokio::test]
    async fn test_delete_multiid_affects_only_selection() {
        let store = test_store().await;
        let host_id = seed_host(&store, "192.0.2.4", None).await;
        let mut note_ids = Vec::new();
        for i in 0..3 {
            note_ids.push(
                store
                    .create_note(&NoteFields {
                        host_id,
                        ntype: Some("nmap".to_string()),
                        data: Some(format!("note {i}")),
                        ..Default::default()
                    })
                    .await
                    .unwrap(),
            );
        }

        let deleted = store
            .delete_multiid(Entity::Note, &note_ids[..2])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(store.get_note(note_ids[2]).await.unwrap().is_some());
        assert_eq!(store.count(Entity::Note).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_annotate_touches_only_comment_and_tags() {
        let store = test_store().await;
        let host_id = seed_host(&store, "192.0.2.5", Some("db.example.org")).await;

        store
            .annotate(
                Entity::Host,
                host_id,
                Some("checked"),
                &["Prod".to_string(), "prod".to_string()],
            )
            .await
            .unwrap();

        let host = store.get_host(host_id).await.unwrap().unwrap();
        assert_eq!(host.comment.as_deref(), Some("checked"));
        assert_eq!(host.tags, vec!["prod".to_string()]);
        assert_eq!(host.hostname.as_deref(), Some("db.example.org"));
    }

    #[tokio::test]
    async fn test_vuln_severity_roundtrip() {
        let store = test_store().await;
        let host_id = seed_host(&store, "192.0.2.6", None).await;
        let vuln_id = store
            .create_vuln(&VulnFields {
                host_id,
                name: "heartbleed".to_string(),
                xtype: Some("cve".to_string()),
                severity: Severity::Critical,
                refs: vec!["CVE-2014-0160".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        let vuln = store.get_vuln(vuln_id).await.unwrap().unwrap();
        assert_eq!(vuln.severity, Severity::Critical);
        assert_eq!(vuln.refs, vec!["CVE-2014-0160".to_string()]);
    }
}
