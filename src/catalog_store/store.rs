//! SQLite-backed catalog store.
//!
//! One write connection serializes all mutations; each write runs inside a
//! `BEGIN IMMEDIATE` transaction so the write lock is taken up front rather
//! than on the first write. Reads rotate over a pool of read-only WAL
//! connections and never block on writers.

use super::error::{CatalogError, CatalogResult};
use super::models::*;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::{CatalogStore, CatalogTransaction};
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{bail, Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

const ITEM_COLUMNS: &str = "id, title, media_ref, rank, activated_at, created_at, updated_at";

const SUGGESTION_COLUMNS: &str = "id, submitter_id, title, media_ref, desired_rank, status, \
     reviewer_id, reviewed_at, resulting_rank, created_at";

/// SQLite-backed catalog store.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    read_pool: Vec<Arc<Mutex<Connection>>>,
    write_conn: Arc<Mutex<Connection>>,
    read_index: Arc<AtomicUsize>,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    let latest_version = CATALOG_VERSIONED_SCHEMAS.len() - 1;
    let latest_schema = &CATALOG_VERSIONED_SCHEMAS[latest_version];

    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |r| r.get(0),
    )?;

    if table_count == 0 {
        info!("Creating catalog db schema at version {}", latest_version);
        let tx = conn.transaction()?;
        latest_schema.create(&tx)?;
        tx.commit()?;
        return Ok(());
    }

    if db_version < BASE_DB_VERSION as i64 {
        bail!(
            "Database has user_version {} and does not look like a catalog database",
            db_version
        );
    }
    let mut current_version = (db_version - BASE_DB_VERSION as i64) as usize;
    if current_version > latest_version {
        bail!(
            "Catalog db version {} is newer than the latest known version {}",
            current_version,
            latest_version
        );
    }

    if current_version < latest_version {
        let tx = conn.transaction()?;
        for schema in CATALOG_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!(
                    "Migrating catalog db from version {} to {}",
                    current_version, schema.version
                );
                migration_fn(&tx)?;
            }
            current_version = schema.version;
        }
        tx.pragma_update(None, "user_version", BASE_DB_VERSION + current_version)?;
        tx.commit()?;
    }

    latest_schema
        .validate(conn)
        .context("Catalog db schema validation failed")
}

/// A panic inside a write transaction drops (and so rolls back) the
/// transaction before the guard is poisoned, leaving the connection usable.
fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn parse_item_row(row: &rusqlite::Row) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        title: row.get(1)?,
        media_ref: row.get(2)?,
        rank: row.get(3)?,
        activated_at: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn parse_suggestion_row(row: &rusqlite::Row) -> rusqlite::Result<Suggestion> {
    let status: String = row.get(5)?;
    let status = SuggestionStatus::from_str(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Text,
            format!("unknown suggestion status '{}'", status).into(),
        )
    })?;
    Ok(Suggestion {
        id: row.get(0)?,
        submitter_id: row.get(1)?,
        title: row.get(2)?,
        media_ref: row.get(3)?,
        desired_rank: row.get(4)?,
        status,
        reviewer_id: row.get(6)?,
        reviewed_at: row.get(7)?,
        resulting_rank: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn query_item(conn: &Connection, id: &str) -> CatalogResult<Option<Item>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS),
            params![id],
            parse_item_row,
        )
        .optional()?)
}

fn query_suggestion(conn: &Connection, id: &str) -> CatalogResult<Option<Suggestion>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM suggestions WHERE id = ?1", SUGGESTION_COLUMNS),
            params![id],
            parse_suggestion_row,
        )
        .optional()?)
}

fn count(conn: &Connection, sql: &str) -> usize {
    conn.query_row(sql, [], |r| r.get::<_, i64>(0))
        .unwrap_or(0) as usize
}

impl SqliteCatalogStore {
    /// Open (creating if needed) the catalog database at `db_path`.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `read_pool_size` - Number of read-only connections (at least one is opened)
    /// * `busy_timeout` - How long a connection waits on a lock held by another process
    pub fn new<P: AsRef<Path>>(
        db_path: P,
        read_pool_size: usize,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let db_path_ref = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path_ref,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open catalog database {:?}", db_path_ref))?;
        write_conn.busy_timeout(busy_timeout)?;
        write_conn.pragma_update(None, "journal_mode", "WAL")?;

        migrate_if_needed(&mut write_conn)?;

        info!(
            "Opened catalog: {} active items ({} ranked), {} pending suggestions",
            count(&write_conn, "SELECT COUNT(*) FROM items WHERE activated_at IS NOT NULL"),
            count(&write_conn, "SELECT COUNT(*) FROM items WHERE rank IS NOT NULL"),
            count(&write_conn, "SELECT COUNT(*) FROM suggestions WHERE status = 'pending'"),
        );

        let read_pool_size = read_pool_size.max(1);
        let mut read_pool = Vec::with_capacity(read_pool_size);
        for _ in 0..read_pool_size {
            let read_conn = Connection::open_with_flags(
                db_path_ref,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            read_conn.busy_timeout(busy_timeout)?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        Ok(SqliteCatalogStore {
            read_pool,
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_index: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn get_read_conn(&self) -> Arc<Mutex<Connection>> {
        let index = self.read_index.fetch_add(1, Ordering::SeqCst) % self.read_pool.len();
        self.read_pool[index].clone()
    }
}

struct SqliteTransaction<'a> {
    conn: &'a Connection,
}

impl SqliteTransaction<'_> {
    fn expect_one_row(changed: usize, id: &str) -> CatalogResult<()> {
        if changed == 0 {
            return Err(CatalogError::ItemNotFound(id.to_string()));
        }
        Ok(())
    }
}

impl CatalogTransaction for SqliteTransaction<'_> {
    fn get_item(&self, id: &str) -> CatalogResult<Option<Item>> {
        query_item(self.conn, id)
    }

    fn insert_item(&self, item: &Item) -> CatalogResult<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO items ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    ITEM_COLUMNS
                ),
                params![
                    item.id,
                    item.title,
                    item.media_ref,
                    item.rank,
                    item.activated_at,
                    item.created_at,
                    item.updated_at
                ],
            )
            .map_err(|e| CatalogError::from_write(e, &item.media_ref))?;
        Ok(())
    }

    fn update_item_details(
        &self,
        id: &str,
        title: &str,
        media_ref: &str,
        updated_at: i64,
    ) -> CatalogResult<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE items SET title = ?1, media_ref = ?2, updated_at = ?3 WHERE id = ?4",
                params![title, media_ref, updated_at, id],
            )
            .map_err(|e| CatalogError::from_write(e, media_ref))?;
        Self::expect_one_row(changed, id)
    }

    fn delete_item(&self, id: &str) -> CatalogResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM items WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn ranked_items_from(&self, from: Rank, excluding_id: &str) -> CatalogResult<Vec<Item>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM items WHERE rank IS NOT NULL AND rank >= ?1 AND id != ?2 \
             ORDER BY rank DESC",
            ITEM_COLUMNS
        ))?;
        let items = stmt
            .query_map(params![from, excluding_id], parse_item_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn set_item_rank(&self, id: &str, rank: Option<Rank>, updated_at: i64) -> CatalogResult<()> {
        let changed = self.conn.execute(
            "UPDATE items SET rank = ?1, updated_at = ?2 WHERE id = ?3",
            params![rank, updated_at, id],
        )?;
        Self::expect_one_row(changed, id)
    }

    fn activate_item(&self, id: &str, at: i64) -> CatalogResult<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE items SET activated_at = ?1, updated_at = ?1 WHERE id = ?2",
                params![at, id],
            )
            .map_err(|e| {
                let media_ref = query_item(self.conn, id)
                    .ok()
                    .flatten()
                    .map(|item| item.media_ref)
                    .unwrap_or_default();
                CatalogError::from_write(e, &media_ref)
            })?;
        Self::expect_one_row(changed, id)
    }

    fn insert_suggestion(&self, suggestion: &Suggestion) -> CatalogResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO suggestions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                SUGGESTION_COLUMNS
            ),
            params![
                suggestion.id,
                suggestion.submitter_id,
                suggestion.title,
                suggestion.media_ref,
                suggestion.desired_rank,
                suggestion.status.as_str(),
                suggestion.reviewer_id,
                suggestion.reviewed_at,
                suggestion.resulting_rank,
                suggestion.created_at
            ],
        )?;
        Ok(())
    }

    fn get_suggestion(&self, id: &str) -> CatalogResult<Option<Suggestion>> {
        query_suggestion(self.conn, id)
    }

    fn mark_suggestion_reviewed(
        &self,
        id: &str,
        status: SuggestionStatus,
        reviewer_id: &str,
        reviewed_at: i64,
        resulting_rank: Option<Rank>,
    ) -> CatalogResult<()> {
        let changed = self.conn.execute(
            "UPDATE suggestions SET status = ?1, reviewer_id = ?2, reviewed_at = ?3, \
             resulting_rank = ?4 WHERE id = ?5 AND status = 'pending'",
            params![status.as_str(), reviewer_id, reviewed_at, resulting_rank, id],
        )?;
        if changed == 0 {
            return Err(CatalogError::Conflict(format!(
                "suggestion {} is no longer pending",
                id
            )));
        }
        Ok(())
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn write_transaction(
        &self,
        work: &mut dyn FnMut(&dyn CatalogTransaction) -> CatalogResult<()>,
    ) -> CatalogResult<()> {
        let mut conn = lock(&self.write_conn);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // Returning early drops `tx`, which rolls everything back
        work(&SqliteTransaction { conn: &tx })?;
        tx.commit()?;
        debug!("Committed catalog write transaction");
        Ok(())
    }

    fn get_item(&self, id: &str) -> CatalogResult<Option<Item>> {
        let read_conn = self.get_read_conn();
        let conn = lock(&read_conn);
        query_item(&conn, id)
    }

    fn list_ranked_items(&self) -> CatalogResult<Vec<Item>> {
        let read_conn = self.get_read_conn();
        let conn = lock(&read_conn);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM items WHERE rank IS NOT NULL ORDER BY rank ASC",
            ITEM_COLUMNS
        ))?;
        let items = stmt
            .query_map([], parse_item_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn list_unranked_items(&self, page: PageRequest) -> CatalogResult<ItemsPage> {
        let read_conn = self.get_read_conn();
        let conn = lock(&read_conn);
        // Same snapshot for the count and the page
        let tx = conn.unchecked_transaction()?;
        let total: i64 = tx.query_row(
            "SELECT COUNT(*) FROM items WHERE activated_at IS NOT NULL AND rank IS NULL",
            [],
            |r| r.get(0),
        )?;
        let items = tx
            .prepare(&format!(
                "SELECT {} FROM items WHERE activated_at IS NOT NULL AND rank IS NULL \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
                ITEM_COLUMNS
            ))?
            .query_map(
                params![
                    page.per_page as i64,
                    i64::try_from(page.offset()).unwrap_or(i64::MAX)
                ],
                parse_item_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        tx.finish()?;
        Ok(ItemsPage::new(items, page, total as usize))
    }

    fn get_suggestion(&self, id: &str) -> CatalogResult<Option<Suggestion>> {
        let read_conn = self.get_read_conn();
        let conn = lock(&read_conn);
        query_suggestion(&conn, id)
    }

    fn list_suggestions(
        &self,
        status: Option<SuggestionStatus>,
        limit: usize,
    ) -> CatalogResult<Vec<Suggestion>> {
        let read_conn = self.get_read_conn();
        let conn = lock(&read_conn);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM suggestions WHERE (?1 IS NULL OR status = ?1) \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            SUGGESTION_COLUMNS
        ))?;
        let suggestions = stmt
            .query_map(
                params![status.map(|s| s.as_str()), limit as i64],
                parse_suggestion_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(suggestions)
    }

    fn get_items_count(&self) -> usize {
        let read_conn = self.get_read_conn();
        let conn = lock(&read_conn);
        count(
            &conn,
            "SELECT COUNT(*) FROM items WHERE activated_at IS NOT NULL",
        )
    }

    fn get_pending_suggestions_count(&self) -> usize {
        let read_conn = self.get_read_conn();
        let conn = lock(&read_conn);
        count(
            &conn,
            "SELECT COUNT(*) FROM suggestions WHERE status = 'pending'",
        )
    }
}
