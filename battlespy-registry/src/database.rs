//! The Database collaborator (C10, §4.5/§6).
//!
//! A minimal async layer over the `server` table the Registry uses to
//! persist online/offline transitions. Two implementations: [`MySqlDatabase`]
//! for production, backed by `sqlx`, and [`InMemoryDatabase`] used by this
//! core's own tests and by anything exercising the Registry without a real
//! database.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Errors talking to the database. Never propagated to the query path
/// (§4.8); the Registry logs these and moves on.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish or maintain the connection pool.
    #[error("database connection failed: {0}")]
    Connect(String),
    /// A query or statement failed.
    #[error("database query failed: {0}")]
    Query(String),
}

/// The minimal async SQL surface the Registry's `mark_online`/`mark_offline`
/// need (§4.5, §6): resolve a server's row id by `(ip, queryport)`, and flip
/// its online flag.
#[async_trait]
pub trait Database: Send + Sync {
    /// `SELECT COALESCE(id, 0), COUNT(id) FROM server WHERE ip = ? AND queryport = ?`.
    /// Returns `0` if the server has no row (§4.5: "not found" resolves to
    /// id=0 and the core never auto-inserts).
    async fn resolve_id(&self, ip: Ipv4Addr, query_port: u16) -> Result<i64, DatabaseError>;

    /// `UPDATE server SET online=1, gameport=?, name=?, lastseen=? WHERE id=?`.
    /// `name` is truncated to 100 characters by the caller before this is
    /// invoked, matching the hostname field's own bound (§3).
    async fn mark_online(
        &self,
        id: i64,
        game_port: u16,
        name: &str,
        last_seen: u64,
    ) -> Result<(), DatabaseError>;

    /// `UPDATE server SET online=0 WHERE id=?`.
    async fn mark_offline(&self, id: i64) -> Result<(), DatabaseError>;
}

/// Production implementation, backed by a `sqlx` MySQL connection pool.
pub struct MySqlDatabase {
    pool: sqlx::MySqlPool,
}

impl MySqlDatabase {
    /// Wraps an already-established pool.
    pub fn new(pool: sqlx::MySqlPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool from a connection string built once at startup
    /// (§4.7). Fatal (`ConfigError`/startup failure, §6) if it can't connect.
    pub async fn connect(connection_string: &str) -> Result<Self, DatabaseError> {
        let pool = sqlx::mysql::MySqlPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await
            .map_err(|err| DatabaseError::Connect(err.to_string()))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    async fn resolve_id(&self, ip: Ipv4Addr, query_port: u16) -> Result<i64, DatabaseError> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            "SELECT COALESCE(id, 0), COUNT(id) FROM server WHERE ip = ? AND queryport = ?",
        )
        .bind(ip.to_string())
        .bind(query_port as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| DatabaseError::Query(err.to_string()))?;

        Ok(row.map(|(id, _count)| id).unwrap_or(0))
    }

    async fn mark_online(
        &self,
        id: i64,
        game_port: u16,
        name: &str,
        last_seen: u64,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE server SET online = 1, gameport = ?, name = ?, lastseen = ? WHERE id = ?")
            .bind(game_port as i64)
            .bind(name)
            .bind(last_seen as i64)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| DatabaseError::Query(err.to_string()))?;
        Ok(())
    }

    async fn mark_offline(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE server SET online = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| DatabaseError::Query(err.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Row {
    online: bool,
    game_port: u16,
    name: String,
    last_seen: u64,
}

/// In-memory stand-in used by tests (and by [`FailingDatabase`]'s sibling
/// tests exercising S6's "database offline" scenario).
#[derive(Default)]
pub struct InMemoryDatabase {
    ids: Mutex<HashMap<(Ipv4Addr, u16), i64>>,
    rows: Mutex<HashMap<i64, Row>>,
}

impl InMemoryDatabase {
    /// An empty database: every `(ip, queryport)` resolves to id 0 until
    /// seeded with [`InMemoryDatabase::seed`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `(ip, queryport)` as an existing row with the given id, as
    /// if a prior out-of-band insert had happened.
    pub fn seed(&self, ip: Ipv4Addr, query_port: u16, id: i64) {
        self.ids.lock().unwrap().insert((ip, query_port), id);
        self.rows.lock().unwrap().entry(id).or_insert(Row {
            online: false,
            game_port: 0,
            name: String::new(),
            last_seen: 0,
        });
    }

    /// Snapshot of one row, for assertions in tests.
    pub fn row(&self, id: i64) -> Option<(bool, u16, String, u64)> {
        self.rows
            .lock()
            .unwrap()
            .get(&id)
            .map(|r| (r.online, r.game_port, r.name.clone(), r.last_seen))
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn resolve_id(&self, ip: Ipv4Addr, query_port: u16) -> Result<i64, DatabaseError> {
        Ok(self
            .ids
            .lock()
            .unwrap()
            .get(&(ip, query_port))
            .copied()
            .unwrap_or(0))
    }

    async fn mark_online(
        &self,
        id: i64,
        game_port: u16,
        name: &str,
        last_seen: u64,
    ) -> Result<(), DatabaseError> {
        if id <= 0 {
            return Ok(());
        }
        let truncated: String = name.chars().take(100).collect();
        self.rows.lock().unwrap().insert(
            id,
            Row {
                online: true,
                game_port,
                name: truncated,
                last_seen,
            },
        );
        Ok(())
    }

    async fn mark_offline(&self, id: i64) -> Result<(), DatabaseError> {
        if id <= 0 {
            return Ok(());
        }
        if let Some(row) = self.rows.lock().unwrap().get_mut(&id) {
            row.online = false;
        }
        Ok(())
    }
}

/// Always-failing `Database`, for exercising S6: a heartbeat's `mark_online`
/// call fails but the Registry must still hold the server and keep serving it.
#[derive(Default)]
pub struct FailingDatabase;

#[async_trait]
impl Database for FailingDatabase {
    async fn resolve_id(&self, _ip: Ipv4Addr, _query_port: u16) -> Result<i64, DatabaseError> {
        Err(DatabaseError::Connect("simulated outage".into()))
    }

    async fn mark_online(
        &self,
        _id: i64,
        _game_port: u16,
        _name: &str,
        _last_seen: u64,
    ) -> Result<(), DatabaseError> {
        Err(DatabaseError::Query("simulated outage".into()))
    }

    async fn mark_offline(&self, _id: i64) -> Result<(), DatabaseError> {
        Err(DatabaseError::Query("simulated outage".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unseeded_server_resolves_to_zero() {
        let db = InMemoryDatabase::new();
        let id = db.resolve_id(Ipv4Addr::new(1, 2, 3, 4), 16567).await.unwrap();
        assert_eq!(id, 0);
    }

    #[tokio::test]
    async fn mark_online_truncates_name_to_100_chars() {
        let db = InMemoryDatabase::new();
        db.seed(Ipv4Addr::new(1, 2, 3, 4), 16567, 7);
        db.mark_online(7, 16567, &"x".repeat(150), 1_700_000_000)
            .await
            .unwrap();
        let (online, _, name, _) = db.row(7).unwrap();
        assert!(online);
        assert_eq!(name.len(), 100);
    }

    #[tokio::test]
    async fn mark_online_is_a_noop_for_unresolved_id() {
        let db = InMemoryDatabase::new();
        db.mark_online(0, 16567, "alpha", 1).await.unwrap();
        assert!(db.row(0).is_none());
    }
}
