//! The live server registry (C5, §4.5).
//!
//! A process-wide map from `(ip, queryPort)` to a validated [`GameServer`],
//! read by the query path and written by the heartbeat collaborator. A
//! single `std::sync::Mutex` guards the map; `snapshot` clones every
//! visible record while the lock is held and releases it before returning,
//! so no reader ever observes one torn mid-mutation (§5).

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use battlespy_proto::schema::GameServer;

use crate::database::Database;

type Key = (Ipv4Addr, u16);

/// The Registry: holds the live server map and the lazily-resolved database
/// id cache, and owns the [`Database`] handle used by `mark_online`/
/// `mark_offline`.
pub struct Registry {
    servers: Mutex<HashMap<Key, GameServer>>,
    resolved_ids: Mutex<HashMap<Key, i64>>,
    database: Arc<dyn Database>,
}

impl Registry {
    /// A fresh, empty registry backed by `database`.
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self {
            servers: Mutex::new(HashMap::new()),
            resolved_ids: Mutex::new(HashMap::new()),
            database,
        }
    }

    /// The Heartbeat collaborator's write surface (§6): insert a new server
    /// or overwrite an existing one's attributes. `lastRefreshed` is left to
    /// the caller to set monotonically (§3's invariant).
    pub fn upsert(&self, server: GameServer) {
        let key = server.key();
        self.servers.lock().unwrap().insert(key, server);
    }

    /// Marks an existing entry validated, making it visible to [`snapshot`](Self::snapshot).
    /// A no-op if the key isn't present (the heartbeat handshake completed
    /// for a server this registry never saw an initial report for).
    pub fn mark_validated(&self, key: (Ipv4Addr, u16)) {
        if let Some(server) = self.servers.lock().unwrap().get_mut(&key) {
            server.is_validated = true;
        }
    }

    /// Removes every entry whose `lastRefreshed` is older than `older_than`
    /// (Unix seconds), per the Heartbeat collaborator's staleness policy.
    pub fn evict_stale(&self, older_than: u64) {
        self.servers
            .lock()
            .unwrap()
            .retain(|_, server| server.last_refreshed >= older_than);
    }

    /// A stable snapshot of every validated entry, for one query's encode
    /// pass (§4.5). Taken under one short lock acquisition; each record is
    /// cloned before the lock releases.
    pub fn snapshot(&self) -> Vec<GameServer> {
        self.servers
            .lock()
            .unwrap()
            .values()
            .filter(|server| server.is_validated)
            .cloned()
            .collect()
    }

    /// Total entry count, validated or not — used by diagnostics, not the
    /// query path.
    pub fn len(&self) -> usize {
        self.servers.lock().unwrap().len()
    }

    /// Whether the registry currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve_id(&self, key: Key) -> Option<i64> {
        self.resolved_ids.lock().unwrap().get(&key).copied()
    }

    fn remember_id(&self, key: Key, id: i64) {
        self.resolved_ids.lock().unwrap().insert(key, id);
    }

    /// Resolves `key`'s database id, consulting (and populating) the
    /// resolution cache so repeated heartbeats don't re-query for it. Errors
    /// are logged and treated as "still unresolved"; the caller's own
    /// `mark_online`/`mark_offline` no-ops on an id of 0 either way (§4.5,
    /// §7: a query — and a heartbeat — never fails because of a database
    /// hiccup, S6).
    async fn resolved_database_id(&self, key: Key) -> i64 {
        if let Some(id) = self.resolve_id(key) {
            return id;
        }
        match self.database.resolve_id(key.0, key.1).await {
            Ok(id) => {
                self.remember_id(key, id);
                id
            }
            Err(err) => {
                tracing::warn!(error = %err, ip = %key.0, query_port = key.1, "failed to resolve database id");
                0
            }
        }
    }

    /// Persists a server coming online (§4.5): resolves its database id
    /// lazily, then issues the update outside any registry lock. A database
    /// failure is logged and swallowed — the in-memory entry this call was
    /// triggered alongside is unaffected (S6).
    pub async fn mark_online(&self, server: &GameServer) {
        let key = server.key();
        let id = self.resolved_database_id(key).await;
        if id <= 0 {
            return;
        }
        if let Err(err) = self
            .database
            .mark_online(id, server.game_port, &server.hostname, server.last_refreshed)
            .await
        {
            tracing::warn!(error = %err, ip = %key.0, query_port = key.1, "mark_online failed");
        }
    }

    /// Persists a server going offline (§4.5), with the same lazy
    /// resolution and error-swallowing behaviour as [`mark_online`](Self::mark_online).
    pub async fn mark_offline(&self, key: Key) {
        let id = self.resolved_database_id(key).await;
        if id <= 0 {
            return;
        }
        if let Err(err) = self.database.mark_offline(id).await {
            tracing::warn!(error = %err, ip = %key.0, query_port = key.1, "mark_offline failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{FailingDatabase, InMemoryDatabase};

    fn server(ip: [u8; 4], query_port: u16, validated: bool) -> GameServer {
        GameServer {
            ip: Ipv4Addr::from(ip),
            query_port,
            game_port: query_port,
            hostname: "alpha".into(),
            game_type: "gpm_cq".into(),
            map_name: "strike_at_karkand".into(),
            game_variant: "bf2".into(),
            num_players: 8,
            max_players: 32,
            round_time: 900,
            connection_type: "LAN".into(),
            password_protected: false,
            ranked: true,
            punkbuster: true,
            dedicated: true,
            time_limit: 30,
            anticheat: true,
            last_refreshed: 1_700_000_000,
            is_validated: validated,
            database_id: 0,
        }
    }

    #[test]
    fn snapshot_only_includes_validated_entries() {
        let registry = Registry::new(Arc::new(InMemoryDatabase::new()));
        registry.upsert(server([1, 2, 3, 4], 16567, true));
        registry.upsert(server([5, 6, 7, 8], 16567, false));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].is_validated);
    }

    #[test]
    fn mark_validated_flips_an_existing_entry() {
        let registry = Registry::new(Arc::new(InMemoryDatabase::new()));
        registry.upsert(server([1, 2, 3, 4], 16567, false));
        registry.mark_validated((Ipv4Addr::new(1, 2, 3, 4), 16567));

        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn evict_stale_removes_old_entries() {
        let registry = Registry::new(Arc::new(InMemoryDatabase::new()));
        registry.upsert(server([1, 2, 3, 4], 16567, true));
        registry.evict_stale(1_700_000_001);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn mark_online_resolves_and_persists_id() {
        let db = Arc::new(InMemoryDatabase::new());
        db.seed(Ipv4Addr::new(1, 2, 3, 4), 16567, 42);
        let registry = Registry::new(db.clone());

        let server = server([1, 2, 3, 4], 16567, true);
        registry.mark_online(&server).await;

        let (online, game_port, name, _) = db.row(42).unwrap();
        assert!(online);
        assert_eq!(game_port, 16567);
        assert_eq!(name, "alpha");
    }

    #[tokio::test]
    async fn mark_online_noop_when_server_absent_from_database() {
        let db = Arc::new(InMemoryDatabase::new());
        let registry = Registry::new(db.clone());
        registry.mark_online(&server([1, 2, 3, 4], 16567, true)).await;
        assert!(db.row(0).is_none());
    }

    #[tokio::test]
    async fn database_failure_during_mark_online_does_not_evict_registry_entry() {
        // S6: a heartbeat triggers mark_online while the database is down;
        // the in-memory entry must still be present and still served.
        let registry = Registry::new(Arc::new(FailingDatabase));
        let entry = server([1, 2, 3, 4], 16567, true);
        registry.upsert(entry.clone());

        registry.mark_online(&entry).await;

        assert_eq!(registry.snapshot().len(), 1);
    }
}
