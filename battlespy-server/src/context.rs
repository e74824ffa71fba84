//! The explicit context object that replaces the original's process-wide
//! statics (§9): one `AppContext` is built once at startup and handed to
//! every accepted connection's [`Session`](crate::session::Session).

use std::sync::Arc;

use battlespy_proto::enctypex::HandoffKey;
use battlespy_registry::Registry;

use crate::config::Config;

/// The per-title handoff key this core identifies itself with during the
/// enctypex handshake (C4). Battlefield 2's well-known BattleSpy key.
pub const HANDOFF_KEY: HandoffKey = *b"BF2spy";

/// Everything a [`Session`](crate::session::Session) needs, bundled once at
/// startup and shared behind an `Arc` across every spawned connection task.
pub struct AppContext {
    pub registry: Arc<Registry>,
    pub config: Config,
}

impl AppContext {
    pub fn new(registry: Arc<Registry>, config: Config) -> Self {
        Self { registry, config }
    }
}
