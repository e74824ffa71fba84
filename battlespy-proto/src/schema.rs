//! The static server schema.
//!
//! The original BattleSpy-era master server used reflection to enumerate a game
//! server's properties and an attribute to mark which of them were legal in a
//! client filter. We replace that with a compile-time table of
//! [`FieldDescriptor`]s keyed by lowercase name, which gives the [normaliser](crate::filter::normalize)
//! and [evaluator](crate::filter::eval) a closed, efficient namespace instead of
//! runtime type introspection.

use std::net::Ipv4Addr;

/// One registered game server, as tracked by the [Registry](../../battlespy_registry/index.html)
/// and consulted by the query path.
#[derive(Debug, Clone, PartialEq)]
pub struct GameServer {
    /// IPv4 address the server was heartbeat-validated from.
    pub ip: Ipv4Addr,
    /// Port the master server queries the game server on.
    pub query_port: u16,
    /// Port game clients connect to.
    pub game_port: u16,

    pub hostname: String,
    pub game_type: String,
    pub map_name: String,
    pub game_variant: String,
    pub num_players: u8,
    pub max_players: u8,
    pub round_time: u16,
    pub connection_type: String,
    pub password_protected: bool,
    pub ranked: bool,
    pub punkbuster: bool,
    pub dedicated: bool,
    pub time_limit: u16,
    pub anticheat: bool,

    /// Unix seconds of the last accepted heartbeat.
    pub last_refreshed: u64,
    /// Only validated servers are visible to the query path.
    pub is_validated: bool,
    /// Resolved database row id; 0 means "not yet resolved or unknown".
    pub database_id: i64,
}

impl GameServer {
    /// The identity used as the Registry's map key.
    pub fn key(&self) -> (Ipv4Addr, u16) {
        (self.ip, self.query_port)
    }
}

/// Scalar values a field resolves to, shared by the evaluator and the encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
    /// Not present on this record (the encoder renders this as an empty string).
    Absent,
}

impl FieldValue {
    /// Render the way the wire encoder expects: booleans as `"1"`/`"0"`, absent as `""`.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Str(s) => s.clone(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            FieldValue::Absent => String::new(),
        }
    }
}

/// One entry in the static schema table.
pub struct FieldDescriptor {
    /// Lowercase canonical name, e.g. `"numplayers"`.
    pub name: &'static str,
    /// Whether a client filter may reference this field.
    pub filterable: bool,
    getter: fn(&GameServer) -> FieldValue,
}

impl FieldDescriptor {
    /// Resolve this field against a server record.
    pub fn get(&self, server: &GameServer) -> FieldValue {
        (self.getter)(server)
    }
}

fn bounded(hostname: &str) -> String {
    hostname.chars().take(100).collect()
}

/// The full, fixed-at-build-time schema, keyed by lowercase name.
///
/// Lookups should go through [`lookup`], which is case-insensitive.
pub static SCHEMA: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "hostname",
        filterable: true,
        getter: |s| FieldValue::Str(bounded(&s.hostname)),
    },
    FieldDescriptor {
        name: "gametype",
        filterable: true,
        getter: |s| FieldValue::Str(s.game_type.clone()),
    },
    FieldDescriptor {
        name: "mapname",
        filterable: true,
        getter: |s| FieldValue::Str(s.map_name.clone()),
    },
    FieldDescriptor {
        name: "gamevariant",
        filterable: true,
        getter: |s| FieldValue::Str(s.game_variant.clone()),
    },
    FieldDescriptor {
        name: "numplayers",
        filterable: true,
        getter: |s| FieldValue::Int(s.num_players as i64),
    },
    FieldDescriptor {
        name: "maxplayers",
        filterable: true,
        getter: |s| FieldValue::Int(s.max_players as i64),
    },
    FieldDescriptor {
        name: "roundtime",
        filterable: true,
        getter: |s| FieldValue::Int(s.round_time as i64),
    },
    FieldDescriptor {
        name: "connectiontype",
        filterable: true,
        getter: |s| FieldValue::Str(s.connection_type.clone()),
    },
    FieldDescriptor {
        name: "password",
        filterable: true,
        getter: |s| FieldValue::Bool(s.password_protected),
    },
    FieldDescriptor {
        name: "ranked",
        filterable: true,
        getter: |s| FieldValue::Bool(s.ranked),
    },
    FieldDescriptor {
        name: "punkbuster",
        filterable: true,
        getter: |s| FieldValue::Bool(s.punkbuster),
    },
    FieldDescriptor {
        name: "dedicated",
        filterable: true,
        getter: |s| FieldValue::Bool(s.dedicated),
    },
    FieldDescriptor {
        name: "timelimit",
        filterable: true,
        getter: |s| FieldValue::Int(s.time_limit as i64),
    },
    FieldDescriptor {
        name: "anticheat",
        filterable: true,
        getter: |s| FieldValue::Bool(s.anticheat),
    },
    FieldDescriptor {
        name: "gameport",
        filterable: true,
        getter: |s| FieldValue::Int(s.game_port as i64),
    },
    // Liveness/internal attributes: present so the encoder can reflect them back
    // when a client requests them, but never filterable.
    FieldDescriptor {
        name: "databaseid",
        filterable: false,
        getter: |s| FieldValue::Int(s.database_id),
    },
    FieldDescriptor {
        name: "lastrefreshed",
        filterable: false,
        getter: |s| FieldValue::Int(s.last_refreshed as i64),
    },
    FieldDescriptor {
        name: "isvalidated",
        filterable: false,
        getter: |s| FieldValue::Bool(s.is_validated),
    },
];

/// Case-insensitive schema lookup.
pub fn lookup(name: &str) -> Option<&'static FieldDescriptor> {
    let lower = name.to_ascii_lowercase();
    SCHEMA.iter().find(|f| f.name == lower)
}

/// Whether `name` names a field in the schema at all (filterable or not).
pub fn is_known_field(name: &str) -> bool {
    lookup(name).is_some()
}

/// Whether `name` names a *filterable* field.
pub fn is_filterable(name: &str) -> bool {
    lookup(name).map(|f| f.filterable).unwrap_or(false)
}

/// Resolve a requested field name to its value for `server`, or `Absent` if
/// the name isn't in the schema at all (the encoder still reflects it back
/// as an empty string per the wire spec).
pub fn resolve(name: &str, server: &GameServer) -> FieldValue {
    match lookup(name) {
        Some(field) => field.get(server),
        None => FieldValue::Absent,
    }
}
