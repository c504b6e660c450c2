//! redb table definitions for the capgrid state store.
//!
//! Entity tables use `u64` keys and `&[u8]` values (JSON-serialized domain
//! types). Id allocation state lives in `SEQUENCES`, keyed by table name.

use redb::TableDefinition;

pub const ORGANIZATIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("organizations");

pub const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");

pub const CLUSTERS: TableDefinition<u64, &[u8]> = TableDefinition::new("clusters");

pub const DEPLOYMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("deployments");

/// Last id handed out per entity table.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
