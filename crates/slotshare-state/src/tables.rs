//! redb table definitions for the SlotShare state store.
//!
//! Both tables use `&str` keys and `&[u8]` values.

use redb::TableDefinition;

/// Opaque blobs keyed by well-known names (see [`crate::types::BLACKLIST_KEY`]).
pub const BLOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("blobs");

/// JSON-serialized agent node records keyed by agent role name.
pub const AGENT_NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("agent_nodes");
