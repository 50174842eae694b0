//! slotshare-state — embedded state store for SlotShare.
//!
//! Backed by [redb](https://docs.rs/redb). Holds the two things the control
//! plane must find again after a restart:
//!
//! - opaque blobs under well-known keys (the compressed agent blacklist)
//! - one record per agent node ever created, so stale nodes can be collected
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across threads and async tasks.

pub mod compress;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
