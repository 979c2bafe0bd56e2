//! Session affinity for Arbor.
//!
//! A `(tenant_id, node_id)` key always reaches the same stateful session
//! actor.  The [`SessionDirectoryActor`](directory) is the only writer of
//! the key → owner mapping held in an external [`TtlStore`]; session actors
//! keep their record alive by heartbeating through it.

pub mod address_book;
pub mod directory;
pub mod session_actor;
pub mod session_key;
pub mod ttl_store;

pub use address_book::SessionAddressBook;
pub use directory::{
    spawn_directory, DirectoryCommand, DirectoryHandle, RouteReceipt, SessionEntry, SessionRecord,
};
pub use session_actor::{DirectoryAck, SessionCommand, SessionHandler, SessionMailbox};
pub use session_key::{storage_key, validate_session_key};
pub use ttl_store::{InMemoryTtlStore, TtlStore};
