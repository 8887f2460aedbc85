//! The vault core: persisted record model, in-memory store with its
//! persistence handoff, transient session state, and the state machine
//! that is the sole entry point for every unlocking or mutating operation.

pub mod machine;
pub mod record;
pub mod session;
pub mod store;

pub use machine::{VaultMachine, VaultState};
pub use record::{EntryKind, EntrySummary, StoredEntry, VaultRecord};
pub use session::Session;
pub use store::VaultStore;
