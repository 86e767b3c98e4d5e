//! # tgstore
//!
//! Durable, restart-surviving state for a Telegram MTProto client.
//!
//! ## Features
//! - Session record — home DC, auth key, account id and flags
//! - Peer cache — access hashes by id, username and phone number, with an
//!   8-hour freshness window on usernames
//! - Update checkpoints — per-source `pts` / `qts` / `date` / `seq` so the
//!   update stream can resume after a restart
//! - Ordered schema migrations, each step committed on its own
//! - Portable session strings
//!
//! All access goes through one worker thread that owns the SQLite connection;
//! the async API never blocks the caller's runtime.
//!
//! ```rust,no_run
//! use tgstore::{Store, StoreConfig, UpdateOffset};
//!
//! # async fn demo() -> Result<(), tgstore::StoreError> {
//! let store = Store::open(StoreConfig::file("account.session")).await?;
//!
//! if store.auth_key().await?.is_none() {
//!     // … run the key exchange, then:
//!     store.set_auth_key(Some(tgstore::AuthKey::from([0u8; 256]))).await?;
//!     store.set_dc_id(4).await?;
//! }
//!
//! store.upsert_update_offset(UpdateOffset::account(100, 0, 1_700_000_000, 1)).await?;
//! store.save().await?;
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]

mod errors;
mod executor;
mod session;
mod store;

pub mod clock;
pub mod config;
pub mod peer_id;
pub mod peers;
pub mod schema;
pub mod session_string;
pub mod update_state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{StoreConfig, StoreLocation, USERNAME_TTL};
pub use errors::{Lookup, SchemaError, StoreError};
pub use peers::{InputPeer, PeerKind, PeerRecord, PeerUpdate};
pub use schema::{CURRENT_VERSION, SchemaState};
pub use session::{AuthKey, SessionRecord};
pub use store::Store;
pub use update_state::{ACCOUNT_SOURCE_ID, UpdateOffset};
