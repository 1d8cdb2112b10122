//! Authentication module: session lifecycle, persistence, and credentials.
//!
//! This module provides:
//! - `SessionManager`: token session with automatic expiry and a
//!   current-value auth status broadcast
//! - `KeyValueStore` / `FileStore` / `NoopStore`: the persistence capability
//!   behind the session snapshot
//! - `CredentialStore`: OS-level credential storage via keyring
//!
//! Sessions are persisted as three fields (`token`, `expiration`, `userId`)
//! and expire client-side when the token lifetime elapses.

pub mod credentials;
pub mod session;
pub mod storage;

pub use credentials::CredentialStore;
pub use session::{AuthGrant, Session, SessionManager};
pub use storage::{FileStore, KeyValueStore, NoopStore};
