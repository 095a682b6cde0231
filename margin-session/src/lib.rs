//! Margin Session - request-scoped session management
//!
//! A [`SessionManager`] sits on top of a [`SessionStore`] and adds:
//!
//! - a single logged-in identity per session, mirrored into the `guid` attribute
//! - lazily generated CSRF tokens that survive restarts and id migration
//! - process-wide access bypass and hidden-entity visibility flags
//!
//! Stores persist through a [`SessionBackend`]: in memory, in a sqlite
//! `sessions` table, or as files.

pub mod backend;
pub mod error;
pub mod file;
pub mod http;
pub mod manager;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

pub use backend::{
    generate_session_id, validate_session_id, MemoryBackend, SessionAttributes, SessionBackend,
};
pub use error::{SessionError, SessionResult};
pub use file::FileBackend;
pub use http::{cache_limiter_headers, cookie_header};
pub use manager::{
    is_reserved, SessionManager, SessionServices, CSRF_TOKEN_KEY, RESERVED_ATTRIBUTES,
    USER_GUID_KEY,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
pub use store::{NativeSessionStore, SessionStore};
