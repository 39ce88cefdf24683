//! Credential lifecycle and authentication recovery
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  RefreshCoordinator  │  single-flight refresh, replay gate
//! └──────────┬───────────┘
//!            │
//!            ├──► RefreshClient        (refresh endpoint)
//!            ├──► TokenStore           (current credential pair)
//!            │         │
//!            │         └──► CredentialPersistence  (memory, keychain, ...)
//!            │
//!            └──► SessionEvents        (redirect + broadcast)
//! ```
//!
//! `AuthMiddleware` reads the store to attach bearer credentials;
//! `AuthStage` and `RefreshStage` plug both into the HTTP pipeline.

mod memory;
pub mod middleware;
pub mod refresh;
pub mod session;
pub mod token_store;

pub use memory::MemoryCredentialStore;
pub use middleware::{AuthMiddleware, AuthStage};
pub use refresh::{RefreshCoordinator, RefreshStage};
pub use session::{SessionEvent, SessionEvents};
pub use token_store::{CredentialStoreError, TokenStore};
