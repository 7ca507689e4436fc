//! # shopbill-client: Backend Access and Session Lifecycle
//!
//! Talks to the shopbill REST backend and owns the device's session: whether
//! the stored credentials are still good, refreshing them once when they are
//! not, and clearing them when nothing can be salvaged.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Screens / CLI                                                          │
//! │       │ flags() / subscribe()            │ bills(), checkout(), ...     │
//! │       ▼                                  ▼                              │
//! │  ┌──────────────────────┐        ┌──────────────────────┐               │
//! │  │   SessionManager     │◄───────│       ShopApi        │               │
//! │  │   (session.rs)       │  401   │   (resources.rs)     │               │
//! │  └───┬──────────────┬───┘        └──────────┬───────────┘               │
//! │      │ AuthBackend  │ SessionStore          │                           │
//! │      ▼              ▼                       ▼                           │
//! │  ┌──────────┐  ┌──────────────┐     ┌──────────────┐                    │
//! │  │ ApiClient│  │ KvRepository │     │  ApiClient   │──► REST backend    │
//! │  │ (api.rs) │  │ MemoryStore  │     │  (api.rs)    │                    │
//! │  └──────────┘  └──────────────┘     └──────────────┘                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Typed REST client (reqwest)
//! - [`config`] - Client configuration (TOML file + environment)
//! - [`session`] - Session bootstrap, login, logout
//! - [`resources`] - Authenticated resource calls with 401 recovery
//! - [`storage`] - Session key-value seam
//! - [`error`] - Client error type

pub mod api;
pub mod config;
pub mod error;
pub mod resources;
pub mod session;
pub mod storage;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use resources::ShopApi;
pub use session::{AuthBackend, SessionManager};
pub use storage::{MemoryStore, SessionStore};
