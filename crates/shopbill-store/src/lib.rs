//! # shopbill-store: Device Storage for shopbill
//!
//! Persists what must survive an app restart: the access token, the refresh
//! token and the cached user. Business records stay on the backend.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SessionManager (shopbill-client)                                       │
//! │       │  get / set / remove_many                                        │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 shopbill-store (THIS CRATE)                     │   │
//! │  │   Store (pool.rs) ──► KvRepository ──► session_kv table         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  <data dir>/shopbill.db                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shopbill_store::{Store, StoreConfig};
//!
//! let store = Store::open(StoreConfig::in_dir(data_dir)).await?;
//! store.kv().set("token", &token).await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{StoreError, StoreResult};
pub use pool::{Store, StoreConfig};
pub use repository::kv::KvRepository;
