//! # Repository Module
//!
//! SQL lives in repositories; callers never touch the pool directly.
//!
//! - [`kv::KvRepository`] - Session key-value storage

pub mod kv;
