//! Cached CRUD hooks over Supabase tables.
//!
//! A [`ResourceContext`] pairs a remote backend with a [`QueryClient`]. Each
//! table gets a [`ResourceHooks`] exposing `list`, `get`, `create`, `update`
//! and `delete`; reads are cached under `[table]` / `[table, id]` and writes
//! invalidate the list entry once they succeed.

pub mod cache;
pub mod config;
pub mod database;
pub mod models;
pub mod provider;
pub mod services;

pub use cache::{Mutation, QueryClient, QueryKey, QueryObserver, QueryState, QueryStatus};
pub use config::{CacheConfig, InvalidationScope, SupabaseConfig};
pub use database::{from_supabase, MemoryBackend, QueryError, Row, SupabaseClient, TableBackend};
pub use provider::ResourceContext;
pub use services::ResourceHooks;
