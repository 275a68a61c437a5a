//! A stampede-protected loading cache over a remote key/value store.
//!
//! `LoadingCache` sits between many concurrent readers and one expensive
//! loader (a database query, a remote call). It keeps the remote store
//! populated and shields the loader from bursts of misses.
//!
//! # Features
//! - **Early Refresh**: Entries about to expire are returned immediately and
//!   reloaded by a small pool of background workers.
//! - **Stampede Suppression**: A fixed array of striped locks lets only one
//!   caller schedule the refresh of a key, with bounded memory.
//! - **Backend Protection**: Every direct loader call passes a shared
//!   token-bucket limiter; excess requests get `None` instead of queueing.
//! - **Degraded Mode**: When the store is unreachable, values are loaded
//!   directly, still through the limiter.
//! - **Observability**: Lock-free counters exposed as a `MetricsSnapshot`,
//!   and `tracing` events for every failure path.

// Public modules that form the API
pub mod builder;
pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod handles;
pub mod loader;
pub mod metrics;
pub mod store;

// Internal, crate-only modules
mod guard;
mod limiter;
mod shared;
mod task;
mod time;

// Re-export the primary user-facing types for convenience
pub use builder::LoadingCacheBuilder;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use codec::EntryCodec;
pub use config::LoadingCacheConfig;
pub use entry::CachedEntry;
pub use error::{BoxError, BuildError, CodecError, LoadError, RefreshError, StoreError};
pub use handles::LoadingCache;
pub use loader::CacheLoader;
pub use metrics::MetricsSnapshot;
pub use store::{MemoryStore, RemoteStore};
