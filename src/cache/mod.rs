//! Client-side query cache: keyed async results, observers and mutations.

pub mod key;
pub mod mutation;
pub mod query_client;

pub use key::{KeyPart, QueryFilter, QueryKey};
pub use mutation::{Mutation, MutationFn, MutationState, MutationStatus};
pub use query_client::{QueryClient, QueryFn, QueryObserver, QueryState, QueryStatus};
