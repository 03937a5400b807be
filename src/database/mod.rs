pub mod remote;

pub use remote::common::SupabaseClient;
pub use remote::memory::MemoryBackend;
pub use remote::normalize::{from_supabase, QueryError};
pub use remote::query::{PostgrestError, QueryBuilder, QueryResponse, Row, TableBackend};
