// Remote table access for the hosted Supabase project
//
// Every backend speaks the same small PostgREST subset:
// - select with an optional column list
// - insert / update / delete
// - equality filters, AND-ed together
// - single-row coercion (exactly one row or an error)
//
// Results always come back as a `{data, error}` pair (`QueryResponse`);
// `normalize::from_supabase` is the only place that turns an error response
// into a Rust `Err`.

pub mod common;
pub mod memory;
pub mod normalize;
pub mod query;
