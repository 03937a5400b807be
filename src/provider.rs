//! The shared backend + cache pair every hook call site draws from.
//!
//! Build one [`ResourceContext`] at application start and either pass it
//! around or install it with [`ResourceContext::scope`]. Tests build their
//! own contexts, so no state leaks between them.

use std::future::Future;
use std::sync::Arc;

use crate::cache::QueryClient;
use crate::config::{CacheConfig, SupabaseConfig};
use crate::database::remote::common::SupabaseClient;
use crate::database::remote::query::{from_table, QueryBuilder, TableBackend};
use crate::models::{BARS, EVENTS, FOOS, VENUES};
use crate::services::resources::ResourceHooks;

tokio::task_local! {
    static CONTEXT: ResourceContext;
}

#[derive(Clone)]
pub struct ResourceContext {
    backend: Arc<dyn TableBackend>,
    query_client: QueryClient,
}

impl ResourceContext {
    pub fn new(backend: Arc<dyn TableBackend>, query_client: QueryClient) -> Self {
        Self {
            backend,
            query_client,
        }
    }

    /// Context talking to the hosted project described by `config`.
    pub fn connect(config: &SupabaseConfig, cache: CacheConfig) -> Self {
        log::info!("using Supabase project at {}", config.project_url);
        Self::new(
            Arc::new(SupabaseClient::from_config(config)),
            QueryClient::new(cache),
        )
    }

    pub fn backend(&self) -> &Arc<dyn TableBackend> {
        &self.backend
    }

    pub fn query_client(&self) -> &QueryClient {
        &self.query_client
    }

    /// Raw query builder, bypassing the cache.
    pub fn from(&self, table: &str) -> QueryBuilder {
        from_table(&self.backend, table)
    }

    pub fn resource(&self, name: &str) -> ResourceHooks {
        ResourceHooks::new(name, self)
    }

    pub fn foos(&self) -> ResourceHooks {
        self.resource(FOOS)
    }

    pub fn bars(&self) -> ResourceHooks {
        self.resource(BARS)
    }

    pub fn events(&self) -> ResourceHooks {
        self.resource(EVENTS)
    }

    pub fn venues(&self) -> ResourceHooks {
        self.resource(VENUES)
    }

    /// Run `future` with this context installed for [`ResourceContext::current`].
    ///
    /// The context is task-local: tasks spawned from inside the scope do not
    /// inherit it.
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        CONTEXT.scope(self, future).await
    }

    /// The context installed by the enclosing [`ResourceContext::scope`].
    pub fn current() -> Option<Self> {
        CONTEXT.try_with(|ctx| ctx.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::remote::memory::MemoryBackend;
    use crate::models::TABLES;
    use serde_json::json;

    fn memory_context() -> ResourceContext {
        ResourceContext::new(
            Arc::new(MemoryBackend::with_tables(&TABLES)),
            QueryClient::default(),
        )
    }

    #[tokio::test]
    async fn current_is_only_visible_inside_scope() {
        assert!(ResourceContext::current().is_none());

        let ctx = memory_context();
        let seen = ctx
            .scope(async { ResourceContext::current().map(|c| c.foos().name().to_string()) })
            .await;
        assert_eq!(seen.as_deref(), Some("foos"));

        assert!(ResourceContext::current().is_none());
    }

    #[tokio::test]
    async fn contexts_do_not_share_caches() {
        let a = memory_context();
        let b = memory_context();

        a.foos().fetch_list().await.unwrap();
        assert_eq!(a.query_client().len(), 1);
        assert!(b.query_client().is_empty());
    }

    #[tokio::test]
    async fn raw_builder_bypasses_the_cache() {
        let ctx = memory_context();
        let response = ctx.from("bars").select("*").execute().await;
        assert_eq!(response.data, Some(json!([])));
        assert!(ctx.query_client().is_empty());
    }

    #[test]
    fn convenience_constructors_cover_every_table() {
        let ctx = memory_context();
        let names: Vec<String> = [ctx.foos(), ctx.bars(), ctx.events(), ctx.venues()]
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, TABLES);
    }
}
