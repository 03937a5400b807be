//! Generic per-resource CRUD hooks
//!
//! One [`ResourceHooks`] value covers a single remote table and hands out
//! the five operations every table gets:
//!
//! | operation | cache effect                       |
//! |-----------|------------------------------------|
//! | `list`    | observes `[R]`                     |
//! | `get`     | observes `[R, id]`                 |
//! | `create`  | invalidates `[R]` on success       |
//! | `update`  | invalidates `[R]` on success       |
//! | `delete`  | invalidates `[R]` on success       |
//!
//! With [`InvalidationScope::ListOnly`] (the default) writes leave
//! `[R, id]` entries alone, so an item observer can keep showing a row that
//! was just updated or deleted until it is refetched some other way.

use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::{
    Mutation, MutationFn, QueryClient, QueryFilter, QueryFn, QueryKey, QueryObserver,
};
use crate::config::InvalidationScope;
use crate::database::remote::normalize::{from_supabase, QueryError};
use crate::database::remote::query::{from_table, Row, TableBackend};
use crate::provider::ResourceContext;

#[derive(Clone)]
pub struct ResourceHooks {
    name: String,
    id_column: String,
    backend: Arc<dyn TableBackend>,
    client: QueryClient,
}

impl ResourceHooks {
    pub fn new(name: &str, context: &ResourceContext) -> Self {
        Self {
            name: name.to_string(),
            id_column: "id".to_string(),
            backend: context.backend().clone(),
            client: context.query_client().clone(),
        }
    }

    /// Filter get/update/delete on `column` instead of `id`.
    pub fn with_id_column(mut self, column: &str) -> Self {
        self.id_column = column.to_string();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn list_key(&self) -> QueryKey {
        QueryKey::new(self.name.as_str())
    }

    pub fn item_key(&self, id: i64) -> QueryKey {
        self.list_key().with(id)
    }

    fn write_filter(&self) -> QueryFilter {
        match self.client.config().invalidation {
            InvalidationScope::ListOnly => QueryFilter::exact(self.list_key()),
            InvalidationScope::Resource => QueryFilter::prefix(self.list_key()),
        }
    }

    fn list_fn(&self) -> QueryFn {
        let backend = self.backend.clone();
        let table = self.name.clone();
        Arc::new(move || from_supabase(from_table(&backend, &table).select("*").execute()).boxed())
    }

    fn item_fn(&self, id: i64) -> QueryFn {
        let backend = self.backend.clone();
        let table = self.name.clone();
        let id_column = self.id_column.clone();
        Arc::new(move || {
            let query = from_table(&backend, &table)
                .select("*")
                .eq(&id_column, id)
                .single();
            from_supabase(query.execute()).boxed()
        })
    }

    /// Observe every row of the table, in the order the store returns them.
    pub fn list(&self) -> QueryObserver {
        self.client.subscribe(self.list_key(), self.list_fn())
    }

    /// Observe the single row whose id column equals `id`.
    ///
    /// The entry ends in an error state when zero or several rows match.
    pub fn get(&self, id: i64) -> QueryObserver {
        self.client.subscribe(self.item_key(id), self.item_fn(id))
    }

    /// One-shot read of the list through the cache.
    pub async fn fetch_list(&self) -> Result<Value, QueryError> {
        self.client.fetch_query(self.list_key(), self.list_fn()).await
    }

    /// One-shot read of a single row through the cache.
    pub async fn fetch(&self, id: i64) -> Result<Value, QueryError> {
        self.client.fetch_query(self.item_key(id), self.item_fn(id)).await
    }

    /// Insert one row (without id); resolves to the inserted rows.
    pub fn create(&self) -> Mutation<Row> {
        let backend = self.backend.clone();
        let table = self.name.clone();
        let mutation_fn: MutationFn<Row> = Arc::new(move |row: Row| {
            from_supabase(from_table(&backend, &table).insert(vec![row]).execute()).boxed()
        });
        Mutation::new(self.client.clone(), mutation_fn).invalidates(self.write_filter())
    }

    /// Update the row matching the payload's id with the payload's fields.
    ///
    /// Columns absent from the payload keep their stored values.
    pub fn update(&self) -> Mutation<Row> {
        let backend = self.backend.clone();
        let table = self.name.clone();
        let id_column = self.id_column.clone();
        let mutation_fn: MutationFn<Row> = Arc::new(move |row: Row| {
            let id = match row.get(&id_column) {
                Some(id) if !id.is_null() => id.clone(),
                _ => {
                    let message = format!("Update on {} is missing `{}`", table, id_column);
                    log::error!("{}", message);
                    return async move { Err(QueryError::new(message)) }.boxed();
                }
            };
            let query = from_table(&backend, &table).update(row).eq(&id_column, id);
            from_supabase(query.execute()).boxed()
        });
        Mutation::new(self.client.clone(), mutation_fn).invalidates(self.write_filter())
    }

    /// Delete the row whose id column equals the input.
    pub fn delete(&self) -> Mutation<i64> {
        let backend = self.backend.clone();
        let table = self.name.clone();
        let id_column = self.id_column.clone();
        let mutation_fn: MutationFn<i64> = Arc::new(move |id: i64| {
            from_supabase(from_table(&backend, &table).delete().eq(&id_column, id).execute())
                .boxed()
        });
        Mutation::new(self.client.clone(), mutation_fn).invalidates(self.write_filter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryStatus;
    use crate::config::CacheConfig;
    use crate::database::remote::memory::MemoryBackend;
    use crate::models::{Foo, FOOS};
    use serde_json::json;
    use std::time::Duration;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn context(config: CacheConfig) -> (Arc<MemoryBackend>, ResourceContext) {
        let memory = Arc::new(MemoryBackend::with_tables(&[FOOS]));
        memory.seed(
            FOOS,
            vec![
                row(json!({ "id": 1, "title": "Kickoff", "date": "2023-12-01" })),
                row(json!({ "id": 2, "title": "Retro", "date": "2023-12-15" })),
            ],
        );
        let ctx = ResourceContext::new(memory.clone(), QueryClient::new(config));
        (memory, ctx)
    }

    fn long_lived() -> CacheConfig {
        CacheConfig {
            stale_time: Duration::from_secs(60),
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn keys_follow_resource_name() {
        let (_, ctx) = context(CacheConfig::default());
        let foos = ctx.foos();
        assert_eq!(foos.list_key().to_string(), "[foos]");
        assert_eq!(foos.item_key(4).to_string(), "[foos, 4]");
    }

    #[tokio::test]
    async fn get_decodes_into_typed_rows() {
        let (_, ctx) = context(CacheConfig::default());
        let mut observer = ctx.foos().get(2);
        observer.settled().await;
        let foo: Foo = observer.data_as().unwrap().unwrap();
        assert_eq!(
            foo,
            Foo {
                id: 2,
                title: "Retro".into(),
                date: "2023-12-15".into()
            }
        );
    }

    #[tokio::test]
    async fn update_without_id_fails_before_reaching_the_store() {
        let (memory, ctx) = context(CacheConfig::default());
        let err = ctx
            .foos()
            .update()
            .mutate(row(json!({ "title": "Nameless" })))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Update on foos is missing `id`");
        assert!(memory.rows(FOOS).iter().all(|r| r["title"] != json!("Nameless")));
    }

    #[tokio::test]
    async fn list_only_scope_leaves_item_entries_stale() {
        let (_, ctx) = context(long_lived());
        let foos = ctx.foos();
        let mut item = foos.get(1);
        item.settled().await;

        foos.update()
            .mutate(row(json!({ "id": 1, "title": "Renamed" })))
            .await
            .unwrap();

        let state = item.state();
        assert!(!state.is_invalidated);
        assert_eq!(state.data.unwrap()["title"], json!("Kickoff"));
    }

    #[tokio::test]
    async fn resource_scope_refreshes_item_entries() {
        let (_, ctx) = context(CacheConfig {
            invalidation: InvalidationScope::Resource,
            ..long_lived()
        });
        let foos = ctx.foos();
        let mut item = foos.get(1);
        item.settled().await;

        foos.update()
            .mutate(row(json!({ "id": 1, "title": "Renamed" })))
            .await
            .unwrap();

        let state = item.settled().await;
        assert_eq!(state.data.unwrap()["title"], json!("Renamed"));
    }

    #[tokio::test]
    async fn custom_id_column_drives_filters() {
        let memory = Arc::new(MemoryBackend::with_tables(&["venues"]).with_id_column("venue_id"));
        memory.seed("venues", vec![row(json!({ "venue_id": 10, "name": "Hall" }))]);
        let ctx = ResourceContext::new(memory.clone(), QueryClient::default());
        let venues = ctx.venues().with_id_column("venue_id");

        assert_eq!(venues.fetch(10).await.unwrap()["name"], json!("Hall"));
        venues.delete().mutate(10).await.unwrap();
        assert!(memory.rows("venues").is_empty());

        let mut gone = venues.get(10);
        assert_eq!(gone.settled().await.status, QueryStatus::Error);
    }
}
