// Write wrapper: run a remote write, then invalidate cache entries

use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

use super::key::QueryFilter;
use super::query_client::QueryClient;
use crate::database::remote::normalize::QueryError;

pub type MutationFn<I> =
    Arc<dyn Fn(I) -> BoxFuture<'static, Result<Value, QueryError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct MutationState {
    pub status: MutationStatus,
    pub data: Option<Value>,
    pub error: Option<QueryError>,
}

impl Default for MutationState {
    fn default() -> Self {
        Self {
            status: MutationStatus::Idle,
            data: None,
            error: None,
        }
    }
}

/// A reusable write operation bound to a cache.
///
/// Each `mutate` call runs the write; only a successful write invalidates
/// the configured filters. There is no retry.
pub struct Mutation<I> {
    client: QueryClient,
    mutation_fn: MutationFn<I>,
    invalidates: Vec<QueryFilter>,
    state: Arc<watch::Sender<MutationState>>,
}

impl<I> Clone for Mutation<I> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            mutation_fn: self.mutation_fn.clone(),
            invalidates: self.invalidates.clone(),
            state: self.state.clone(),
        }
    }
}

impl<I> Mutation<I> {
    pub fn new(client: QueryClient, mutation_fn: MutationFn<I>) -> Self {
        let (state, _) = watch::channel(MutationState::default());
        Self {
            client,
            mutation_fn,
            invalidates: Vec::new(),
            state: Arc::new(state),
        }
    }

    /// Invalidate entries matching `filter` after every successful write.
    pub fn invalidates(mut self, filter: QueryFilter) -> Self {
        self.invalidates.push(filter);
        self
    }

    pub async fn mutate(&self, input: I) -> Result<Value, QueryError> {
        self.state.send_modify(|s| {
            s.status = MutationStatus::Pending;
            s.error = None;
        });

        let result = (self.mutation_fn)(input).await;
        match &result {
            Ok(data) => {
                for filter in &self.invalidates {
                    self.client.invalidate_queries(filter);
                }
                let data = data.clone();
                self.state.send_modify(|s| {
                    s.status = MutationStatus::Success;
                    s.data = Some(data);
                });
            }
            Err(e) => {
                let error = e.clone();
                self.state.send_modify(|s| {
                    s.status = MutationStatus::Error;
                    s.error = Some(error);
                });
            }
        }
        result
    }

    pub fn state(&self) -> MutationState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState> {
        self.state.subscribe()
    }

    pub fn reset(&self) {
        self.state.send_replace(MutationState::default());
    }
}
