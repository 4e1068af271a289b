//! Named pipelines and the middleware chain
//!
//! A pipeline is a registered async function from a [`PipelineContext`] to a
//! JSON value. Before a pipeline runs, every registered middleware sees the
//! context in registration order and may return a replacement context or
//! nothing to keep the current one. Both pipelines and middleware receive the
//! owning [`Crawler`] as an explicit handle; composition is plain functions,
//! not inheritance.
//!
//! Any failure inside middleware or the pipeline body is re-wrapped as a
//! `Pipeline`-kind error that names the pipeline and preserves the original
//! failure as its source. Nothing is ever silently dropped.

use crate::crawler::Crawler;
use crate::error::{CrawlError, ErrorKind};
use crate::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, RwLock};

/// Ordered, extensible field map threaded through middleware into a pipeline
///
/// Created per invocation and discarded at its return; never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineContext {
    fields: BTreeMap<String, Value>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }
}

type PipelineFn =
    Arc<dyn Fn(Arc<Crawler>, PipelineContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

type MiddlewareFn = Arc<
    dyn Fn(Arc<Crawler>, PipelineContext) -> BoxFuture<'static, Result<Option<PipelineContext>>>
        + Send
        + Sync,
>;

/// Registry of named pipelines and the ordered middleware chain
#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: RwLock<HashMap<String, PipelineFn>>,
    middleware: RwLock<Vec<MiddlewareFn>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pipeline under `name`, replacing any previous registration
    pub fn add_pipeline<F, Fut>(&self, name: impl Into<String>, pipeline: F)
    where
        F: Fn(Arc<Crawler>, PipelineContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let pipeline: PipelineFn = Arc::new(move |crawler, ctx| Box::pin(pipeline(crawler, ctx)));
        self.pipelines
            .write()
            .unwrap()
            .insert(name.into(), pipeline);
    }

    /// Appends a middleware to the chain; middleware run in registration
    /// order before every pipeline
    pub fn use_middleware<F, Fut>(&self, middleware: F)
    where
        F: Fn(Arc<Crawler>, PipelineContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<PipelineContext>>> + Send + 'static,
    {
        let middleware: MiddlewareFn =
            Arc::new(move |crawler, ctx| Box::pin(middleware(crawler, ctx)));
        self.middleware.write().unwrap().push(middleware);
    }

    pub fn pipeline_names(&self) -> Vec<String> {
        self.pipelines.read().unwrap().keys().cloned().collect()
    }

    pub fn middleware_count(&self) -> usize {
        self.middleware.read().unwrap().len()
    }

    /// Runs the middleware chain and the named pipeline over `initial`
    pub async fn execute(
        &self,
        crawler: Arc<Crawler>,
        name: &str,
        initial: PipelineContext,
    ) -> Result<Value> {
        let pipeline = self
            .pipelines
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| {
                CrawlError::new(
                    ErrorKind::Pipeline,
                    format!("no pipeline registered under '{}'", name),
                )
                .with_metadata("pipeline", Value::String(name.to_string()))
                .with_retryable(false)
            })?;

        let middleware: Vec<MiddlewareFn> = self.middleware.read().unwrap().clone();

        let mut ctx = initial;
        for stage in middleware {
            match stage(crawler.clone(), ctx.clone()).await {
                // A middleware may hand back a full replacement context
                Ok(Some(next)) => ctx = next,
                // ... or nothing, keeping the current context unchanged
                Ok(None) => {}
                Err(err) => return Err(wrap_pipeline_error(name, err)),
            }
        }

        tracing::debug!(pipeline = name, "executing pipeline");
        pipeline(crawler, ctx)
            .await
            .map_err(|err| wrap_pipeline_error(name, err))
    }
}

/// Re-wraps a middleware or pipeline-body failure, naming the pipeline and
/// keeping the original error as nested diagnostics
fn wrap_pipeline_error(name: &str, cause: CrawlError) -> CrawlError {
    let retryable = cause.retryable;
    CrawlError::new(
        ErrorKind::Pipeline,
        format!("pipeline '{}' failed: {}", name, cause.message),
    )
    .with_metadata("pipeline", Value::String(name.to_string()))
    .with_metadata(
        "original-error",
        serde_json::json!({
            "kind": cause.kind.to_string(),
            "message": cause.message,
        }),
    )
    .with_retryable(retryable)
    .with_source(cause)
}
