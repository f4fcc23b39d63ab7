//! Handler, dependency, parser and decoder hooks of the consume pipeline.

use crate::di::ContextRepo;
use crate::error::{BrokerError, Result};
use crate::message::Message;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Turns a raw transport message into a framework message.
pub type ParserFn = Arc<dyn Fn(Message) -> Result<Message> + Send + Sync>;

/// Produces the decoded body of a parsed message.
pub type DecoderFn = Arc<dyn Fn(&Message) -> Result<Value> + Send + Sync>;

/// Decoder used when no node configures one: JSON payloads are parsed,
/// anything else is left undecoded.
pub fn default_decode(message: &Message) -> Result<Option<Value>> {
    if message.is_json() {
        serde_json::from_slice(&message.payload)
            .map(Some)
            .map_err(|e| BrokerError::Deserialization(e.to_string()))
    } else {
        Ok(None)
    }
}

/// Consumer callback.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message, context: ContextRepo) -> Result<()>;
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub struct FnHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(Message, ContextRepo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnHandler {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F, Fut>
where
    F: Fn(Message, ContextRepo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, message: Message, context: ContextRepo) -> Result<()> {
        (self.f)(message, context).await
    }
}

/// Per-message dependency.
///
/// A resolved value is stored in the message scope under [`Dependency::name`].
#[async_trait]
pub trait Dependency: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(&self, message: &Message, context: &ContextRepo) -> Result<Option<Value>>;
}

/// Dependency backed by a synchronous closure.
pub struct FnDependency<F> {
    name: String,
    f: F,
}

impl<F> FnDependency<F>
where
    F: Fn(&Message, &ContextRepo) -> Result<Option<Value>> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Dependency for FnDependency<F>
where
    F: Fn(&Message, &ContextRepo) -> Result<Option<Value>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, message: &Message, context: &ContextRepo) -> Result<Option<Value>> {
        (self.f)(message, context)
    }
}
