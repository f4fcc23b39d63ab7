// Middleware system for consumed and published messages

use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::trace;

/// Boxed future returned by the chain.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The rest of the chain after the current middleware
pub type Next = Box<dyn FnOnce(Message) -> BoxFuture<Result<()>> + Send>;

/// Terminal step of a chain
pub type HandlerFn = Arc<dyn Fn(Message) -> BoxFuture<Result<()>> + Send + Sync>;

/// Middleware wrapping message consumption and publication.
///
/// Both hooks default to passing the message through unchanged.
#[async_trait]
pub trait BrokerMiddleware: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn on_consume(&self, message: Message, next: Next) -> Result<()> {
        next(message).await
    }

    async fn on_publish(&self, message: Message, next: Next) -> Result<()> {
        next(message).await
    }
}

/// Which hook a chain drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Consume,
    Publish,
}

/// Middleware chain executor.
///
/// The first middleware is the outermost; the last runs nearest to the
/// terminal handler.
#[derive(Clone)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn BrokerMiddleware>>>,
    direction: Direction,
}

impl MiddlewareChain {
    pub fn new(middlewares: Vec<Arc<dyn BrokerMiddleware>>, direction: Direction) -> Self {
        Self {
            middlewares: Arc::new(middlewares),
            direction,
        }
    }

    pub fn consume(middlewares: Vec<Arc<dyn BrokerMiddleware>>) -> Self {
        Self::new(middlewares, Direction::Consume)
    }

    pub fn publish(middlewares: Vec<Arc<dyn BrokerMiddleware>>) -> Self {
        Self::new(middlewares, Direction::Publish)
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run `message` through every middleware, then `handler`.
    pub async fn apply(&self, message: Message, handler: HandlerFn) -> Result<()> {
        trace!(
            middleware_count = self.middlewares.len(),
            subject = %message.subject,
            direction = ?self.direction,
            "Executing middleware chain"
        );
        self.execute_from(0, message, handler).await
    }

    fn execute_from(
        &self,
        index: usize,
        message: Message,
        handler: HandlerFn,
    ) -> BoxFuture<Result<()>> {
        let Some(middleware) = self.middlewares.get(index).cloned() else {
            return handler(message);
        };
        let chain = self.clone();
        let next: Next = Box::new(move |message| chain.execute_from(index + 1, message, handler));

        let direction = self.direction;
        Box::pin(async move {
            match direction {
                Direction::Consume => middleware.on_consume(message, next).await,
                Direction::Publish => middleware.on_publish(message, next).await,
            }
        })
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::consume(Vec::new())
    }
}
