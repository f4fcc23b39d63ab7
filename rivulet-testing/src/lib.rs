//! Testing utilities for Rivulet.
//!
//! - **MockTransport** - in-memory transport with call counters and
//!   injectable failures
//! - **RecordingMiddleware** / **CallLog** - middleware ordering
//! - **RecordingHandler** - captured deliveries with `wait_for`
//! - **RecordingLogger** - captured broker log lines
//! - **Assertions** - published messages, acks and middleware order
//!
//! ```
//! use rivulet_core::{Broker, Message, Registrar, SubscriberOptions};
//! use rivulet_testing::*;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let transport = MockTransport::new();
//! let log = CallLog::new();
//! let handler = RecordingHandler::new();
//!
//! let mut broker = Broker::new(transport.clone());
//! broker.add_middleware(RecordingMiddleware::shared("outer", &log));
//! broker
//!     .subscriber(SubscriberOptions::new("orders"), handler.clone())
//!     .unwrap();
//!
//! broker.start().await.unwrap();
//! broker.publish(Message::new("orders", "hello")).await.unwrap();
//! assert!(handler.wait_for(1, Duration::from_secs(1)).await);
//!
//! assert_published(transport.memory(), "orders", 1);
//! assert_middleware_order(&log, "publish", &["outer"]);
//! broker.close().await.unwrap();
//! # });
//! ```

pub mod assertions;
pub mod mock;
pub mod recorder;

pub use assertions::*;
pub use mock::*;
pub use recorder::*;
