// Tests for router nesting and config composition

use async_trait::async_trait;
use rivulet_core::{
    Broker, BrokerMiddleware, BrokerOptions, ContextRepo, Describable, IncludeOptions,
    MemoryTransport, Message, Registrable, Registrar, Result, Router, Subscriber,
    SubscriberOptions, Visibility, handler_fn,
};
use std::sync::Arc;
use std::time::Duration;

struct Numbered(&'static str);

#[async_trait]
impl BrokerMiddleware for Numbered {
    fn name(&self) -> &str {
        self.0
    }
}

fn declare(node: &mut impl Registrar, subject: &str) -> Arc<Subscriber> {
    node.subscriber(
        SubscriberOptions::new(subject),
        handler_fn(|_msg: Message, _ctx: ContextRepo| async { Ok(()) }),
    )
    .unwrap()
}

fn middleware_names(subscriber: &Subscriber) -> Vec<String> {
    subscriber
        .outer_config()
        .unwrap()
        .middlewares
        .iter()
        .map(|m| m.name().to_string())
        .collect()
}

#[test]
fn test_prefix_concatenation_under_nesting() {
    let mut broker = Broker::new(MemoryTransport::new());
    let mut a = Router::new().prefix("1.");
    let mut b = Router::new();
    let mut c = Router::new().prefix("5.");

    let in_b = declare(&mut b, "b");
    let in_c = declare(&mut c, "c");

    b.include_router_with(&c, IncludeOptions::new().prefix("4."));
    a.include_router(&b);
    broker.include_router(&a);

    assert_eq!(in_b.outer_config().unwrap().prefix, "1.");
    assert_eq!(in_c.outer_config().unwrap().prefix, "1.4.5.");
    assert_eq!(broker.subscribers().len(), 2);
}

#[test]
fn test_middleware_concatenation_order() {
    let mut broker = Broker::new(MemoryTransport::new());
    broker.add_middleware(Arc::new(Numbered("1")));
    let mut router = Router::new().middleware(Arc::new(Numbered("2")));
    let mut router2 = Router::new().middleware(Arc::new(Numbered("3")));

    let subscriber = declare(&mut router2, "orders");
    router.include_router(&router2);
    broker.include_router(&router);

    assert_eq!(middleware_names(&subscriber), ["1", "2", "3"]);
}

#[test]
fn test_include_middleware_override() {
    let mut broker = Broker::new(MemoryTransport::new());
    broker.add_middleware(Arc::new(Numbered("1")));
    let mut router = Router::new().middleware(Arc::new(Numbered("3")));
    let subscriber = declare(&mut router, "orders");

    broker.include_router_with(
        &router,
        IncludeOptions::new().middleware(Arc::new(Numbered("2"))),
    );

    assert_eq!(middleware_names(&subscriber), ["1", "2", "3"]);
}

#[test]
fn test_visibility_table() {
    use Visibility::*;

    let cases = [
        (Hidden, Visible, false),
        (Visible, Visible, true),
        (Unset, Visible, true),
        (Hidden, Hidden, false),
        (Visible, Hidden, false),
        (Unset, Hidden, false),
    ];

    for (child, include, expected) in cases {
        let mut broker = Broker::new(MemoryTransport::new());
        let mut router = Router::new().include_in_schema(child);
        let subscriber = declare(&mut router, "orders");

        broker.include_router_with(&router, IncludeOptions::new().include_in_schema(include));

        let resolved = subscriber.outer_config().unwrap().include_in_schema;
        assert_eq!(
            resolved.is_visible(),
            expected,
            "child {:?}, include {:?}",
            child,
            include
        );
        assert_eq!(subscriber.describe().is_some(), expected);
        assert_eq!(broker.describe().endpoints.len(), usize::from(expected));
    }
}

#[test]
fn test_graceful_timeout_reaches_deep_leaf() {
    let mut broker = Broker::with_options(
        MemoryTransport::new(),
        BrokerOptions::new().graceful_timeout(Duration::from_secs(10)),
    );
    let mut first = Router::new();
    let mut second = Router::new();
    let mut third = Router::new().graceful_timeout(Duration::from_secs(1));
    let leaf = declare(&mut third, "leaf");

    second.include_router(&third);
    first.include_router(&second);
    broker.include_router(&first);

    assert_eq!(
        leaf.outer_config().unwrap().graceful_timeout,
        Some(Duration::from_secs(10))
    );
}

#[test]
fn test_include_routers_follows_argument_order() {
    let mut broker = Broker::new(MemoryTransport::new());
    let mut left = Router::new().prefix("left.");
    let mut right = Router::new().prefix("right.");
    declare(&mut left, "a");
    declare(&mut right, "b");

    broker.include_routers([&right, &left]);

    let subjects: Vec<String> = broker.subscribers().iter().map(|s| s.subject()).collect();
    assert_eq!(subjects, ["right.b", "left.a"]);
}

#[test]
fn test_endpoints_share_broker_state_after_include() {
    let mut broker = Broker::new(MemoryTransport::new());
    let mut router = Router::new();
    let subscriber = declare(&mut router, "orders");

    broker.include_router(&router);

    let config = subscriber.outer_config().unwrap();
    assert!(Arc::ptr_eq(&config.state.get(), &broker.state()));
    assert!(Arc::ptr_eq(&config.producer, &broker.producer()));
}

#[tokio::test]
async fn test_unmounted_endpoint_fails_fast() {
    let mut router = Router::new();
    let subscriber = declare(&mut router, "orders");

    let state = subscriber.outer_config().unwrap().state.get();
    assert!(state.logger().unwrap_err().is_incorrect_state());
    assert!(state.di().unwrap_err().is_incorrect_state());

    let err = subscriber
        .consume(Message::new("orders", "x"))
        .await
        .unwrap_err();
    assert!(err.is_incorrect_state());
}

#[tokio::test]
async fn test_include_dependencies_run_before_handler() {
    use rivulet_core::FnDependency;

    let mut broker = Broker::new(MemoryTransport::new());
    let mut router = Router::new();
    let seen = Arc::new(parking_lot::Mutex::new(None));
    let sink = seen.clone();
    let subscriber = router
        .subscriber(
            SubscriberOptions::new("orders"),
            handler_fn(move |_msg: Message, ctx: ContextRepo| {
                let sink = sink.clone();
                async move {
                    *sink.lock() = ctx.get("tenant");
                    Result::Ok(())
                }
            }),
        )
        .unwrap();

    broker.include_router_with(
        &router,
        IncludeOptions::new().dependency(Arc::new(FnDependency::new(
            "tenant",
            |msg: &Message, _ctx: &ContextRepo| {
                Ok(msg.headers.get("tenant").cloned().map(Into::into))
            },
        ))),
    );

    subscriber
        .consume(Message::new("orders", "x").with_header("tenant", "acme"))
        .await
        .unwrap();
    assert_eq!(*seen.lock(), Some(serde_json::json!("acme")));
}
