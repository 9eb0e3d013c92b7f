mod common;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use common::recorder;
use pretty_assertions::assert_eq;
use pubsub_connector::{
    adapter::MockAdapter,
    callback,
    connector::Accessor,
    props, publish_method, Component, ConnectedComponent, ConnectedProps, ConnectorOptions,
    MappingEntry, MountScope, OwnerId, Prop, Props, PubSub, PubSubConnector, PubSubError,
    PubSubProvider, PubSubResult, PublishMapping, PublishProps, SubscriptionMapping, Token,
    Transformer, Value,
};

#[derive(Debug, Default)]
struct Probe {
    renders: usize,
}

impl Component for Probe {
    type Output = ConnectedProps;

    fn display_name(&self) -> String {
        "Probe".to_string()
    }

    fn render(&mut self, props: &ConnectedProps) -> Self::Output {
        self.renders += 1;
        props.clone()
    }
}

fn connector(
    subscriptions: Option<SubscriptionMapping>,
    publish: Option<PublishMapping>,
    options: ConnectorOptions,
) -> PubSubConnector {
    PubSubConnector::new(subscriptions, publish, options).unwrap()
}

fn mount(
    connector: &PubSubConnector,
    own_props: Props,
    registry: &PubSub,
) -> ConnectedComponent<Probe> {
    connector
        .mount(Probe::default(), own_props, MountScope::with_registry(registry))
        .unwrap()
}

fn speaker(registry: &PubSub) -> pubsub_connector::Subscription {
    registry.register(&OwnerId::from("speaker")).unwrap()
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[test]
fn test_alias_sets_and_clears_prop() {
    let registry = PubSub::new();
    let connector = connector(
        Some(SubscriptionMapping::from_entries([("TALK", "lastMessage")])),
        None,
        ConnectorOptions::default(),
    );
    let mut conversation = mount(&connector, Props::new(), &registry);
    conversation.render();

    speaker(&registry)
        .publish("TALK", &[Value::from("hi")])
        .unwrap();
    assert_eq!(conversation.subscribed_props(), props([("lastMessage", "hi")]));
    assert!(conversation.needs_render());

    let rendered = conversation.render();
    assert_eq!(rendered.value("lastMessage"), Some(&Value::from("hi")));
    assert!(!conversation.needs_render());

    speaker(&registry).publish("TALK", &[Value::Null]).unwrap();
    assert!(conversation.subscribed_props().is_empty());
    assert!(!conversation.render().contains_key("lastMessage"));
}

#[test]
fn test_transformer_props_dependence() {
    let plain_calls = counter();
    let props_calls = counter();
    let plain = plain_calls.clone();
    let with_props = props_calls.clone();

    let mapping = SubscriptionMapping::from_entries([
        (
            "PLAIN",
            MappingEntry::from(Transformer::new(move |args| {
                plain.fetch_add(1, Ordering::SeqCst);
                Ok(props([("plain", args.first().cloned().unwrap_or_default())]))
            })),
        ),
        (
            "DECORATED",
            MappingEntry::from(Transformer::with_props(move |args, own| {
                with_props.fetch_add(1, Ordering::SeqCst);
                let prefix = own.get("prefix").and_then(Value::as_str).unwrap_or("");
                let msg = args.first().and_then(Value::as_str).unwrap_or("");
                Ok(props([("decorated", format!("{}{}", prefix, msg))]))
            })),
        ),
    ]);
    let registry = PubSub::new();
    let connector = connector(Some(mapping), None, ConnectorOptions::default());
    let mut c = mount(&connector, props([("prefix", "a:")]), &registry);

    let speaker = speaker(&registry);
    speaker.publish("PLAIN", &[Value::from("x")]).unwrap();
    speaker.publish("DECORATED", &[Value::from("y")]).unwrap();
    assert_eq!(plain_calls.load(Ordering::SeqCst), 1);
    assert_eq!(props_calls.load(Ordering::SeqCst), 1);
    assert_eq!(c.subscribed_props()["decorated"], Value::from("a:y"));
    c.render();

    assert!(c.receive_props(props([("prefix", "b:")])).unwrap());
    assert_eq!(plain_calls.load(Ordering::SeqCst), 1);
    assert_eq!(props_calls.load(Ordering::SeqCst), 2);
    assert_eq!(c.subscribed_props()["decorated"], Value::from("b:y"));
    assert_eq!(c.subscribed_props()["plain"], Value::from("x"));

    c.render();
    assert!(!c.receive_props(props([("prefix", "b:")])).unwrap());
    assert_eq!(props_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_props_dependent_transformer_waits_for_first_event() {
    let calls = counter();
    let c2 = calls.clone();
    let mapping = SubscriptionMapping::from_entries([(
        "DECORATED",
        Transformer::with_props(move |_, _| {
            c2.fetch_add(1, Ordering::SeqCst);
            Ok(props([("decorated", true)]))
        }),
    )]);
    let registry = PubSub::new();
    let mut c = mount(
        &connector(Some(mapping), None, ConnectorOptions::default()),
        props([("n", 0)]),
        &registry,
    );

    c.receive_props(props([("n", 1)])).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_props_independent_publish_mapping_is_computed_once() {
    let calls = counter();
    let c2 = calls.clone();
    let publish = PublishMapping::from_fn(move |publisher| {
        c2.fetch_add(1, Ordering::SeqCst);
        PublishProps::from([("publish".to_string(), Prop::from(publisher.clone()))])
    });
    let registry = PubSub::new();
    let mut c = mount(
        &connector(None, Some(publish), ConnectorOptions::default()),
        Props::new(),
        &registry,
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    for n in 0..3 {
        assert!(c.receive_props(props([("n", n)])).unwrap());
        c.render();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_props_dependent_publish_mapping_follows_props() {
    let calls = counter();
    let c2 = calls.clone();
    let publish = PublishMapping::from_fn_with_props(move |_, own| {
        c2.fetch_add(1, Ordering::SeqCst);
        let n = own.get("n").and_then(Value::as_i64).unwrap_or(-1);
        PublishProps::from([("label".to_string(), Prop::from(Value::from(format!("n={}", n))))])
    });
    let registry = PubSub::new();
    let mut c = mount(
        &connector(None, Some(publish), ConnectorOptions::default()),
        Props::new(),
        &registry,
    );

    for n in 0..3 {
        c.receive_props(props([("n", n)])).unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(
        c.render().value("label"),
        Some(&Value::from("n=2"))
    );
}

#[test]
fn test_equal_publish_props_are_kept() {
    let calls = counter();
    let c2 = calls.clone();
    let publish = PublishMapping::from_fn_with_props(move |publisher, _| {
        c2.fetch_add(1, Ordering::SeqCst);
        PublishProps::from([("publish".to_string(), Prop::from(publisher.clone()))])
    });
    let registry = PubSub::new();
    let mut c = mount(
        &connector(None, Some(publish), ConnectorOptions::default()),
        props([("n", 0)]),
        &registry,
    );
    let cached = c.publish_props().clone();
    let entry: *const Prop = &c.publish_props()["publish"];

    for n in 1..=3 {
        assert!(c.receive_props(props([("n", n)])).unwrap());
        c.render();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(c.publish_props(), &cached);
    // 同じ内容なら差し替えない
    assert!(std::ptr::eq(entry, &c.publish_props()["publish"]));
}

#[test]
fn test_failed_props_recompute_restores_own_props() {
    let mapping = SubscriptionMapping::from_entries([(
        "TALK",
        Transformer::with_props(|args, own| {
            if own.get("n") == Some(&Value::from(1)) {
                return Err(PubSubError::listener("TALK", "transient"));
            }
            Ok(props([("lastMessage", args.first().cloned().unwrap_or_default())]))
        }),
    )]);
    let registry = PubSub::new();
    let mut c = mount(
        &connector(Some(mapping), None, ConnectorOptions::default()),
        props([("n", 0)]),
        &registry,
    );
    speaker(&registry)
        .publish("TALK", &[Value::from("hi")])
        .unwrap();
    c.render();

    let err = c.receive_props(props([("n", 1)])).unwrap_err();
    assert!(matches!(err, PubSubError::Listener { .. }));
    assert_eq!(c.own_props(), props([("n", 0)]));
    assert!(c.needs_render());

    // 同じ props でも再計算される
    assert!(c.receive_props(props([("n", 1)])).is_err());
    assert!(c.receive_props(props([("n", 2)])).unwrap());
    assert_eq!(c.own_props(), props([("n", 2)]));
    assert_eq!(c.subscribed_props()["lastMessage"], Value::from("hi"));
}

#[test]
fn test_double_unmount_removes_subscriptions_once() {
    let mut adapter = MockAdapter::new();
    adapter
        .expect_subscribe()
        .times(2)
        .returning(|action, _| Ok(Token::new(action)));
    adapter.expect_unsubscribe().times(2).returning(|_| Ok(()));
    let registry = PubSub::with_adapter(Arc::new(adapter));

    let connector = connector(
        Some(SubscriptionMapping::from_entries([("A", "a"), ("B", "b")])),
        None,
        ConnectorOptions::default(),
    );
    let mut c = mount(&connector, Props::new(), &registry);
    assert_eq!(c.subscription().len(), 2);

    c.unmount().unwrap();
    c.unmount().unwrap();
    assert!(!c.is_mounted());
    drop(c);
    assert_eq!(registry.subscriber_count(), 0);
}

#[test]
fn test_drop_unmounts() {
    let registry = PubSub::new();
    let connector = connector(
        Some(SubscriptionMapping::from_entries([("TALK", "lastMessage")])),
        None,
        ConnectorOptions::default(),
    );
    let owner = mount(&connector, Props::new(), &registry).owner().clone();
    assert!(!registry.is_registered(&owner));
    // 購読が残っていなければ誰にも届かない
    assert!(speaker(&registry)
        .publish("TALK", &[Value::from("anyone?")])
        .is_ok());
}

#[test]
fn test_missing_registry() {
    let connector = connector(None, None, ConnectorOptions::default());
    let err = connector
        .mount(Probe::default(), Props::new(), MountScope::default())
        .unwrap_err();
    assert!(matches!(err, PubSubError::MissingRegistry { .. }));
    assert!(err.to_string().contains("PubSubConnector(Probe)"));
}

#[test]
fn test_mount_under_provider() {
    let provider = PubSubProvider::new(PubSub::new());
    let connector = connector(None, None, ConnectorOptions::default());
    let c = connector
        .mount(
            Probe::default(),
            Props::new(),
            MountScope::with_provider(&provider),
        )
        .unwrap();
    assert!(c.registry().ptr_eq(provider.core()));
    assert!(provider.core().is_registered(c.owner()));
}

#[test]
fn test_render_precedence() {
    let registry = PubSub::new();
    let publish = PublishMapping::from_fn(|_| {
        PublishProps::from([("c".to_string(), Prop::from("publish"))])
    });
    let connector = connector(
        Some(SubscriptionMapping::from_entries([("TALK", "b")])),
        Some(publish),
        ConnectorOptions::default(),
    );
    let mut c = mount(
        &connector,
        props([("a", "own"), ("b", "own"), ("c", "own")]),
        &registry,
    );
    speaker(&registry)
        .publish("TALK", &[Value::from("subscribed")])
        .unwrap();

    let rendered = c.render();
    assert_eq!(rendered.value("a"), Some(&Value::from("own")));
    assert_eq!(rendered.value("b"), Some(&Value::from("subscribed")));
    assert_eq!(rendered.value("c"), Some(&Value::from("publish")));
    assert!(rendered.pub_sub().ptr_eq(c.subscription()));
}

#[test]
fn test_default_publish_mapping_exposes_publisher() {
    let registry = PubSub::new();
    let (log, make) = recorder();
    speaker(&registry).add("TALK", make("listener")).unwrap();

    let mut c = mount(
        &connector(None, None, ConnectorOptions::default()),
        Props::new(),
        &registry,
    );
    let rendered = c.render();
    rendered
        .publisher("publish")
        .unwrap()
        .publish("TALK", &[Value::from("hey")])
        .unwrap();
    assert_eq!(
        *log.lock(),
        vec![("listener".to_string(), vec![Value::from("hey")])]
    );
}

#[test]
fn test_publish_methods() {
    let registry = PubSub::new();
    let (log, make) = recorder();
    speaker(&registry).add("TALK", make("listener")).unwrap();

    let publish = PublishMapping::methods([(
        "talk",
        publish_method(|publisher, args| publisher.publish("TALK", args)),
    )]);
    let c = mount(
        &connector(None, Some(publish), ConnectorOptions::default()),
        Props::new(),
        &registry,
    );
    let props = c.connected_props();
    assert!(props.publisher("publish").is_none());
    props
        .method("talk")
        .unwrap()
        .call(&[Value::map([("msg", "hi"), ("owner", "mat")])])
        .unwrap();
    assert_eq!(log.lock().len(), 1);
}

#[test]
fn test_initializer_mapping() {
    let init_calls = counter();
    let accessor_calls = counter();
    let init = init_calls.clone();
    let accessor_count = accessor_calls.clone();

    let mapping = SubscriptionMapping::initializer(move |subscription, notifier, own_props| {
        init.fetch_add(1, Ordering::SeqCst);
        subscription.add(
            "TALK",
            callback(move |args| {
                let owner = own_props.get().get("name").cloned().unwrap_or_default();
                notifier.notify(props([
                    ("lastMessage", args.first().cloned().unwrap_or_default()),
                    ("heardBy", owner),
                ]));
                Ok(())
            }),
        )?;
        let count = accessor_count.clone();
        let accessor: Accessor = Box::new(move |own: &Props| -> PubSubResult<Props> {
            count.fetch_add(1, Ordering::SeqCst);
            let name = own.get("name").and_then(Value::as_str).unwrap_or("nobody");
            Ok(props([("greeting", format!("hello {}", name))]))
        });
        Ok(accessor)
    });

    let registry = PubSub::new();
    let mut c = mount(
        &connector(Some(mapping), None, ConnectorOptions::default()),
        props([("name", "mat")]),
        &registry,
    );
    assert!(c.has_subscriptions());
    assert_eq!(init_calls.load(Ordering::SeqCst), 1);
    assert_eq!(accessor_calls.load(Ordering::SeqCst), 1);
    assert_eq!(c.subscribed_props(), props([("greeting", "hello mat")]));
    c.render();

    speaker(&registry)
        .publish("TALK", &[Value::from("hi")])
        .unwrap();
    assert_eq!(accessor_calls.load(Ordering::SeqCst), 1);
    assert!(c.needs_render());
    assert_eq!(c.subscribed_props()["lastMessage"], Value::from("hi"));
    assert_eq!(c.subscribed_props()["heardBy"], Value::from("mat"));

    c.receive_props(props([("name", "ste")])).unwrap();
    assert_eq!(init_calls.load(Ordering::SeqCst), 1);
    assert_eq!(accessor_calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        c.subscribed_props(),
        props([
            ("greeting", "hello ste"),
            ("lastMessage", "hi"),
            ("heardBy", "mat"),
        ])
    );
}

#[test]
fn test_failed_initializer_cleans_up() {
    let mapping = SubscriptionMapping::initializer(|subscription, _, _| {
        subscription.add("TALK", callback(|_| Ok(())))?;
        Err(PubSubError::listener("init", "not today"))
    });
    let registry = PubSub::new();
    let result = connector(Some(mapping), None, ConnectorOptions::default()).mount(
        Probe::default(),
        Props::new(),
        MountScope::with_registry(&registry),
    );
    assert!(result.is_err());
    assert_eq!(registry.subscriber_count(), 0);
}

#[test]
fn test_force_initial_values() {
    let mapping = || {
        SubscriptionMapping::from_entries([
            (
                "COUNT",
                MappingEntry::from(
                    Transformer::new(|args| Ok(props([("count", args.len() as i64)])))
                        .initial_values(vec![Value::from(1), Value::from(2)]),
                ),
            ),
            ("TALK", MappingEntry::alias("lastMessage")),
        ])
    };
    let registry = PubSub::new();

    let forced = mount(
        &connector(
            Some(mapping()),
            None,
            ConnectorOptions {
                force_initial_values: true,
                ..Default::default()
            },
        ),
        Props::new(),
        &registry,
    );
    assert_eq!(forced.subscribed_props(), props([("count", 2)]));

    let lazy = mount(
        &connector(Some(mapping()), None, ConnectorOptions::default()),
        Props::new(),
        &registry,
    );
    assert!(lazy.subscribed_props().is_empty());
}

#[test]
fn test_wrapped_instance_requires_with_ref() {
    let registry = PubSub::new();
    let c = mount(
        &connector(None, None, ConnectorOptions::default()),
        Props::new(),
        &registry,
    );
    assert_eq!(
        c.wrapped_instance().unwrap_err(),
        PubSubError::RefNotEnabled {
            connector: "PubSubConnector(Probe)".to_string()
        }
    );

    let mut c = mount(
        &connector(
            None,
            None,
            ConnectorOptions {
                with_ref: true,
                ..Default::default()
            },
        ),
        Props::new(),
        &registry,
    );
    c.render();
    c.render();
    assert_eq!(c.wrapped_instance().unwrap().renders, 2);
    c.wrapped_instance_mut().unwrap().renders = 0;
    assert_eq!(c.wrapped_instance().unwrap().renders, 0);
}

#[test]
fn test_empty_transformer_result_reaches_publisher() {
    let registry = PubSub::new();
    let _c = mount(
        &connector(
            Some(SubscriptionMapping::from_entries([(
                "TALK",
                Transformer::new(|_| Ok(Props::new())),
            )])),
            None,
            ConnectorOptions::default(),
        ),
        Props::new(),
        &registry,
    );
    let err = speaker(&registry).publish("TALK", &[]).unwrap_err();
    assert!(matches!(
        err,
        PubSubError::InvalidMappingResult { ref action, .. } if action == "TALK"
    ));
}

#[test]
fn test_own_props_disabled() {
    let calls = counter();
    let c2 = calls.clone();
    let mapping = SubscriptionMapping::from_entries([(
        "TALK",
        Transformer::with_props(move |_, own| {
            c2.fetch_add(1, Ordering::SeqCst);
            Ok(props([("seen", own.len() as i64)]))
        }),
    )]);
    let registry = PubSub::new();
    let mut c = mount(
        &connector(
            Some(mapping),
            None,
            ConnectorOptions {
                own_props: false,
                ..Default::default()
            },
        ),
        props([("x", 1)]),
        &registry,
    );

    speaker(&registry).publish("TALK", &[]).unwrap();
    assert_eq!(c.subscribed_props(), props([("seen", 0)]));

    c.receive_props(props([("x", 2)])).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_has_subscriptions() {
    let registry = PubSub::new();
    let none = mount(
        &connector(None, None, ConnectorOptions::default()),
        Props::new(),
        &registry,
    );
    assert!(!none.has_subscriptions());

    let mut mapped = mount(
        &connector(
            Some(SubscriptionMapping::from_entries([("TALK", "lastMessage")])),
            None,
            ConnectorOptions::default(),
        ),
        Props::new(),
        &registry,
    );
    assert!(mapped.has_subscriptions());
    mapped.unmount().unwrap();
    assert!(!mapped.has_subscriptions());
}

#[test]
fn test_events_after_unmount_are_ignored() {
    let registry = PubSub::new();
    let mut c = mount(
        &connector(
            Some(SubscriptionMapping::from_entries([("TALK", "lastMessage")])),
            None,
            ConnectorOptions::default(),
        ),
        Props::new(),
        &registry,
    );
    c.unmount().unwrap();
    speaker(&registry)
        .publish("TALK", &[Value::from("late")])
        .unwrap();
    assert!(c.subscribed_props().is_empty());
    assert!(!c.receive_props(props([("x", 1)])).unwrap());
}

#[test]
fn test_instances_do_not_share_state() {
    let registry = PubSub::new();
    let connector = connector(
        Some(SubscriptionMapping::from_entries([(
            "TALK",
            Transformer::with_props(|args, own| {
                let name = own.get("name").cloned().unwrap_or_default();
                Ok(props([
                    ("heardBy", name),
                    ("lastMessage", args.first().cloned().unwrap_or_default()),
                ]))
            }),
        )])),
        None,
        ConnectorOptions::default(),
    );
    let mat = mount(&connector, props([("name", "mat")]), &registry);
    let ste = mount(&connector, props([("name", "ste")]), &registry);
    assert_ne!(mat.owner(), ste.owner());

    speaker(&registry)
        .publish("TALK", &[Value::from("hi")])
        .unwrap();
    assert_eq!(mat.subscribed_props()["heardBy"], Value::from("mat"));
    assert_eq!(ste.subscribed_props()["heardBy"], Value::from("ste"));
}

struct Echo;

impl Component for Echo {
    type Output = PubSubResult<()>;

    fn render(&mut self, props: &ConnectedProps) -> Self::Output {
        if props.contains_key("heard") {
            return Ok(());
        }
        props.pub_sub().publish("ECHO", &[Value::from("once")])
    }
}

#[test]
fn test_notification_during_render_stays_pending() {
    let registry = PubSub::new();
    let connector = connector(
        Some(SubscriptionMapping::from_entries([("ECHO", "heard")])),
        None,
        ConnectorOptions::default(),
    );
    let mut echo = connector
        .mount(Echo, Props::new(), MountScope::with_registry(&registry))
        .unwrap();

    echo.render().unwrap();
    assert!(echo.needs_render());
    assert_eq!(echo.revision(), 1);

    echo.render().unwrap();
    assert!(!echo.needs_render());
}
