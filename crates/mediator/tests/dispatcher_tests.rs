//! Dispatcher behaviour tests
//!
//! Registration rules, delivery, after-event chaining and ordering.

use std::fmt;
use std::time::Duration;

use mediator::{Delivery, DispatchError, Dispatcher, DispatcherConfig, Inbox};
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Name {
    Save,
    Invalidate,
    Unbound,
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::Save => write!(f, "item.save"),
            Name::Invalidate => write!(f, "cache.invalidate"),
            Name::Unbound => write!(f, "unbound"),
        }
    }
}

type TestDispatcher = Dispatcher<Name, u32>;

async fn next(rx: &mut mpsc::Receiver<Delivery<Name, u32>>) -> Delivery<Name, u32> {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Timeout waiting for delivery")
        .expect("Inbox closed")
}

async fn assert_silent(rx: &mut mpsc::Receiver<Delivery<Name, u32>>) {
    assert!(
        timeout(Duration::from_millis(100), rx.recv()).await.is_err(),
        "listener should not receive anything"
    );
}

#[tokio::test]
async fn test_dispatch_delivers_to_bound_listener() {
    let dispatcher = TestDispatcher::new();
    let (inbox, mut rx) = Inbox::<Name, u32>::new(8);

    dispatcher.register(inbox, &[Name::Save]).unwrap();
    dispatcher.dispatch(Name::Save, 42).await.unwrap();

    let delivery = next(&mut rx).await;
    assert_eq!(delivery, Delivery { name: Name::Save, payload: 42 });
}

#[tokio::test]
async fn test_dispatch_to_unregistered_name_fails_without_delivery() {
    let dispatcher = TestDispatcher::new();
    let (inbox, mut rx) = Inbox::<Name, u32>::new(8);
    dispatcher.register(inbox, &[Name::Save]).unwrap();

    let result = dispatcher.dispatch(Name::Unbound, 1).await;

    assert_eq!(result, Err(DispatchError::NotRegistered("unbound".to_string())));
    assert_silent(&mut rx).await;
}

#[tokio::test]
async fn test_register_rejects_bound_name_and_keeps_original() {
    let dispatcher = TestDispatcher::new();
    let (first, mut first_rx) = Inbox::<Name, u32>::new(8);
    let (second, mut second_rx) = Inbox::<Name, u32>::new(8);

    dispatcher.register(first, &[Name::Save]).unwrap();
    let result = dispatcher.register(second.clone(), &[Name::Invalidate, Name::Save]);

    assert_eq!(result, Err(DispatchError::AlreadyRegistered("item.save".to_string())));
    // The rejected call leaves no partial binding behind
    assert!(!dispatcher.is_registered(Name::Invalidate));

    dispatcher.dispatch(Name::Save, 7).await.unwrap();
    assert_eq!(next(&mut first_rx).await.payload, 7);
    assert_silent(&mut second_rx).await;
}

#[tokio::test]
async fn test_after_event_chains_same_payload() {
    let dispatcher = TestDispatcher::new();
    let (saver, mut saver_rx) = Inbox::<Name, u32>::new(8);
    let (invalidator, mut invalidator_rx) = Inbox::<Name, u32>::new(8);

    dispatcher.register(saver, &[Name::Save]).unwrap();
    dispatcher.register(invalidator, &[Name::Invalidate]).unwrap();
    dispatcher.set_after_event(Name::Save, Name::Invalidate).unwrap();

    dispatcher.dispatch(Name::Save, 5).await.unwrap();

    assert_eq!(next(&mut saver_rx).await, Delivery { name: Name::Save, payload: 5 });
    assert_eq!(next(&mut invalidator_rx).await, Delivery { name: Name::Invalidate, payload: 5 });
}

#[tokio::test]
async fn test_after_event_requires_registered_names() {
    let dispatcher = TestDispatcher::new();
    let (inbox, _rx) = Inbox::<Name, u32>::new(8);
    dispatcher.register(inbox, &[Name::Save]).unwrap();

    let result = dispatcher.set_after_event(Name::Save, Name::Unbound);
    assert_eq!(result, Err(DispatchError::NotRegistered("unbound".to_string())));
}

#[tokio::test]
async fn test_same_listener_keeps_submission_order() {
    let dispatcher = TestDispatcher::with_config(DispatcherConfig { workers: 4, queue_capacity: 16 });
    let (inbox, mut rx) = Inbox::<Name, u32>::new(512);
    dispatcher.register(inbox, &[Name::Save, Name::Invalidate]).unwrap();

    let mut sent = Vec::new();
    for i in 0..300u32 {
        let name = if i % 3 == 0 { Name::Invalidate } else { Name::Save };
        dispatcher.dispatch(name, i).await.unwrap();
        sent.push((name, i));
    }

    let mut received = Vec::new();
    for _ in 0..sent.len() {
        let delivery = next(&mut rx).await;
        received.push((delivery.name, delivery.payload));
    }
    assert_eq!(received, sent);
}

#[tokio::test]
async fn test_chained_dispatch_to_same_listener_is_ordered() {
    let dispatcher = TestDispatcher::new();
    let (inbox, mut rx) = Inbox::<Name, u32>::new(64);
    dispatcher.register(inbox, &[Name::Save, Name::Invalidate]).unwrap();
    dispatcher.set_after_event(Name::Save, Name::Invalidate).unwrap();

    for i in 0..10u32 {
        dispatcher.dispatch(Name::Save, i).await.unwrap();
    }

    for i in 0..10u32 {
        assert_eq!(next(&mut rx).await, Delivery { name: Name::Save, payload: i });
        assert_eq!(next(&mut rx).await, Delivery { name: Name::Invalidate, payload: i });
    }
}

#[tokio::test]
async fn test_shutdown_delivers_accepted_jobs_then_closes() {
    let dispatcher = TestDispatcher::with_config(DispatcherConfig { workers: 2, queue_capacity: 64 });
    let (inbox, mut rx) = Inbox::<Name, u32>::new(64);
    dispatcher.register(inbox, &[Name::Save]).unwrap();

    for i in 0..20u32 {
        dispatcher.dispatch(Name::Save, i).await.unwrap();
    }
    dispatcher.shutdown().await;

    let mut count = 0;
    while let Ok(delivery) = rx.try_recv() {
        assert_eq!(delivery.payload, count);
        count += 1;
    }
    assert_eq!(count, 20);

    assert_eq!(dispatcher.dispatch(Name::Save, 99).await, Err(DispatchError::Closed));
}

#[tokio::test]
async fn test_registered_names() {
    let dispatcher = TestDispatcher::new();
    let (inbox, _rx) = Inbox::<Name, u32>::new(1);
    dispatcher.register(inbox, &[Name::Save, Name::Invalidate]).unwrap();

    let mut names = dispatcher.registered_names();
    names.sort_by_key(|name| name.to_string());
    assert_eq!(names, vec![Name::Invalidate, Name::Save]);
    assert!(!dispatcher.is_registered(Name::Unbound));
}
