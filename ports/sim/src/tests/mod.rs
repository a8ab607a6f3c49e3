use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use ble_api::{
    AttributeObserver, AuthorizeReply, BleError, BleTransport, CharacteristicDescriptor,
    PeerAddress, Properties, ServiceDescriptor, WriteAuthorizer, WriteRequest,
};
use equeue::EventQueue;
use crate::{SimCall, SimOp, SimTransport};

fn service_descriptor(characteristics: usize) -> ServiceDescriptor {
    ServiceDescriptor {
        uuid: uuid::Uuid::from_u128(0x1000),
        characteristics: (0..characteristics)
            .map(|i| CharacteristicDescriptor {
                uuid: uuid::Uuid::from_u128(0x2000 + i as u128),
                initial_value: i as u8,
                properties: Properties::READ | Properties::WRITE,
            })
            .collect(),
    }
}

struct RejectAll;

impl WriteAuthorizer for RejectAll {
    fn authorize_write(&self, _request: &WriteRequest<'_>) -> AuthorizeReply {
        AuthorizeReply::WriteNotPermitted
    }
}

#[derive(Default)]
struct SentCounter {
    sent: AtomicUsize,
}

impl AttributeObserver for SentCounter {
    fn on_data_sent(&self, count: usize) {
        self.sent.fetch_add(count, Ordering::SeqCst);
    }
}

#[test]
fn init_completion_is_delivered_through_the_queue() {
    let queue = EventQueue::new();
    let transport = SimTransport::new(queue.clone());

    let completed = Arc::new(AtomicBool::new(false));
    let probe = completed.clone();
    transport
        .init(Box::new(move |result| {
            assert!(result.is_ok());
            probe.store(true, Ordering::SeqCst);
        }))
        .unwrap();

    // Async contract: nothing happens until the queue is pumped.
    assert!(!completed.load(Ordering::SeqCst));
    queue.advance(0);
    assert!(completed.load(Ordering::SeqCst));
}

#[test]
fn reinitialization_is_rejected() {
    let queue = EventQueue::new();
    let transport = SimTransport::new(queue.clone());

    transport.init(Box::new(|_| {})).unwrap();
    queue.advance(0);

    let err = transport.init(Box::new(|_| {})).unwrap_err();
    assert_eq!(err, BleError::AlreadyInitialized);
}

#[test]
fn registration_assigns_distinct_value_handles() {
    let queue = EventQueue::new();
    let transport = SimTransport::new(queue);

    let handle = transport.register_service(&service_descriptor(3)).unwrap();
    assert_eq!(handle.value_handles.len(), 3);

    let mut all = handle.value_handles.clone();
    all.push(handle.service);
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 4, "handles must be distinct");

    for (i, value_handle) in handle.value_handles.iter().enumerate() {
        assert_eq!(transport.peek_attribute(*value_handle), Some(i as u8));
    }
}

#[test]
fn client_write_commits_only_when_authorized() {
    let queue = EventQueue::new();
    let transport = SimTransport::new(queue);
    let handle = transport.register_service(&service_descriptor(1)).unwrap();
    let value = handle.value_handles[0];

    // No gate registered: the transport commits.
    assert_eq!(transport.client_write(value, 0, &[7]), AuthorizeReply::Accepted);
    assert_eq!(transport.peek_attribute(value), Some(7));

    transport.register_write_authorizer(value, Arc::new(RejectAll));
    assert_eq!(
        transport.client_write(value, 0, &[9]),
        AuthorizeReply::WriteNotPermitted
    );
    assert_eq!(transport.peek_attribute(value), Some(7), "rejected write must not commit");
}

#[test]
fn planned_failures_fire_once_after_the_configured_skip() {
    let queue = EventQueue::new();
    let transport = SimTransport::new(queue);
    let handle = transport.register_service(&service_descriptor(1)).unwrap();
    let value = handle.value_handles[0];

    transport.fail_after(SimOp::ReadAttribute, 1, 42);
    assert!(transport.read_attribute(value).is_ok());
    assert_eq!(
        transport.read_attribute(value).unwrap_err(),
        BleError::OperationFailed(42)
    );
    assert!(transport.read_attribute(value).is_ok());
}

#[test]
fn local_writes_notify_only_subscribed_handles() {
    let queue = EventQueue::new();
    let transport = SimTransport::new(queue);
    let handle = transport.register_service(&service_descriptor(1)).unwrap();
    let value = handle.value_handles[0];

    let counter = Arc::new(SentCounter::default());
    transport.register_attribute_observer(counter.clone());

    transport.connect(PeerAddress([0; 6]));
    transport.write_attribute(value, 1, false).unwrap();
    assert_eq!(counter.sent.load(Ordering::SeqCst), 0, "not subscribed yet");

    transport.subscribe(value, true);
    transport.write_attribute(value, 2, false).unwrap();
    assert_eq!(counter.sent.load(Ordering::SeqCst), 1);

    // local_only keeps the change out of the air.
    transport.write_attribute(value, 3, true).unwrap();
    assert_eq!(counter.sent.load(Ordering::SeqCst), 1);
}

#[test]
fn the_call_log_preserves_order() {
    let queue = EventQueue::new();
    let transport = SimTransport::new(queue.clone());

    transport.init(Box::new(|_| {})).unwrap();
    queue.advance(0);
    transport.start_advertising().unwrap();

    assert_eq!(
        transport.take_calls(),
        vec![SimCall::Init, SimCall::StartAdvertising]
    );
    assert!(transport.calls().is_empty());
}
