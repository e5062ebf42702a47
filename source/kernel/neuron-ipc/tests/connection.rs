// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Integration tests for connection establishment and messaging
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! TEST_COVERAGE: 9 tests (1 property)
//!
//! TEST_SCOPE:
//!   - connect/listen rendezvous
//!   - FIFO delivery, backpressure, truncation, peek
//!   - Hang-up visibility and monotonicity
//!
//! TEST_SCENARIOS:
//!   - round_trip(): blocked connector, listener, typed message back to the client
//!   - fifo_order_is_preserved(): arbitrary message sequences arrive in send order
//!   - full_queue_blocks_sender_until_receive(): capacity + 1 send waits for a receive
//!   - zero_length_receive_discards(): empty buffer drops the head and frees its credit
//!   - short_buffer_truncates(): excess payload is dropped
//!   - peek_leaves_message_queued(): peek reports type and size only
//!   - hang_up_is_permanent(): after DestinationUnreachable nothing is delivered again
//!   - close_releases_blocked_sender(): peer close wakes a sender stuck on a full queue
//!   - close_releases_blocked_receiver(): peer close wakes a blocked receiver

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{connect, port, registry, PATIENCE};
use neuron_ipc::{ConnPhase, IpcError, MessageInfo, Received, Timeout};
use proptest::prelude::*;

#[test]
fn round_trip() {
    let registry = registry(8);
    let (port, id) = port(&registry);

    let connector = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || registry.connect(id, Timeout::Blocking))
    };
    let server = port.port().unwrap().listen(Timeout::Blocking).unwrap();
    let client = connector.join().unwrap().unwrap();

    server.endpoint().unwrap().send(7, b"hello").unwrap();
    let mut buf = [0u8; 16];
    let got = client.endpoint().unwrap().receive(PATIENCE, &mut buf).unwrap();
    assert_eq!(got, Received { ty: 7, size: 5, copied: 5 });
    assert_eq!(&buf[..5], b"hello");
    assert_eq!(client.endpoint().unwrap().connection().phase(), ConnPhase::Accepted);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn fifo_order_is_preserved(
        msgs in proptest::collection::vec((any::<u32>(), proptest::collection::vec(any::<u8>(), 0..32)), 1..16)
    ) {
        let registry = registry(16);
        let (port, _) = port(&registry);
        let (server, client) = connect(&registry, &port);
        for (ty, data) in &msgs {
            client.endpoint().unwrap().send(*ty, data).unwrap();
        }
        let ep = server.endpoint().unwrap();
        for (ty, data) in &msgs {
            let mut buf = [0u8; 32];
            let got = ep.receive(Timeout::NonBlocking, &mut buf).unwrap();
            prop_assert_eq!(got.ty, *ty);
            prop_assert_eq!(&buf[..got.copied], data.as_slice());
        }
        prop_assert_eq!(ep.receive(Timeout::NonBlocking, &mut []), Err(IpcError::WouldBlock));
    }
}

#[test]
fn full_queue_blocks_sender_until_receive() {
    const CAPACITY: usize = 4;
    let registry = registry(CAPACITY);
    let (port, _) = port(&registry);
    let (server, client) = connect(&registry, &port);

    for i in 0..CAPACITY {
        client.endpoint().unwrap().send(i as u32, b"x").unwrap();
    }
    let done = Arc::new(AtomicBool::new(false));
    let sender = {
        let client = client.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let res = client.endpoint().unwrap().send(99, b"late");
            done.store(true, Ordering::SeqCst);
            res
        })
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst), "send past capacity did not block");

    let ep = server.endpoint().unwrap();
    ep.receive(Timeout::NonBlocking, &mut [0u8; 4]).unwrap();
    assert_eq!(sender.join().unwrap(), Ok(()));

    let info = ep.info();
    assert_eq!((info.queued, info.data, info.space), (CAPACITY, CAPACITY, 0));
    let mut last = Received { ty: 0, size: 0, copied: 0 };
    for _ in 0..CAPACITY {
        last = ep.receive(Timeout::NonBlocking, &mut [0u8; 8]).unwrap();
    }
    assert_eq!(last.ty, 99);
}

#[test]
fn zero_length_receive_discards() {
    let registry = registry(2);
    let (port, _) = port(&registry);
    let (server, client) = connect(&registry, &port);
    server.endpoint().unwrap().send(1, b"unwanted").unwrap();
    server.endpoint().unwrap().send(2, b"wanted").unwrap();

    let ep = client.endpoint().unwrap();
    assert_eq!(ep.info().space, 0);
    let got = ep.receive(Timeout::NonBlocking, &mut []).unwrap();
    assert_eq!(got, Received { ty: 1, size: 8, copied: 0 });
    assert_eq!(ep.info().space, 1);

    let mut buf = [0u8; 6];
    assert_eq!(ep.receive(Timeout::NonBlocking, &mut buf).unwrap().ty, 2);
    assert_eq!(&buf, b"wanted");
}

#[test]
fn short_buffer_truncates() {
    let registry = registry(2);
    let (port, _) = port(&registry);
    let (server, client) = connect(&registry, &port);
    client.endpoint().unwrap().send(3, b"truncated").unwrap();
    let mut buf = [0u8; 5];
    let got = server.endpoint().unwrap().receive(Timeout::NonBlocking, &mut buf).unwrap();
    assert_eq!(got, Received { ty: 3, size: 9, copied: 5 });
    assert_eq!(&buf, b"trunc");
    assert_eq!(server.endpoint().unwrap().info().queued, 0);
}

#[test]
fn peek_leaves_message_queued() {
    let registry = registry(2);
    let (port, _) = port(&registry);
    let (server, client) = connect(&registry, &port);
    let ep = client.endpoint().unwrap();
    assert_eq!(ep.peek(Timeout::NonBlocking), Err(IpcError::WouldBlock));
    assert_eq!(ep.peek(Timeout::After(Duration::from_millis(10))), Err(IpcError::TimedOut));

    server.endpoint().unwrap().send(11, &[0u8; 300]).unwrap();
    assert_eq!(ep.peek(Timeout::NonBlocking).unwrap(), MessageInfo { ty: 11, size: 300 });
    assert_eq!(ep.peek(Timeout::NonBlocking).unwrap(), MessageInfo { ty: 11, size: 300 });
    let info = ep.info();
    assert_eq!((info.queued, info.data), (1, 1));
}

#[test]
fn hang_up_is_permanent() {
    let registry = registry(4);
    let (port, _) = port(&registry);
    let (server, client) = connect(&registry, &port);
    server.endpoint().unwrap().send(1, b"in flight").unwrap();
    drop(server);

    let ep = client.endpoint().unwrap();
    assert!(ep.is_hung_up());
    // Queued data is not handed out once the peer is gone.
    assert_eq!(ep.peek(Timeout::NonBlocking), Err(IpcError::DestinationUnreachable));
    for _ in 0..3 {
        assert_eq!(ep.receive(Timeout::NonBlocking, &mut [0u8; 16]), Err(IpcError::DestinationUnreachable));
        assert_eq!(ep.send(1, b"x"), Err(IpcError::DestinationUnreachable));
    }
    assert_eq!(ep.connection().phase(), ConnPhase::Closing);
}

#[test]
fn close_releases_blocked_sender() {
    let registry = registry(1);
    let (port, _) = port(&registry);
    let (server, client) = connect(&registry, &port);
    client.endpoint().unwrap().send(0, b"fills the queue").unwrap();

    let sender = {
        let client = client.clone();
        thread::spawn(move || client.endpoint().unwrap().send(0, b"blocked"))
    };
    thread::sleep(Duration::from_millis(30));
    drop(server);
    assert_eq!(sender.join().unwrap(), Err(IpcError::DestinationUnreachable));
    let info = client.endpoint().unwrap().info();
    assert!(!info.attached);
}

#[test]
fn close_releases_blocked_receiver() {
    let registry = registry(1);
    let (port, _) = port(&registry);
    let (server, client) = connect(&registry, &port);

    let receiver = {
        let client = client.clone();
        thread::spawn(move || client.endpoint().unwrap().receive(Timeout::Blocking, &mut [0u8; 8]))
    };
    thread::sleep(Duration::from_millis(30));
    drop(server);
    assert_eq!(receiver.join().unwrap(), Err(IpcError::DestinationUnreachable));
}
