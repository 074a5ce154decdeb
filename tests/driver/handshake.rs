//! Full handshakes between two drivers over the in-memory network.

use std::time::Instant;

use dtlsmux::message::{is_hello_request, MessageType};
use dtlsmux::{Config, State};

use crate::common::*;

#[test]
fn handshake_and_data_both_ways() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut client = driver(&network, client_addr(), Config::default(), now);
    let mut server = driver(&network, server_addr(), Config::default(), now);

    connect(&network, &mut client, &mut server, now, b"hello");

    assert_eq!(
        server.poll_plaintext(),
        Some((b"hello".to_vec(), client_addr()))
    );
    assert_eq!(server.poll_plaintext(), None);

    server.send(now, client_addr(), b"pong").unwrap();
    assert_eq!(server.flush_outgoing(), 1);
    client.process_incoming(now);

    assert_eq!(
        client.poll_plaintext(),
        Some((b"pong".to_vec(), server_addr()))
    );

    assert_eq!(client.connection_count(), 1);
    assert_eq!(server.connection_count(), 1);
}

#[test]
fn cookie_exchange_recreates_initiator_engine() {
    //! The initiator's first engine only does the cookie round trip. The
    //! HelloRequest that follows a valid cookie swaps it for a fresh one.
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut client = driver(&network, client_addr(), Config::default(), now);
    let mut server = driver(&network, server_addr(), Config::default(), now);

    client.send(now, server_addr(), b"hello").unwrap();
    assert_eq!(client.flush_outgoing(), 1);

    let engine_id = |c: &TestDriver| {
        c.connection(server_addr())
            .and_then(|c| c.engine())
            .map(|e| e.id)
    };

    assert_eq!(engine_id(&client), Some(0));
    assert_eq!(
        client.connection(server_addr()).unwrap().state(),
        State::CookieExchange
    );

    // ClientHello -> HelloVerifyRequest
    assert_eq!(server.process_incoming(now), 1);
    assert_eq!(server.connection_count(), 0);

    // HelloVerifyRequest -> ClientHello with cookie
    assert_eq!(client.process_incoming(now), 1);
    assert_eq!(client.flush_outgoing(), 1);
    assert_eq!(engine_id(&client), Some(0));

    // Cookie accepted -> HelloRequest
    assert_eq!(server.process_incoming(now), 1);
    assert_eq!(
        server.connection(client_addr()).unwrap().state(),
        State::SendHelloRequest
    );
    assert_eq!(server.flush_outgoing(), 1);
    assert!(is_hello_request(&server.socket().sent_to(client_addr())[1]));

    // HelloRequest -> new engine, fresh ClientHello
    assert_eq!(client.process_incoming(now), 1);
    let c = client.connection(server_addr()).unwrap();
    assert_eq!(c.state(), State::Connect);
    assert_eq!(engine_id(&client), Some(1));
    assert_eq!(client.factory().stats.created.get(), 2);
    assert_eq!(client.factory().stats.destroyed.get(), 1);

    client.flush_outgoing();
    server.process_incoming(now);
    assert_eq!(
        server.connection(client_addr()).unwrap().state(),
        State::Accept
    );

    pump(&network, &mut [&mut client, &mut server], now, 20);
    assert!(client.is_connected(server_addr()));
    assert!(server.is_connected(client_addr()));
}

#[test]
fn lost_client_hello_retransmitted() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut client = driver(&network, client_addr(), Config::default(), now);

    client.send(now, server_addr(), b"hello").unwrap();
    assert_eq!(client.flush_outgoing(), 1);
    assert_eq!(network.discard(server_addr()).len(), 1);

    client.handle_timeout(now + ms(249));
    assert_eq!(client.flush_outgoing(), 0);

    client.handle_timeout(now + ms(250));
    assert_eq!(client.flush_outgoing(), 1);

    let resent = network.discard(server_addr());
    assert_eq!(resent.len(), 1);
    assert_eq!(handshake_type(&resent[0]), Some(CLIENT_HELLO));

    let engine = client.connection(server_addr()).unwrap().engine().unwrap();
    assert_eq!(engine.retransmits, 1);

    // Backed off to 500ms.
    client.handle_timeout(now + ms(700));
    assert_eq!(client.flush_outgoing(), 0);
    client.handle_timeout(now + ms(750));
    assert_eq!(client.flush_outgoing(), 1);
}

#[test]
fn established_resends_final_flight() {
    //! A handshake record arriving after completion means the peer missed our
    //! last flight. Resend it while the connection is young.
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut client = driver(&network, client_addr(), Config::default(), now);
    let mut server = driver(&network, server_addr(), Config::default(), now);

    connect(&network, &mut client, &mut server, now, b"hello");
    server.socket().clear_sent();

    let finished = handshake_record(MessageType::Finished, b"client");
    network.inject(client_addr(), server_addr(), finished.clone());
    server.process_incoming(now + ms(100));
    assert_eq!(server.flush_outgoing(), 1);

    let sent = server.socket().sent_to(client_addr());
    assert_eq!(sent, vec![handshake_record(MessageType::Finished, b"server")]);
    assert!(server.is_connected(client_addr()));

    // Past the liveness window nothing is resent.
    server.bind(client_addr());
    server.socket().clear_sent();
    network.inject(client_addr(), server_addr(), finished);
    server.process_incoming(now + ms(10_001));
    assert_eq!(server.flush_outgoing(), 0);
    assert!(server.socket().sent_to(client_addr()).is_empty());
    assert!(server.is_connected(client_addr()));
}

#[test]
fn two_clients_at_once() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let other = addr("198.51.100.8:50000");

    let mut a = driver(&network, client_addr(), Config::default(), now);
    let mut b = driver(&network, other, Config::default(), now);
    let mut server = driver(&network, server_addr(), Config::default(), now);

    a.send(now, server_addr(), b"from a").unwrap();
    b.send(now, server_addr(), b"from b").unwrap();
    a.flush_outgoing();
    b.flush_outgoing();

    pump(&network, &mut [&mut a, &mut b, &mut server], now, 20);

    assert!(a.is_connected(server_addr()));
    assert!(b.is_connected(server_addr()));
    assert!(server.is_connected(client_addr()));
    assert!(server.is_connected(other));
    assert_eq!(server.connection_count(), 2);

    let mut got = Vec::new();
    while let Some(v) = server.poll_plaintext() {
        got.push(v);
    }
    got.sort();

    let mut expected = vec![
        (b"from a".to_vec(), client_addr()),
        (b"from b".to_vec(), other),
    ];
    expected.sort();
    assert_eq!(got, expected);
}

#[test]
fn engine_creation_failure_surfaces() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut client = driver(&network, client_addr(), Config::default(), now);
    client.factory_mut().fail_create = true;

    assert!(client.send(now, server_addr(), b"hello").is_err());
    assert_eq!(client.connection_count(), 0);
}
