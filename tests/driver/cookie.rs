//! Stateless cookie exchange with unknown peers.

use std::time::Instant;

use dtlsmux::message::{is_hello_request, HelloVerifyRequest};
use dtlsmux::{Config, State, COOKIE_LEN};

use crate::common::*;

#[test]
fn fresh_client_hello_gets_hello_verify_request() {
    //! An unknown peer's first ClientHello is answered with exactly one
    //! HelloVerifyRequest and no connection is created.
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut server = driver(&network, server_addr(), Config::default(), now);

    server.handle_datagram(now, &client_hello(0, &[]), client_addr());

    let sent = server.socket().sent_to(client_addr());
    assert_eq!(sent.len(), 1);
    assert_eq!(handshake_type(&sent[0]), Some(HELLO_VERIFY_REQUEST));

    let (rest, hvr) = HelloVerifyRequest::parse(&sent[0]).unwrap();
    assert!(rest.is_empty());
    assert_eq!(hvr.cookie.len(), COOKIE_LEN);
    assert_eq!(hvr.header.record.epoch, 0);
    assert_eq!(hvr.header.message_seq, 0);

    let expected = server.cookies_mut().derive(now, &client_addr()).unwrap();
    assert_eq!(hvr.cookie, expected);

    assert_eq!(server.connection_count(), 0);
    assert_eq!(server.connections_from(client_addr().ip()), 0);
}

#[test]
fn every_fresh_client_hello_answered_once() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut server = driver(&network, server_addr(), Config::default(), now);

    for port in 40000..40020 {
        let from = addr(&format!("203.0.113.9:{}", port));
        server.handle_datagram(now, &client_hello(0, &[]), from);

        let sent = server.socket().sent_to(from);
        assert_eq!(sent.len(), 1, "port {}", port);
        let (_, hvr) = HelloVerifyRequest::parse(&sent[0]).unwrap();
        assert_eq!(hvr.cookie.len(), COOKIE_LEN);
    }

    assert_eq!(server.connection_count(), 0);
}

#[test]
fn valid_cookie_creates_responder() {
    //! A ClientHello (message_seq 1) echoing the derived cookie creates a
    //! connection in SendHelloRequest.
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut server = driver(&network, server_addr(), Config::default(), now);

    let cookie = server.cookies_mut().derive(now, &client_addr()).unwrap();
    server.handle_datagram(now, &client_hello(1, &cookie), client_addr());

    assert_eq!(server.connection_count(), 1);
    assert_eq!(server.connections_from(client_addr().ip()), 1);

    let c = server.connection(client_addr()).unwrap();
    assert_eq!(c.state(), State::SendHelloRequest);
    assert!(!server.is_connected(client_addr()));

    // No HelloVerifyRequest this time; a HelloRequest once flushed.
    assert!(server.socket().sent_to(client_addr()).is_empty());
    assert_eq!(server.flush_outgoing(), 1);
    let sent = server.socket().sent_to(client_addr());
    assert!(is_hello_request(&sent[0]));
}

#[test]
fn tampered_cookie_rejected() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut server = driver(&network, server_addr(), Config::default(), now);

    let mut cookie = server
        .cookies_mut()
        .derive(now, &client_addr())
        .unwrap()
        .to_vec();
    cookie[7] ^= 0x10;

    server.handle_datagram(now, &client_hello(1, &cookie), client_addr());

    assert_eq!(server.connection_count(), 0);
    assert!(server.socket().sent_to(client_addr()).is_empty());
}

#[test]
fn cookie_for_other_address_rejected() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut server = driver(&network, server_addr(), Config::default(), now);

    let spoofed = addr("198.51.100.7:50001");
    let cookie = server.cookies_mut().derive(now, &spoofed).unwrap();
    server.handle_datagram(now, &client_hello(1, &cookie), client_addr());

    assert_eq!(server.connection_count(), 0);
}

#[test]
fn cookie_from_previous_secret_honored() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let config = Config::builder()
        .cookie_rotation_interval(ms(1000))
        .build()
        .unwrap();
    let mut server = driver(&network, server_addr(), config, now);

    server.handle_datagram(now, &client_hello(0, &[]), client_addr());
    let sent = server.socket().sent_to(client_addr());
    let (_, hvr) = HelloVerifyRequest::parse(&sent[0]).unwrap();

    // Rotated once; the old cookie still works.
    let later = now + ms(1500);
    server.handle_datagram(later, &client_hello(1, &hvr.cookie), client_addr());
    assert_eq!(server.connection_count(), 1);
}

#[test]
fn stale_cookie_rejected() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let config = Config::builder()
        .cookie_rotation_interval(ms(1000))
        .build()
        .unwrap();
    let mut server = driver(&network, server_addr(), config, now);

    server.handle_datagram(now, &client_hello(0, &[]), client_addr());
    let sent = server.socket().sent_to(client_addr());
    let (_, hvr) = HelloVerifyRequest::parse(&sent[0]).unwrap();

    // Two intervals gone: the previous secret is discarded too.
    let much_later = now + ms(2500);
    server.handle_datagram(much_later, &client_hello(1, &hvr.cookie), client_addr());
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn per_ip_cap() {
    //! Once an IP holds the configured number of connections, its further
    //! ClientHellos get no answer.
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let config = Config::builder().max_connections_per_ip(2).build().unwrap();
    let mut server = driver(&network, server_addr(), config, now);

    for port in [1000, 1001] {
        let from = addr(&format!("198.51.100.7:{}", port));
        let cookie = server.cookies_mut().derive(now, &from).unwrap();
        server.handle_datagram(now, &client_hello(1, &cookie), from);
    }
    assert_eq!(server.connection_count(), 2);
    assert_eq!(server.connections_from(client_addr().ip()), 2);

    // Fresh hello from a third port: silence.
    let third = addr("198.51.100.7:1002");
    server.handle_datagram(now, &client_hello(0, &[]), third);
    assert!(server.socket().sent_to(third).is_empty());

    // Valid cookie from a third port: no connection.
    let cookie = server.cookies_mut().derive(now, &third).unwrap();
    server.handle_datagram(now, &client_hello(1, &cookie), third);
    assert_eq!(server.connection_count(), 2);

    // Other IPs are unaffected.
    let other = addr("198.51.100.8:1000");
    server.handle_datagram(now, &client_hello(0, &[]), other);
    assert_eq!(server.socket().sent_to(other).len(), 1);
}

#[test]
fn unknown_peer_garbage_dropped() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut server = driver(&network, server_addr(), Config::default(), now);

    let mut dtls13 = client_hello(0, &[]);
    dtls13[2] = 0xFC;

    let mut truncated = client_hello(0, &[]);
    truncated.pop();

    let cookie = server.cookies_mut().derive(now, &client_addr()).unwrap();

    let junk: Vec<Vec<u8>> = vec![
        vec![],
        vec![0x16],
        vec![0xFF; 64],
        app_record(b"hello"),
        alert_record(),
        dtls13,
        truncated,
        // Wrong cookie size for message_seq 1.
        client_hello(1, &cookie[..COOKIE_LEN - 1]),
        // message_seq 2 is never an opener.
        client_hello(2, &cookie),
    ];

    for data in &junk {
        server.handle_datagram(now, data, client_addr());
    }

    assert!(server.socket().sent_to(client_addr()).is_empty());
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn bogus_receive_length_dropped() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut server = driver(&network, server_addr(), Config::default(), now);

    network.inject(client_addr(), server_addr(), client_hello(0, &[]));
    server.socket().report_len.set(Some(100_000));
    assert_eq!(server.process_incoming(now), 1);
    assert!(server.socket().sent_to(client_addr()).is_empty());

    // The buffer is still good for honest datagrams.
    network.inject(client_addr(), server_addr(), client_hello(0, &[]));
    server.socket().report_len.set(None);
    assert_eq!(server.process_incoming(now), 1);
    assert_eq!(server.socket().sent_to(client_addr()).len(), 1);
}

#[test]
fn no_hello_verify_request_without_send_buffer() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut server = driver(&network, server_addr(), Config::default(), now);

    server.socket().writable.set(false);
    server.handle_datagram(now, &client_hello(0, &[]), client_addr());
    assert!(server.socket().sent_to(client_addr()).is_empty());

    server.socket().writable.set(true);
    server.handle_datagram(now, &client_hello(0, &[]), client_addr());
    assert_eq!(server.socket().sent_to(client_addr()).len(), 1);
}
