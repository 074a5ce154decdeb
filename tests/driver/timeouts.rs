use std::time::Instant;

use dtlsmux::{Config, State};

use crate::common::*;

#[test]
fn unbound_connection_expires() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut client = driver(&network, client_addr(), Config::default(), now);
    let mut server = driver(&network, server_addr(), Config::default(), now);

    connect(&network, &mut client, &mut server, now, b"hello");

    server.handle_timeout(now + ms(10_000));
    assert_eq!(server.connection_count(), 1);
    assert!(server.is_connected(client_addr()));

    server.handle_timeout(now + ms(10_001));
    assert_eq!(server.connection_count(), 0);
    assert_eq!(server.connections_from(client_addr().ip()), 0);
    assert!(!server.is_connected(client_addr()));

    let stats = &server.factory().stats;
    assert_eq!(stats.created.get(), stats.destroyed.get());
}

#[test]
fn bound_connection_survives_until_unbound() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut client = driver(&network, client_addr(), Config::default(), now);
    let mut server = driver(&network, server_addr(), Config::default(), now);

    connect(&network, &mut client, &mut server, now, b"hello");

    assert!(server.bind(client_addr()));
    assert!(!server.bind(addr("203.0.113.1:1")));

    server.handle_timeout(now + ms(20_000));
    assert!(server.is_connected(client_addr()));
    assert!(server.connection(client_addr()).unwrap().is_bound());

    // Data still flows.
    client.send(now + ms(20_000), server_addr(), b"late").unwrap();
    client.flush_outgoing();
    server.process_incoming(now + ms(20_000));
    server.poll_plaintext();
    assert_eq!(
        server.poll_plaintext(),
        Some((b"late".to_vec(), client_addr()))
    );

    assert!(server.unbind(client_addr()));
    server.handle_timeout(now + ms(20_015));
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn handshake_gives_up_on_absent_peer() {
    //! Nobody answers. The initiator retransmits with backoff capped at a
    //! tenth of the connection timeout, then gives up.
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut client = driver(&network, client_addr(), Config::default(), now);

    client.send(now, server_addr(), b"hello").unwrap();
    client.flush_outgoing();
    network.discard(server_addr());

    let mut t = 0;
    while t <= 10_000 {
        client.handle_timeout(now + ms(t));
        client.flush_outgoing();
        network.discard(server_addr());
        t += 10;
    }

    // 250, 750, 1750, then once a second up to 9750.
    let c = client.connection(server_addr()).unwrap();
    assert_eq!(c.state(), State::CookieExchange);
    let retransmits = c.engine().unwrap().retransmits;
    assert!((10..=12).contains(&retransmits), "{}", retransmits);
    assert_eq!(
        client.socket().sent_to(server_addr()).len(),
        retransmits + 1
    );

    client.handle_timeout(now + ms(10_001));
    assert_eq!(client.connection_count(), 0);
    assert_eq!(client.factory().stats.destroyed.get(), 1);
}

#[test]
fn bound_handshake_still_times_out() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut client = driver(&network, client_addr(), Config::default(), now);

    client.send(now, server_addr(), b"hello").unwrap();
    assert!(client.bind(server_addr()));

    client.handle_timeout(now + ms(10_000));
    assert_eq!(client.connection_count(), 1);
    client.handle_timeout(now + ms(10_001));
    assert_eq!(client.connection_count(), 0);
}

#[test]
fn hello_request_resent_until_peer_restarts() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut server = driver(&network, server_addr(), Config::default(), now);

    let cookie = server.cookies_mut().derive(now, &client_addr()).unwrap();
    server.handle_datagram(now, &client_hello(1, &cookie), client_addr());
    assert_eq!(server.flush_outgoing(), 1);

    // Resent at 50, 100 and 200ms.
    for (at, sent) in [(49, 0), (50, 1), (99, 0), (100, 1), (199, 0), (200, 1)] {
        server.handle_timeout(now + ms(at));
        assert_eq!(server.flush_outgoing(), sent, "at {}ms", at);
    }

    server.handle_datagram(now + ms(210), &client_hello(0, &[]), client_addr());
    let c = server.connection(client_addr()).unwrap();
    assert_eq!(c.state(), State::Accept);

    // Accept has its own retransmit schedule; the ServerHello goes out.
    assert_eq!(server.flush_outgoing(), 1);
    let sent = server.socket().sent_to(client_addr());
    assert_eq!(handshake_type(sent.last().unwrap()), Some(SERVER_HELLO));
}

#[test]
fn update_respects_tick_resolution() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut server = driver(&network, server_addr(), Config::default(), now);

    assert!(server.update(now));
    assert!(!server.update(now + ms(10)));
    assert!(server.update(now + ms(15)));
    assert!(!server.update(now + ms(29)));
    assert!(server.update(now + ms(30)));
}

#[test]
fn disconnect_removes_on_next_tick() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let mut client = driver(&network, client_addr(), Config::default(), now);
    let mut server = driver(&network, server_addr(), Config::default(), now);

    connect(&network, &mut client, &mut server, now, b"hello");

    assert!(server.disconnect(now, client_addr()));
    assert!(!server.disconnect(now, addr("203.0.113.1:1")));

    let c = server.connection(client_addr()).unwrap();
    assert_eq!(c.state(), State::Disconnected);
    assert!(c.engine().is_none());
    assert_eq!(server.factory().stats.destroyed.get(), 1);
    assert!(!server.is_connected(client_addr()));

    server.handle_timeout(now + ms(1));
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn failed_engine_disconnects_only_its_peer() {
    init_logging();

    let now = Instant::now();
    let network = Network::new();
    let other = addr("198.51.100.8:50000");

    let mut a = driver(&network, client_addr(), Config::default(), now);
    let mut b = driver(&network, other, Config::default(), now);
    let mut server = driver(&network, server_addr(), Config::default(), now);

    a.send(now, server_addr(), b"a").unwrap();
    b.send(now, server_addr(), b"b").unwrap();
    a.flush_outgoing();
    b.flush_outgoing();
    pump(&network, &mut [&mut a, &mut b, &mut server], now, 20);
    assert_eq!(server.connection_count(), 2);
    while server.poll_plaintext().is_some() {}

    network.inject(client_addr(), server_addr(), alert_record());
    server.process_incoming(now + ms(5));

    let c = server.connection(client_addr()).unwrap();
    assert_eq!(c.state(), State::Disconnected);
    assert_eq!(c.last_error(), Some(-(ALERT as i32)));
    assert!(server.is_connected(other));

    server.handle_timeout(now + ms(5));
    assert_eq!(server.connection_count(), 1);
    assert_eq!(server.connections_from(client_addr().ip()), 0);
    assert_eq!(server.connections_from(other.ip()), 1);

    b.send(now + ms(5), server_addr(), b"still here").unwrap();
    b.flush_outgoing();
    server.process_incoming(now + ms(5));
    assert_eq!(
        server.poll_plaintext(),
        Some((b"still here".to_vec(), other))
    );
}
