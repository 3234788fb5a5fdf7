mod support;

#[cfg(test)]
mod tests {
    use super::support::{Log, Recorder, init_tracing};
    use conduit::{Callbacks, Connection, Endpoint, Error, Events, Protocol, Reactor, Status};

    use std::cell::RefCell;
    use std::io::{ErrorKind, Read, Write};
    use std::net::{TcpListener, TcpStream, UdpSocket};
    use std::os::fd::AsRawFd;
    use std::rc::Rc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// Builds a connected Tcp pair: the adopted connection and its peer.
    fn adopted_pair(reactor: &Reactor, log: &Log) -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");
        let peer = TcpStream::connect(addr).expect("Failed to connect to listener");
        let (accepted, _) = listener.accept().expect("Failed to accept connection");

        let conn = Connection::new(reactor);
        conn.set_handler(Recorder::new(log));
        conn.adopt(accepted).expect("Failed to adopt socket");

        (conn, peer)
    }

    /// Closes `stream` with an RST instead of a FIN.
    fn reset(stream: TcpStream) {
        let linger = libc::linger {
            l_onoff: 1,
            l_linger: 0,
        };

        let rc = unsafe {
            libc::setsockopt(
                stream.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_LINGER,
                &linger as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::linger>() as libc::socklen_t,
            )
        };
        assert_eq!(rc, 0, "setsockopt(SO_LINGER) failed");

        drop(stream);
    }

    #[test]
    fn test_segmented_stream_is_buffered_in_order() {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");
        let payload = pattern(10_000);
        let expected = payload.clone();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("Failed to accept connection");

            for segment in [&payload[..4000], &payload[4000..7000], &payload[7000..]] {
                stream.write_all(segment).expect("Failed to write segment");
                stream.flush().expect("Failed to flush");
                thread::sleep(Duration::from_millis(30));
            }

            let _ = done_rx.recv();
        });

        let reactor = Reactor::new().expect("Failed to create reactor");
        let conn = Connection::new(&reactor);
        let log = Log::default();
        conn.set_handler(Recorder::new(&log).stop_on_event());

        conn.connect(None, &Endpoint::tcp(addr), Duration::from_secs(1))
            .expect("Failed to start connect");
        reactor.run_for(Duration::from_secs(2)).expect("Reactor failed");
        assert_eq!(log.events(), vec![Events::CONNECTED]);

        conn.set_handler(Recorder::new(&log).stop_at_available(10_000));
        reactor.run_for(Duration::from_secs(5)).expect("Reactor failed");

        assert_eq!(conn.available(), 10_000);
        assert!(
            log.data_calls.get() >= 3,
            "expected one on_data per chunk, got {}",
            log.data_calls.get()
        );

        let mut received = Vec::new();
        while conn.available() > 0 {
            let chunk = conn.read(1000);
            assert!(!chunk.is_empty() && chunk.len() <= 1000);
            received.extend_from_slice(&chunk);
        }

        assert_eq!(received, expected);
        assert_eq!(conn.available(), 0);

        done_tx.send(()).expect("Peer thread gone");
        handle.join().expect("Thread panicked");
    }

    #[test]
    fn test_peek_and_read() {
        init_tracing();

        let reactor = Reactor::new().expect("Failed to create reactor");
        let log = Log::default();
        let (conn, mut peer) = adopted_pair(&reactor, &log);
        conn.set_handler(Recorder::new(&log).stop_at_available(11));

        peer.write_all(b"hello world").expect("Failed to write");
        reactor.run_for(Duration::from_secs(2)).expect("Reactor failed");
        assert_eq!(conn.available(), 11);

        assert_eq!(conn.peek(5), b"hello");
        assert_eq!(conn.peek(5), b"hello");
        assert_eq!(conn.available(), 11);

        assert!(conn.read(0).is_empty());
        assert_eq!(conn.read(5), b"hello");
        assert_eq!(conn.available(), 6);

        assert_eq!(conn.peek(100), b" world");
        assert_eq!(conn.read(100), b" world");
        assert_eq!(conn.available(), 0);
        assert!(conn.read(10).is_empty());
    }

    #[test]
    fn test_stream_write_reaches_peer_in_order() {
        init_tracing();

        let reactor = Reactor::new().expect("Failed to create reactor");
        let log = Log::default();
        let (conn, mut peer) = adopted_pair(&reactor, &log);

        let payload = pattern(8 * 1024 * 1024);
        let expected = payload.clone();

        let handle = thread::spawn(move || {
            // Let the connection fill the socket buffer first.
            thread::sleep(Duration::from_millis(100));

            let mut received = Vec::new();
            peer.read_to_end(&mut received).expect("Failed to read");
            received
        });

        assert_eq!(conn.write(&payload[..3]).expect("Failed to write"), 3);
        assert_eq!(
            conn.write(&payload[3..]).expect("Failed to write"),
            payload.len() - 3
        );

        if conn.outbound_len() > 0 {
            reactor.run_for(Duration::from_secs(10)).expect("Reactor failed");
            assert_eq!(log.sendable_calls.get(), 1);
        }

        assert_eq!(conn.outbound_len(), 0);
        assert_eq!(conn.status(), Status::Connected);

        conn.close();

        let received = handle.join().expect("Thread panicked");
        assert_eq!(received.len(), expected.len());
        assert!(received == expected, "stream bytes arrived out of order");
    }

    #[test]
    fn test_eof_keeps_received_bytes() {
        init_tracing();

        let reactor = Reactor::new().expect("Failed to create reactor");
        let log = Log::default();
        let (conn, mut peer) = adopted_pair(&reactor, &log);
        conn.set_handler(Recorder::new(&log).stop_on_event());

        peer.write_all(b"bye").expect("Failed to write");
        drop(peer);

        reactor.run_for(Duration::from_secs(2)).expect("Reactor failed");

        assert_eq!(log.events(), vec![Events::CONNECTED, Events::EOF]);
        assert_eq!(conn.status(), Status::Closed);
        assert_eq!(reactor.watch_count(), 0);
        assert!(conn.take_error().is_none());

        assert_eq!(conn.available(), 3);
        assert_eq!(conn.read(10), b"bye");
        assert!(matches!(conn.write(b"more"), Err(Error::NotConnected)));
    }

    #[test]
    fn test_peer_reset_reports_eof_and_error() {
        init_tracing();

        let reactor = Reactor::new().expect("Failed to create reactor");
        let log = Log::default();
        let (conn, peer) = adopted_pair(&reactor, &log);
        conn.set_handler(Recorder::new(&log).stop_on_event());

        reset(peer);
        reactor.run_for(Duration::from_secs(2)).expect("Reactor failed");

        assert_eq!(log.events(), vec![Events::CONNECTED, Events::EOF | Events::ERROR]);
        assert_eq!(conn.status(), Status::Closed);
        assert_eq!(reactor.watch_count(), 0);

        match conn.take_error() {
            Some(Error::Io(e)) => assert_eq!(e.kind(), ErrorKind::ConnectionReset),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_send_failure_while_flushing_closes() {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");
        let _peer = TcpStream::connect(addr).expect("Failed to connect to listener");
        let (accepted, _) = listener.accept().expect("Failed to accept connection");
        let alias = accepted.try_clone().expect("Failed to clone socket");

        let reactor = Reactor::new().expect("Failed to create reactor");
        let conn = Connection::new(&reactor);
        let log = Log::default();
        conn.set_handler(Recorder::new(&log).stop_on_event());
        conn.adopt(accepted).expect("Failed to adopt socket");

        // The peer never reads, so most of this stays queued.
        let payload = pattern(32 * 1024 * 1024);
        assert_eq!(conn.write(&payload).expect("Failed to write"), payload.len());
        assert!(conn.outbound_len() > 0);

        // Sends on a write-shut socket fail with EPIPE while it still
        // polls writable.
        let rc = unsafe { libc::shutdown(alias.as_raw_fd(), libc::SHUT_WR) };
        assert_eq!(rc, 0, "shutdown failed");

        reactor.run_for(Duration::from_secs(2)).expect("Reactor failed");

        assert_eq!(log.events(), vec![Events::CONNECTED, Events::ERROR]);
        assert_eq!(conn.status(), Status::Closed);
        assert_eq!(reactor.watch_count(), 0);
        assert_eq!(log.sendable_calls.get(), 0);

        match conn.take_error() {
            Some(Error::Io(e)) => assert_eq!(e.kind(), ErrorKind::BrokenPipe),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_stream_write_failure_is_returned() {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");
        let _peer = TcpStream::connect(addr).expect("Failed to connect to listener");
        let (accepted, _) = listener.accept().expect("Failed to accept connection");
        let alias = accepted.try_clone().expect("Failed to clone socket");

        let reactor = Reactor::new().expect("Failed to create reactor");
        let conn = Connection::new(&reactor);
        conn.adopt(accepted).expect("Failed to adopt socket");

        let rc = unsafe { libc::shutdown(alias.as_raw_fd(), libc::SHUT_WR) };
        assert_eq!(rc, 0, "shutdown failed");

        match conn.write(b"after shutdown") {
            Err(Error::Io(e)) => assert_eq!(e.kind(), ErrorKind::BrokenPipe),
            other => panic!("unexpected result: {other:?}"),
        }

        assert_eq!(conn.outbound_len(), 0);
        assert_eq!(conn.status(), Status::Connected);
    }

    #[test]
    fn test_data_callback_can_consume() {
        init_tracing();

        let reactor = Reactor::new().expect("Failed to create reactor");
        let log = Log::default();
        let (conn, mut peer) = adopted_pair(&reactor, &log);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        conn.set_handler(
            Callbacks::new()
                .on_data(move |conn| {
                    sink.borrow_mut().extend(conn.read(conn.available()));

                    if sink.borrow().ends_with(b"\n") {
                        conn.reactor().stop();
                    }
                })
                .on_event(|_, events| panic!("unexpected event: {events:?}")),
        );

        peer.write_all(b"line one\n").expect("Failed to write");
        reactor.run_for(Duration::from_secs(2)).expect("Reactor failed");

        assert_eq!(seen.borrow().as_slice(), b"line one\n");
        assert_eq!(conn.available(), 0);
    }

    #[test]
    fn test_tls_write_is_queued_for_record_layer() {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");

        let reactor = Reactor::new().expect("Failed to create reactor");
        let conn = Connection::builder(&reactor).protocol(Protocol::Tls).build();
        let log = Log::default();
        conn.set_handler(Recorder::new(&log).stop_on_event());

        conn.connect(None, &Endpoint::tcp(addr), Duration::from_secs(1))
            .expect("Failed to start connect");
        reactor.run_for(Duration::from_secs(2)).expect("Reactor failed");

        assert_eq!(log.events(), vec![Events::CONNECTED]);
        assert_eq!(conn.protocol(), Protocol::Tls);

        let (mut peer, _) = listener.accept().expect("Failed to accept connection");
        peer.set_read_timeout(Some(Duration::from_millis(100)))
            .expect("Failed to set timeout");

        let payload = pattern(100);
        assert_eq!(conn.write(&payload).expect("Failed to write"), 100);
        assert_eq!(conn.outbound_len(), 100);

        reactor.run_for(Duration::from_millis(50)).expect("Reactor failed");

        let mut buf = [0u8; 128];
        let err = peer.read(&mut buf).expect_err("No plaintext may reach the wire");
        assert!(matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut));

        assert_eq!(conn.take_outbound(60), &payload[..60]);
        assert_eq!(conn.outbound_len(), 40);
        assert_eq!(conn.take_outbound(usize::MAX), &payload[60..]);
        assert_eq!(conn.outbound_len(), 0);
        assert_eq!(log.sendable_calls.get(), 0);
    }

    #[test]
    fn test_tcp_has_no_record_layer_queue() {
        let reactor = Reactor::new().expect("Failed to create reactor");
        let log = Log::default();
        let (conn, _peer) = adopted_pair(&reactor, &log);

        assert_eq!(conn.protocol(), Protocol::Tcp);
        assert_eq!(conn.write(b"abc").expect("Failed to write"), 3);
        assert!(conn.take_outbound(10).is_empty());
    }

    #[test]
    fn test_udp_datagrams_both_ways() {
        init_tracing();

        let peer = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind peer");
        peer.set_read_timeout(Some(Duration::from_secs(2)))
            .expect("Failed to set timeout");
        let addr = peer.local_addr().expect("Failed to get local address");

        let reactor = Reactor::new().expect("Failed to create reactor");
        let conn = Connection::new(&reactor);
        let log = Log::default();
        conn.set_handler(Recorder::new(&log).stop_on_event());

        conn.connect(None, &Endpoint::udp(addr), Duration::from_secs(1))
            .expect("Failed to start connect");
        reactor.run_for(Duration::from_secs(2)).expect("Reactor failed");

        assert_eq!(log.events(), vec![Events::CONNECTED]);
        assert_eq!(conn.protocol(), Protocol::Udp);

        assert_eq!(conn.write(b"ping").expect("Failed to send"), 4);

        let mut buf = [0u8; 64];
        let (n, from) = peer.recv_from(&mut buf).expect("Failed to receive");
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from, conn.local_addr().expect("Failed to query local"));

        conn.set_handler(Recorder::new(&log).stop_at_available(9));
        peer.send_to(b"pong", from).expect("Failed to send");
        peer.send_to(b"", from).expect("Failed to send");
        peer.send_to(b"again", from).expect("Failed to send");

        reactor.run_for(Duration::from_secs(2)).expect("Reactor failed");

        assert_eq!(conn.status(), Status::Connected);
        assert_eq!(conn.read(conn.available()), b"pongagain");
        assert_eq!(conn.outbound_len(), 0);
    }

    #[test]
    fn test_io_requires_socket() {
        let reactor = Reactor::new().expect("Failed to create reactor");
        let conn = Connection::new(&reactor);

        assert!(matches!(conn.write(b"early"), Err(Error::NotConnected)));
        assert!(matches!(conn.local_addr(), Err(Error::NotConnected)));
        assert!(matches!(conn.peer_endpoint(), Err(Error::NotConnected)));
        assert_eq!(conn.available(), 0);
        assert!(conn.peek(10).is_empty());

        conn.close();
        assert_eq!(conn.status(), Status::Closed);
        assert!(matches!(conn.write(b"late"), Err(Error::NotConnected)));
    }
}
