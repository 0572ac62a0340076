use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use strand::net::{TcpConnection, TcpListener};
use strand::{Error, EventLoop, Handle, Result};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Waits on the loop for a blocking peer thread to finish.
async fn join_peer<T: Send + 'static>(handle: &Handle, peer: thread::JoinHandle<T>) -> T {
    handle
        .spawn_blocking(move || peer.join())
        .await
        .expect("Failed to offload join")
        .expect("Peer thread panicked")
}

async fn echo_lines(conn: TcpConnection) -> Result<()> {
    conn.start_read()?;

    loop {
        let line = conn.read_until(b"\n", Some(b"\r")).await?;
        if line.as_ref() == b"quit" {
            return Ok(());
        }

        let mut reply = line.to_vec();
        reply.push(b'\n');
        conn.send(reply).await?;
    }
}

#[test]
fn test_echo_crlf_lines() {
    init_tracing();

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();

    let listener = TcpListener::bind(&handle, "127.0.0.1:0", echo_lines).expect("Failed to bind");
    listener.start().expect("Failed to start listener");
    let addr = listener.local_addr();

    let peer = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("Failed to connect");
        stream
            .write_all(b"hello\r\nwor")
            .expect("Failed to write to stream");
        thread::sleep(Duration::from_millis(20));
        stream
            .write_all(b"ld\nquit\n")
            .expect("Failed to write to stream");

        let mut reply = String::new();
        stream
            .read_to_string(&mut reply)
            .expect("Failed to read from stream");
        reply
    });

    let reply = event_loop.block_on(async move { join_peer(&handle, peer).await });
    assert_eq!(reply, "hello\nworld\n");
}

async fn exact_reads(conn: TcpConnection) -> Result<()> {
    conn.start_read()?;

    let head = conn.read(3).await?;
    let tail = conn.read(5).await?;

    conn.send([tail, head].concat()).await?;
    Ok(())
}

#[test]
fn test_exact_reads_span_chunks() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();

    let listener = TcpListener::bind(&handle, "127.0.0.1:0", exact_reads).expect("Failed to bind");
    listener.start().expect("Failed to start listener");
    let addr = listener.local_addr();

    let peer = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("Failed to connect");
        for chunk in [&b"ab"[..], b"cdef", b"gh"] {
            stream.write_all(chunk).expect("Failed to write to stream");
            thread::sleep(Duration::from_millis(10));
        }

        let mut reply = Vec::new();
        stream
            .read_to_end(&mut reply)
            .expect("Failed to read from stream");
        reply
    });

    let reply = event_loop.block_on(async move { join_peer(&handle, peer).await });
    assert_eq!(reply, b"defghabc");
}

type Log = Rc<RefCell<Vec<String>>>;

fn outcome<T: std::fmt::Debug>(result: &Result<T>) -> String {
    match result {
        Ok(value) => format!("ok {value:?}"),
        Err(e) => format!("err {e}"),
    }
}

async fn misuse(conn: TcpConnection, log: Log) -> Result<()> {
    log.borrow_mut().push(outcome(&conn.read(0).await));
    log.borrow_mut().push(outcome(&conn.read(4).await));
    log.borrow_mut().push(outcome(&conn.read_until(b"\n", None).await));

    conn.start_read()?;
    log.borrow_mut().push(outcome(&conn.read_until(b"", None).await));
    log.borrow_mut().push(outcome(&conn.send(&b""[..]).await));

    let first = conn.read(2);
    log.borrow_mut().push(outcome(&conn.read(2).await));
    log.borrow_mut().push(outcome(&first.await));

    conn.send(&b"done"[..]).await?;
    Ok(())
}

#[test]
fn test_synchronous_failures() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();
    let log: Log = Rc::default();

    let recorded = log.clone();
    let listener = TcpListener::bind(&handle, "127.0.0.1:0", move |conn| {
        misuse(conn, recorded.clone())
    })
    .expect("Failed to bind");
    listener.start().expect("Failed to start listener");
    let addr = listener.local_addr();

    let peer = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("Failed to connect");
        stream.write_all(b"xy").expect("Failed to write to stream");

        let mut reply = Vec::new();
        stream
            .read_to_end(&mut reply)
            .expect("Failed to read from stream");
        reply
    });

    let reply = event_loop.block_on(async move { join_peer(&handle, peer).await });
    assert_eq!(reply, b"done");

    let log = log.borrow();
    assert_eq!(log[0], "ok b\"\"");
    assert_eq!(log[1], "err connection is not active");
    assert_eq!(log[2], "err connection is not active");
    assert_eq!(log[3], "err delimiter must not be empty");
    assert_eq!(log[4], "ok 0");
    assert_eq!(log[5], "err a read is already pending on this connection");
    assert_eq!(log[6], "ok b\"xy\"");
}

async fn until_eof(conn: TcpConnection, log: Log) -> Result<()> {
    conn.start_read()?;

    let line = conn.read_until(b"\n", None).await;
    log.borrow_mut().push(outcome(&line));
    log.borrow_mut().push(format!("buffered {}", conn.buffered_len()));
    log.borrow_mut().push(format!("connected {}", conn.is_connected()));

    let rest = conn.read(7).await;
    log.borrow_mut().push(outcome(&rest));
    log.borrow_mut().push(outcome(&conn.read(1).await));
    log.borrow_mut().push(outcome(&conn.send(&b"late"[..]).await));

    Ok(())
}

#[test]
fn test_peer_disconnect_keeps_buffered_bytes() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();
    let log: Log = Rc::default();

    let recorded = log.clone();
    let listener = TcpListener::bind(&handle, "127.0.0.1:0", move |conn| {
        until_eof(conn, recorded.clone())
    })
    .expect("Failed to bind");
    listener.start().expect("Failed to start listener");
    let addr = listener.local_addr();

    let peer = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("Failed to connect");
        stream.write_all(b"partial").expect("Failed to write to stream");
        stream
            .shutdown(Shutdown::Write)
            .expect("Failed to shut down stream");

        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    event_loop.block_on(async move { join_peer(&handle, peer).await });

    let log = log.borrow();
    assert_eq!(log[0], "err connection disconnected");
    assert_eq!(log[1], "buffered 7");
    assert_eq!(log[2], "connected false");
    assert_eq!(log[3], "ok b\"partial\"");
    assert_eq!(log[4], "err connection disconnected");
    assert_eq!(log[5], "err connection disconnected");
}

async fn close_while_waiting(conn: TcpConnection, log: Log) -> Result<()> {
    conn.start_read()?;

    let read = conn.read(4);
    conn.close();
    conn.close();

    log.borrow_mut().push(outcome(&read.await));
    log.borrow_mut().push(format!("closed {}", conn.is_closed()));
    log.borrow_mut().push(outcome(&conn.send(&b"x"[..]).await));
    log.borrow_mut().push(outcome(&conn.start_read()));
    log.borrow_mut().push(outcome(&conn.peer_addr()));

    Ok(())
}

#[test]
fn test_close_resumes_waiters() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();
    let log: Log = Rc::default();

    let recorded = log.clone();
    let listener = TcpListener::bind(&handle, "127.0.0.1:0", move |conn| {
        close_while_waiting(conn, recorded.clone())
    })
    .expect("Failed to bind");
    listener.start().expect("Failed to start listener");
    let addr = listener.local_addr();

    let peer = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("Failed to connect");
        let mut rest = Vec::new();
        stream
            .read_to_end(&mut rest)
            .expect("Failed to read from stream");
        rest.len()
    });

    let received = event_loop.block_on(async move { join_peer(&handle, peer).await });
    assert_eq!(received, 0);

    let log = log.borrow();
    assert_eq!(log[0], "err connection disconnected");
    assert_eq!(log[1], "closed true");
    assert_eq!(log[2], "err connection is not active");
    assert_eq!(log[3], "err connection is not active");
    assert_eq!(log[4], "err connection is not active");
}

async fn bulk(conn: TcpConnection, size: usize, log: Log) -> Result<()> {
    let payload = vec![0x5a; size];

    conn.send_nowait(&b"head"[..])?;
    let written = conn.send(payload).await?;
    log.borrow_mut().push(format!("written {written}"));
    log.borrow_mut().push(format!("queued {}", conn.queued_len()));

    Ok(())
}

#[test]
fn test_large_send_completes_in_order() {
    const SIZE: usize = 4 * 1024 * 1024;

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();
    let log: Log = Rc::default();

    let recorded = log.clone();
    let listener = TcpListener::bind(&handle, "127.0.0.1:0", move |conn| {
        bulk(conn, SIZE, recorded.clone())
    })
    .expect("Failed to bind");
    listener.start().expect("Failed to start listener");
    let addr = listener.local_addr();

    let peer = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("Failed to connect");
        thread::sleep(Duration::from_millis(50));

        let mut received = Vec::new();
        stream
            .read_to_end(&mut received)
            .expect("Failed to read from stream");
        received
    });

    let received = event_loop.block_on(async move { join_peer(&handle, peer).await });

    assert_eq!(received.len(), SIZE + 4);
    assert_eq!(&received[..4], b"head");
    assert!(received[4..].iter().all(|&b| b == 0x5a));
    assert_eq!(*log.borrow(), vec![format!("written {SIZE}"), "queued 0".to_string()]);
}

#[test]
fn test_outbound_connect() {
    let server = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let addr = server.local_addr().expect("Failed to get local address");

    let peer = thread::spawn(move || {
        let (mut stream, _) = server.accept().expect("Failed to accept connection");
        let mut buffer = [0; 4];
        stream
            .read_exact(&mut buffer)
            .expect("Failed to read from stream");
        stream.write_all(&buffer).expect("Failed to write to stream");
    });

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();

    let echoed = event_loop.block_on(async move {
        let conn = TcpConnection::connect(&handle, &addr.to_string())
            .await
            .expect("Failed to connect");

        assert_eq!(conn.peer_addr().expect("Missing peer address"), addr);
        assert!(conn.local_addr().expect("Missing local address").port() != 0);

        conn.start_read().expect("Failed to start reading");
        conn.send(&b"ping"[..]).await.expect("Failed to send");
        let echoed = conn.read(4).await.expect("Failed to read");

        join_peer(&handle, peer).await;
        echoed
    });

    assert_eq!(echoed.as_ref(), b"ping");
}

#[test]
fn test_connect_refused() {
    let addr = {
        let server = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        server.local_addr().expect("Failed to get local address")
    };

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();

    let result = event_loop.block_on(async move {
        TcpConnection::connect(&handle, &addr.to_string()).await
    });

    assert!(matches!(result, Err(Error::Connect { .. })));
}

async fn close_with_waiters(conn: TcpConnection, log: Log) -> Result<()> {
    conn.start_read()?;

    let read = conn.read(50);
    let first = conn.send(&b"first"[..]);
    let second = conn.send(&b"second"[..]);
    log.borrow_mut().push(format!("queued {}", conn.queued_len()));

    conn.close();

    log.borrow_mut().push(outcome(&read.await));
    log.borrow_mut().push(outcome(&first.await));
    log.borrow_mut().push(outcome(&second.await));

    Ok(())
}

#[test]
fn test_close_fails_pending_read_and_queued_sends() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();
    let log: Log = Rc::default();

    let recorded = log.clone();
    let listener = TcpListener::bind(&handle, "127.0.0.1:0", move |conn| {
        close_with_waiters(conn, recorded.clone())
    })
    .expect("Failed to bind");
    listener.start().expect("Failed to start listener");
    let addr = listener.local_addr();

    let peer = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("Failed to connect");
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
        rest
    });

    let received = event_loop.block_on(async move { join_peer(&handle, peer).await });
    assert!(received.is_empty());

    assert_eq!(
        *log.borrow(),
        vec![
            "queued 11",
            "err connection disconnected",
            "err connection disconnected",
            "err connection disconnected",
        ]
    );
}

async fn request_head(conn: TcpConnection, log: Log) -> Result<()> {
    conn.start_read()?;

    let head = conn.read_until(b"\r\n\r\n", None).await?;
    log.borrow_mut().push(outcome(&Ok(head)));

    conn.send(&b"ok"[..]).await?;
    Ok(())
}

#[test]
fn test_request_head_split_across_segments() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();
    let log: Log = Rc::default();

    let recorded = log.clone();
    let listener = TcpListener::bind(&handle, "127.0.0.1:0", move |conn| {
        request_head(conn, recorded.clone())
    })
    .expect("Failed to bind");
    listener.start().expect("Failed to start listener");
    let addr = listener.local_addr();

    let peer = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("Failed to connect");
        stream.set_nodelay(true).expect("Failed to set nodelay");

        stream.write_all(b"GET /\r").expect("Failed to write to stream");
        thread::sleep(Duration::from_millis(30));
        stream.write_all(b"\n\r\n").expect("Failed to write to stream");

        let mut reply = Vec::new();
        stream
            .read_to_end(&mut reply)
            .expect("Failed to read from stream");
        reply
    });

    let reply = event_loop.block_on(async move { join_peer(&handle, peer).await });

    assert_eq!(reply, b"ok");
    assert_eq!(*log.borrow(), vec!["ok b\"GET /\""]);
}
