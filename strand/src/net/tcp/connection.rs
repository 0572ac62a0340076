use crate::error::{Error, Result};
use crate::net::buffer::{ReadRequest, StreamBuffer};
use crate::net::queue::{Flush, Sink, WriteQueue};
use crate::reactor::poller::platform::{
    domain_of, sys_close, sys_connect, sys_peername, sys_recv, sys_send, sys_sockname,
    sys_socket, sys_take_socket_error,
};
use crate::reactor::{Event, Interest, IoSource};
use crate::runtime::Handle;
use crate::runtime::Suspend;
use crate::runtime::suspend::{Resumer, suspension};

use bytes::Bytes;
use std::cell::{Cell, RefCell};
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// A TCP connection driven by an event loop.
///
/// Connections are created by a [`TcpListener`](super::TcpListener) for
/// each accepted client, or by [`connect`](Self::connect). Cloning a
/// `TcpConnection` yields another handle to the same socket; the socket
/// is closed by [`close`](Self::close) or when the last handle is dropped.
///
/// Nothing is received until [`start_read`](Self::start_read) is called.
/// Received bytes accumulate in a buffer from which [`read`](Self::read)
/// and [`read_until`](Self::read_until) take exactly what they return.
/// Only one read may be pending at a time. Sends are queued and written in
/// order whenever the socket accepts data.
///
/// # Examples
///
/// ```rust,ignore
/// conn.start_read()?;
///
/// let request_line = conn.read_until(b"\n", Some(b"\r")).await?;
/// conn.send(b"HTTP/1.1 204 No Content\r\n\r\n".to_vec()).await?;
/// conn.close();
/// ```
#[derive(Clone)]
pub struct TcpConnection {
    inner: Rc<Inner>,
}

struct Inner {
    handle: Handle,
    fd: RawFd,
    peer: SocketAddr,

    /// Reactor token; `None` once deregistered.
    token: Cell<Option<usize>>,

    state: RefCell<State>,
}

struct State {
    /// Explicitly closed; the descriptor is released.
    closed: bool,

    /// Reading enabled by `start_read`.
    active: bool,

    /// The peer went away or the socket failed.
    disconnected: bool,

    /// Readiness currently requested from the reactor.
    interest: Interest,

    buffer: StreamBuffer,
    writes: WriteQueue,
}

struct SocketSink(RawFd);

impl Sink for SocketSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        sys_send(self.0, buf)
    }
}

impl TcpConnection {
    /// Wraps a connected, non-blocking socket and registers it with the
    /// loop. The descriptor is closed if registration fails.
    pub(crate) fn open(handle: &Handle, fd: RawFd, peer: SocketAddr) -> Result<Self> {
        let core = match handle.core() {
            Ok(core) => core,
            Err(e) => {
                sys_close(fd);
                return Err(e);
            }
        };

        let inner = Rc::new(Inner {
            handle: handle.clone(),
            fd,
            peer,
            token: Cell::new(None),
            state: RefCell::new(State {
                closed: false,
                active: false,
                disconnected: false,
                interest: Interest::NONE,
                buffer: StreamBuffer::with_capacity(core.config.initial_buffer_capacity),
                writes: WriteQueue::new(),
            }),
        });

        let source = Rc::downgrade(&inner);
        let token = core
            .reactor
            .borrow_mut()
            .register(fd, Interest::NONE, source)?;
        inner.token.set(Some(token));

        trace!(fd, %peer, "connection opened");

        Ok(Self { inner })
    }

    /// Opens a connection to `address`, e.g. `"127.0.0.1:8080"`.
    ///
    /// The calling task is suspended until the connection is established.
    pub async fn connect(handle: &Handle, address: &str) -> Result<Self> {
        let addr: SocketAddr = address.parse().map_err(|_| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid socket address: {address}"),
            ))
        })?;

        let fd = sys_socket(domain_of(&addr)).map_err(|source| Error::Connect { addr, source })?;
        let pending = Rc::new(Connecting {
            handle: handle.clone(),
            fd,
            token: Cell::new(None),
            resumer: RefCell::new(None),
            established: Cell::new(false),
        });

        match sys_connect(fd, &addr) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => pending.wait(addr).await?,
            Err(source) => return Err(Error::Connect { addr, source }),
        }

        pending.established.set(true);
        drop(pending);

        let peer = sys_peername(fd).unwrap_or(addr);
        debug!(fd, %peer, "connected");

        Self::open(handle, fd, peer)
    }

    /// Starts receiving data from the socket.
    pub fn start_read(&self) -> Result<()> {
        let mut state = self.inner.state.borrow_mut();

        if state.closed {
            return Err(Error::NotActive);
        }

        state.active = true;
        self.inner.update_interest(&mut state);

        Ok(())
    }

    /// Stops receiving data. Bytes already buffered stay available.
    pub fn stop_read(&self) -> Result<()> {
        let mut state = self.inner.state.borrow_mut();

        if state.closed {
            return Err(Error::NotActive);
        }

        state.active = false;
        self.inner.update_interest(&mut state);

        Ok(())
    }

    /// Reads exactly `n` bytes.
    ///
    /// A zero-length read resolves immediately with empty bytes. Fails with
    /// [`Error::NotActive`] unless reading was started, with
    /// [`Error::ReadInProgress`] if another read is pending, and with
    /// [`Error::Disconnected`] if the connection is lost before `n` bytes
    /// arrived.
    pub fn read(&self, n: usize) -> Suspend<Bytes> {
        if n == 0 {
            return Suspend::ready(Ok(Bytes::new()));
        }

        self.request(ReadRequest::Exact(n))
    }

    /// Reads up to the first occurrence of `delimiter`.
    ///
    /// The delimiter is consumed but not returned. If `ignore` is given and
    /// the bytes right before the delimiter equal it, they are consumed and
    /// stripped as well (`read_until(b"\n", Some(b"\r"))` reads a CRLF
    /// line).
    pub fn read_until(&self, delimiter: &[u8], ignore: Option<&[u8]>) -> Suspend<Bytes> {
        {
            let state = self.inner.state.borrow();
            if state.closed || !state.active {
                return Suspend::ready(Err(Error::NotActive));
            }
        }

        if delimiter.is_empty() {
            return Suspend::ready(Err(Error::EmptyDelimiter));
        }

        self.request(ReadRequest::Until {
            delimiter: Bytes::copy_from_slice(delimiter),
            ignore: ignore.map(Bytes::copy_from_slice),
        })
    }

    fn request(&self, request: ReadRequest) -> Suspend<Bytes> {
        let mut state = self.inner.state.borrow_mut();

        if state.closed || !state.active {
            return Suspend::ready(Err(Error::NotActive));
        }

        if state.disconnected {
            return match state.buffer.take(&request, 0) {
                Some(bytes) => Suspend::ready(Ok(bytes)),
                None => Suspend::ready(Err(Error::Disconnected)),
            };
        }

        state.buffer.read(request)
    }

    /// Queues `data` and suspends until all of it has been written.
    ///
    /// Resolves with the number of bytes written. An empty payload
    /// resolves immediately with `0`.
    pub fn send(&self, data: impl Into<Bytes>) -> Suspend<usize> {
        let data = data.into();
        let mut state = self.inner.state.borrow_mut();

        if let Err(e) = Self::check_writable(&state) {
            return Suspend::ready(Err(e));
        }

        if data.is_empty() {
            return Suspend::ready(Ok(0));
        }

        let (resumer, suspend) = suspension();
        if state.writes.push(data, Some(resumer)) {
            self.inner.update_interest(&mut state);
        }

        suspend
    }

    /// Queues `data` without waiting for it to be written.
    pub fn send_nowait(&self, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        let mut state = self.inner.state.borrow_mut();

        Self::check_writable(&state)?;

        if !data.is_empty() && state.writes.push(data, None) {
            self.inner.update_interest(&mut state);
        }

        Ok(())
    }

    fn check_writable(state: &State) -> Result<()> {
        if state.closed {
            Err(Error::NotActive)
        } else if state.disconnected {
            Err(Error::Disconnected)
        } else {
            Ok(())
        }
    }

    /// Returns `true` while the connection is open, reading, and the peer
    /// is still there.
    pub fn is_connected(&self) -> bool {
        let state = self.inner.state.borrow();
        !state.closed && state.active && !state.disconnected
    }

    /// Returns `true` if received bytes are waiting to be read.
    pub fn has_buffered_data(&self) -> bool {
        !self.inner.state.borrow().buffer.is_empty()
    }

    /// Number of received bytes waiting to be read.
    pub fn buffered_len(&self) -> usize {
        self.inner.state.borrow().buffer.len()
    }

    /// Number of bytes queued for sending.
    pub fn queued_len(&self) -> usize {
        self.inner.state.borrow().writes.queued_bytes()
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        if self.inner.state.borrow().closed {
            return Err(Error::NotActive);
        }

        Ok(self.inner.peer)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        if self.inner.state.borrow().closed {
            return Err(Error::NotActive);
        }

        Ok(sys_sockname(self.inner.fd)?)
    }

    /// Closes the connection.
    ///
    /// A pending read and every waiting send are resumed with
    /// [`Error::Disconnected`]; the socket and buffers are released.
    /// Closing twice does nothing.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.borrow().closed
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("fd", &self.inner.fd)
            .field("peer", &self.inner.peer)
            .finish()
    }
}

impl Inner {
    /// Brings the reactor interest in line with the state: read while
    /// active, write while sends are queued.
    fn update_interest(&self, state: &mut State) {
        if state.closed || state.disconnected {
            return;
        }

        let wanted = Interest::NONE
            .with_read(state.active)
            .with_write(!state.writes.is_empty());

        if wanted == state.interest {
            return;
        }

        let Some(token) = self.token.get() else {
            return;
        };

        let Ok(core) = self.handle.core() else {
            return;
        };

        let changed = core.reactor.borrow_mut().set_interest(token, wanted);

        match changed {
            Ok(()) => state.interest = wanted,
            Err(e) => self.disconnect(state, Some(e)),
        }
    }

    fn receive(&self) {
        let Ok(core) = self.handle.core() else {
            return;
        };

        let mut scratch = core.scratch.borrow_mut();
        let mut state = self.state.borrow_mut();

        loop {
            if state.closed || state.disconnected || !state.active {
                return;
            }

            match sys_recv(self.fd, &mut scratch) {
                Ok(0) => {
                    self.disconnect(&mut state, None);
                    return;
                }
                Ok(n) => state.buffer.feed(&scratch[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    self.disconnect(&mut state, Some(e));
                    return;
                }
            }
        }
    }

    fn flush(&self) {
        let mut state = self.state.borrow_mut();

        if state.closed || state.disconnected {
            return;
        }

        match state.writes.flush(&mut SocketSink(self.fd)) {
            Flush::Drained => self.update_interest(&mut state),
            Flush::Blocked => {}
            Flush::Failed(e) => self.disconnect(&mut state, Some(e)),
        }
    }

    /// Marks the connection as lost and fails every waiter.
    ///
    /// Buffered bytes are kept so later reads can still drain them.
    fn disconnect(&self, state: &mut State, cause: Option<io::Error>) {
        if state.disconnected {
            return;
        }

        state.disconnected = true;
        state.interest = Interest::NONE;
        state.buffer.fail_pending(Error::Disconnected);
        state.writes.fail_all();
        self.deregister();

        match cause {
            Some(e) => debug!(fd = self.fd, peer = %self.peer, error = %e, "connection failed"),
            None => debug!(fd = self.fd, peer = %self.peer, "peer closed the connection"),
        }
    }

    fn deregister(&self) {
        let Some(token) = self.token.take() else {
            return;
        };

        if let Ok(core) = self.handle.core() {
            match core.reactor.try_borrow_mut() {
                Ok(mut reactor) => reactor.deregister(token),
                Err(_) => warn!(fd = self.fd, "reactor busy, leaving stale registration"),
            }
        }
    }

    fn close(&self) {
        let mut state = self.state.borrow_mut();

        if state.closed {
            return;
        }

        state.closed = true;
        state.active = false;
        state.disconnected = true;
        state.interest = Interest::NONE;

        state.buffer.fail_pending(Error::Disconnected);
        state.writes.fail_all();
        state.buffer.release();

        self.deregister();
        sys_close(self.fd);

        debug!(fd = self.fd, peer = %self.peer, "connection closed");
    }
}

impl IoSource for Inner {
    fn ready(&self, event: Event) {
        if event.readable {
            self.receive();
        }

        if event.writable {
            self.flush();
        }

        if event.hangup {
            let mut state = self.state.borrow_mut();
            if !state.closed {
                self.disconnect(&mut state, None);
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.close();
    }
}

/// A socket waiting for a non-blocking connect to finish.
///
/// Owns the descriptor until the connection is established; dropping it
/// earlier (the connecting task was dropped, or the connect failed)
/// closes the socket.
struct Connecting {
    handle: Handle,
    fd: RawFd,
    token: Cell<Option<usize>>,
    resumer: RefCell<Option<Resumer<()>>>,
    established: Cell<bool>,
}

impl Connecting {
    async fn wait(self: &Rc<Self>, addr: SocketAddr) -> Result<()> {
        let (resumer, suspend) = suspension();
        self.resumer.replace(Some(resumer));

        let source = Rc::downgrade(self);
        let token = self
            .handle
            .core()?
            .reactor
            .borrow_mut()
            .register(self.fd, Interest::WRITE, source)
            .map_err(|source| Error::Connect { addr, source })?;
        self.token.set(Some(token));

        suspend.await.map_err(|e| match e {
            Error::Io(source) => Error::Connect { addr, source },
            other => other,
        })
    }
}

impl IoSource for Connecting {
    fn ready(&self, _event: Event) {
        if let Some(resumer) = self.resumer.borrow_mut().take() {
            resumer.resume(sys_take_socket_error(self.fd).map_err(Error::Io));
        }
    }
}

impl Drop for Connecting {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            if let Ok(core) = self.handle.core() {
                if let Ok(mut reactor) = core.reactor.try_borrow_mut() {
                    reactor.deregister(token);
                }
            }
        }

        if !self.established.get() {
            sys_close(self.fd);
        }
    }
}
