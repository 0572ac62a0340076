use super::connection::TcpConnection;
use crate::error::{Error, Result};
use crate::reactor::poller::platform::{
    domain_of, sys_accept, sys_bind, sys_close, sys_enable_dual_stack, sys_listen,
    sys_set_reuseaddr, sys_socket, sys_sockname,
};
use crate::reactor::{Event, Interest, IoSource};
use crate::runtime::Handle;
use crate::runtime::task::{LocalBoxFuture, catch_panic};

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::rc::Rc;
use tracing::{debug, error, warn};

/// Per-connection entry task factory.
type Entry = dyn Fn(TcpConnection) -> LocalBoxFuture<Result<()>>;

/// A TCP server socket.
///
/// `TcpListener` accepts connections while started and runs the entry
/// function as a new task for each of them, passing the accepted
/// [`TcpConnection`]. If the entry task returns an error or panics, the
/// error is logged and the connection is closed.
///
/// # Examples
///
/// ```rust,ignore
/// async fn greet(conn: TcpConnection) -> strand::Result<()> {
///     conn.start_read()?;
///     let name = conn.read_until(b"\n", Some(b"\r")).await?;
///     conn.send([&b"hello "[..], &name, b"\n"].concat()).await?;
///     Ok(())
/// }
///
/// let listener = TcpListener::bind(&handle, "127.0.0.1:8080", greet)?;
/// listener.start()?;
/// ```
pub struct TcpListener {
    inner: Rc<Inner>,
}

struct Inner {
    handle: Handle,
    fd: RawFd,
    local: SocketAddr,
    token: Cell<Option<usize>>,
    state: RefCell<State>,
}

struct State {
    active: bool,
    closed: bool,
    entry: Option<Rc<Entry>>,
}

fn bind_error(address: &str, source: io::Error) -> Error {
    Error::Bind {
        addr: address.to_string(),
        source,
    }
}

impl TcpListener {
    /// Binds a listening socket to `address`, e.g. `"127.0.0.1:8080"` or
    /// `"[::1]:0"`.
    ///
    /// The listener does not accept anything until [`start`](Self::start)
    /// is called; clients connecting earlier wait in the backlog.
    pub fn bind<F, Fut>(handle: &Handle, address: &str, entry: F) -> Result<Self>
    where
        F: Fn(TcpConnection) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        let addr: SocketAddr = address.parse().map_err(|_| {
            bind_error(
                address,
                io::Error::new(io::ErrorKind::InvalidInput, "invalid socket address"),
            )
        })?;

        let core = handle.core()?;
        let domain = domain_of(&addr);
        let fd = sys_socket(domain).map_err(|e| bind_error(address, e))?;

        let setup = sys_set_reuseaddr(fd)
            .and_then(|_| sys_enable_dual_stack(fd, domain))
            .and_then(|_| sys_bind(fd, &addr))
            .and_then(|_| sys_listen(fd, core.config.listen_backlog))
            .and_then(|_| sys_sockname(fd));

        let local = match setup {
            Ok(local) => local,
            Err(e) => {
                sys_close(fd);
                return Err(bind_error(address, e));
            }
        };

        let entry: Rc<Entry> =
            Rc::new(move |conn: TcpConnection| -> LocalBoxFuture<Result<()>> { Box::pin(entry(conn)) });

        let inner = Rc::new(Inner {
            handle: handle.clone(),
            fd,
            local,
            token: Cell::new(None),
            state: RefCell::new(State {
                active: false,
                closed: false,
                entry: Some(entry),
            }),
        });

        let source = Rc::downgrade(&inner);
        let token = core
            .reactor
            .borrow_mut()
            .register(fd, Interest::NONE, source)?;
        inner.token.set(Some(token));

        debug!(fd, %local, "listener bound");

        Ok(Self { inner })
    }

    /// Starts accepting connections.
    pub fn start(&self) -> Result<()> {
        self.inner.set_active(true)
    }

    /// Stops accepting; pending clients stay in the backlog.
    pub fn stop(&self) -> Result<()> {
        self.inner.set_active(false)
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.borrow().active
    }

    /// Returns the bound address (with the actual port when bound to `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local
    }

    /// Stops accepting, closes the socket and drops the entry function.
    ///
    /// Connections accepted earlier are not affected.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Inner {
    fn set_active(&self, active: bool) -> Result<()> {
        let mut state = self.state.borrow_mut();

        if state.closed {
            return Err(Error::NotActive);
        }

        if let Some(token) = self.token.get() {
            let interest = Interest::NONE.with_read(active);
            self.handle
                .core()?
                .reactor
                .borrow_mut()
                .set_interest(token, interest)?;
        }

        state.active = active;
        Ok(())
    }

    fn accept_pending(&self) {
        loop {
            let entry = {
                let state = self.state.borrow();

                match &state.entry {
                    Some(entry) if state.active && !state.closed => entry.clone(),
                    _ => return,
                }
            };

            match sys_accept(self.fd) {
                Ok((fd, peer)) => {
                    debug!(fd, %peer, "connection accepted");
                    self.serve(fd, peer, entry);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e)
                    if e.kind() == io::ErrorKind::Interrupted
                        || e.kind() == io::ErrorKind::ConnectionAborted =>
                {
                    continue;
                }
                Err(e) => {
                    warn!(fd = self.fd, error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    /// Runs the entry task for an accepted socket, starting it right away.
    fn serve(&self, fd: RawFd, peer: SocketAddr, entry: Rc<Entry>) {
        let conn = match TcpConnection::open(&self.handle, fd, peer) {
            Ok(conn) => conn,
            Err(e) => {
                warn!(%peer, error = %e, "failed to register accepted connection");
                return;
            }
        };

        let task = async move {
            let result = match catch_panic(entry(conn.clone())).await {
                Ok(result) => result,
                Err(message) => Err(Error::Panicked(message)),
            };

            if let Err(e) = &result {
                error!(%peer, error = %e, "connection handler failed");
                conn.close();
            }

            Ok(())
        };

        if let Err(e) = self.handle.spawn_local(Box::pin(task), true) {
            warn!(%peer, error = %e, "failed to spawn connection handler");
        }
    }

    fn close(&self) {
        let mut state = self.state.borrow_mut();

        if state.closed {
            return;
        }

        state.closed = true;
        state.active = false;
        state.entry = None;

        if let Some(token) = self.token.take() {
            if let Ok(core) = self.handle.core() {
                if let Ok(mut reactor) = core.reactor.try_borrow_mut() {
                    reactor.deregister(token);
                }
            }
        }

        sys_close(self.fd);
        debug!(fd = self.fd, local = %self.local, "listener closed");
    }
}

impl IoSource for Inner {
    fn ready(&self, _event: Event) {
        self.accept_pending();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.close();
    }
}
