use libc::{
    AF_INET, AF_INET6, F_GETFL, F_SETFL, IPPROTO_IPV6, IPV6_V6ONLY, MSG_NOSIGNAL, O_NONBLOCK,
    SO_ERROR, SO_REUSEADDR, SOCK_CLOEXEC, SOCK_STREAM, SOL_SOCKET, accept4, bind, c_int, close,
    connect, fcntl, getpeername, getsockname, getsockopt, listen, recv, send, setsockopt, sockaddr,
    sockaddr_in, sockaddr_in6, sockaddr_storage, socket, socklen_t,
};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::RawFd;
use std::{io, mem};

/// Receives from a socket into the given buffer.
///
/// The descriptor **must** be non-blocking.
pub(crate) fn sys_recv(fd: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { recv(fd, buffer.as_mut_ptr() as *mut _, buffer.len(), 0) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// Sends the buffer through a socket without raising `SIGPIPE`.
///
/// The descriptor **must** be non-blocking.
pub(crate) fn sys_send(fd: RawFd, buffer: &[u8]) -> io::Result<usize> {
    let n = unsafe { send(fd, buffer.as_ptr() as *const _, buffer.len(), MSG_NOSIGNAL) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// Closes a file descriptor.
pub(crate) fn sys_close(fd: RawFd) {
    unsafe { close(fd) };
}

/// Sets a file descriptor to non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Creates a non-blocking, close-on-exec stream socket.
pub(crate) fn sys_socket(domain: c_int) -> io::Result<RawFd> {
    let fd = unsafe { socket(domain, SOCK_STREAM | SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    if let Err(e) = sys_set_nonblocking(fd) {
        unsafe { close(fd) };
        return Err(e);
    }

    Ok(fd)
}

/// Binds a socket to an address.
pub(crate) fn sys_bind(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = encode_addr(addr);

    let rc = unsafe { bind(fd, &storage as *const _ as *const sockaddr, len) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Marks a socket as a listening socket.
pub(crate) fn sys_listen(fd: RawFd, backlog: i32) -> io::Result<()> {
    let rc = unsafe { listen(fd, backlog) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Accepts a new incoming connection.
///
/// The returned client socket is non-blocking and close-on-exec.
pub(crate) fn sys_accept(fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let client_fd = unsafe {
        accept4(
            fd,
            &mut storage as *mut _ as *mut sockaddr,
            &mut len,
            SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
        )
    };

    if client_fd < 0 {
        return Err(io::Error::last_os_error());
    }

    match decode_addr(&storage) {
        Ok(addr) => Ok((client_fd, addr)),
        Err(e) => {
            unsafe { close(client_fd) };
            Err(e)
        }
    }
}

type AddrQuery = unsafe extern "C" fn(c_int, *mut sockaddr, *mut socklen_t) -> c_int;

/// Runs `getsockname`-style `query` on `fd` and decodes the address.
fn query_addr(fd: RawFd, query: AddrQuery) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    if unsafe { query(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) } < 0 {
        return Err(io::Error::last_os_error());
    }

    decode_addr(&storage)
}

/// Returns the local address of a socket.
pub(crate) fn sys_sockname(fd: RawFd) -> io::Result<SocketAddr> {
    query_addr(fd, getsockname)
}

/// Returns the address of the connected peer.
pub(crate) fn sys_peername(fd: RawFd) -> io::Result<SocketAddr> {
    query_addr(fd, getpeername)
}

/// Initiates a non-blocking connection.
pub(crate) fn sys_connect(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = encode_addr(addr);

    let rc = unsafe { connect(fd, &storage as *const _ as *const sockaddr, len) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Reads and clears the pending `SO_ERROR` of a socket.
///
/// Used once a non-blocking connect reports writability.
pub(crate) fn sys_take_socket_error(fd: RawFd) -> io::Result<()> {
    let mut value: c_int = 0;
    let mut len = mem::size_of::<c_int>() as socklen_t;

    let rc = unsafe {
        getsockopt(
            fd,
            SOL_SOCKET,
            SO_ERROR,
            &mut value as *mut _ as *mut _,
            &mut len,
        )
    };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else if value != 0 {
        Err(io::Error::from_raw_os_error(value))
    } else {
        Ok(())
    }
}

/// Sets an integer socket option.
fn set_int_option(fd: RawFd, level: c_int, name: c_int, value: c_int) -> io::Result<()> {
    let rc = unsafe {
        setsockopt(
            fd,
            level,
            name,
            &value as *const _ as *const _,
            mem::size_of::<c_int>() as socklen_t,
        )
    };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Enables `SO_REUSEADDR` on a socket.
pub(crate) fn sys_set_reuseaddr(fd: RawFd) -> io::Result<()> {
    set_int_option(fd, SOL_SOCKET, SO_REUSEADDR, 1)
}

/// Lets an IPv6 listener accept IPv4-mapped clients too.
pub(crate) fn sys_enable_dual_stack(fd: RawFd, domain: c_int) -> io::Result<()> {
    if domain == AF_INET6 {
        set_int_option(fd, IPPROTO_IPV6, IPV6_V6ONLY, 0)?;
    }
    Ok(())
}

/// Returns the socket domain matching an address.
pub(crate) fn domain_of(addr: &SocketAddr) -> c_int {
    match addr {
        SocketAddr::V4(_) => AF_INET,
        SocketAddr::V6(_) => AF_INET6,
    }
}

/// Decodes an IPv4 or IPv6 socket address filled in by the kernel.
fn decode_addr(storage: &sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as c_int {
        AF_INET => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            let port = u16::from_be(addr.sin_port);

            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }

        AF_INET6 => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
            let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
            let port = u16::from_be(addr.sin6_port);

            Ok(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }

        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported address family",
        )),
    }
}

/// Encodes `addr` for `bind`/`connect`, returning the length to pass.
fn encode_addr(addr: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    match addr {
        SocketAddr::V4(v4) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
            sa.sin_family = AF_INET as _;
            sa.sin_port = v4.port().to_be();
            sa.sin_addr.s_addr = u32::from(*v4.ip()).to_be();

            (storage, mem::size_of::<sockaddr_in>() as socklen_t)
        }

        SocketAddr::V6(v6) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
            sa.sin6_family = AF_INET6 as _;
            sa.sin6_port = v6.port().to_be();
            sa.sin6_addr.s6_addr = v6.ip().octets();
            sa.sin6_flowinfo = v6.flowinfo();
            sa.sin6_scope_id = v6.scope_id();

            (storage, mem::size_of::<sockaddr_in6>() as socklen_t)
        }
    }
}
