use crate::error::{Error, Result};
use crate::runtime::Handle;

use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use tracing::trace;

/// Resolves a host name to an IP address.
///
/// The lookup runs on the offload pool, so the loop keeps serving other
/// tasks meanwhile. The first IPv4 address is preferred; otherwise the
/// first address returned is used. IP literals resolve to themselves.
///
/// # Examples
///
/// ```rust,ignore
/// let ip = strand::net::resolve(&handle, "localhost").await?;
/// let conn = TcpConnection::connect(&handle, &format!("{ip}:6379")).await?;
/// ```
pub async fn resolve(handle: &Handle, host: &str) -> Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let name = host.to_owned();
    let lookup = handle
        .spawn_blocking(move || -> io::Result<Vec<SocketAddr>> {
            Ok((name.as_str(), 0).to_socket_addrs()?.collect())
        })
        .await?;

    let addrs = lookup.map_err(|source| Error::Resolve {
        host: host.to_owned(),
        source,
    })?;

    let ip = pick(&addrs).ok_or_else(|| Error::Resolve {
        host: host.to_owned(),
        source: io::Error::new(io::ErrorKind::NotFound, "no address found"),
    })?;

    trace!(host, %ip, "resolved");
    Ok(ip)
}

fn pick(addrs: &[SocketAddr]) -> Option<IpAddr> {
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .map(SocketAddr::ip)
}
