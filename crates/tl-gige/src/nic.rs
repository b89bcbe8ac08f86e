//! Network interface helpers for GigE Vision control and streaming.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use if_addrs::{get_if_addrs, IfAddr};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Default receive buffer size requested for stream sockets (4 MiB), large
/// enough to absorb a few frames' worth of packets during scheduling jitter.
pub const DEFAULT_RCVBUF_BYTES: usize = 4 * 1024 * 1024;

/// A host network interface usable for GVSP reception.
#[derive(Debug, Clone)]
pub struct Iface {
    pub name: String,
    ipv4: Option<Ipv4Addr>,
    mtu: Option<u32>,
}

impl Iface {
    /// Look up a host interface by its OS name.
    pub fn by_name(name: &str) -> io::Result<Self> {
        for entry in get_if_addrs()? {
            if entry.name != name {
                continue;
            }
            let ipv4 = match entry.addr {
                IfAddr::V4(v4) => Some(v4.ip),
                IfAddr::V6(_) => None,
            };
            return Ok(Self {
                name: entry.name,
                ipv4,
                mtu: None,
            });
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such interface: {name}"),
        ))
    }

    /// Build an interface handle directly from a known IPv4 address, bypassing
    /// OS interface enumeration (useful for tests and loopback scenarios).
    pub fn from_ipv4(name: impl Into<String>, ipv4: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            ipv4: Some(ipv4),
            mtu: None,
        }
    }

    /// Override the MTU reported by [`mtu`] for this interface.
    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    /// The interface's IPv4 address, if any.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.ipv4
    }
}

/// Enumerate host interfaces carrying an IPv4 address.
pub fn list_interfaces() -> io::Result<Vec<Iface>> {
    let mut out = Vec::new();
    for entry in get_if_addrs()? {
        if let IfAddr::V4(v4) = entry.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            out.push(Iface {
                name: entry.name,
                ipv4: Some(v4.ip),
                mtu: None,
            });
        }
    }
    Ok(out)
}

/// Multicast socket options applied when joining a GVSP multicast group.
#[derive(Debug, Clone, Copy)]
pub struct McOptions {
    /// Whether packets the host itself sends should loop back to local
    /// receivers (irrelevant for a pure stream receiver, kept for parity
    /// with `IP_MULTICAST_LOOP`).
    pub loopback: bool,
    /// Multicast TTL requested on the joined group.
    pub ttl: u32,
    /// Receive buffer size requested via `SO_RCVBUF`.
    pub rcvbuf_bytes: usize,
}

impl Default for McOptions {
    fn default() -> Self {
        Self {
            loopback: false,
            ttl: 1,
            rcvbuf_bytes: DEFAULT_RCVBUF_BYTES,
        }
    }
}

/// Query the link MTU for an interface. Falls back to the conventional
/// Ethernet MTU of 1500 bytes when the interface did not report one.
pub fn mtu(iface: &Iface) -> io::Result<u32> {
    Ok(iface.mtu.unwrap_or(1500))
}

/// Compute the best GVSP payload packet size for a given link MTU, leaving
/// room for the IPv4 header (20 bytes), UDP header (8 bytes) and GVSP leader
/// (8 bytes).
pub fn best_packet_size(mtu: u32) -> u32 {
    const OVERHEAD: u32 = 20 + 8 + 8;
    mtu.saturating_sub(OVERHEAD).max(576)
}

fn configure_rcvbuf(socket: &Socket, rcvbuf_bytes: usize) -> io::Result<()> {
    socket.set_recv_buffer_size(rcvbuf_bytes)
}

/// Bind a UDP socket for unicast GVSP reception, optionally bound to a
/// specific interface's address and with a requested receive buffer size.
pub async fn bind_udp(
    bind_ip: IpAddr,
    port: u16,
    iface: Option<Iface>,
    rcvbuf_bytes: Option<usize>,
) -> io::Result<UdpSocket> {
    let bind_ip = match (bind_ip, iface) {
        (IpAddr::V4(ip), _) if !ip.is_unspecified() => IpAddr::V4(ip),
        (_, Some(iface)) => iface
            .ipv4()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        (other, None) => other,
    };
    let domain = Domain::for_address(SocketAddr::new(bind_ip, port));
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    configure_rcvbuf(&socket, rcvbuf_bytes.unwrap_or(DEFAULT_RCVBUF_BYTES))?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::new(bind_ip, port).into())?;
    UdpSocket::from_std(socket.into())
}

/// Bind a UDP socket and join the given multicast group on the provided
/// interface, applying [`McOptions`].
pub async fn bind_multicast(
    iface: &Iface,
    group: Ipv4Addr,
    port: u16,
    opts: &McOptions,
) -> io::Result<UdpSocket> {
    let iface_ip = iface.ipv4().unwrap_or(Ipv4Addr::UNSPECIFIED);
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    configure_rcvbuf(&socket, opts.rcvbuf_bytes)?;
    socket.set_multicast_loop_v4(opts.loopback)?;
    socket.set_multicast_ttl_v4(opts.ttl)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port).into())?;
    socket.join_multicast_v4(&group, &iface_ip)?;
    UdpSocket::from_std(socket.into())
}
