//! Multicast socket for the SSDP control point.
//!
//! One socket serves both directions: it is bound to the SSDP port with
//! address reuse so NOTIFY multicasts are received, and M-SEARCH requests
//! go out through it so unicast 200 OK responses come back on the same
//! port. The read timeout keeps the listener loop cooperative: the owner
//! can check its shutdown flag between `recv_event` calls.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, trace, warn};

use super::message::{SsdpEvent, parse_message};

/// Receive buffer size; SSDP datagrams are small.
const RECV_BUFFER_LEN: usize = 4096;

pub struct SsdpSocket {
    socket: UdpSocket,
    group: Ipv4Addr,
    port: u16,
    user_agent: String,
}

impl SsdpSocket {
    /// Open the multicast socket: bind `0.0.0.0:<port>` with address
    /// reuse, join `group` on every non-loopback IPv4 interface, set the
    /// multicast TTL and a read timeout.
    ///
    /// Join failures on individual interfaces are logged and tolerated;
    /// the socket is usable as long as the bind itself succeeded.
    pub fn open(
        group: Ipv4Addr,
        port: u16,
        ttl: u32,
        read_timeout: Duration,
        user_agent: &str,
    ) -> io::Result<Self> {
        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;

        let bind_addr: SocketAddr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        socket2.bind(&bind_addr.into())?;

        let socket: UdpSocket = socket2.into();
        socket.set_read_timeout(Some(read_timeout))?;
        socket.set_multicast_ttl_v4(ttl)?;
        socket.set_multicast_loop_v4(true)?; // utile en dev local

        for iface in get_if_addrs::get_if_addrs()? {
            if let std::net::IpAddr::V4(ipv4) = iface.ip() {
                if !ipv4.is_loopback() {
                    match socket.join_multicast_v4(&group, &ipv4) {
                        Ok(()) => {
                            debug!("SSDP: joined {} on {}", group, ipv4);
                        }
                        Err(e) => {
                            warn!("SSDP: failed to join {} on {}: {}", group, ipv4, e);
                        }
                    }
                }
            }
        }

        info!("✅ SSDP socket ready on {}:{}", group, port);

        Ok(Self {
            socket,
            group,
            port,
            user_agent: user_agent.to_string(),
        })
    }

    /// Envoie un M-SEARCH pour un type donné
    pub fn send_msearch(&self, st: &str, mx: u32) -> io::Result<()> {
        let mx = mx.max(1); // MX doit être >= 1
        let msg = format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {}:{}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: {}\r\n\
             ST: {}\r\n\
             USER-AGENT: {}\r\n\
             \r\n",
            self.group, self.port, mx, st, self.user_agent
        );

        let addr = SocketAddr::from((self.group, self.port));
        match self.socket.send_to(msg.as_bytes(), addr) {
            Ok(_) => {
                debug!("📤 M-SEARCH sent (ST={}, MX={})", st, mx);
                Ok(())
            }
            Err(e) => {
                warn!("❌ Failed to send M-SEARCH: {}", e);
                Err(e)
            }
        }
    }

    /// Receive one datagram and parse it.
    ///
    /// `Ok(None)` covers both the read timeout and datagrams a control
    /// point must ignore, so callers can loop on this and poll their
    /// shutdown flag in between.
    pub fn recv_event(&self) -> io::Result<Option<SsdpEvent>> {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        match self.socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                let data = String::from_utf8_lossy(&buf[..n]);
                let event = parse_message(&data, from);
                if let Some(ref event) = event {
                    trace!("📥 SSDP event from {}: {:?}", from, event);
                }
                Ok(event)
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Leave the multicast group on every interface we joined it on.
    /// Best effort; errors are logged only.
    pub fn leave_group(&self) {
        if let Ok(ifaces) = get_if_addrs::get_if_addrs() {
            for iface in ifaces {
                if let std::net::IpAddr::V4(ipv4) = iface.ip() {
                    if !ipv4.is_loopback() {
                        if let Err(e) = self.socket.leave_multicast_v4(&self.group, &ipv4) {
                            trace!("SSDP: leave {} on {}: {}", self.group, ipv4, e);
                        }
                    }
                }
            }
        }
    }
}
