//! Virtual-interface abstraction.
//!
//! The engine never opens the tunnel itself: the host platform's
//! permission-gated VPN API establishes it and hands over a device
//! handle plus a socket exempted from the tunnel's routing. These traits
//! model that capability so the loop can be driven by a real interface
//! in production and by in-memory fakes in tests.

use std::io;
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use parking_lot::Mutex;

use crate::error::{NetworkError, Result};

/// Size of the interface read buffer.
pub const READ_BUFFER_SIZE: usize = 32 * 1024;

/// Addressing the platform should establish the tunnel with.
///
/// The tunnel advertises `gateway` as the device's only DNS server and
/// routes nothing but that single address, so DNS lookups are the only
/// traffic that ever reaches the interception loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunConfig {
    /// Private address assigned to the tunnel itself (/32).
    pub address: Ipv4Addr,
    /// Gateway address advertised as the DNS server and routed (/32).
    pub gateway: Ipv4Addr,
}

impl Default for TunConfig {
    fn default() -> Self {
        Self {
            address: Ipv4Addr::new(10, 0, 0, 2),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
        }
    }
}

/// Read/write access to an established virtual interface.
pub trait TunInterface: Send + 'static {
    /// Pull the next raw IPv4 datagram off the interface.
    ///
    /// Returns `Ok(None)` when no packet is currently available; the
    /// caller decides how long to pause before retrying.
    fn read_packet(&mut self) -> Result<Option<Vec<u8>>>;

    /// Inject a reply packet back into the device's network stack.
    fn write_packet(&mut self, packet: &[u8]) -> Result<()>;
}

/// Capability to establish the tunnel for one session.
///
/// Returns the interface handle together with a UDP socket that the
/// platform has exempted from the tunnel's routing, so upstream
/// forwarding cannot loop back into the interception path.
pub trait TunProvider: Send + Sync {
    type Tun: TunInterface;

    fn establish(&self, config: &TunConfig) -> Result<(Self::Tun, std::net::UdpSocket)>;
}

/// Virtual interface backed by a raw tun file descriptor.
///
/// The host platform opens the device and passes the descriptor down;
/// reads are switched to non-blocking so the loop can poll without
/// getting stuck on an idle interface.
pub struct FdTun {
    fd: OwnedFd,
    read_buf: Vec<u8>,
}

impl FdTun {
    /// Wrap an owned tun descriptor, switching it to non-blocking mode.
    pub fn new(fd: OwnedFd) -> Result<Self> {
        set_nonblocking(fd.as_raw_fd())?;
        Ok(Self {
            fd,
            read_buf: vec![0u8; READ_BUFFER_SIZE],
        })
    }

    /// Wrap a raw tun descriptor, taking ownership of it.
    ///
    /// # Safety
    ///
    /// `fd` must be an open file descriptor that nothing else owns or
    /// closes.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Result<Self> {
        Self::new(unsafe { OwnedFd::from_raw_fd(fd) })
    }
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    // Safety: plain fcntl calls on a descriptor we hold.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error().into());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(())
}

impl TunInterface for FdTun {
    fn read_packet(&mut self) -> Result<Option<Vec<u8>>> {
        // Safety: the buffer outlives the call and the length matches.
        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                self.read_buf.as_mut_ptr().cast(),
                self.read_buf.len(),
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(None),
                _ => Err(err.into()),
            };
        }
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.read_buf[..n as usize].to_vec()))
    }

    fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < packet.len() {
            // Safety: slice pointer and remaining length stay in bounds.
            let n = unsafe {
                libc::write(
                    self.fd.as_raw_fd(),
                    packet[written..].as_ptr().cast(),
                    packet.len() - written,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(NetworkError::SendFailed(err.to_string()).into());
            }
            written += n as usize;
        }
        Ok(())
    }
}

/// Provider adapter for a descriptor inherited from the host process.
///
/// The descriptor can back exactly one session; a second establishment
/// attempt fails instead of handing out an already-consumed handle.
pub struct FdTunProvider {
    fd: Mutex<Option<OwnedFd>>,
}

impl FdTunProvider {
    /// Adopt a raw descriptor handed down by the host platform.
    ///
    /// # Safety
    ///
    /// `fd` must be an open tun descriptor that nothing else owns or
    /// closes.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Self {
        Self {
            fd: Mutex::new(Some(unsafe { OwnedFd::from_raw_fd(fd) })),
        }
    }
}

impl TunProvider for FdTunProvider {
    type Tun = FdTun;

    fn establish(&self, _config: &TunConfig) -> Result<(FdTun, std::net::UdpSocket)> {
        let fd = self
            .fd
            .lock()
            .take()
            .ok_or_else(|| NetworkError::Establish("tun descriptor already consumed".into()))?;
        let tun = FdTun::new(fd)?;
        // The host platform exempts this socket from the tunnel. With the
        // gateway-only route above, binding an ordinary socket suffices:
        // upstream traffic never matches the tunnel's route table.
        let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .map_err(|err| NetworkError::Establish(err.to_string()))?;
        Ok((tun, socket))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// In-memory interface for driving the loop in tests.
    pub struct MockTun {
        incoming: Arc<Mutex<VecDeque<Vec<u8>>>>,
        written: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl MockTun {
        pub fn new() -> Self {
            Self {
                incoming: Arc::new(Mutex::new(VecDeque::new())),
                written: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn with_packets(packets: Vec<Vec<u8>>) -> Self {
            let tun = Self::new();
            *tun.incoming.lock() = packets.into();
            tun
        }

        /// Handle for inspecting packets the loop wrote back.
        pub fn written(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
            Arc::clone(&self.written)
        }

        /// Handle for feeding packets while the loop is running.
        pub fn incoming(&self) -> Arc<Mutex<VecDeque<Vec<u8>>>> {
            Arc::clone(&self.incoming)
        }
    }

    impl TunInterface for MockTun {
        fn read_packet(&mut self) -> Result<Option<Vec<u8>>> {
            Ok(self.incoming.lock().pop_front())
        }

        fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
            self.written.lock().push(packet.to_vec());
            Ok(())
        }
    }

    #[test]
    fn mock_tun_replays_packets_in_order() {
        let mut tun = MockTun::with_packets(vec![vec![1, 2], vec![3]]);

        assert_eq!(tun.read_packet().unwrap(), Some(vec![1, 2]));
        assert_eq!(tun.read_packet().unwrap(), Some(vec![3]));
        assert_eq!(tun.read_packet().unwrap(), None);
    }

    #[test]
    fn mock_tun_records_writes() {
        let mut tun = MockTun::new();
        let written = tun.written();

        tun.write_packet(&[9, 9]).unwrap();
        assert_eq!(written.lock().as_slice(), &[vec![9, 9]]);
    }

    #[test]
    fn default_tun_config_routes_only_the_gateway() {
        let config = TunConfig::default();
        assert_eq!(config.address, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(config.gateway, Ipv4Addr::new(10, 0, 0, 1));
    }
}
