use super::error::TftpError;
use super::packet::{MAX_PACKET_SIZE, Packet};
use std::{
    io::ErrorKind,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket},
    time::Duration,
};

/// Socket `trait` is used to allow building custom sockets to be used for
/// TFTP communication. The transfer state machine only talks to the network
/// through this trait, which keeps it testable with scripted peers.
pub trait Socket: Send + 'static {
    /// Sends a [`Packet`] to the specified remote address. A datagram that is
    /// not written in full is reported as [`TftpError::ShortWrite`].
    fn send_to(&self, packet: &Packet, to: &SocketAddr) -> Result<(), TftpError>;
    /// Waits up to `timeout` for one datagram and returns its raw bytes and
    /// source. Returns `Ok(None)` when nothing arrived in time. The buffer is
    /// one byte larger than the largest legal packet so oversized datagrams
    /// are detected by the codec rather than silently truncated to fit.
    fn recv_from(&self, timeout: Duration) -> Result<Option<(Vec<u8>, SocketAddr)>, TftpError>;
    /// Reads and discards every datagram already queued on the socket and
    /// returns how many were dropped.
    fn drain(&self) -> Result<usize, TftpError>;
    /// Returns the local address the socket is bound to.
    fn local_addr(&self) -> Result<SocketAddr, TftpError>;
}

/// Binds a UDP socket on an ephemeral port of all IPv4 interfaces.
pub fn bind_any() -> Result<UdpSocket, TftpError> {
    UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).map_err(TftpError::Bind)
}

impl Socket for UdpSocket {
    fn send_to(&self, packet: &Packet, to: &SocketAddr) -> Result<(), TftpError> {
        let bytes = packet.serialize()?;
        let sent = UdpSocket::send_to(self, &bytes, to)?;
        if sent != bytes.len() {
            return Err(TftpError::ShortWrite {
                sent,
                expected: bytes.len(),
            });
        }

        Ok(())
    }

    fn recv_from(&self, timeout: Duration) -> Result<Option<(Vec<u8>, SocketAddr)>, TftpError> {
        // A zero timeout means "block forever" to the OS, never what we want
        let timeout = timeout.max(Duration::from_millis(1));
        UdpSocket::set_read_timeout(self, Some(timeout))?;

        let mut buf = vec![0; MAX_PACKET_SIZE + 1];
        match UdpSocket::recv_from(self, &mut buf) {
            Ok((amt, src)) => {
                buf.truncate(amt);
                Ok(Some((buf, src)))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn drain(&self) -> Result<usize, TftpError> {
        UdpSocket::set_nonblocking(self, true)?;

        let mut buf = [0u8; MAX_PACKET_SIZE + 1];
        let mut dropped = 0;
        let result = loop {
            match UdpSocket::recv_from(self, &mut buf) {
                Ok(_) => dropped += 1,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(dropped),
                // ICMP errors from an earlier peer surface here on some platforms
                Err(e) if e.kind() == ErrorKind::ConnectionReset => continue,
                Err(e) => break Err(e.into()),
            }
        };

        UdpSocket::set_nonblocking(self, false)?;
        result
    }

    fn local_addr(&self) -> Result<SocketAddr, TftpError> {
        Ok(UdpSocket::local_addr(self)?)
    }
}

impl<T: Socket + ?Sized> Socket for Box<T> {
    fn send_to(&self, packet: &Packet, to: &SocketAddr) -> Result<(), TftpError> {
        (**self).send_to(packet, to)
    }

    fn recv_from(&self, timeout: Duration) -> Result<Option<(Vec<u8>, SocketAddr)>, TftpError> {
        (**self).recv_from(timeout)
    }

    fn drain(&self) -> Result<usize, TftpError> {
        (**self).drain()
    }

    fn local_addr(&self) -> Result<SocketAddr, TftpError> {
        (**self).local_addr()
    }
}
