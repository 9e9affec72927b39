use std::{io, net::{SocketAddr, IpAddr, Ipv4Addr, Ipv6Addr}};
use core::task::{Poll, Context};
use futures::ready;
use tokio::io::ReadBuf;
use super::{CoeSocket, partial_send};

/**
    UDP socket connected to the PDO port of a drive

    the socket is connected so datagrams coming from any other host are dropped by the OS
*/
#[derive(Debug)]
pub struct UdpSocket {
    socket: tokio::net::UdpSocket,
    peer: SocketAddr,
}

impl UdpSocket {
    /// bind an ephemeral local port and connect it to the given drive port
    pub async fn connect(peer: SocketAddr) -> io::Result<Self> {
        let local = match peer {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = tokio::net::UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        log::debug!("PDO socket bound to {} for {}", socket.local_addr()?, peer);
        Ok(Self {socket, peer})
    }
}

impl CoeSocket for UdpSocket {
    fn poll_receive(&self, cx: &mut Context<'_>, data: &mut [u8]) -> Poll<io::Result<usize>> {
        let mut buffer = ReadBuf::new(data);
        ready!(self.socket.poll_recv(cx, &mut buffer))?;
        Poll::Ready(Ok(buffer.filled().len()))
    }
    fn poll_send(&self, cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<()>> {
        let sent = ready!(self.socket.poll_send(cx, data))?;
        if sent != data.len()
            {return Poll::Ready(Err(partial_send(sent, data.len())))}
        Poll::Ready(Ok(()))
    }
    fn peer(&self) -> SocketAddr {self.peer}
}
