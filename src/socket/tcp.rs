use std::{io, net::SocketAddr};
use core::task::{Poll, Context};
use futures::ready;
use super::{CoeSocket, partial_send};

/**
    TCP stream to the SDO server of a drive

    frames are small enough to be written and read in one operation, so no reassembly is done here
*/
#[derive(Debug)]
pub struct TcpSocket {
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
}

impl TcpSocket {
    pub async fn connect(peer: SocketAddr) -> io::Result<Self> {
        let stream = tokio::net::TcpStream::connect(peer).await?;
        // requests are sent one at a time and waited for, delaying them only slows the transfer
        stream.set_nodelay(true)?;
        log::debug!("SDO stream connected to {} from {}", peer, stream.local_addr()?);
        Ok(Self {stream, peer})
    }
}

impl CoeSocket for TcpSocket {
    fn poll_receive(&self, cx: &mut Context<'_>, data: &mut [u8]) -> Poll<io::Result<usize>> {
        loop {
            ready!(self.stream.poll_read_ready(cx))?;
            match self.stream.try_read(data) {
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => continue,
                result => return Poll::Ready(result),
            }
        }
    }
    fn poll_send(&self, cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<()>> {
        loop {
            ready!(self.stream.poll_write_ready(cx))?;
            match self.stream.try_write(data) {
                Ok(sent) if sent == data.len() => return Poll::Ready(Ok(())),
                Ok(sent) => return Poll::Ready(Err(partial_send(sent, data.len()))),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => continue,
                Err(error) => return Poll::Ready(Err(error)),
            }
        }
    }
    fn peer(&self) -> SocketAddr {self.peer}
}
