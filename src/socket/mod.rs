/*!
    This module provide the trait [CoeSocket], and its implementors carrying CoE frames over IP.

    Two channels are used to talk to one drive:

    - a TCP stream carries SDO requests and their responses. Every request is answered, so the stream is used in a strict request/response manner.
    - a UDP socket carries PDO frames cyclically. There is no acknowledge, a lost frame is simply superseded by the next cycle.

    | socket type |  service  |  acknowledged |  ordering |
    |-------------|-----------|---------------|-----------|
    | [TcpSocket] | SDO       | yes           | guaranteed |
    | [UdpSocket] | PDO       | no            | none       |
*/

mod tcp;
mod udp;

pub use tcp::TcpSocket;
pub use udp::UdpSocket;
use core::task::{Poll, Context};

use std::{io, net::SocketAddr, sync::Arc};

/**
    trait implementing the CoE frame encapsulation into some medium

    This allows to send or receive CoE frames over any transport, the rest of the crate never touches the OS sockets directly.
    Methods take `&self` so a socket can be shared between a background exchange and its owner.
*/
pub trait CoeSocket {
    /**
        receive a frame into the given buffer

        The buffer should be big enough for the data to receive. Returns the number of bytes read, zero meaning the peer has nothing more to say (stream closed).
    */
    fn poll_receive(&self, cx: &mut Context<'_>, data: &mut [u8]) -> Poll<io::Result<usize>>;

    /**
        send a frame contained in the given buffer.

        The whole buffer will be sent, the user has to tail it to the exact data size to send.
    */
    fn poll_send(&self, cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<()>>;

    /// address of the remote peer, used to report errors
    fn peer(&self) -> SocketAddr;
}

/// a shared socket, so its owner can keep looking at it while a session uses it
impl<S: CoeSocket + ?Sized> CoeSocket for Arc<S> {
    fn poll_receive(&self, cx: &mut Context<'_>, data: &mut [u8]) -> Poll<io::Result<usize>> {
        S::poll_receive(self, cx, data)
    }
    fn poll_send(&self, cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<()>> {
        S::poll_send(self, cx, data)
    }
    fn peer(&self) -> SocketAddr {S::peer(self)}
}

/// wait for the next frame from the given socket
pub async fn receive<S: CoeSocket + ?Sized>(socket: &S, data: &mut [u8]) -> io::Result<usize> {
    futures::future::poll_fn(|cx| socket.poll_receive(cx, data)).await
}

/// send a complete frame on the given socket
pub async fn send<S: CoeSocket + ?Sized>(socket: &S, data: &[u8]) -> io::Result<()> {
    futures::future::poll_fn(|cx| socket.poll_send(cx, data)).await
}

fn partial_send(sent: usize, expected: usize) -> io::Error {
    io::Error::new(io::ErrorKind::WriteZero, format!("frame partially sent ({} of {} bytes)", sent, expected))
}
