//! `tonic::transport::server::Connected` wrapper over `tokio::net::UnixStream`,
//! so the RPC server can listen on a Unix domain socket instead of TCP.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tonic::transport::server::Connected;

#[derive(Debug)]
pub struct UnixStream(pub tokio::net::UnixStream);

#[derive(Clone, Copy)]
pub struct NoneConnectInfo;

impl Connected for UnixStream {
    type ConnectInfo = NoneConnectInfo;

    fn connect_info(&self) -> Self::ConnectInfo {
        NoneConnectInfo
    }
}

impl AsyncRead for UnixStream {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for UnixStream {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

/// Wraps a bound `UnixListener` into the connection stream
/// `serve_with_incoming` expects.
pub fn incoming(listener: tokio::net::UnixListener) -> impl tokio_stream::Stream<Item = std::io::Result<UnixStream>> {
    async_stream::stream! {
        loop {
            let item = listener.accept().await.map(|(stream, _addr)| UnixStream(stream));
            yield item;
        }
    }
}
