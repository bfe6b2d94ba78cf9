use crate::{
    errors::ErrorKind,
    http::request::{content_length, find_head_end, HEAD_TERMINATOR},
    limits::{ConnLimits, ReqLimits},
    server::static_files::StaticFiles,
    Dispatch, Request, Response, Router, StatusCode,
};
use std::{
    io,
    net::SocketAddr,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{sleep, timeout},
};
use tracing::{debug, error, warn};

/// Serves one request per accepted socket.
///
/// Each worker owns one `HttpConnection` for its whole life, so the read
/// buffers are allocated once and reused across connections.
pub(crate) struct HttpConnection {
    router: Arc<Router>,
    static_files: Option<Arc<StaticFiles>>,

    buffer: Vec<u8>,
    chunk: Box<[u8]>,

    conn_limits: ConnLimits,
    req_limits: ReqLimits,
}

impl HttpConnection {
    #[inline]
    pub(crate) fn new(
        router: Arc<Router>,
        static_files: Option<Arc<StaticFiles>>,
        conn_limits: ConnLimits,
        req_limits: ReqLimits,
    ) -> Self {
        Self {
            router,
            static_files,

            buffer: Vec::with_capacity(req_limits.read_chunk_size),
            chunk: vec![0; req_limits.read_chunk_size.max(1)].into_boxed_slice(),

            conn_limits,
            req_limits,
        }
    }

    /// Reads, answers and closes `stream`.
    ///
    /// Only socket failures are returned; everything else becomes a response.
    pub(crate) async fn run(&mut self, stream: &mut TcpStream, remote: SocketAddr) -> io::Result<()> {
        let result = self.serve(stream, remote).await;

        // Give back whatever a large request grew the buffer to
        self.buffer.clear();
        self.buffer.shrink_to(self.req_limits.read_chunk_size);

        result
    }

    async fn serve(&mut self, stream: &mut TcpStream, remote: SocketAddr) -> io::Result<()> {
        let deadline = self.conn_limits.request_read_timeout;
        let Ok(read) = timeout(deadline, self.read_request(stream)).await else {
            warn!(%remote, "request not received in time");
            return Err(io::Error::new(io::ErrorKind::TimedOut, "request read timeout"));
        };

        let response = match read {
            Ok(()) if self.buffer.is_empty() => return Ok(()),
            Ok(()) => self.respond(remote).await,
            Err(ErrorKind::Io(err)) => return Err(err.0),
            Err(err) => {
                warn!(%remote, error = %err, "request rejected while reading");
                err.to_response()
            }
        };

        self.send(stream, response).await
    }

    /// Buffers one request: the head up to `\r\n\r\n` plus as many body bytes
    /// as its `Content-Length` announces. Stops early on EOF.
    async fn read_request(&mut self, stream: &mut TcpStream) -> Result<(), ErrorKind> {
        let max_size = self.req_limits.max_request_size;
        let mut expected_len = None;

        self.buffer.clear();
        loop {
            if let Some(len) = expected_len {
                if self.buffer.len() >= len {
                    return Ok(());
                }
            }

            let read = self.conn_limits.read_chunk(stream, &mut self.chunk).await?;
            if read == 0 {
                return Ok(());
            }
            if self.buffer.len() + read > max_size {
                return Err(ErrorKind::PayloadTooLarge);
            }
            self.buffer.extend_from_slice(&self.chunk[..read]);

            if expected_len.is_none() {
                if let Some(head_end) = find_head_end(&self.buffer) {
                    let body_len = content_length(&self.buffer[..head_end]).unwrap_or(0);
                    let total = (head_end + HEAD_TERMINATOR.len()).saturating_add(body_len);

                    if total > max_size {
                        return Err(ErrorKind::PayloadTooLarge);
                    }
                    expected_len = Some(total);
                }
            }
        }
    }

    async fn respond(&self, remote: SocketAddr) -> Response {
        let request = match Request::from_bytes(&self.buffer) {
            Ok(request) => request.with_remote_addr(remote),
            Err(err) => {
                warn!(%remote, error = %err, "malformed request");
                return err.to_response();
            }
        };

        let method = request.method();
        let path = request.path().to_string();

        let response = match panic::catch_unwind(AssertUnwindSafe(|| self.router.dispatch(request))) {
            Ok(Dispatch::Handled(response)) => response,
            Ok(Dispatch::Unmatched(request)) => self.fallback(&request).await,
            Err(_) => {
                error!(%method, %path, %remote, "handler panicked");
                Response::internal_error()
            }
        };

        debug!(%method, %path, status = %response.status(), %remote, "request served");
        response
    }

    /// Static files first, then `405` if the path is routed under other
    /// methods, otherwise `404`.
    async fn fallback(&self, request: &Request) -> Response {
        let response = match &self.static_files {
            Some(files) => files.serve(request.path()).await,
            None => Response::not_found(),
        };

        if response.status() != StatusCode::NOT_FOUND {
            return response;
        }

        let allowed = self.router.allowed_methods_for(request.path());
        match allowed.is_empty() {
            true => response,
            false => Response::method_not_allowed(&allowed),
        }
    }

    #[inline]
    async fn send(&self, stream: &mut TcpStream, mut response: Response) -> io::Result<()> {
        response.finalize();

        self.conn_limits.write_bytes(stream, &response.to_bytes()).await?;
        stream.shutdown().await
    }
}

impl ConnLimits {
    #[inline]
    pub(crate) async fn read_chunk(&self, stream: &mut TcpStream, chunk: &mut [u8]) -> io::Result<usize> {
        read_with_timeout(stream, chunk, self.socket_read_timeout).await
    }

    #[inline]
    pub(crate) async fn write_bytes(&self, stream: &mut TcpStream, bytes: &[u8]) -> io::Result<()> {
        timeout(self.socket_write_timeout, stream.write_all(bytes))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timeout"))?
    }

    /// Answers an overflow connection with `503` and closes it.
    pub(crate) async fn send_unavailable(&self, stream: &mut TcpStream) -> io::Result<()> {
        let mut response = Response::service_unavailable();
        response.finalize();

        self.write_bytes(stream, &response.to_bytes()).await?;
        stream.shutdown().await
    }
}

#[inline]
async fn read_with_timeout(stream: &mut TcpStream, chunk: &mut [u8], time: Duration) -> io::Result<usize> {
    tokio::select! {
        biased;

        read = stream.read(chunk) => read,
        _ = sleep(time) => Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout")),
    }
}
