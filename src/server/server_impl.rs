use crate::{
    errors::Error,
    limits::{ConnLimits, ReqLimits, ServerLimits, WaitStrategy},
    server::{connection::HttpConnection, static_files::StaticFiles},
    Router,
};
use crossbeam::queue::SegQueue;
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::Notify,
    task::yield_now,
    time::sleep as tokio_sleep,
};
use tracing::{debug, error, info};

/// An HTTP/1.1 server answering one request per connection.
///
/// Requests go to the [`Router`] first. Unmatched requests fall back to
/// files under the public directory (when one is configured), then to
/// `405 Method Not Allowed` if the path is routed under other methods, and
/// finally to `404 Not Found`.
///
/// # Examples
///
/// ```no_run
/// use snack_box::{Request, Response, Router, Server, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), snack_box::Error> {
///     let router = Router::new().get("/hello/:name", |req: &Request| {
///         Response::text(StatusCode::OK, format!("Hello, {}!", req.param("name").unwrap_or("stranger")))
///     });
///
///     Server::builder()
///         .port(8080)
///         .router(router)
///         .public_dir("public")
///         .build()?
///         .launch()
///         .await;
///
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,

    router: Arc<Router>,
    static_files: Option<Arc<StaticFiles>>,
    shutdown: Arc<Shutdown>,

    server_limits: ServerLimits,
    conn_limits: ConnLimits,
    req_limits: ReqLimits,
}

impl Server {
    #[inline]
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            router: Router::new(),
            public_dir: None,

            server_limits: ServerLimits::default(),
            connection_limits: ConnLimits::default(),
            request_limits: ReqLimits::default(),
        }
    }

    /// The bound address; resolves port `0` to the port actually assigned.
    #[inline(always)]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle that stops [`launch`](Server::launch) from another task.
    #[inline]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Spawns the worker pool and accepts connections until stopped.
    ///
    /// Accepted sockets are queued for the workers. Once
    /// `max_pending_connections` sockets are waiting, new ones are handed to
    /// the `503` tasks instead. Accept failures are logged and never end the
    /// loop.
    ///
    /// Must run inside a multi-threaded Tokio runtime.
    pub async fn launch(self) {
        let stream_queue: TcpQueue = Arc::new(SegQueue::new());
        let error_queue: TcpQueue = Arc::new(SegQueue::new());

        for _ in 0..self.server_limits.max_connections {
            self.spawn_worker(&stream_queue);
        }
        match self.server_limits.count_503_handlers {
            0 => self.spawn_quiet_alarmist(&error_queue),
            count => (0..count).for_each(|_| self.spawn_alarmist(&error_queue)),
        }

        info!(
            addr = %self.local_addr,
            workers = self.server_limits.max_connections,
            routes = self.router.routes().len(),
            "listening"
        );

        loop {
            let accepted = tokio::select! {
                biased;

                _ = self.shutdown.notify.notified() => break,
                accepted = self.listener.accept() => accepted,
            };

            let value = match accepted {
                Ok(value) => value,
                Err(err) => {
                    error!(error = %err, "accept failed");
                    continue;
                }
            };

            match stream_queue.len() < self.server_limits.max_pending_connections {
                true => stream_queue.push(value),
                false => {
                    debug!(remote = %value.1, "queue full, rejecting connection");
                    error_queue.push(value)
                }
            }
        }

        // Only now, with nothing left to push, may idle workers exit
        self.shutdown.stopped.store(true, Ordering::Release);
        info!(addr = %self.local_addr, "server stopped");
    }

    fn spawn_worker(&self, queue: &TcpQueue) {
        let queue = queue.clone();
        let shutdown = self.shutdown.clone();
        let wait = self.server_limits.wait_strategy.clone();
        let mut conn = HttpConnection::new(
            self.router.clone(),
            self.static_files.clone(),
            self.conn_limits.clone(),
            self.req_limits.clone(),
        );

        tokio::spawn(async move {
            while let Some((mut stream, remote)) = get_stream(&queue, &wait, &shutdown).await {
                if let Err(err) = conn.run(&mut stream, remote).await {
                    debug!(%remote, error = %err, "connection dropped");
                }
            }
        });
    }

    fn spawn_alarmist(&self, queue: &TcpQueue) {
        let queue = queue.clone();
        let shutdown = self.shutdown.clone();
        let wait = self.server_limits.wait_strategy.clone();
        let conn_limits = self.conn_limits.clone();

        tokio::spawn(async move {
            while let Some((mut stream, _)) = get_stream(&queue, &wait, &shutdown).await {
                let _ = conn_limits.send_unavailable(&mut stream).await;
            }
        });
    }

    fn spawn_quiet_alarmist(&self, queue: &TcpQueue) {
        let queue = queue.clone();
        let shutdown = self.shutdown.clone();
        let wait = self.server_limits.wait_strategy.clone();

        tokio::spawn(async move {
            while let Some((stream, _)) = get_stream(&queue, &wait, &shutdown).await {
                drop(stream);
            }
        });
    }
}

/// Pops the next socket, waiting per `wait`. Returns `None` once the server
/// is stopped and the queue is drained.
#[inline]
async fn get_stream(
    queue: &TcpQueue,
    wait: &WaitStrategy,
    shutdown: &Shutdown,
) -> Option<(TcpStream, SocketAddr)> {
    loop {
        if let Some(value) = queue.pop() {
            return Some(value);
        }
        if shutdown.stopped.load(Ordering::Acquire) {
            return None;
        }

        match wait {
            WaitStrategy::Yield => yield_now().await,
            WaitStrategy::Sleep(time) => tokio_sleep(*time).await,
        }
    }
}

#[derive(Debug, Default)]
struct Shutdown {
    notify: Notify,
    stopped: AtomicBool,
}

/// Stops a running [`Server`].
///
/// Stopping ends the accept loop. Workers finish the connections already
/// queued and then exit. [`is_stopped`](ShutdownHandle::is_stopped) turns
/// true once the accept loop has exited.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<Shutdown>);

impl ShutdownHandle {
    /// Requests shutdown. Safe to call before `launch` or more than once.
    #[inline]
    pub fn stop(&self) {
        self.0.notify.notify_one();
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.0.stopped.load(Ordering::Acquire)
    }
}

/// Builder for [`Server`].
///
/// Defaults: `0.0.0.0:8080`, an empty router, no public directory and the
/// default limits.
#[derive(Debug)]
pub struct ServerBuilder {
    addr: SocketAddr,
    router: Router,
    public_dir: Option<PathBuf>,

    server_limits: ServerLimits,
    connection_limits: ConnLimits,
    request_limits: ReqLimits,
}

impl ServerBuilder {
    /// Sets the address to listen on.
    #[inline(always)]
    pub fn addr<A: Into<SocketAddr>>(mut self, addr: A) -> Self {
        self.addr = addr.into();
        self
    }

    /// Sets only the port, keeping the current IP.
    #[inline(always)]
    pub fn port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }

    #[inline(always)]
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Enables the static file fallback rooted at `dir`.
    ///
    /// The directory is resolved per request, so it may be created after
    /// the server starts.
    #[inline(always)]
    pub fn public_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.public_dir = Some(dir.into());
        self
    }

    /// Configures worker count, queueing and the listen backlog.
    ///
    /// ```no_run
    /// use snack_box::{Server, limits::ServerLimits};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let server = Server::builder()
    ///     .server_limits(ServerLimits {
    ///         max_connections: 16,
    ///         max_pending_connections: 1024,
    ///         ..ServerLimits::default()
    ///     })
    ///     .build();
    /// # }
    /// ```
    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = limits;
        self
    }

    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = limits;
        self
    }

    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = limits;
        self
    }

    /// Binds the listening socket.
    ///
    /// Must be called inside a Tokio runtime. Nothing is accepted until
    /// [`Server::launch`].
    pub fn build(self) -> Result<Server, Error> {
        let std_listener = bind(self.addr, self.server_limits.backlog)?;
        let listener = TcpListener::from_std(std_listener).map_err(Error::Runtime)?;
        let local_addr = listener.local_addr().map_err(Error::Runtime)?;

        Ok(Server {
            listener,
            local_addr,

            router: Arc::new(self.router),
            static_files: self.public_dir.map(|dir| Arc::new(StaticFiles::new(dir))),
            shutdown: Arc::new(Shutdown::default()),

            server_limits: self.server_limits,
            conn_limits: self.connection_limits,
            req_limits: self.request_limits,
        })
    }
}

fn bind(addr: SocketAddr, backlog: i32) -> Result<std::net::TcpListener, Error> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(Error::Socket)?;

    socket.set_reuse_address(true).map_err(Error::Socket)?;
    socket
        .bind(&addr.into())
        .map_err(|source| Error::Bind { addr, source })?;
    socket
        .listen(backlog)
        .map_err(|source| Error::Listen { addr, source })?;
    socket.set_nonblocking(true).map_err(Error::Socket)?;

    Ok(socket.into())
}

type TcpQueue = Arc<SegQueue<(TcpStream, SocketAddr)>>;
