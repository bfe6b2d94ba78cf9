//! Server configuration limits and timeouts
//!
//! # Defaults
//!
//! Default limits bound the resources a single client can hold:
//! - a fixed worker pool instead of one task per connection
//! - a cap on buffered request bytes
//! - read and write timeouts so stalled peers are dropped
//! - a deadline for the whole request so slow senders cannot hold a worker
//!
//! # Examples
//!
//! ```no_run
//! use snack_box::{Router, Server, limits::{ConnLimits, ReqLimits, ServerLimits}};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::builder()
//!         .port(8080)
//!         .router(Router::new())
//!         .server_limits(ServerLimits {
//!             max_connections: 500, // Higher concurrency
//!             ..ServerLimits::default()
//!         })
//!         .connection_limits(ConnLimits {
//!             socket_read_timeout: Duration::from_secs(5),
//!             ..ConnLimits::default()
//!         })
//!         .request_limits(ReqLimits {
//!             max_request_size: 64 * 1024,
//!             ..ReqLimits::default()
//!         })
//!         .build()
//!         .expect("failed to start")
//!         .launch()
//!         .await;
//! }
//! ```

use std::time::Duration;

/// Controls server-level concurrency, queueing, and socket setup.
///
/// # Connection management
/// ```text
///                            [------------]
///                            [ Tcp accept ]
///                            [------------]
///                                  ||
///                                  || TCP_STREAM
///                                  \/
/// [--------------]   Yes   /----------------\   No   [-------------]
/// [ Add to queue ] <====== | Queue has room? | ====> [ Sending 503 ]
/// [--------------]         \----------------/        [-------------]
///        ||
///        \==================\\          //====================\
///                            V          V                    ||
/// [---------]   Yes   /--------------------------\   No   [------]
/// [ Worker  ] <====== | Is there a free worker?  | =====> [ Wait ]
/// [---------]         \--------------------------/        [------]
/// ```
///
/// A worker is a long-running task spawned once at startup. It pops an
/// accepted socket, serves exactly one request on it and closes it, then
/// goes back to the queue.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Number of worker tasks, i.e. connections served concurrently (default: `100`).
    pub max_connections: usize,

    /// Maximum number of accepted connections waiting for a worker (default: `250`).
    ///
    /// When the queue is full, new connections receive an immediate `503`.
    pub max_pending_connections: usize,

    /// How idle workers wait for the queue to fill (default: `Sleep(50μs)`).
    pub wait_strategy: WaitStrategy,

    /// Tasks answering overflow connections with `503` (default: `1`).
    ///
    /// Set to 0 to silently close overflow connections instead.
    pub count_503_handlers: usize,

    /// Backlog passed to `listen(2)` (default: `64`).
    pub backlog: i32,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_pending_connections: 250,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),
            count_503_handlers: 1,
            backlog: 64,

            _priv: (),
        }
    }
}

/// Strategy for worker task waiting when no connections are available
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// While waiting, uses [`tokio::task::yield_now()`]
    ///
    /// Keeps latency minimal at the cost of a busy CPU.
    Yield,

    /// While waiting, uses [`tokio::time::sleep()`]
    Sleep(Duration),
}

/// Per-connection timeouts
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum time a single socket read may take (default: `10 seconds`)
    ///
    /// A peer that stops sending before the head is complete is dropped
    /// when this expires.
    pub socket_read_timeout: Duration,

    /// Maximum time for receiving a whole request, head and body (default: `10 seconds`)
    ///
    /// Bounds clients that keep the socket busy with a trickle of bytes, each
    /// read arriving within `socket_read_timeout`. The connection is dropped
    /// without a response when it expires.
    pub request_read_timeout: Duration,

    /// Maximum time writing the whole response may take (default: `10 seconds`)
    pub socket_write_timeout: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(10),
            request_read_timeout: Duration::from_secs(10),
            socket_write_timeout: Duration::from_secs(10),

            _priv: (),
        }
    }
}

/// Request reading and parsing limits
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Size of each socket read in bytes (default: `4 KB`)
    pub read_chunk_size: usize,

    /// Maximum number of buffered bytes for one request, head and body
    /// together (default: `1 MB`)
    ///
    /// A client exceeding it receives `413 Payload Too Large`.
    pub max_request_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            read_chunk_size: 4 * 1024,
            max_request_size: 1024 * 1024,

            _priv: (),
        }
    }
}
