use snack_box::{
    limits::{ConnLimits, ReqLimits, ServerLimits, WaitStrategy},
    Request, Response, Router, Server, ServerBuilder, ShutdownHandle, StatusCode,
};
use std::{
    fs,
    net::SocketAddr,
    path::Path,
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

struct Running {
    addr: SocketAddr,
    handle: ShutdownHandle,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.handle.stop();
    }
}

fn router() -> Router {
    Router::new()
        .get("/hello/:name", |req: &Request| {
            Response::text(StatusCode::OK, format!("Hello, {}!", req.param("name").unwrap_or("?")))
        })
        .get("/users/:id", |req: &Request| {
            Response::text(StatusCode::OK, format!("user {}", req.param("id").unwrap_or("?")))
        })
        .post("/echo", |req: &Request| Response::new(StatusCode::OK).with_body(req.body().to_vec()))
        .get("/search", |req: &Request| {
            Response::text(StatusCode::OK, req.query_param("q").unwrap_or_default().to_string())
        })
        .get("/dated", |_: &Request| {
            Response::text(StatusCode::OK, "x").with_header("Date", "Thu, 01 Jan 1970 00:00:00 GMT")
        })
        .get("/boom", |_: &Request| -> Response { panic!("handler failure") })
}

fn builder(server_limits: ServerLimits) -> ServerBuilder {
    Server::builder()
        .addr(([127, 0, 0, 1], 0))
        .router(router())
        .server_limits(server_limits)
        .request_limits(ReqLimits {
            max_request_size: 16 * 1024,
            ..ReqLimits::default()
        })
}

async fn start(public: Option<&Path>) -> Running {
    let mut builder = builder(ServerLimits {
        max_connections: 4,
        ..ServerLimits::default()
    });
    if let Some(dir) = public {
        builder = builder.public_dir(dir);
    }

    run(builder)
}

fn run(builder: ServerBuilder) -> Running {
    let server = builder.build().unwrap();
    let running = Running {
        addr: server.local_addr(),
        handle: server.shutdown_handle(),
    };

    tokio::spawn(server.launch());
    running
}

async fn send(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    read_all(stream).await
}

// Reads until the server closes the connection
async fn read_all(mut stream: TcpStream) -> String {
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut out))
        .await
        .unwrap()
        .unwrap();

    String::from_utf8_lossy(&out).into_owned()
}

fn header<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    let head = response.split("\r\n\r\n").next()?;
    head.split("\r\n")
        .skip(1)
        .filter_map(|line| line.split_once(": "))
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
}

fn body(response: &str) -> &str {
    response.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
}

#[tokio::test(flavor = "multi_thread")]
async fn routes_with_path_params() {
    let server = start(None).await;

    let out = send(server.addr, b"GET /hello/alice HTTP/1.1\r\nHost: x\r\n\r\n").await;

    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{out}");
    assert_eq!(body(&out), "Hello, alice!");
    assert_eq!(header(&out, "Server"), Some("SnackBox/0.1"));
    assert_eq!(header(&out, "Connection"), Some("close"));
    assert_eq!(header(&out, "Content-Length"), Some("13"));
    assert_eq!(header(&out, "Date").map(str::len), Some(20));
}

#[tokio::test(flavor = "multi_thread")]
async fn decoding_of_path_and_query() {
    let server = start(None).await;

    #[rustfmt::skip]
    let cases: [(&[u8], &str); 3] = [
        (b"GET /hello/bob%20smith HTTP/1.1\r\n\r\n",   "Hello, bob smith!"),
        (b"GET /hello/a+b HTTP/1.1\r\n\r\n",           "Hello, a+b!"),
        (b"GET /search?q=rust+lang&q=last%21 HTTP/1.1\r\n\r\n", "last!"),
    ];

    for (raw, expected) in cases {
        let out = send(server.addr, raw).await;
        assert_eq!(body(&out), expected, "{out}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_method_is_405_unknown_path_is_404() {
    let server = start(None).await;

    let out = send(server.addr, b"DELETE /users/123 HTTP/1.1\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{out}");
    assert_eq!(header(&out, "Allow"), Some("GET"));

    let out = send(server.addr, b"GET /nowhere HTTP/1.1\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"), "{out}");
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_request_is_400() {
    let server = start(None).await;

    let out = send(server.addr, b"GARBAGE\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{out}");
}

#[tokio::test(flavor = "multi_thread")]
async fn body_is_echoed() {
    let server = start(None).await;

    let out = send(
        server.addr,
        b"POST /echo HTTP/1.1\r\nContent-Length: 9\r\n\r\nname=test",
    )
    .await;
    assert_eq!(body(&out), "name=test");
    assert_eq!(header(&out, "Content-Length"), Some("9"));
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_body_is_413() {
    let server = start(None).await;

    let out = send(
        server.addr,
        b"POST /echo HTTP/1.1\r\nContent-Length: 1000000\r\n\r\n",
    )
    .await;
    assert!(out.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "{out}");
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_date_is_kept() {
    let server = start(None).await;

    let out = send(server.addr, b"GET /dated HTTP/1.1\r\n\r\n").await;
    assert_eq!(header(&out, "Date"), Some("Thu, 01 Jan 1970 00:00:00 GMT"));
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_handler_is_500_and_server_survives() {
    let server = start(None).await;

    let out = send(server.addr, b"GET /boom HTTP/1.1\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{out}");

    let out = send(server.addr, b"GET /hello/again HTTP/1.1\r\n\r\n").await;
    assert_eq!(body(&out), "Hello, again!");
}

#[tokio::test(flavor = "multi_thread")]
async fn static_fallback() {
    let public = tempfile::tempdir().unwrap();
    fs::write(public.path().join("index.html"), "<h1>home</h1>").unwrap();
    fs::write(public.path().join("style.css"), "body{}").unwrap();
    fs::create_dir(public.path().join("blog")).unwrap();
    fs::write(public.path().join("blog/index.html"), "<h1>blog</h1>").unwrap();

    let server = start(Some(public.path())).await;

    #[rustfmt::skip]
    let cases: [(&[u8], &str, &str, Option<&str>); 5] = [
        (b"GET / HTTP/1.1\r\n\r\n",            "200 OK",        "<h1>home</h1>", Some("text/html; charset=utf-8")),
        (b"GET /style.css HTTP/1.1\r\n\r\n",   "200 OK",        "body{}",        Some("text/css; charset=utf-8")),
        (b"GET /blog HTTP/1.1\r\n\r\n",        "200 OK",        "<h1>blog</h1>", Some("text/html; charset=utf-8")),
        (b"POST /style.css HTTP/1.1\r\n\r\n",  "200 OK",        "body{}",        Some("text/css; charset=utf-8")),
        (b"GET /missing.js HTTP/1.1\r\n\r\n",  "404 Not Found", "Not Found",     Some("text/plain; charset=utf-8")),
    ];

    for (raw, status, expected, content_type) in cases {
        let out = send(server.addr, raw).await;
        assert!(out.starts_with(&format!("HTTP/1.1 {status}\r\n")), "{out}");
        assert_eq!(body(&out), expected, "{out}");
        assert_eq!(header(&out, "Content-Type"), content_type, "{out}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn routes_take_precedence_over_files() {
    let public = tempfile::tempdir().unwrap();
    fs::create_dir_all(public.path().join("hello")).unwrap();
    fs::write(public.path().join("hello/bob"), "from disk").unwrap();

    let server = start(Some(public.path())).await;

    let out = send(server.addr, b"GET /hello/bob HTTP/1.1\r\n\r\n").await;
    assert_eq!(body(&out), "Hello, bob!");
}

#[tokio::test(flavor = "multi_thread")]
async fn traversal_is_refused() {
    let outer = tempfile::tempdir().unwrap();
    fs::write(outer.path().join("secret.txt"), "top secret").unwrap();
    fs::create_dir(outer.path().join("public")).unwrap();

    let public = outer.path().join("public");
    let server = start(Some(public.as_path())).await;

    #[rustfmt::skip]
    let cases: [&[u8]; 3] = [
        b"GET /../secret.txt HTTP/1.1\r\n\r\n",
        b"GET /%2e%2e/secret.txt HTTP/1.1\r\n\r\n",
        b"GET /a/../../secret.txt HTTP/1.1\r\n\r\n",
    ];

    for raw in cases {
        let out = send(server.addr, raw).await;
        assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"), "{out}");
        assert!(!out.contains("top secret"), "{out}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_clients() {
    let server = start(None).await;

    let clients = (0..32).map(|i| {
        let addr = server.addr;
        tokio::spawn(async move {
            let raw = format!("GET /users/{i} HTTP/1.1\r\n\r\n");
            let out = send(addr, raw.as_bytes()).await;
            assert_eq!(body(&out), format!("user {i}"));
        })
    });

    for client in clients.collect::<Vec<_>>() {
        client.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_ends_launch() {
    let server = Server::builder()
        .addr(([127, 0, 0, 1], 0))
        .build()
        .unwrap();
    let handle = server.shutdown_handle();
    let task = tokio::spawn(server.launch());

    handle.stop();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn overflow_connection_gets_503() {
    // No workers and no queue: every connection overflows
    let server = run(builder(ServerLimits {
        max_connections: 0,
        max_pending_connections: 0,
        ..ServerLimits::default()
    }));

    for _ in 0..3 {
        let stream = TcpStream::connect(server.addr).await.unwrap();
        let out = read_all(stream).await;

        assert!(out.starts_with("HTTP/1.1 503 Service Unavailable\r\n"), "{out}");
        assert_eq!(header(&out, "Connection"), Some("close"));
        assert_eq!(body(&out), "Service Unavailable");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn overflow_without_503_handlers_closes_silently() {
    let server = run(builder(ServerLimits {
        max_connections: 0,
        max_pending_connections: 0,
        count_503_handlers: 0,
        ..ServerLimits::default()
    }));

    let stream = TcpStream::connect(server.addr).await.unwrap();
    let out = read_all(stream).await;
    assert!(out.is_empty(), "{out}");
}

#[tokio::test(flavor = "multi_thread")]
async fn yielding_workers_serve_requests() {
    let server = run(builder(ServerLimits {
        max_connections: 2,
        wait_strategy: WaitStrategy::Yield,
        ..ServerLimits::default()
    }));

    for name in ["one", "two", "three"] {
        let out = send(server.addr, format!("GET /hello/{name} HTTP/1.1\r\n\r\n").as_bytes()).await;
        assert_eq!(body(&out), format!("Hello, {name}!"), "{out}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn trickling_client_does_not_starve_the_pool() {
    let server = run(builder(ServerLimits {
        max_connections: 1,
        ..ServerLimits::default()
    })
    .connection_limits(ConnLimits {
        socket_read_timeout: Duration::from_millis(500),
        request_read_timeout: Duration::from_millis(300),
        ..ConnLimits::default()
    }));

    // Holds the only worker: one byte every 50 ms, never a full head
    let mut slow = TcpStream::connect(server.addr).await.unwrap();
    let trickle = tokio::spawn(async move {
        for _ in 0..100 {
            if slow.write_all(b"X").await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let out = send(server.addr, b"GET /hello/fast HTTP/1.1\r\n\r\n").await;

    assert_eq!(body(&out), "Hello, fast!", "{out}");
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
    trickle.abort();
}
