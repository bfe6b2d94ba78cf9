//! snack_box - a small from-scratch HTTP/1.1 server
//!
//! Byte-level request parsing, response serialization, path-template
//! routing with middleware, and an accept loop that falls back to static
//! files when no route matches.
//!
//! # Protocol
//!
//! - **HTTP/1.1 only**: one request per connection, always `Connection: close`
//! - **Fully buffered bodies**: sized by `Content-Length`, capped by
//!   [`ReqLimits::max_request_size`](limits::ReqLimits::max_request_size)
//! - No keep-alive, pipelining, chunked encoding or TLS
//!
//! # Examples
//!
//! Quick start:
//! ```no_run
//! use snack_box::{Request, Response, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), snack_box::Error> {
//!     let router = Router::new()
//!         .get("/health", |_: &Request| Response::text(StatusCode::OK, "ok"))
//!         .get("/hello/:name", |req: &Request| {
//!             let name = req.param("name").unwrap_or("stranger");
//!             Response::text(StatusCode::OK, format!("Hello, {name}!"))
//!         });
//!
//!     Server::builder()
//!         .port(8080)
//!         .router(router)
//!         .public_dir("public")
//!         .build()?
//!         .launch()
//!         .await;
//!
//!     Ok(())
//! }
//! ```
//! Middleware:
//! ```
//! use snack_box::{Method, Request, Response, Router, StatusCode};
//!
//! let router = Router::new()
//!     .use_middleware(|req: &Request| match req.header("Authorization") {
//!         Some(_) => None,
//!         None => Some(Response::text(StatusCode::UNAUTHORIZED, "login first")),
//!     })
//!     .get("/secret", |_: &Request| Response::text(StatusCode::OK, "42"));
//!
//! let resp = router.dispatch(Request::new(Method::Get, "/secret")).into_response().unwrap();
//! assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
//! ```

pub(crate) mod http {
    pub mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub mod text;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod server_impl;
    pub(crate) mod static_files;
}
pub(crate) mod errors;
pub mod limits;
pub(crate) mod router;

pub use crate::{
    errors::{Error, ParseError},
    http::{
        query,
        request::{parse_request, Request},
        response::{serialize_response, Response},
        text,
        types::{Headers, Method, StatusCode},
    },
    router::{Dispatch, Handler, Middleware, PathPattern, PatternError, Route, Router},
    server::server_impl::{Server, ServerBuilder, ShutdownHandle},
};
