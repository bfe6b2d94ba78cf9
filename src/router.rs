//! Path-template routing with a pre-routing middleware chain.
//!
//! A [`Router`] is assembled once, by value, and then handed to the
//! [`Server`](crate::Server), which keeps it behind an `Arc` for the rest of
//! its life. There is no way to register routes on a running server.
//!
//! ```
//! use snack_box::{Dispatch, Method, Request, Response, Router, StatusCode};
//!
//! let router = Router::new()
//!     .use_middleware(|req: &Request| {
//!         (req.header("x-blocked").is_some()).then(|| Response::text(StatusCode::FORBIDDEN, "no"))
//!     })
//!     .get("/users/:id", |req: &Request| {
//!         Response::text(StatusCode::OK, format!("user {}", req.param("id").unwrap_or("?")))
//!     });
//!
//! let resp = router.dispatch(Request::new(Method::Get, "/users/42")).into_response().unwrap();
//! assert_eq!(resp.body(), b"user 42");
//!
//! assert!(matches!(
//!     router.dispatch(Request::new(Method::Delete, "/users/42")),
//!     Dispatch::Unmatched(_)
//! ));
//! assert_eq!(router.allowed_methods_for("/users/42"), [Method::Get]);
//! ```

use crate::{Method, Request, Response};
use regex::Regex;
use std::{collections::HashMap, fmt};

const PARAM_MARKER: char = ':';

/// Produces the response for a matched route.
///
/// Implemented for every `Fn(&Request) -> Response + Send + Sync + 'static`,
/// so plain closures and functions work. Path parameters are already bound
/// on the request when `handle` runs.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: &Request) -> Response;
}

impl<F> Handler for F
where
    F: Fn(&Request) -> Response + Send + Sync + 'static,
{
    #[inline(always)]
    fn handle(&self, request: &Request) -> Response {
        self(request)
    }
}

/// Runs before routing. `None` lets the request continue to the next
/// middleware and then to the route table; `Some(response)` ends dispatch
/// with that response.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, request: &Request) -> Option<Response>;
}

impl<F> Middleware for F
where
    F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
{
    #[inline(always)]
    fn handle(&self, request: &Request) -> Option<Response> {
        self(request)
    }
}

/// Errors from compiling a path template.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("path template {template:?} has a parameter without a name")]
    EmptyParamName { template: String },

    #[error("path template {template:?} did not compile: {source}")]
    Regex {
        template: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled path template such as `/users/:id/books/:book`.
///
/// Literal characters match themselves (regex metacharacters included) and
/// each `:name` matches one or more characters other than `/`. A parameter
/// name runs until the next `/`. The whole path must match.
///
/// ```
/// use snack_box::PathPattern;
///
/// let pattern = PathPattern::compile("/files/v1.0/:name").unwrap();
/// assert_eq!(pattern.param_names(), ["name"]);
/// assert!(pattern.is_match("/files/v1.0/report"));
/// assert!(!pattern.is_match("/files/v1x0/report"));
/// assert!(!pattern.is_match("/files/v1.0/report/extra"));
/// ```
#[derive(Clone)]
pub struct PathPattern {
    template: String,
    regex: Regex,
    param_names: Vec<String>,
}

impl PathPattern {
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        let mut pattern = String::with_capacity(template.len() * 2 + 2);
        let mut param_names = Vec::new();
        let mut rest = template;

        pattern.push('^');
        while !rest.is_empty() {
            match rest.find(PARAM_MARKER) {
                Some(0) => {
                    let end = rest.find('/').unwrap_or(rest.len());
                    let name = &rest[PARAM_MARKER.len_utf8()..end];

                    if name.is_empty() {
                        return Err(PatternError::EmptyParamName {
                            template: template.to_string(),
                        });
                    }

                    param_names.push(name.to_string());
                    pattern.push_str("([^/]+)");
                    rest = &rest[end..];
                }
                Some(start) => {
                    pattern.push_str(&regex::escape(&rest[..start]));
                    rest = &rest[start..];
                }
                None => {
                    pattern.push_str(&regex::escape(rest));
                    rest = "";
                }
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|source| PatternError::Regex {
            template: template.to_string(),
            source,
        })?;

        debug_assert_eq!(regex.captures_len() - 1, param_names.len());

        Ok(Self {
            template: template.to_string(),
            regex,
            param_names,
        })
    }

    #[inline(always)]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Parameter names in declaration order.
    #[inline(always)]
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    #[inline]
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Matches `path` and binds each capture to its parameter name by
    /// position. A name declared twice keeps the later capture.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(path)?;

        let params = self
            .param_names
            .iter()
            .zip(captures.iter().skip(1))
            .filter_map(|(name, value)| Some((name.clone(), value?.as_str().to_string())))
            .collect();

        Some(params)
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathPattern")
            .field("template", &self.template)
            .field("regex", &self.regex.as_str())
            .field("param_names", &self.param_names)
            .finish()
    }
}

/// A registered route. Immutable once added to a [`Router`].
pub struct Route {
    method: Method,
    pattern: PathPattern,
    handler: Box<dyn Handler>,
}

impl Route {
    #[inline(always)]
    pub fn method(&self) -> Method {
        self.method
    }

    #[inline(always)]
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.template)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`Router::dispatch`].
#[derive(Debug)]
pub enum Dispatch {
    /// A middleware short-circuited or a route matched.
    Handled(Response),
    /// Nothing matched; the request is handed back for the caller's fallback.
    Unmatched(Request),
}

impl Dispatch {
    #[inline]
    pub fn into_response(self) -> Option<Response> {
        match self {
            Dispatch::Handled(response) => Some(response),
            Dispatch::Unmatched(_) => None,
        }
    }
}

/// Ordered middleware chain plus an append-only route table.
///
/// Dispatch runs every middleware in registration order, then walks the
/// routes in registration order; the first route whose method and pattern
/// both match wins.
#[derive(Default)]
pub struct Router {
    middlewares: Vec<Box<dyn Middleware>>,
    routes: Vec<Route>,
}

impl Router {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware to the chain.
    #[inline]
    pub fn use_middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middlewares.push(Box::new(middleware));
        self
    }

    /// Registers `handler` for `method` requests whose path matches `path`.
    ///
    /// # Panics
    ///
    /// Panics when `path` is not a valid template (a `:` with no name). Use
    /// [`try_route`](Router::try_route) for templates built at runtime.
    #[inline]
    #[track_caller]
    pub fn route<H: Handler>(self, method: Method, path: &str, handler: H) -> Self {
        match self.try_route(method, path, handler) {
            Ok(router) => router,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_route<H: Handler>(
        mut self,
        method: Method,
        path: &str,
        handler: H,
    ) -> Result<Self, PatternError> {
        let pattern = PathPattern::compile(path)?;

        self.routes.push(Route {
            method,
            pattern,
            handler: Box::new(handler),
        });
        Ok(self)
    }

    #[inline]
    #[track_caller]
    pub fn get<H: Handler>(self, path: &str, handler: H) -> Self {
        self.route(Method::Get, path, handler)
    }

    #[inline]
    #[track_caller]
    pub fn post<H: Handler>(self, path: &str, handler: H) -> Self {
        self.route(Method::Post, path, handler)
    }

    #[inline]
    #[track_caller]
    pub fn put<H: Handler>(self, path: &str, handler: H) -> Self {
        self.route(Method::Put, path, handler)
    }

    #[inline]
    #[track_caller]
    pub fn patch<H: Handler>(self, path: &str, handler: H) -> Self {
        self.route(Method::Patch, path, handler)
    }

    #[inline]
    #[track_caller]
    pub fn delete<H: Handler>(self, path: &str, handler: H) -> Self {
        self.route(Method::Delete, path, handler)
    }

    #[inline]
    #[track_caller]
    pub fn head<H: Handler>(self, path: &str, handler: H) -> Self {
        self.route(Method::Head, path, handler)
    }

    #[inline]
    #[track_caller]
    pub fn options<H: Handler>(self, path: &str, handler: H) -> Self {
        self.route(Method::Options, path, handler)
    }

    #[inline(always)]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Runs the middleware chain, then the route table.
    ///
    /// On a match, any path parameters already on `request` are replaced by
    /// the ones captured from its path before the handler sees it.
    pub fn dispatch(&self, mut request: Request) -> Dispatch {
        for middleware in &self.middlewares {
            if let Some(response) = middleware.handle(&request) {
                return Dispatch::Handled(response);
            }
        }

        for route in &self.routes {
            if route.method != request.method {
                continue;
            }

            if let Some(params) = route.pattern.captures(&request.path) {
                request.path_params = params;
                return Dispatch::Handled(route.handler.handle(&request));
            }
        }

        Dispatch::Unmatched(request)
    }

    /// Methods of every route whose pattern matches `path`, ignoring the
    /// request method. Deduplicated, in registration order.
    ///
    /// Empty means the path is unknown (404); non-empty means the path exists
    /// under other methods (405).
    pub fn allowed_methods_for(&self, path: &str) -> Vec<Method> {
        let mut methods = Vec::new();

        for route in &self.routes {
            if route.pattern.is_match(path) && !methods.contains(&route.method) {
                methods.push(route.method);
            }
        }

        methods
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("middlewares", &self.middlewares.len())
            .field("routes", &self.routes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatusCode;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn ok(body: &'static str) -> impl Handler {
        move |_: &Request| Response::text(StatusCode::OK, body)
    }

    fn body_of(dispatch: Dispatch) -> Option<String> {
        dispatch
            .into_response()
            .map(|resp| String::from_utf8(resp.body().to_vec()).unwrap())
    }

    #[test]
    fn binds_path_param() {
        let router = Router::new().get("/hello/:name", |req: &Request| {
            assert_eq!(req.param("name"), Some("alice"));
            Response::text(StatusCode::OK, "ok")
        });

        let resp = router
            .dispatch(Request::new(Method::Get, "/hello/alice"))
            .into_response()
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn wrong_method_is_unmatched_but_allowed() {
        let router = Router::new().get("/users/:id", ok("user"));

        assert_eq!(router.allowed_methods_for("/users/123"), [Method::Get]);
        assert!(router.allowed_methods_for("/users").is_empty());
        assert!(router.allowed_methods_for("/users/123/x").is_empty());

        match router.dispatch(Request::new(Method::Delete, "/users/123")) {
            Dispatch::Unmatched(req) => assert_eq!(req.path(), "/users/123"),
            Dispatch::Handled(_) => panic!("DELETE must not match a GET route"),
        }
    }

    #[test]
    fn allowed_methods_deduplicated_in_order() {
        let router = Router::new()
            .put("/items/:id", ok("a"))
            .get("/items/:id", ok("b"))
            .put("/items/:other", ok("c"))
            .delete("/items/fixed", ok("d"));

        assert_eq!(
            router.allowed_methods_for("/items/1"),
            [Method::Put, Method::Get]
        );
        assert_eq!(
            router.allowed_methods_for("/items/fixed"),
            [Method::Put, Method::Get, Method::Delete]
        );
    }

    #[test]
    fn params_bound_positionally() {
        #[rustfmt::skip]
        let cases = [
            ("/a/:x",                "/a/1",           vec![("x", "1")]),
            ("/a/:x/b/:y",           "/a/1/b/2",       vec![("x", "1"), ("y", "2")]),
            ("/:a/:b/:c",            "/p/q/r",         vec![("a", "p"), ("b", "q"), ("c", "r")]),
            ("/users/:id/books/:bookId", "/users/7/books/abc-9",
                                                       vec![("id", "7"), ("bookId", "abc-9")]),
            ("/static",              "/static",        vec![]),
        ];

        for (template, path, expected) in cases {
            let pattern = PathPattern::compile(template).unwrap();
            assert_eq!(pattern.param_names().len(), expected.len(), "{template}");

            let params = pattern.captures(path).unwrap();
            assert_eq!(params.len(), expected.len(), "{template}");
            for (name, value) in expected {
                assert_eq!(params.get(name).map(String::as_str), Some(value), "{template}");
            }
        }
    }

    #[test]
    fn literals_are_escaped() {
        #[rustfmt::skip]
        let cases = [
            ("/v1.0/x",      "/v1.0/x",    true),
            ("/v1.0/x",      "/v1a0/x",    false),
            ("/a+b",         "/a+b",       true),
            ("/a+b",         "/aab",       false),
            ("/q?",          "/q?",        true),
            ("/q?",          "/",          false),
            ("/(x)|[y]",     "/(x)|[y]",   true),
            ("/(x)|[y]",     "/x",         false),
            ("/star*",       "/star*",     true),
            ("/star*",       "/sta",       false),
            ("/$^{}\\",      "/$^{}\\",    true),
        ];

        for (template, path, expected) in cases {
            let pattern = PathPattern::compile(template).unwrap();
            assert_eq!(pattern.is_match(path), expected, "{template} vs {path}");
        }
    }

    #[test]
    fn params_never_span_segments() {
        let pattern = PathPattern::compile("/files/:name").unwrap();

        assert!(pattern.is_match("/files/report.pdf"));
        assert!(!pattern.is_match("/files/"));
        assert!(!pattern.is_match("/files/a/b"));
        assert!(!pattern.is_match("/prefix/files/a"));
    }

    #[test]
    fn empty_param_name_rejected() {
        assert!(matches!(
            PathPattern::compile("/users/:/x"),
            Err(PatternError::EmptyParamName { .. })
        ));
        assert!(Router::new().try_route(Method::Get, "/:", ok("x")).is_err());
    }

    #[test]
    #[should_panic(expected = "parameter without a name")]
    fn route_panics_on_bad_template() {
        let _ = Router::new().get("/a/:", ok("x"));
    }

    #[test]
    fn first_match_wins() {
        let router = Router::new()
            .get("/items/special", ok("special"))
            .get("/items/:id", ok("generic"))
            .get("/items/special", ok("shadowed"));

        assert_eq!(
            body_of(router.dispatch(Request::new(Method::Get, "/items/special"))),
            Some("special".into())
        );
        assert_eq!(
            body_of(router.dispatch(Request::new(Method::Get, "/items/7"))),
            Some("generic".into())
        );
    }

    #[test]
    fn middleware_short_circuits_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let router = Router::new()
            .use_middleware(move |_: &Request| -> Option<Response> {
                counter.fetch_add(1, Ordering::SeqCst);
                None
            })
            .use_middleware(|req: &Request| {
                (req.header("Authorization").is_none())
                    .then(|| Response::text(StatusCode::UNAUTHORIZED, "login"))
            })
            .use_middleware(|_: &Request| -> Option<Response> {
                panic!("must not run after a short-circuit")
            })
            .get("/", ok("home"));

        let resp = router
            .dispatch(Request::new(Method::Get, "/"))
            .into_response()
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn middleware_runs_before_unmatched() {
        let router = Router::new()
            .use_middleware(|_: &Request| Some(Response::text(StatusCode::SERVICE_UNAVAILABLE, "down")));

        let resp = router
            .dispatch(Request::new(Method::Get, "/not/registered"))
            .into_response()
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn middleware_continue_reaches_routes() {
        let router = Router::new()
            .use_middleware(|_: &Request| -> Option<Response> { None })
            .use_middleware(|_: &Request| -> Option<Response> { None })
            .post("/submit", ok("stored"));

        assert_eq!(
            body_of(router.dispatch(Request::new(Method::Post, "/submit"))),
            Some("stored".into())
        );
    }

    #[test]
    fn stale_params_are_replaced() {
        let router = Router::new().get("/a/:x", |req: &Request| {
            assert_eq!(req.path_params().len(), 1);
            Response::text(StatusCode::OK, req.param("x").unwrap_or_default().to_string())
        });

        let mut request = Request::new(Method::Get, "/a/fresh");
        request.path_params.insert("stale".into(), "value".into());
        request.path_params.insert("x".into(), "old".into());

        assert_eq!(body_of(router.dispatch(request)), Some("fresh".into()));
    }

    #[test]
    fn unknown_method_never_matches() {
        let router = Router::new().get("/", ok("home"));

        assert!(matches!(
            router.dispatch(Request::new(Method::Unknown, "/")),
            Dispatch::Unmatched(_)
        ));
        assert_eq!(router.allowed_methods_for("/"), [Method::Get]);
    }

    #[test]
    fn decoded_path_is_matched() {
        let router = Router::new().get("/docs/:title", |req: &Request| {
            Response::text(StatusCode::OK, req.param("title").unwrap_or_default().to_string())
        });

        let request = Request::parse(b"GET /docs/hello%20world HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(body_of(router.dispatch(request)), Some("hello world".into()));
    }
}
