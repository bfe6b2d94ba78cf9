use crate::{http::types::to_lower_case, Response, StatusCode};
use std::{
    io,
    path::{Component, Path, PathBuf},
};
use tracing::debug;

const INDEX_FILE: &str = "index.html";

/// Serves files below a public root directory.
///
/// Only used for requests no route matched. Every failure, traversal
/// attempts included, is answered with `404 Not Found`.
#[derive(Debug, Clone)]
pub(crate) struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    #[inline]
    pub(crate) fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub(crate) async fn serve(&self, url_path: &str) -> Response {
        match self.load(url_path).await {
            Ok((body, content_type)) => Response::with_content_type(StatusCode::OK, body, content_type),
            Err(err) => {
                debug!(path = url_path, error = %err, "static file not served");
                Response::not_found()
            }
        }
    }

    async fn load(&self, url_path: &str) -> io::Result<(Vec<u8>, &'static str)> {
        let relative = map_path(url_path).ok_or_else(|| not_found("path leaves the public root"))?;
        let root = tokio::fs::canonicalize(&self.root).await?;

        let mut path = root.join(relative);
        if tokio::fs::metadata(&path).await?.is_dir() {
            path.push(INDEX_FILE);
        }

        // Symlinks may still point outside the root
        let path = tokio::fs::canonicalize(&path).await?;
        if !path.starts_with(&root) {
            return Err(not_found("resolved path leaves the public root"));
        }
        if !tokio::fs::metadata(&path).await?.is_file() {
            return Err(not_found("not a regular file"));
        }

        let body = tokio::fs::read(&path).await?;
        Ok((body, content_type(&path)))
    }
}

/// Turns a decoded URL path into a path relative to the root.
///
/// Returns `None` for anything but plain names and `.`, so `..` and
/// absolute components never reach the file system.
fn map_path(url_path: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();

    for component in Path::new(url_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(name) => relative.push(name),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(relative)
}

fn content_type(path: &Path) -> &'static str {
    let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
        return "application/octet-stream";
    };

    let mut extension = extension.as_bytes().to_vec();
    to_lower_case(&mut extension);

    match extension.as_slice() {
        b"html" | b"htm" => "text/html; charset=utf-8",
        b"css" => "text/css; charset=utf-8",
        b"js" | b"mjs" => "application/javascript; charset=utf-8",
        b"json" => "application/json",
        b"txt" => "text/plain; charset=utf-8",
        b"png" => "image/png",
        b"jpg" | b"jpeg" => "image/jpeg",
        b"gif" => "image/gif",
        b"svg" => "image/svg+xml",
        b"ico" => "image/x-icon",
        b"wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

#[inline]
fn not_found(reason: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, reason)
}
