//! Pre-rendered page serving with trailing-slash reconciliation.
//!
//! # Responsibilities
//! - Hold the build-time set of pre-rendered paths
//! - Serve an exact match from the pre-rendered directory
//! - Redirect (308) when only the slash-toggled path is pre-rendered
//!
//! # Design Decisions
//! - Lookups use the percent-decoded path; a malformed escape falls
//!   back to the raw path instead of failing the request
//! - Exactly one trailing `/` is stripped or appended, nothing more
//! - The redirect targets the decoded page path, re-escaped only where
//!   a header value or URL path requires it
//! - 308 keeps the method and body for the retried request

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::LOCATION;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::http::request::without_body;
use crate::routing::sequence::{Flow, Middleware};

/// Bytes escaped when a decoded path goes back into a `Location` header.
const LOCATION_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Error loading the pre-rendered path list.
#[derive(Debug, Error)]
pub enum PrerenderedError {
    #[error("Failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Immutable set of canonical pre-rendered paths.
#[derive(Debug, Clone, Default)]
pub struct PrerenderedSet {
    paths: HashSet<String>,
}

impl PrerenderedSet {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Load from a JSON array of paths. A missing file is an empty set.
    pub fn load(path: &Path) -> Result<Self, PrerenderedError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No pre-rendered manifest, serving none");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(PrerenderedError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let paths: Vec<String> =
            serde_json::from_str(&content).map_err(|source| PrerenderedError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(paths))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Strip a trailing `/` if present, else append one.
pub fn toggle_trailing_slash(path: &str) -> String {
    match path.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => format!("{path}/"),
    }
}

/// Percent-decode a path, keeping the raw path if it does not decode.
pub fn decode_path(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// What the router decided for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Serve the page at this canonical path.
    Serve(String),
    /// Redirect to this location.
    Redirect(String),
    /// Not a pre-rendered page.
    Miss,
}

/// Routes requests for pre-rendered pages.
#[derive(Debug, Clone)]
pub struct PrerenderedRouter {
    pages: PrerenderedSet,
    root: PathBuf,
}

impl PrerenderedRouter {
    pub fn new(pages: PrerenderedSet, root: impl Into<PathBuf>) -> Self {
        Self {
            pages,
            root: root.into(),
        }
    }

    pub fn pages(&self) -> &PrerenderedSet {
        &self.pages
    }

    /// Decide how to answer a raw path and optional query.
    pub fn resolve(&self, raw_path: &str, query: Option<&str>) -> Resolution {
        let path = decode_path(raw_path);
        if self.pages.contains(&path) {
            return Resolution::Serve(path);
        }

        let toggled = toggle_trailing_slash(&path);
        if !self.pages.contains(&toggled) {
            return Resolution::Miss;
        }

        let mut location = utf8_percent_encode(&toggled, LOCATION_PATH).to_string();
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            location.push('?');
            location.push_str(query);
        }
        Resolution::Redirect(location)
    }

    /// File backing a pre-rendered path, if one exists on disk.
    pub fn file_for(&self, path: &str) -> Option<PathBuf> {
        let relative = path.trim_start_matches('/');
        let base = self.root.join(relative);

        let candidates = if relative.is_empty() || path.ends_with('/') {
            vec![base.join("index.html")]
        } else {
            vec![
                base.clone(),
                with_suffix(&base, ".html"),
                base.join("index.html"),
            ]
        };
        candidates.into_iter().find(|c| c.is_file())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::PERMANENT_REDIRECT, [(LOCATION, value)]).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

#[async_trait]
impl Middleware for PrerenderedRouter {
    fn name(&self) -> &'static str {
        "prerendered"
    }

    async fn handle(&self, request: Request<Body>) -> Flow {
        let uri = request.uri();
        match self.resolve(uri.path(), uri.query()) {
            Resolution::Miss => Flow::Next(request),
            Resolution::Redirect(location) => Flow::Respond(redirect(&location)),
            Resolution::Serve(path) => {
                if !crate::http::static_files::is_read_method(request.method()) {
                    return Flow::Next(request);
                }
                let Some(file) = self.file_for(&path) else {
                    tracing::warn!(path = %path, "Pre-rendered page has no file on disk");
                    return Flow::Next(request);
                };

                let service = ServeFile::new(file).precompressed_br().precompressed_gzip();
                match service.oneshot(without_body(&request)).await {
                    Ok(response) => Flow::Respond(response.map(Body::new)),
                    Err(never) => match never {},
                }
            }
        }
    }
}
