//! Ordered dispatch over a list of request handlers.
//!
//! # Responsibilities
//! - Try each stage in list order
//! - Stop at the first stage that produces a response
//! - Hand the request to a terminal fallback when every stage passes
//!
//! # Design Decisions
//! - A stage that passes returns ownership of the request, so the next
//!   stage sees it unchanged and no stage can run twice
//! - One loop over the stage list, no recursive continuations

use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

use crate::observability::metrics;

/// Result of offering a request to one stage.
#[derive(Debug)]
pub enum Flow {
    /// The stage answered the request.
    Respond(Response),
    /// The stage declined; the request moves on.
    Next(Request<Body>),
}

/// A stage of the request pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Answer the request or hand it back.
    async fn handle(&self, request: Request<Body>) -> Flow;
}

/// An ordered list of stages.
#[derive(Default)]
pub struct Sequence {
    stages: Vec<Box<dyn Middleware>>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn push(&mut self, stage: impl Middleware + 'static) {
        self.stages.push(Box::new(stage));
    }

    /// Append a stage, builder style.
    pub fn with(mut self, stage: impl Middleware + 'static) -> Self {
        self.push(stage);
        self
    }

    /// Stage names in dispatch order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run the request through the stages, then `fallback` if none answers.
    pub async fn run<F, Fut>(&self, request: Request<Body>, fallback: F) -> Response
    where
        F: FnOnce(Request<Body>) -> Fut,
        Fut: Future<Output = Response>,
    {
        let start = Instant::now();
        let method = request.method().clone();
        let mut request = request;

        for stage in &self.stages {
            match stage.handle(request).await {
                Flow::Respond(response) => {
                    tracing::debug!(
                        stage = stage.name(),
                        status = response.status().as_u16(),
                        "Request handled"
                    );
                    metrics::record_request(method.as_str(), response.status().as_u16(), stage.name(), start);
                    return response;
                }
                Flow::Next(passed) => request = passed,
            }
        }

        let response = fallback(request).await;
        metrics::record_request(method.as_str(), response.status().as_u16(), "fallback", start);
        response
    }
}
