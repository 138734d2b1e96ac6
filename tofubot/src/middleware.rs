//! Outbound request logging for the GitHub client.

use std::time::Instant;

use reqwest::header::HeaderValue;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use tracing::{info, warn};
use uuid::Uuid;

/// Header carrying the id shared by every request made while handling one event.
pub const RUN_ID_HEADER: &str = "x-tofubot-run-id";

pub struct RequestTracing {
    run_id: String,
}

impl RequestTracing {
    pub fn new() -> Self {
        Self::with_run_id(Uuid::new_v4().to_string())
    }

    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl Default for RequestTracing {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Middleware for RequestTracing {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        if !req.headers().contains_key(RUN_ID_HEADER) {
            if let Ok(value) = HeaderValue::from_str(&self.run_id) {
                req.headers_mut().insert(RUN_ID_HEADER, value);
            }
        }

        let method = req.method().clone();
        let url = req.url().clone();
        let started = Instant::now();

        let response = next.run(req, extensions).await;

        let elapsed_ms = started.elapsed().as_millis();
        match &response {
            Ok(resp) => info!(
                run_id = %self.run_id,
                status = resp.status().as_u16(),
                elapsed_ms,
                "{} {}",
                method,
                url
            ),
            Err(err) => warn!(
                run_id = %self.run_id,
                elapsed_ms,
                "{} {} failed: {}",
                method,
                url,
                err
            ),
        }

        response
    }
}
