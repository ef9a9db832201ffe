//! Request logging for the BRS HTTP client.

use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::utils::fmt_duration;

const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(3);

/// Logs method, path, status and latency of every portal request.
pub struct TransactionLogMiddleware;

#[async_trait::async_trait]
impl Middleware for TransactionLogMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let method = req.method().clone();
        let path = req.url().path().to_string();
        let start = Instant::now();
        trace!(%method, path, "BRS request");

        let result = next.run(req, extensions).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(response) if elapsed > SLOW_REQUEST_THRESHOLD => warn!(
                %method,
                path,
                status = response.status().as_u16(),
                duration = fmt_duration(elapsed),
                "Slow BRS request"
            ),
            Ok(response) => debug!(
                %method,
                path,
                status = response.status().as_u16(),
                duration = fmt_duration(elapsed),
                "BRS response"
            ),
            Err(e) => warn!(
                %method,
                path,
                duration = fmt_duration(elapsed),
                error = %e,
                "BRS request failed"
            ),
        }

        result
    }
}
