//! Paginated ingestion loop: fetch a page, normalize and upsert each item,
//! sleep, repeat until the target count is reached or the upstream stops
//! giving items.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{sync::mpsc, time::sleep};

use crate::{
    error::FetchError,
    normalize::normalize,
    reconcile::{UpsertOutcome, upsert},
    store::ProductStore,
    upstream::{ProductSource, RawProduct},
};

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub query: String,
    /// Target number of processed items.
    pub limit: usize,
    /// Pause between consecutive page fetches.
    pub delay: Duration,
}

impl IngestRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 100,
            delay: Duration::from_secs(1),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// How often a failing page is re-requested before the run aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// One attempt per page: the first fetch error ends the run.
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub const fn bounded(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    LimitReached,
    Exhausted { page: u32 },
    FetchFailed { page: u32, error: String },
    StoreFailed { page: u32, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub processed: usize,
    pub pages: u32,
    pub created: usize,
    pub updated: usize,
    pub stop: StopReason,
}

impl RunReport {
    fn empty(stop: StopReason) -> Self {
        Self {
            processed: 0,
            pages: 0,
            created: 0,
            updated: 0,
            stop,
        }
    }
}

/// Progress notifications for a single run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        query: String,
        limit: usize,
    },
    Page {
        page: u32,
        items: usize,
        processed: usize,
    },
    Finished(RunReport),
}

pub struct Ingestor {
    source: Arc<dyn ProductSource>,
    store: Arc<dyn ProductStore>,
    retry: RetryPolicy,
}

impl Ingestor {
    pub fn new(source: Arc<dyn ProductSource>, store: Arc<dyn ProductStore>) -> Self {
        Self {
            source,
            store,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs to completion and returns only the processed count.
    pub async fn run_count(&self, req: &IngestRequest) -> usize {
        self.run(req).await.processed
    }

    pub async fn run(&self, req: &IngestRequest) -> RunReport {
        self.drive(req, None).await
    }

    /// Same as [`Ingestor::run`] but reports progress on `events`. A dropped
    /// receiver does not interrupt the run.
    pub async fn run_with_events(
        &self,
        req: &IngestRequest,
        events: &mpsc::Sender<RunEvent>,
    ) -> RunReport {
        self.drive(req, Some(events)).await
    }

    async fn drive(&self, req: &IngestRequest, events: Option<&mpsc::Sender<RunEvent>>) -> RunReport {
        tracing::info!(
            query = %req.query,
            limit = req.limit,
            delay_secs = req.delay.as_secs_f64(),
            "ingestion run started"
        );
        emit(
            events,
            RunEvent::Started {
                query: req.query.clone(),
                limit: req.limit,
            },
        )
        .await;

        let report = if req.limit == 0 {
            RunReport::empty(StopReason::LimitReached)
        } else {
            self.paginate(req, events).await
        };

        match &report.stop {
            StopReason::LimitReached => {
                tracing::info!(processed = report.processed, pages = report.pages, "target reached")
            }
            StopReason::Exhausted { page } => tracing::info!(
                page,
                processed = report.processed,
                "upstream has no more products"
            ),
            StopReason::FetchFailed { page, error } => tracing::warn!(
                page,
                error = %error,
                processed = report.processed,
                "page fetch failed; stopping early"
            ),
            StopReason::StoreFailed { page, error } => tracing::error!(
                page,
                error = %error,
                processed = report.processed,
                "storage failed; stopping early"
            ),
        }

        emit(events, RunEvent::Finished(report.clone())).await;
        report
    }

    async fn paginate(
        &self,
        req: &IngestRequest,
        events: Option<&mpsc::Sender<RunEvent>>,
    ) -> RunReport {
        let mut report = RunReport::empty(StopReason::LimitReached);
        let mut page: u32 = 1;

        let stop = 'pages: loop {
            let items = match self.fetch_with_retry(&req.query, page).await {
                Ok(items) => items,
                Err(e) => {
                    break StopReason::FetchFailed {
                        page,
                        error: e.to_string(),
                    };
                }
            };
            report.pages += 1;

            if items.is_empty() {
                break StopReason::Exhausted { page };
            }

            for raw in &items {
                if report.processed >= req.limit {
                    break;
                }
                let draft = normalize(raw);
                match upsert(self.store.as_ref(), &draft).await {
                    Ok(UpsertOutcome::Created(_)) => report.created += 1,
                    Ok(UpsertOutcome::Updated(_)) => report.updated += 1,
                    Err(e) => {
                        break 'pages StopReason::StoreFailed {
                            page,
                            error: e.to_string(),
                        };
                    }
                }
                report.processed += 1;
            }

            tracing::debug!(page, items = items.len(), processed = report.processed, "page done");
            emit(
                events,
                RunEvent::Page {
                    page,
                    items: items.len(),
                    processed: report.processed,
                },
            )
            .await;

            if report.processed >= req.limit {
                break StopReason::LimitReached;
            }

            page += 1;
            sleep(req.delay).await;
        };

        report.stop = stop;
        report
    }

    async fn fetch_with_retry(&self, query: &str, page: u32) -> Result<Vec<RawProduct>, FetchError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.source.fetch_page(query, page).await {
                Ok(items) => return Ok(items),
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(page, attempt, error = %e, "page fetch failed; retrying");
                    sleep(self.retry.backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn emit(events: Option<&mpsc::Sender<RunEvent>>, event: RunEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}
