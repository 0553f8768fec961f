use crate::api_client::{DateWindow, RawPage, ReportApi};
use crate::error::Error;
use log::{debug, warn};
use std::time::Duration;
use tokio::time::sleep;

/// Drives the page fetcher across all pages of one window, owning the
/// retry/backoff policy the fetcher deliberately does not have.
pub struct Paginator {
    pub max_pages: u32,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// Exponential backoff capped at `max`: base, 2*base, 4*base, ...
pub(crate) fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

impl Paginator {
    pub fn new(
        max_pages: u32,
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Paginator {
            max_pages,
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Collects every report page for the window, sequentially.
    ///
    /// Zero pages with zero records is a valid outcome (the window may sit
    /// entirely inside the upstream freshness delay), distinct from any
    /// error return.
    pub async fn collect_pages(
        &self,
        api: &dyn ReportApi,
        window: &DateWindow,
    ) -> Result<Vec<RawPage>, Error> {
        let mut pages = Vec::new();
        let mut page = 1u32;

        loop {
            let raw = self.fetch_with_retry(api, window, page).await?;

            // Upstream sometimes reports more total pages than it has
            // rows; an empty page is the authoritative end signal.
            if raw.records.is_empty() {
                break;
            }

            let has_more = raw.has_more();
            debug!(
                "window {}: page {} with {} records (more: {})",
                window,
                page,
                raw.records.len(),
                has_more
            );
            pages.push(raw);

            if !has_more {
                break;
            }
            if page >= self.max_pages {
                warn!(
                    "window {}: stopping at page bound {} while upstream still signals more",
                    window, self.max_pages
                );
                break;
            }
            page += 1;
        }

        Ok(pages)
    }

    async fn fetch_with_retry(
        &self,
        api: &dyn ReportApi,
        window: &DateWindow,
        page: u32,
    ) -> Result<RawPage, Error> {
        let mut last_err = None;

        for attempt in 0..self.max_attempts {
            match api.fetch_report_page(window, page).await {
                Ok(raw) => return Ok(raw),
                Err(err @ Error::RateLimited { .. }) => {
                    let delay = backoff_delay(self.base_delay, self.max_delay, attempt);
                    warn!(
                        "window {} page {}: rate limited, attempt {}/{}, backing off {:?}",
                        window,
                        page,
                        attempt + 1,
                        self.max_attempts,
                        delay
                    );
                    last_err = Some(err);
                    sleep(delay).await;
                }
                Err(err @ (Error::Upstream { .. } | Error::Http(_))) => {
                    warn!(
                        "window {} page {}: upstream failure, attempt {}/{}: {}",
                        window,
                        page,
                        attempt + 1,
                        self.max_attempts,
                        err
                    );
                    last_err = Some(err);
                }
                // Auth rejections and local bugs cannot be retried away.
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or(Error::Upstream {
            status: 0,
            body: format!("no attempts made for window {window}"),
        }))
    }
}
