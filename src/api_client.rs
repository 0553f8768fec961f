use crate::config::Credentials;
use crate::error::Error;
use chrono::NaiveDate;
use log::warn;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Inclusive calendar-date range a report run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, Error> {
        if start > end {
            return Err(Error::StartDateAfterEndDate {
                start_date: start.to_string(),
                end_date: end.to_string(),
            });
        }
        Ok(DateWindow { start, end })
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// One page of the upstream report: loosely typed rows plus the
/// pagination position. Discarded once transformed.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub records: Vec<Value>,
    pub page: u32,
    pub total_pages: u32,
}

impl RawPage {
    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Ad metadata from the `/ad/get/` endpoint, keyed by ad_id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdDetails {
    pub ad_id: String,
    #[serde(default)]
    pub ad_name: String,
    #[serde(default)]
    pub adgroup_name: String,
    #[serde(default)]
    pub campaign_name: String,
    #[serde(default)]
    pub ad_text: String,
    #[serde(default)]
    pub call_to_action: String,
    #[serde(default)]
    pub creative_material_mode: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ReportApi: Send + Sync + 'static {
    /// Fetches a single page of the integrated ad report for the window.
    /// Issues exactly one request; retry policy lives in the Paginator.
    async fn fetch_report_page(&self, window: &DateWindow, page: u32)
        -> Result<RawPage, Error>;

    /// Fetches creative/campaign metadata for the given ad IDs.
    /// Batches that fail are skipped with a warning, so the returned map
    /// may be partial; the transformer falls back to empty strings.
    async fn fetch_ad_details(
        &self,
        ad_ids: &[String],
    ) -> Result<HashMap<String, AdDetails>, Error>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    page_size: u32,
}

// Upstream response envelope: a business-level `code` wraps every body,
// 0 meaning success even when HTTP is 200.
#[derive(Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<Value>,
}

#[derive(Deserialize, Default)]
struct PageInfo {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    total_page: u32,
}

const CODE_RATE_LIMIT: i64 = 40100;
const CODE_AUTH_MIN: i64 = 40101;
const CODE_AUTH_MAX: i64 = 40105;
const AD_DETAILS_BATCH: usize = 100;

const REPORT_METRICS: [&str; 13] = [
    "spend",
    "impressions",
    "clicks",
    "ctr",
    "cpm",
    "cpc",
    "reach",
    "frequency",
    "video_play_actions",
    "video_watched_2s",
    "video_watched_6s",
    "average_video_play",
    "average_video_play_per_user",
];

/// Maps an upstream failure to the error taxonomy: rate limiting and
/// auth rejections get their own variants so the Paginator can pick a
/// retry strategy per kind.
pub(crate) fn classify_failure(status: StatusCode, code: i64, message: &str) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS || code == CODE_RATE_LIMIT {
        return Error::RateLimited {
            message: message.to_string(),
        };
    }
    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || (CODE_AUTH_MIN..=CODE_AUTH_MAX).contains(&code)
    {
        return Error::Auth {
            status: status.as_u16(),
            message: message.to_string(),
        };
    }
    Error::Upstream {
        status: status.as_u16(),
        body: message.to_string(),
    }
}

impl ApiClient {
    pub fn new(api_url: &str, credentials: Credentials, page_size: u32) -> Self {
        ApiClient {
            client: Client::new(),
            base_url: api_url.to_string(),
            credentials,
            page_size,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::UrlParsingFailed(url::ParseError::SetHostOnCannotBeABaseUrl))?
            .extend(segments);
        Ok(url)
    }

    async fn fetch_ad_details_batch(
        &self,
        batch: &[String],
    ) -> Result<Vec<AdDetails>, Error> {
        let mut url = self.endpoint(&["ad", "get"])?;
        url.query_pairs_mut()
            .append_pair("advertiser_id", &self.credentials.advertiser_id)
            .append_pair("filtering", &json!({ "ad_ids": batch }).to_string())
            .append_pair(
                "fields",
                &json!([
                    "ad_id",
                    "ad_name",
                    "adgroup_name",
                    "campaign_name",
                    "ad_text",
                    "call_to_action",
                    "creative_material_mode"
                ])
                .to_string(),
            );

        let resp = self
            .client
            .get(url)
            .header("Access-Token", &self.credentials.access_token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_failure(status, 0, &body));
        }

        let envelope = resp.json::<Envelope>().await?;
        if envelope.code != 0 {
            return Err(classify_failure(status, envelope.code, &envelope.message));
        }

        let list = envelope
            .data
            .and_then(|d| d.get("list").cloned())
            .unwrap_or(Value::Array(vec![]));
        let ads: Vec<AdDetails> = serde_json::from_value(list).unwrap_or_default();
        Ok(ads)
    }
}

#[async_trait::async_trait]
impl ReportApi for ApiClient {
    async fn fetch_report_page(
        &self,
        window: &DateWindow,
        page: u32,
    ) -> Result<RawPage, Error> {
        let url = self.endpoint(&["report", "integrated", "get"])?;

        let payload = json!({
            "advertiser_id": self.credentials.advertiser_id,
            "report_type": "BASIC",
            "dimensions": ["ad_id", "stat_time_day"],
            "metrics": REPORT_METRICS,
            "data_level": "AUCTION_AD",
            "start_date": window.start.format("%Y-%m-%d").to_string(),
            "end_date": window.end.format("%Y-%m-%d").to_string(),
            "page_size": self.page_size,
            "page": page,
        });

        let resp = self
            .client
            .post(url)
            .header("Access-Token", &self.credentials.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_failure(status, 0, &body));
        }

        let envelope = resp.json::<Envelope>().await?;
        if envelope.code != 0 {
            return Err(classify_failure(status, envelope.code, &envelope.message));
        }

        let data = envelope.data.unwrap_or(Value::Null);
        let records: Vec<Value> = data
            .get("list")
            .and_then(|l| l.as_array())
            .cloned()
            .unwrap_or_default();
        let page_info: PageInfo = data
            .get("page_info")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .unwrap_or_default()
            .unwrap_or_default();

        Ok(RawPage {
            records,
            page: if page_info.page == 0 { page } else { page_info.page },
            total_pages: page_info.total_page.max(1),
        })
    }

    async fn fetch_ad_details(
        &self,
        ad_ids: &[String],
    ) -> Result<HashMap<String, AdDetails>, Error> {
        let mut details = HashMap::new();

        for batch in ad_ids.chunks(AD_DETAILS_BATCH) {
            match self.fetch_ad_details_batch(batch).await {
                Ok(ads) => {
                    for ad in ads {
                        details.insert(ad.ad_id.clone(), ad);
                    }
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!("skipping ad details batch of {}: {}", batch.len(), err);
                }
            }
        }

        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn test_credentials() -> Credentials {
        Credentials {
            app_id: "app".to_string(),
            app_secret: "secret".to_string(),
            access_token: "token".to_string(),
            advertiser_id: "adv-1".to_string(),
        }
    }

    #[test]
    fn test_date_window_rejects_inverted_range() {
        let start = NaiveDate::from_str("2025-10-13").unwrap();
        let end = NaiveDate::from_str("2025-10-07").unwrap();
        assert!(matches!(
            DateWindow::new(start, end).unwrap_err(),
            Error::StartDateAfterEndDate { .. }
        ));
    }

    #[test]
    fn test_raw_page_has_more() {
        let page = RawPage {
            records: vec![],
            page: 1,
            total_pages: 3,
        };
        assert!(page.has_more());

        let last = RawPage {
            records: vec![],
            page: 3,
            total_pages: 3,
        };
        assert!(!last.has_more());
    }

    #[test]
    fn test_classify_rate_limit_by_status() {
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, 0, "slow down");
        assert!(matches!(err, Error::RateLimited { .. }));
    }

    #[test]
    fn test_classify_rate_limit_by_code() {
        let err = classify_failure(StatusCode::OK, 40100, "quota exceeded");
        assert!(matches!(err, Error::RateLimited { .. }));
    }

    #[test]
    fn test_classify_auth_by_status() {
        let err = classify_failure(StatusCode::UNAUTHORIZED, 0, "bad token");
        assert!(matches!(err, Error::Auth { status: 401, .. }));
    }

    #[test]
    fn test_classify_auth_by_code() {
        let err = classify_failure(StatusCode::OK, 40102, "token expired");
        assert!(matches!(err, Error::Auth { .. }));
    }

    #[test]
    fn test_classify_other_is_upstream() {
        let err = classify_failure(StatusCode::INTERNAL_SERVER_ERROR, 50000, "boom");
        assert!(matches!(err, Error::Upstream { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_fetch_report_page_invalid_url() {
        let client = ApiClient::new("invalid_url", test_credentials(), 1000);
        let window = DateWindow::new(
            NaiveDate::from_str("2025-10-07").unwrap(),
            NaiveDate::from_str("2025-10-13").unwrap(),
        )
        .unwrap();

        let result = client.fetch_report_page(&window, 1).await;
        assert!(matches!(result.unwrap_err(), Error::UrlParsingFailed(_)));
    }

    #[tokio::test]
    async fn test_fetch_ad_details_invalid_url() {
        let client = ApiClient::new("invalid_url", test_credentials(), 1000);
        let ad_ids = vec!["123".to_string()];

        // Non-auth failures on a details batch are skipped, so the call
        // succeeds with a partial (here empty) map.
        let details = client.fetch_ad_details(&ad_ids).await.unwrap();
        assert!(details.is_empty());
    }
}
