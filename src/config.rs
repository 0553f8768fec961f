use clap::Args as ClapArgs;

const DEFAULT_API_URL: &str = "https://business-api.tiktok.com/open_api/v1.3";
const DEFAULT_TABLE_PATH: &str = "./tiktok_report";

#[derive(ClapArgs)]
pub struct Config {
    #[arg(long, default_value = DEFAULT_API_URL, env = "TIKTOK_API_URL")]
    pub(crate) api_url: String,

    #[arg(long, env = "TIKTOK_APP_ID")]
    pub(crate) app_id: String,

    #[arg(long, env = "TIKTOK_APP_SECRET")]
    pub(crate) app_secret: String,

    #[arg(long, env = "TIKTOK_ACCESS_TOKEN")]
    pub(crate) access_token: String,

    #[arg(long, env = "TIKTOK_ADVERTISER_ID")]
    pub(crate) advertiser_id: String,

    /// Directory holding the parquet part files of the report table.
    #[arg(long, default_value = DEFAULT_TABLE_PATH, env = "REPORT_TABLE_PATH")]
    pub(crate) table_path: String,

    /// Upstream reporting lag: windows are clamped to end no later than
    /// today minus this many days.
    #[arg(long, default_value_t = 2, env = "FRESHNESS_DELAY_DAYS")]
    pub(crate) freshness_delay_days: u32,

    /// Backfills are split into sub-windows of at most this many days.
    #[arg(long, default_value_t = 30, env = "MAX_WINDOW_DAYS")]
    pub(crate) max_window_days: u32,

    #[arg(long, default_value_t = 1000, env = "REPORT_PAGE_SIZE")]
    pub(crate) page_size: u32,

    /// Hard stop on pagination, in case upstream keeps signalling
    /// more pages.
    #[arg(long, default_value_t = 500, env = "REPORT_MAX_PAGES")]
    pub(crate) max_pages: u32,

    #[arg(long, default_value_t = 5, env = "REPORT_MAX_ATTEMPTS")]
    pub(crate) max_attempts: u32,

    #[arg(long, default_value_t = 1000, env = "REPORT_BASE_BACKOFF_MS")]
    pub(crate) base_backoff_ms: u64,

    #[arg(long, default_value_t = 30_000, env = "REPORT_MAX_BACKOFF_MS")]
    pub(crate) max_backoff_ms: u64,
}

/// Opaque credential bundle resolved by the caller's secret store.
/// Intentionally not `Debug`: tokens must never end up in logs.
#[derive(Clone)]
pub struct Credentials {
    pub app_id: String,
    pub app_secret: String,
    pub access_token: String,
    pub advertiser_id: String,
}

impl Config {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            app_id: self.app_id.clone(),
            app_secret: self.app_secret.clone(),
            access_token: self.access_token.clone(),
            advertiser_id: self.advertiser_id.clone(),
        }
    }
}
