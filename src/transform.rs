use crate::api_client::AdDetails;
use crate::error::Error;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;

pub const PLATFORM: &str = "TikTok";
pub const CURRENCY: &str = "USD";
pub const LANGUAGE: &str = "en";

/// Share of total video views assumed to have reached the 75% mark.
/// Upstream only reports 2s/6s watch counts and total plays, so the
/// quartile columns are estimates, not measurements: 25% ~ watched 2s,
/// 50% ~ watched 6s, 75% ~ this ratio of plays, 100% ~ total plays.
pub const QUARTILE_75_RATIO: f64 = 0.75;

/// The fixed 26-column row the destination table expects. Every field is
/// always populated: counts and rates default to zero, identifiers to
/// the empty string. Nothing downstream ever sees an absent value.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub date: NaiveDate,
    pub video_average_play_time: f64,
    pub video_views: u64,
    pub video_views_at_25: u64,
    pub video_views_at_50: u64,
    pub video_views_at_75: u64,
    pub video_views_at_100: u64,
    pub format: String,
    pub text: String,
    pub creative: String,
    pub call_to_action: String,
    pub frequency: f64,
    pub amount_spent_usd: f64,
    pub reach: u64,
    pub ctr_destination: f64,
    pub currency: String,
    pub impressions: u64,
    pub cpm: f64,
    pub cpc_destination: f64,
    pub link_clicks: u64,
    pub cpr: f64,
    pub campaign_name: String,
    pub ad_group_name: String,
    pub ad_name: String,
    pub platform: String,
    pub language: String,
}

pub const CANONICAL_FIELD_COUNT: usize = 26;

fn transform_err(field: &str, raw_value: &Value) -> Error {
    Error::Transform {
        field: field.to_string(),
        raw_value: raw_value.to_string(),
    }
}

/// Required identifier out of `dimensions`. Upstream emits IDs as either
/// JSON strings or bare integers depending on endpoint version.
fn dimension_id(raw: &Value, name: &str) -> Result<String, Error> {
    let value = raw
        .get("dimensions")
        .and_then(|d| d.get(name))
        .ok_or_else(|| transform_err(name, &Value::Null))?;

    match value {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(transform_err(name, other)),
    }
}

fn stat_date(raw: &Value) -> Result<NaiveDate, Error> {
    let value = raw
        .get("dimensions")
        .and_then(|d| d.get("stat_time_day"))
        .ok_or_else(|| transform_err("stat_time_day", &Value::Null))?;

    let text = value
        .as_str()
        .ok_or_else(|| transform_err("stat_time_day", value))?;

    // Daily stats arrive as "YYYY-MM-DD" or "YYYY-MM-DD 00:00:00".
    let day = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| transform_err("stat_time_day", value))
}

/// Rate/currency metric: absent or null means zero; numbers and numeric
/// strings coerce; anything else is a transform failure, never a silent
/// default.
fn metric_f64(raw: &Value, name: &str) -> Result<f64, Error> {
    let value = match raw.get("metrics").and_then(|m| m.get(name)) {
        None | Some(Value::Null) => return Ok(0.0),
        Some(v) => v,
    };

    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| transform_err(name, value)),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| transform_err(name, value)),
        other => Err(transform_err(name, other)),
    }
}

/// Count metric: same defaulting rules, but fractional or negative
/// values cannot be a count and fail.
fn metric_u64(raw: &Value, name: &str) -> Result<u64, Error> {
    let value = match raw.get("metrics").and_then(|m| m.get(name)) {
        None | Some(Value::Null) => return Ok(0),
        Some(v) => v,
    };

    let as_float = match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| transform_err(name, value))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| transform_err(name, value))?,
        other => return Err(transform_err(name, other)),
    };

    if as_float < 0.0 || as_float.fract() != 0.0 {
        return Err(transform_err(name, value));
    }
    Ok(as_float as u64)
}

fn round6(x: f64) -> f64 {
    (x * 1_000_000.0).round() / 1_000_000.0
}

/// Cost per reach, rounded to 6 decimal places. Zero reach yields zero
/// rather than a division blow-up.
fn cost_per_reach(spend: f64, reach: u64) -> f64 {
    if reach == 0 {
        return 0.0;
    }
    round6(spend / reach as f64)
}

/// Maps one raw report row into the canonical 26-column record.
///
/// Pure: all I/O (page fetching, ad-details lookup) happens before this
/// point, which keeps the mapping exhaustively unit-testable.
pub fn transform_record(
    raw: &Value,
    details: &HashMap<String, AdDetails>,
) -> Result<CanonicalRecord, Error> {
    let ad_id = dimension_id(raw, "ad_id")?;
    let date = stat_date(raw)?;

    let video_views = metric_u64(raw, "video_play_actions")?;
    let video_2s = metric_u64(raw, "video_watched_2s")?;
    let video_6s = metric_u64(raw, "video_watched_6s")?;
    let spend = metric_f64(raw, "spend")?;
    let reach = metric_u64(raw, "reach")?;

    let info = details.get(&ad_id).cloned().unwrap_or_default();

    Ok(CanonicalRecord {
        date,
        video_average_play_time: metric_f64(raw, "average_video_play")?,
        video_views,
        video_views_at_25: video_2s,
        video_views_at_50: video_6s,
        video_views_at_75: (video_views as f64 * QUARTILE_75_RATIO).floor() as u64,
        video_views_at_100: video_views,
        format: info.creative_material_mode,
        text: info.ad_text,
        creative: ad_id,
        call_to_action: info.call_to_action,
        frequency: metric_f64(raw, "frequency")?,
        amount_spent_usd: spend,
        reach,
        ctr_destination: metric_f64(raw, "ctr")?,
        currency: CURRENCY.to_string(),
        impressions: metric_u64(raw, "impressions")?,
        cpm: metric_f64(raw, "cpm")?,
        cpc_destination: metric_f64(raw, "cpc")?,
        link_clicks: metric_u64(raw, "clicks")?,
        cpr: cost_per_reach(spend, reach),
        campaign_name: info.campaign_name,
        ad_group_name: info.adgroup_name,
        ad_name: info.ad_name,
        platform: PLATFORM.to_string(),
        language: LANGUAGE.to_string(),
    })
}
