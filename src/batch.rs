use crate::transform::CanonicalRecord;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Identity of one report row within a run. The advertiser is run-scoped
/// but part of the key so batches from different advertisers could never
/// collapse into each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RecordKey {
    date: NaiveDate,
    advertiser_id: String,
    creative: String,
}

/// Deduplicates a run's transformed records by (date, advertiser,
/// creative).
///
/// Upstream pages are append-only within a window, so when pagination
/// overlaps, the last occurrence of a key is the most complete one: we
/// keep the LAST-seen record, written back into the FIRST-seen position
/// so that the relative order of distinct keys stays deterministic.
pub fn assemble(records: Vec<CanonicalRecord>, advertiser_id: &str) -> Vec<CanonicalRecord> {
    let mut positions: HashMap<RecordKey, usize> = HashMap::new();
    let mut assembled: Vec<CanonicalRecord> = Vec::with_capacity(records.len());

    for record in records {
        let key = RecordKey {
            date: record.date,
            advertiser_id: advertiser_id.to_string(),
            creative: record.creative.clone(),
        };

        match positions.get(&key) {
            Some(&idx) => assembled[idx] = record,
            None => {
                positions.insert(key, assembled.len());
                assembled.push(record);
            }
        }
    }

    assembled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn record(date: &str, creative: &str, impressions: u64) -> CanonicalRecord {
        CanonicalRecord {
            date: NaiveDate::from_str(date).unwrap(),
            video_average_play_time: 0.0,
            video_views: 0,
            video_views_at_25: 0,
            video_views_at_50: 0,
            video_views_at_75: 0,
            video_views_at_100: 0,
            format: String::new(),
            text: String::new(),
            creative: creative.to_string(),
            call_to_action: String::new(),
            frequency: 0.0,
            amount_spent_usd: 0.0,
            reach: 0,
            ctr_destination: 0.0,
            currency: "USD".to_string(),
            impressions,
            cpm: 0.0,
            cpc_destination: 0.0,
            link_clicks: 0,
            cpr: 0.0,
            campaign_name: String::new(),
            ad_group_name: String::new(),
            ad_name: String::new(),
            platform: "TikTok".to_string(),
            language: "en".to_string(),
        }
    }

    #[test]
    fn test_distinct_keys_pass_through_in_order() {
        let input = vec![
            record("2025-10-07", "a", 1),
            record("2025-10-07", "b", 2),
            record("2025-10-08", "a", 3),
        ];
        let out = assemble(input.clone(), "adv");
        assert_eq!(out, input);
    }

    #[test]
    fn test_duplicate_key_keeps_last_seen_at_first_position() {
        let input = vec![
            record("2025-10-07", "a", 1),
            record("2025-10-07", "b", 2),
            record("2025-10-07", "a", 99),
        ];
        let out = assemble(input, "adv");

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].creative, "a");
        assert_eq!(out[0].impressions, 99);
        assert_eq!(out[1].creative, "b");
    }

    #[test]
    fn test_same_creative_different_dates_are_distinct() {
        let input = vec![
            record("2025-10-07", "a", 1),
            record("2025-10-08", "a", 2),
        ];
        let out = assemble(input, "adv");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_empty_input_yields_empty_batch() {
        assert!(assemble(vec![], "adv").is_empty());
    }
}
