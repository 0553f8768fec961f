use crate::error::Error;
use crate::transform::{CanonicalRecord, CANONICAL_FIELD_COUNT};
use chrono::NaiveDateTime;
use datafusion::arrow::array::{
    Date64Builder, Float64Builder, RecordBatch, StringBuilder, StringDictionaryBuilder,
    UInt64Builder,
};
use datafusion::arrow::datatypes::{DataType, Field, Int32Type, Schema};
use std::sync::Arc;

fn dict_utf8() -> DataType {
    DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
}

/// The destination table's 26-column schema. Low-cardinality label
/// columns are dictionary-encoded; free text and per-ad identifiers stay
/// plain Utf8.
pub fn report_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date64, false),
        Field::new("video_average_play_time", DataType::Float64, false),
        Field::new("video_views", DataType::UInt64, false),
        Field::new("video_views_at_25", DataType::UInt64, false),
        Field::new("video_views_at_50", DataType::UInt64, false),
        Field::new("video_views_at_75", DataType::UInt64, false),
        Field::new("video_views_at_100", DataType::UInt64, false),
        Field::new("format", dict_utf8(), false),
        Field::new("text", DataType::Utf8, false),
        Field::new("creative", DataType::Utf8, false),
        Field::new("call_to_action", dict_utf8(), false),
        Field::new("frequency", DataType::Float64, false),
        Field::new("amount_spent_usd", DataType::Float64, false),
        Field::new("reach", DataType::UInt64, false),
        Field::new("ctr_destination", DataType::Float64, false),
        Field::new("currency", dict_utf8(), false),
        Field::new("impressions", DataType::UInt64, false),
        Field::new("cpm", DataType::Float64, false),
        Field::new("cpc_destination", DataType::Float64, false),
        Field::new("link_clicks", DataType::UInt64, false),
        Field::new("cpr", DataType::Float64, false),
        Field::new("campaign_name", dict_utf8(), false),
        Field::new("ad_group_name", dict_utf8(), false),
        Field::new("ad_name", DataType::Utf8, false),
        Field::new("platform", dict_utf8(), false),
        Field::new("language", dict_utf8(), false),
    ]))
}

fn date_to_unix_ms(date: chrono::NaiveDate) -> i64 {
    (date - NaiveDateTime::UNIX_EPOCH.date()).num_milliseconds()
}

/// Builds one Arrow [`RecordBatch`] from a batch of canonical records,
/// column order matching [`report_schema`].
pub fn records_to_batch(records: &[CanonicalRecord]) -> Result<RecordBatch, Error> {
    let num_records = records.len();

    let mut date = Date64Builder::with_capacity(num_records);
    let mut video_average_play_time = Float64Builder::with_capacity(num_records);
    let mut video_views = UInt64Builder::with_capacity(num_records);
    let mut video_views_at_25 = UInt64Builder::with_capacity(num_records);
    let mut video_views_at_50 = UInt64Builder::with_capacity(num_records);
    let mut video_views_at_75 = UInt64Builder::with_capacity(num_records);
    let mut video_views_at_100 = UInt64Builder::with_capacity(num_records);
    let mut format = StringDictionaryBuilder::<Int32Type>::new();
    let mut text = StringBuilder::new();
    let mut creative = StringBuilder::new();
    let mut call_to_action = StringDictionaryBuilder::<Int32Type>::new();
    let mut frequency = Float64Builder::with_capacity(num_records);
    let mut amount_spent_usd = Float64Builder::with_capacity(num_records);
    let mut reach = UInt64Builder::with_capacity(num_records);
    let mut ctr_destination = Float64Builder::with_capacity(num_records);
    let mut currency = StringDictionaryBuilder::<Int32Type>::new();
    let mut impressions = UInt64Builder::with_capacity(num_records);
    let mut cpm = Float64Builder::with_capacity(num_records);
    let mut cpc_destination = Float64Builder::with_capacity(num_records);
    let mut link_clicks = UInt64Builder::with_capacity(num_records);
    let mut cpr = Float64Builder::with_capacity(num_records);
    let mut campaign_name = StringDictionaryBuilder::<Int32Type>::new();
    let mut ad_group_name = StringDictionaryBuilder::<Int32Type>::new();
    let mut ad_name = StringBuilder::new();
    let mut platform = StringDictionaryBuilder::<Int32Type>::new();
    let mut language = StringDictionaryBuilder::<Int32Type>::new();

    for record in records {
        date.append_value(date_to_unix_ms(record.date));
        video_average_play_time.append_value(record.video_average_play_time);
        video_views.append_value(record.video_views);
        video_views_at_25.append_value(record.video_views_at_25);
        video_views_at_50.append_value(record.video_views_at_50);
        video_views_at_75.append_value(record.video_views_at_75);
        video_views_at_100.append_value(record.video_views_at_100);
        format.append(&record.format)?;
        text.append_value(&record.text);
        creative.append_value(&record.creative);
        call_to_action.append(&record.call_to_action)?;
        frequency.append_value(record.frequency);
        amount_spent_usd.append_value(record.amount_spent_usd);
        reach.append_value(record.reach);
        ctr_destination.append_value(record.ctr_destination);
        currency.append(&record.currency)?;
        impressions.append_value(record.impressions);
        cpm.append_value(record.cpm);
        cpc_destination.append_value(record.cpc_destination);
        link_clicks.append_value(record.link_clicks);
        cpr.append_value(record.cpr);
        campaign_name.append(&record.campaign_name)?;
        ad_group_name.append(&record.ad_group_name)?;
        ad_name.append_value(&record.ad_name);
        platform.append(&record.platform)?;
        language.append(&record.language)?;
    }

    let batch = RecordBatch::try_new(
        report_schema(),
        vec![
            Arc::new(date.finish()),
            Arc::new(video_average_play_time.finish()),
            Arc::new(video_views.finish()),
            Arc::new(video_views_at_25.finish()),
            Arc::new(video_views_at_50.finish()),
            Arc::new(video_views_at_75.finish()),
            Arc::new(video_views_at_100.finish()),
            Arc::new(format.finish()),
            Arc::new(text.finish()),
            Arc::new(creative.finish()),
            Arc::new(call_to_action.finish()),
            Arc::new(frequency.finish()),
            Arc::new(amount_spent_usd.finish()),
            Arc::new(reach.finish()),
            Arc::new(ctr_destination.finish()),
            Arc::new(currency.finish()),
            Arc::new(impressions.finish()),
            Arc::new(cpm.finish()),
            Arc::new(cpc_destination.finish()),
            Arc::new(link_clicks.finish()),
            Arc::new(cpr.finish()),
            Arc::new(campaign_name.finish()),
            Arc::new(ad_group_name.finish()),
            Arc::new(ad_name.finish()),
            Arc::new(platform.finish()),
            Arc::new(language.finish()),
        ],
    )?;

    Ok(batch)
}

/// Gate every batch through the table contract before any byte hits the
/// destination: name, type and nullability of all 26 columns must match.
pub fn validate_batch(batch: &RecordBatch) -> Result<(), Error> {
    let expected = report_schema();
    let actual = batch.schema();

    if actual.fields().len() != expected.fields().len() {
        return Err(Error::SchemaMismatch {
            field: "*".to_string(),
            expected_type: format!("{} columns", expected.fields().len()),
            actual_type: format!("{} columns", actual.fields().len()),
        });
    }

    for (want, got) in expected.fields().iter().zip(actual.fields().iter()) {
        if want.name() != got.name() {
            return Err(Error::SchemaMismatch {
                field: want.name().clone(),
                expected_type: want.name().clone(),
                actual_type: got.name().clone(),
            });
        }
        if want.data_type() != got.data_type() || want.is_nullable() != got.is_nullable() {
            return Err(Error::SchemaMismatch {
                field: want.name().clone(),
                expected_type: want.data_type().to_string(),
                actual_type: got.data_type().to_string(),
            });
        }
    }

    Ok(())
}
