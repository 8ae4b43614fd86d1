//! Local time helpers for date-range questions
//!
//! The bank works in Europe/Amsterdam time; offsets and DST transitions come
//! from the IANA database via `chrono-tz`.

use crate::error::OrchestrationError;
use crate::models::RequestContext;
use crate::tools::{object_schema, required_str, Tool};
use crate::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::Amsterdam;
use chrono_tz::{OffsetComponents, Tz};
use serde_json::{json, Value};
use std::sync::Arc;

pub const TIMEZONE: &str = "Europe/Amsterdam";

pub fn tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(CurrentTimeTool), Arc::new(ConvertToUnixTool)]
}

/// Whether summer time is in effect at the given instant
pub fn is_summer_time(utc: DateTime<Utc>) -> bool {
    utc.with_timezone(&Amsterdam).offset().dst_offset() != Duration::zero()
}

pub fn in_amsterdam(utc: DateTime<Utc>) -> DateTime<Tz> {
    utc.with_timezone(&Amsterdam)
}

pub fn now_in_amsterdam() -> DateTime<Tz> {
    in_amsterdam(Utc::now())
}

/// Local Amsterdam wall-clock time to UTC.
/// In the repeated autumn hour the summer-time reading wins; a time inside
/// the skipped spring hour is read as winter time.
pub fn local_to_utc(local: NaiveDateTime) -> Result<DateTime<Utc>> {
    Amsterdam
        .from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            Amsterdam
                .from_local_datetime(&(local + Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            OrchestrationError::InvalidToolInput(format!(
                "{} does not exist in {}",
                local, TIMEZONE
            ))
        })
}

/// Accepts `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`
pub fn parse_local(input: &str) -> Result<NaiveDateTime> {
    let input = input.trim();

    if let Ok(dt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt);
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| {
            OrchestrationError::InvalidToolInput(format!(
                "Expected 'YYYY-MM-DD' or 'YYYY-MM-DD HH:MM:SS', got {:?}",
                input
            ))
        })
}

/// Local Amsterdam midnight of a date, as UNIX milliseconds
pub fn local_midnight_millis(date: NaiveDate) -> Result<i64> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    Ok(local_to_utc(midnight)?.timestamp_millis())
}

pub struct CurrentTimeTool;

#[async_trait::async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Returns the current date, weekday and time in Europe/Amsterdam. \
         Use it for any question involving today's date."
    }

    async fn execute(&self, _args: &Value, _ctx: &RequestContext) -> Result<Value> {
        let now = now_in_amsterdam();
        Ok(json!({
            "timezone": TIMEZONE,
            "datetime": now.to_rfc3339(),
            "date": now.format("%Y-%m-%d").to_string(),
            "day_of_week": now.format("%A").to_string(),
            "is_dst": is_summer_time(now.with_timezone(&Utc)),
        }))
    }
}

pub struct ConvertToUnixTool;

#[async_trait::async_trait]
impl Tool for ConvertToUnixTool {
    fn name(&self) -> &str {
        "convert_europe_amsterdam_to_unix"
    }

    fn description(&self) -> &str {
        "Converts a Europe/Amsterdam datetime ('YYYY-MM-DD' or 'YYYY-MM-DD HH:MM:SS') \
         to a UNIX timestamp in milliseconds."
    }

    fn parameters(&self) -> Value {
        object_schema(json!({"datetime_str": {"type": "string"}}), &["datetime_str"])
    }

    async fn execute(&self, args: &Value, _ctx: &RequestContext) -> Result<Value> {
        let local = parse_local(&required_str(args, "datetime_str")?)?;
        Ok(json!(local_to_utc(local)?.timestamp_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(input: &str) -> NaiveDateTime {
        parse_local(input).unwrap()
    }

    fn utc_millis(input: &str) -> i64 {
        local_to_utc(local(input)).unwrap().timestamp_millis()
    }

    fn utc(input: &str) -> DateTime<Utc> {
        local(input).and_utc()
    }

    #[test]
    fn test_winter_and_summer_offsets() {
        // 2025-01-15 00:00 CET == 2025-01-14 23:00 UTC
        assert_eq!(utc_millis("2025-01-15"), 1_736_895_600_000);
        // 2025-07-01 00:00 CEST == 2025-06-30 22:00 UTC
        assert_eq!(utc_millis("2025-07-01 00:00:00"), 1_751_320_800_000);
    }

    #[test]
    fn test_transition_instants_2025() {
        assert!(!is_summer_time(utc("2025-03-30 00:59:59")));
        assert!(is_summer_time(utc("2025-03-30 01:00:00")));
        assert!(is_summer_time(utc("2025-10-26 00:59:59")));
        assert!(!is_summer_time(utc("2025-10-26 01:00:00")));
    }

    #[test]
    fn test_ambiguous_and_skipped_local_times() {
        // 02:30 happens twice on 2025-10-26; the CEST reading is 00:30 UTC
        assert_eq!(
            local_to_utc(local("2025-10-26 02:30:00")).unwrap(),
            utc("2025-10-26 00:30:00")
        );
        // 02:30 never happens on 2025-03-30; read as CET it is 01:30 UTC
        assert_eq!(
            local_to_utc(local("2025-03-30 02:30:00")).unwrap(),
            utc("2025-03-30 01:30:00")
        );
    }

    #[test]
    fn test_local_midnight_follows_offset() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert_eq!(local_midnight_millis(date).unwrap(), 1_751_320_800_000);
        assert_eq!(
            in_amsterdam(utc("2025-06-30 22:00:00")).date_naive(),
            date
        );
    }

    #[test]
    fn test_rejects_other_formats() {
        assert!(parse_local("01-07-2025").is_err());
        assert!(parse_local("2025-07-01T00:00:00").is_err());
    }

    #[tokio::test]
    async fn test_convert_tool() {
        let out = ConvertToUnixTool
            .execute(
                &json!({"datetime_str": "2025-07-01"}),
                &RequestContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(out, json!(1_751_320_800_000i64));
    }
}
