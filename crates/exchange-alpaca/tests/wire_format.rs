use chrono::{NaiveDate, TimeZone, Utc};
use gapfade_alpaca::types::{BarsPage, CalendarDay, LatestQuote, Snapshot};
use gapfade_core::Bar;
use rust_decimal_macros::dec;

#[test]
fn bars_page_converts_to_domain_bars() {
    let page: BarsPage = serde_json::from_str(
        r#"{
            "bars": [
                {"t":"2024-01-10T14:30:00Z","o":99.0,"h":99.3,"l":98.9,"c":99.25,"v":15231,"n":120,"vw":99.12},
                {"t":"2024-01-10T14:31:00Z","o":99.25,"h":99.3,"l":98.7,"c":98.75,"v":9120,"n":88}
            ],
            "symbol": "SPY",
            "next_page_token": "U1BZfE18MjAyNC0wMS0xMFQxNDozMTowMFo="
        }"#,
    )
    .unwrap();

    assert!(page.next_page_token.is_some());
    let bars: Vec<Bar> = page.bars.unwrap().into_iter().map(Bar::from).collect();
    assert_eq!(bars.len(), 2);
    assert_eq!(bars[0].timestamp, Utc.with_ymd_and_hms(2024, 1, 10, 14, 30, 0).unwrap());
    assert_eq!(bars[0].open, dec!(99));
    assert_eq!(bars[0].volume, dec!(15231));
    assert_eq!(bars[0].vwap, Some(dec!(99.12)));
    assert_eq!(bars[1].vwap, None);
}

#[test]
fn empty_range_has_null_bars() {
    let page: BarsPage =
        serde_json::from_str(r#"{"bars":null,"symbol":"SPY","next_page_token":null}"#).unwrap();
    assert!(page.bars.is_none());
    assert!(page.next_page_token.is_none());
}

const SNAPSHOT: &str = r#"{
    "symbol": "SPY",
    "latestQuote": {"ap": 99.01, "bp": 98.99, "t": "2024-01-10T15:00:00Z"},
    "dailyBar": {"t":"2024-01-10T05:00:00Z","o":99.0,"h":99.5,"l":98.2,"c":98.6,"v":1000000},
    "prevDailyBar": {"t":"2024-01-09T05:00:00Z","o":100.5,"h":101.0,"l":99.8,"c":100.0,"v":2000000}
}"#;

#[test]
fn prior_close_during_session_is_previous_daily_bar() {
    let snapshot: Snapshot = serde_json::from_str(SNAPSHOT).unwrap();
    let today = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
    assert_eq!(snapshot.prior_close(today), Some(dec!(100)));
}

#[test]
fn prior_close_before_open_is_latest_daily_bar() {
    // Next morning the snapshot has not rolled yet; the 10th is the prior session.
    let snapshot: Snapshot = serde_json::from_str(SNAPSHOT).unwrap();
    let tomorrow = NaiveDate::from_ymd_opt(2024, 1, 11).unwrap();
    assert_eq!(snapshot.prior_close(tomorrow), Some(dec!(98.6)));
}

#[test]
fn quote_mid_price() {
    let latest: LatestQuote = serde_json::from_str(
        r#"{"symbol":"SPY","quote":{"ap":99.02,"as":3,"bp":98.98,"bs":2,"t":"2024-01-10T15:00:00Z"}}"#,
    )
    .unwrap();
    assert_eq!(latest.quote.mid(), Some(dec!(99.00)));
}

#[test]
fn one_sided_quote_uses_the_live_side() {
    let latest: LatestQuote =
        serde_json::from_str(r#"{"quote":{"ap":0,"bp":98.98}}"#).unwrap();
    assert_eq!(latest.quote.mid(), Some(dec!(98.98)));
    let dead: LatestQuote = serde_json::from_str(r#"{"quote":{"ap":0,"bp":0}}"#).unwrap();
    assert_eq!(dead.quote.mid(), None);
}

#[test]
fn calendar_reports_early_close() {
    let days: Vec<CalendarDay> = serde_json::from_str(
        r#"[{"date":"2024-11-29","open":"09:30","close":"13:00","session_open":"0400","session_close":"1700","settlement_date":"2024-12-03"}]"#,
    )
    .unwrap();
    let window = days[0].window().unwrap();
    assert_eq!(window.date, NaiveDate::from_ymd_opt(2024, 11, 29).unwrap());
    assert_eq!(window.open, Utc.with_ymd_and_hms(2024, 11, 29, 14, 30, 0).unwrap());
    assert_eq!(window.close, Utc.with_ymd_and_hms(2024, 11, 29, 18, 0, 0).unwrap());
}

#[test]
fn calendar_hours_follow_daylight_saving() {
    let days: Vec<CalendarDay> =
        serde_json::from_str(r#"[{"date":"2024-07-03","open":"09:30","close":"13:00"}]"#).unwrap();
    let window = days[0].window().unwrap();
    assert_eq!(window.close, Utc.with_ymd_and_hms(2024, 7, 3, 17, 0, 0).unwrap());
}

#[test]
fn malformed_calendar_hours_give_no_window() {
    let days: Vec<CalendarDay> =
        serde_json::from_str(r#"[{"date":"2024-11-29","open":"9:30am","close":"13:00"}]"#).unwrap();
    assert!(days[0].window().is_none());
}
