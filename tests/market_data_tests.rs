use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use ckls_mpc::market_data::{
    read_bars, search_date, slice, to_series, CsvDirectorySource, MarketDataSource, PriceField,
};
use uuid::Uuid;

const CSV: &str = "\
Date,Open,High,Low,Close,Adj Close,Volume
2020-01-03,101.0,103.0,100.0,102.0,51.0,1000
2020-01-02,100.0,102.0,99.0,101.0,50.5,1200
2020-01-06,102.0,104.0,101.0,103.0,51.5,900
2020-01-07,103.0,105.0,102.0,104.0,52.0,800
";

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ckls-mpc-{}", Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("SPY.csv"), CSV).unwrap();
    dir
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
/// Verifies tickers resolve case-insensitively and rows come back in date order.
fn fetch_uppercases_ticker_and_sorts() {
    let dir = temp_dir();
    let bars = CsvDirectorySource::new(&dir).fetch(" spy ").unwrap();
    assert_eq!(bars.len(), 4);
    assert_eq!(bars[0].date, day(2020, 1, 2));
    assert!(bars.windows(2).all(|w| w[0].date < w[1].date));
    assert!(CsvDirectorySource::new(&dir).fetch("QQQ").is_err());
    fs::remove_dir_all(dir).unwrap();
}

#[test]
/// Verifies a weekend start rolls forward to the next trading day and the end is inclusive.
fn slice_rolls_forward_and_includes_end() {
    let dir = temp_dir();
    let bars = read_bars(&dir.join("SPY.csv")).unwrap();
    let window = slice(&bars, day(2020, 1, 4), day(2020, 1, 7)).unwrap();
    assert_eq!(window.len(), 2);
    assert_eq!(window[0].date, day(2020, 1, 6));
    assert_eq!(search_date(&bars, day(2020, 1, 1)).unwrap(), 0);
    assert!(search_date(&bars, day(2020, 2, 1)).is_err());
    assert!(slice(&bars, day(2020, 1, 6), day(2020, 1, 2)).is_err());
    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn adjusted_fields_use_close_ratio() {
    let dir = temp_dir();
    let bars = read_bars(&dir.join("SPY.csv")).unwrap();
    assert!((bars[0].adjustment_factor() - 0.5).abs() < 1e-12);
    assert!((bars[0].adj_open() - 50.0).abs() < 1e-12);
    assert!((PriceField::AdjOpen.pick(&bars[1]) - 50.5).abs() < 1e-12);

    let series = to_series(&bars, PriceField::AdjClose, 1.0 / 252.0).unwrap();
    assert_eq!(series.values(), &[50.5, 51.0, 51.5, 52.0]);
    fs::remove_dir_all(dir).unwrap();
}
