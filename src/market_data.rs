use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::series::ObservedSeries;

/// Daily bar as exported by common data vendors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Open")]
    pub open: f64,
    #[serde(rename = "High")]
    pub high: f64,
    #[serde(rename = "Low")]
    pub low: f64,
    #[serde(rename = "Close")]
    pub close: f64,
    #[serde(rename = "Adj Close")]
    pub adj_close: f64,
    #[serde(rename = "Volume", default)]
    pub volume: f64,
}

impl PriceBar {
    /// `Adj Close / Close`, the split/dividend factor for the whole bar.
    pub fn adjustment_factor(&self) -> f64 {
        if self.close.abs() <= f64::EPSILON {
            return 1.0;
        }
        self.adj_close / self.close
    }

    pub fn adj_open(&self) -> f64 {
        self.open * self.adjustment_factor()
    }

    pub fn adj_high(&self) -> f64 {
        self.high * self.adjustment_factor()
    }

    pub fn adj_low(&self) -> f64 {
        self.low * self.adjustment_factor()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    #[default]
    AdjClose,
    AdjOpen,
}

impl PriceField {
    pub fn pick(self, bar: &PriceBar) -> f64 {
        match self {
            Self::Open => bar.open,
            Self::High => bar.high,
            Self::Low => bar.low,
            Self::Close => bar.close,
            Self::AdjClose => bar.adj_close,
            Self::AdjOpen => bar.adj_open(),
        }
    }
}

pub trait MarketDataSource {
    fn fetch(&self, ticker: &str) -> Result<Vec<PriceBar>, CoreError>;
}

/// Reads `<root>/<TICKER>.csv`, rows sorted by date.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    root: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.root
            .join(format!("{}.csv", ticker.trim().to_ascii_uppercase()))
    }
}

impl MarketDataSource for CsvDirectorySource {
    fn fetch(&self, ticker: &str) -> Result<Vec<PriceBar>, CoreError> {
        let bars = read_bars(&self.path_for(ticker))?;
        tracing::info!(ticker, bars = bars.len(), "loaded price history");
        Ok(bars)
    }
}

pub fn read_bars(path: &Path) -> Result<Vec<PriceBar>, CoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut bars = reader
        .deserialize()
        .collect::<Result<Vec<PriceBar>, _>>()?;
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

/// Index of the first bar dated on or after `date`.
pub fn search_date(bars: &[PriceBar], date: NaiveDate) -> Result<usize, CoreError> {
    bars.iter().position(|b| b.date >= date).ok_or_else(|| {
        CoreError::InvalidInput(format!("no bar on or after {date}"))
    })
}

/// Bars from the first on/after `start` through the first on/after `end`, inclusive.
pub fn slice(bars: &[PriceBar], start: NaiveDate, end: NaiveDate) -> Result<&[PriceBar], CoreError> {
    let from = search_date(bars, start)?;
    let to = search_date(bars, end)?;
    if to < from {
        return Err(CoreError::InvalidInput(format!(
            "window end {end} precedes start {start}"
        )));
    }
    Ok(&bars[from..=to])
}

pub fn to_series(bars: &[PriceBar], field: PriceField, dt: f64) -> Result<ObservedSeries, CoreError> {
    ObservedSeries::new(bars.iter().map(|b| field.pick(b)).collect(), dt)
}
