//! OHLCV bars and bar-series helpers

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::DataError;

/// A single OHLCV bar. Series are ascending by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Zero when the provider has no volume data
    #[serde(default)]
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn body_size(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Calendar date of the bar in New York time
    pub fn date_ny(&self) -> NaiveDate {
        self.timestamp.with_timezone(&New_York).date_naive()
    }
}

/// Bar timeframe as requested from a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1H")]
    H1,
    #[serde(rename = "4H")]
    H4,
    #[serde(rename = "1D")]
    D1,
}

impl Timeframe {
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1H",
            Timeframe::H4 => "4H",
            Timeframe::D1 => "1D",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1H" | "1h" => Ok(Timeframe::H1),
            "4H" | "4h" => Ok(Timeframe::H4),
            "1D" | "1d" => Ok(Timeframe::D1),
            other => Err(format!("Unsupported timeframe: {}", other)),
        }
    }
}

/// Last `n` bars of a series (the whole series when shorter)
pub fn tail(bars: &[Bar], n: usize) -> &[Bar] {
    &bars[bars.len().saturating_sub(n)..]
}

pub fn highest_high(bars: &[Bar]) -> Option<f64> {
    bars.iter().map(|b| b.high).reduce(f64::max)
}

pub fn lowest_low(bars: &[Bar]) -> Option<f64> {
    bars.iter().map(|b| b.low).reduce(f64::min)
}

/// Average Daily Range over the last `period` daily bars.
/// Returns 0.0 when fewer than `period` bars are available.
pub fn average_daily_range(daily: &[Bar], period: usize) -> f64 {
    if period == 0 || daily.len() < period {
        return 0.0;
    }
    let recent = tail(daily, period);
    recent.iter().map(Bar::range).sum::<f64>() / period as f64
}

/// Parse a timestamp in RFC3339, unix seconds, or naive New York local form
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        let secs: i64 = raw.parse().ok()?;
        return Utc.timestamp_opt(secs, 0).single();
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    New_York
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Load bars from a CSV file with a `timestamp,open,high,low,close[,volume]` header
pub fn load_bars_csv(path: &Path) -> Result<Vec<Bar>, DataError> {
    let file = std::fs::File::open(path)?;
    read_bars_csv(file)
}

/// Read bars from any CSV source. Column order is free; names are case-insensitive.
pub fn read_bars_csv<R: std::io::Read>(reader: R) -> Result<Vec<Bar>, DataError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let column = |name: &str| -> Option<usize> {
        headers.iter().position(|h| h.eq_ignore_ascii_case(name))
    };
    let required = |name: &str| -> Result<usize, DataError> {
        column(name).ok_or_else(|| DataError::MissingColumn(name.to_string()))
    };

    let ts_idx = column("timestamp")
        .or_else(|| column("time"))
        .or_else(|| column("date"))
        .ok_or_else(|| DataError::MissingColumn("timestamp".to_string()))?;
    let open_idx = required("open")?;
    let high_idx = required("high")?;
    let low_idx = required("low")?;
    let close_idx = required("close")?;
    let volume_idx = column("volume");

    let mut bars: Vec<Bar> = Vec::new();

    for (row, record) in csv_reader.records().enumerate() {
        let record = record?;
        let field = |idx: usize, name: &str| -> Result<f64, DataError> {
            let value = record.get(idx).unwrap_or("");
            value.parse::<f64>().map_err(|_| DataError::BadValue {
                row,
                column: name.to_string(),
                value: value.to_string(),
            })
        };

        let raw_ts = record.get(ts_idx).unwrap_or("");
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| DataError::BadTimestamp {
            row,
            value: raw_ts.to_string(),
        })?;

        if let Some(prev) = bars.last() {
            if timestamp <= prev.timestamp {
                return Err(DataError::UnsortedBars { row });
            }
        }

        let volume = match volume_idx {
            Some(idx) if !record.get(idx).unwrap_or("").is_empty() => field(idx, "volume")?,
            _ => 0.0,
        };

        bars.push(Bar {
            timestamp,
            open: field(open_idx, "open")?,
            high: field(high_idx, "high")?,
            low: field(low_idx, "low")?,
            close: field(close_idx, "close")?,
            volume,
        });
    }

    Ok(bars)
}
