//! Error types for bar ingestion
//!
//! Only malformed upstream data is an error. Short series, invalid setups and
//! exhausted fallback chains are ordinary values in the analysis output.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    /// IO error while reading a bar file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required OHLC column is absent from the input
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A numeric field could not be parsed
    #[error("Bad value '{value}' for {column} at row {row}")]
    BadValue {
        row: usize,
        column: String,
        value: String,
    },

    /// Timestamp could not be parsed
    #[error("Bad timestamp '{value}' at row {row}")]
    BadTimestamp { row: usize, value: String },

    /// Bars are not strictly ascending by timestamp
    #[error("Bars out of order at row {row}")]
    UnsortedBars { row: usize },

    /// Provider returned nothing for a series the routine cannot do without
    #[error("No bars for {symbol} {timeframe}")]
    EmptySeries { symbol: String, timeframe: String },
}
