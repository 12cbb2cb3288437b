//! Row-oriented fixture tables and metric series CSV output.
//!
//! A fixture has a `timestamp` column plus `<SYMBOL>_position` and
//! `<SYMBOL>_price` columns. Empty cells mean "not observed in this row".

use crate::types::{instrument, Instrument, MetricsSample, PositionSnapshot, PriceQuote};
use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use std::fs::File;
use std::io;
use std::path::Path;

enum Column {
    Timestamp,
    Position(Instrument),
    Price(Instrument),
}

fn parse_header(header: &str) -> Result<Column> {
    let header = header.trim();
    if header.eq_ignore_ascii_case("timestamp") {
        return Ok(Column::Timestamp);
    }

    match header.rsplit_once('_') {
        Some((symbol, suffix)) if !symbol.is_empty() => {
            match suffix.to_ascii_lowercase().as_str() {
                "position" => Ok(Column::Position(instrument(symbol))),
                "price" => Ok(Column::Price(instrument(symbol))),
                _ => Err(Error::Fixture(format!("unknown column suffix in '{}'", header))),
            }
        }
        _ => Err(Error::Fixture(format!("unrecognised column '{}'", header))),
    }
}

/// Parse a timestamp given as integer epoch seconds or RFC 3339.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| Error::Fixture(format!("timestamp out of range: {}", secs)));
    }

    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Fixture(format!("invalid timestamp '{}': {}", value, e)))
}

fn parse_cell(value: &str, row: usize, column: &str) -> Result<Option<f64>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }

    let parsed: f64 = value.parse().map_err(|_| {
        Error::Fixture(format!(
            "row {}: column '{}' is not a number: '{}'",
            row, column, value
        ))
    })?;

    // Exported NaN cells count as unobserved
    Ok(parsed.is_finite().then_some(parsed))
}

/// Read a fixture table into position and price feeds.
pub fn read_fixture_from_reader<R: io::Read>(
    reader: R,
) -> Result<(Vec<PositionSnapshot>, Vec<PriceQuote>)> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let columns: Vec<Column> = headers
        .iter()
        .map(parse_header)
        .collect::<Result<_>>()?;

    let timestamp_idx = columns
        .iter()
        .position(|c| matches!(c, Column::Timestamp))
        .ok_or_else(|| Error::Fixture("missing 'timestamp' column".to_string()))?;

    let mut snapshots = Vec::new();
    let mut quotes = Vec::new();

    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let raw_ts = record
            .get(timestamp_idx)
            .ok_or_else(|| Error::Fixture(format!("row {}: missing timestamp", row)))?;
        let timestamp = parse_timestamp(raw_ts)?;

        let mut snapshot = PositionSnapshot::new(timestamp);
        let mut quote = PriceQuote::new(timestamp);

        for (idx, column) in columns.iter().enumerate() {
            let cell = record.get(idx).unwrap_or("");
            match column {
                Column::Timestamp => {}
                Column::Position(symbol) => {
                    if let Some(quantity) = parse_cell(cell, row, &headers[idx])? {
                        snapshot.positions.insert(symbol.clone(), quantity);
                    }
                }
                Column::Price(symbol) => {
                    if let Some(price) = parse_cell(cell, row, &headers[idx])? {
                        quote.prices.insert(symbol.clone(), price);
                    }
                }
            }
        }

        snapshots.push(snapshot);
        quotes.push(quote);
    }

    tracing::debug!(rows = snapshots.len(), "fixture loaded");
    Ok((snapshots, quotes))
}

/// Read a fixture table from a file.
pub fn read_fixture(path: &Path) -> Result<(Vec<PositionSnapshot>, Vec<PriceQuote>)> {
    let file = File::open(path)?;
    read_fixture_from_reader(file)
}

/// Write a metric series as CSV, one row per sample.
pub fn write_metrics_csv<W: io::Write>(writer: W, samples: &[MetricsSample]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for sample in samples {
        wtr.serialize(sample)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write a metric series to a CSV file, creating parent directories.
pub fn write_metrics_csv_to_path(path: &Path, samples: &[MetricsSample]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    write_metrics_csv(File::create(path)?, samples)
}
