//! Input alignment and tabular persistence.
//!
//! The merger turns separate position and price feeds into ticks. The
//! fixture helpers read the row-oriented test table and write the derived
//! metric series.

mod fixture;
mod merger;

pub use fixture::{
    parse_timestamp, read_fixture, read_fixture_from_reader, write_metrics_csv,
    write_metrics_csv_to_path,
};
pub use merger::SnapshotMerger;
