#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use trip_cleaner::{CleaningConfig, CleaningReport, ExclusionLog, TripCleaner};

pub const RAW_HEADER: &str = "id,vendor_id,pickup_datetime,dropoff_datetime,passenger_count,\
pickup_longitude,pickup_latitude,dropoff_longitude,dropoff_latitude,store_and_fwd_flag";

/// One raw input row. The default is a valid 15-minute midtown to downtown trip.
#[derive(Debug, Clone)]
pub struct RawTrip {
    pub id: String,
    pub vendor_id: String,
    pub pickup_datetime: String,
    pub dropoff_datetime: String,
    pub passenger_count: String,
    pub pickup: (f64, f64),
    pub dropoff: (f64, f64),
    pub store_and_fwd_flag: String,
}

impl RawTrip {
    pub fn valid(id: &str) -> Self {
        Self {
            id: id.to_string(),
            vendor_id: "2".to_string(),
            pickup_datetime: "2016-01-01 08:00:00".to_string(),
            dropoff_datetime: "2016-01-01 08:15:00".to_string(),
            passenger_count: "2".to_string(),
            pickup: (-73.98, 40.75),
            dropoff: (-73.99, 40.73),
            store_and_fwd_flag: "0".to_string(),
        }
    }

    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{}",
            self.id,
            self.vendor_id,
            self.pickup_datetime,
            self.dropoff_datetime,
            self.passenger_count,
            self.pickup.0,
            self.pickup.1,
            self.dropoff.0,
            self.dropoff.1,
            self.store_and_fwd_flag
        )
    }
}

/// Writes the trips as a raw CSV file inside `dir`.
pub fn write_raw(dir: &Path, trips: &[RawTrip]) -> PathBuf {
    let mut text = String::from(RAW_HEADER);
    text.push('\n');
    for trip in trips {
        text.push_str(&trip.to_csv_line());
        text.push('\n');
    }
    let path = dir.join("train.csv");
    std::fs::write(&path, text).unwrap();
    path
}

/// A cleaned artifact read back as text: the header and one map per row.
pub struct CleanedFile {
    pub header: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
}

impl CleanedFile {
    pub fn read(path: &Path) -> Self {
        let text = std::fs::read_to_string(path).unwrap();
        let mut lines = text.lines();
        let header: Vec<String> = lines
            .next()
            .unwrap()
            .split(',')
            .map(str::to_string)
            .collect();
        let rows = lines
            .map(|line| {
                header
                    .iter()
                    .cloned()
                    .zip(line.split(',').map(str::to_string))
                    .collect()
            })
            .collect();
        Self { header, rows }
    }

    pub fn row(&self, id: &str) -> Option<&HashMap<String, String>> {
        self.rows.iter().find(|row| row["id"] == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row["id"].as_str()).collect()
    }
}

pub fn number(row: &HashMap<String, String>, column: &str) -> f64 {
    row[column]
        .parse()
        .unwrap_or_else(|_| panic!("column {} is not numeric: {}", column, row[column]))
}

/// Everything produced by one cleaning run in a fresh temporary directory.
pub struct CleaningRun {
    pub dir: TempDir,
    pub output: PathBuf,
    pub report: CleaningReport,
    pub log: ExclusionLog,
    pub cleaned: CleanedFile,
}

pub async fn clean_trips_with(trips: &[RawTrip], config: CleaningConfig) -> CleaningRun {
    let dir = tempfile::tempdir().unwrap();
    let input = write_raw(dir.path(), trips);
    let output = dir.path().join("processed").join("clean_trips.csv");
    let mut log = ExclusionLog::new();
    let report = TripCleaner::new(config)
        .unwrap()
        .run(&input, &output, &mut log)
        .await
        .unwrap();
    let cleaned = CleanedFile::read(&output);
    CleaningRun {
        dir,
        output,
        report,
        log,
        cleaned,
    }
}

pub async fn clean_trips(trips: &[RawTrip]) -> CleaningRun {
    clean_trips_with(trips, CleaningConfig::default()).await
}
