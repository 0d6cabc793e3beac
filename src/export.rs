//! JSON export of found paths and run statistics.
//!
//! A path is written as an array of `[x, y]` pairs in walking order.
use grid_util::point::Point;
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

use crate::session::Metrics;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("there is no path to export")]
    NoPath,
    #[error("could not write path: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode path: {0}")]
    Json(#[from] serde_json::Error),
}

fn pairs(path: &[Point]) -> Vec<(i32, i32)> {
    path.iter().map(|p| (p.x, p.y)).collect()
}

pub fn path_to_json(path: &[Point]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(&pairs(path))?)
}

/// Reads a path written by [write_path].
pub fn path_from_json(json: &str) -> Result<Vec<Point>, ExportError> {
    let pairs: Vec<(i32, i32)> = serde_json::from_str(json)?;
    Ok(pairs.into_iter().map(|(x, y)| Point::new(x, y)).collect())
}

pub fn write_path<W: Write>(path: &[Point], mut writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(&mut writer, &pairs(path))?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Writes the path to `filename`, replacing the file if it exists.
pub fn save_path<P: AsRef<Path>>(path: &[Point], filename: P) -> Result<(), ExportError> {
    let f = File::create(filename.as_ref())?;
    write_path(path, BufWriter::new(f))?;
    info!(
        "Exported path of {} cells to {}",
        path.len(),
        filename.as_ref().display()
    );
    Ok(())
}

pub fn metrics_to_json(metrics: &Metrics) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(metrics)?)
}
