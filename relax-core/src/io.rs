//! Table I/O: input loading, initial-dual loading, and result persistence.
//!
//! Index/value tables are JSON-lines records `{"index": i, "value": v}` or
//! plain `index,value` CSV; block tables are JSON-lines only. The serializer
//! lays out one subdirectory per artifact under the output directory and
//! replaces any previous run wholesale.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::driver::DriverError;
use crate::linalg::sparse::{self, SparseVec};
use crate::objective::PrimalTable;
use crate::objectives::separable_qp::Block;

/// On-disk encoding of index/value tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableFormat {
    #[default]
    Json,
    Csv,
}

impl std::fmt::Display for TableFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableFormat::Json => write!(f, "json"),
            TableFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for TableFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(TableFormat::Json),
            "csv" => Ok(TableFormat::Csv),
            other => Err(format!("unknown table format `{}`", other)),
        }
    }
}

/// One row of a persisted index/value table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexedValue {
    pub index: i32,
    pub value: f64,
}

fn malformed(path: &Path, message: impl ToString) -> DriverError {
    DriverError::Malformed {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

/// Read an index/value table. Rows need not be sorted.
pub fn read_indexed_values(
    path: &Path,
    format: TableFormat,
) -> Result<Vec<(usize, f64)>, DriverError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut pairs = Vec::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let row = match format {
            TableFormat::Json => serde_json::from_str::<IndexedValue>(trimmed)
                .map_err(|e| malformed(path, format!("line {}: {}", lineno + 1, e)))?,
            TableFormat::Csv => {
                if lineno == 0 && trimmed.starts_with("index") {
                    continue;
                }
                let mut fields = trimmed.split(',');
                let index = fields
                    .next()
                    .and_then(|f| f.trim().parse::<i32>().ok())
                    .ok_or_else(|| malformed(path, format!("line {}: bad index", lineno + 1)))?;
                let value = fields
                    .next()
                    .and_then(|f| f.trim().parse::<f64>().ok())
                    .ok_or_else(|| malformed(path, format!("line {}: bad value", lineno + 1)))?;
                IndexedValue { index, value }
            }
        };
        if row.index < 0 {
            return Err(malformed(path, format!("negative index {}", row.index)));
        }
        pairs.push((row.index as usize, row.value));
    }
    Ok(pairs)
}

/// Load the starting dual: the table at `path`, or the zero vector when no
/// path is given. Rows may arrive in any order; missing indices are zero.
pub fn load_initial_dual(
    path: Option<&Path>,
    dim: usize,
    format: TableFormat,
) -> Result<SparseVec, DriverError> {
    let Some(path) = path else {
        return Ok(sparse::zeros(dim));
    };
    let pairs = read_indexed_values(path, format)?;
    sparse::from_pairs(dim, pairs).map_err(|e| malformed(path, e))
}

/// Load the constraint right-hand side b. The table fixes the dual
/// dimensionality as max index + 1.
pub fn load_vector_b(path: &Path, format: TableFormat) -> Result<Vec<f64>, DriverError> {
    let pairs = read_indexed_values(path, format)?;
    if pairs.is_empty() {
        return Err(malformed(path, "empty constraint vector"));
    }
    let dim = pairs.iter().map(|&(i, _)| i).max().unwrap() + 1;
    let mut b = vec![0.0; dim];
    for (i, v) in pairs {
        b[i] = v;
    }
    Ok(b)
}

/// Load the block table (JSON lines of [`Block`] records).
pub fn load_blocks(path: &Path) -> Result<Vec<Block>, DriverError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut blocks = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let block: Block = serde_json::from_str(&line)
            .map_err(|e| malformed(path, format!("line {}: {}", lineno + 1, e)))?;
        blocks.push(block);
    }
    Ok(blocks)
}

fn table_file(dir: &Path, format: TableFormat) -> PathBuf {
    dir.join(format!("part-00000.{}", format))
}

/// Recreate `dir` empty. Replacement of a previous run's artifact.
fn fresh_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)
}

fn write_table<'a>(
    dir: &Path,
    entries: impl Iterator<Item = (usize, &'a f64)>,
    format: TableFormat,
) -> Result<(), DriverError> {
    fresh_dir(dir)?;
    let file = File::create(table_file(dir, format))?;
    let mut writer = BufWriter::new(file);
    if format == TableFormat::Csv {
        writeln!(writer, "index,value")?;
    }
    for (index, &value) in entries {
        let row = IndexedValue {
            index: index as i32,
            value,
        };
        match format {
            TableFormat::Json => {
                serde_json::to_writer(&mut writer, &row)
                    .map_err(|e| DriverError::Malformed {
                        path: dir.display().to_string(),
                        message: e.to_string(),
                    })?;
                writeln!(writer)?;
            }
            TableFormat::Csv => writeln!(writer, "{},{}", row.index, row.value)?,
        }
    }
    writer.flush()?;
    Ok(())
}

/// Persist a run: the accumulated log, the dual (active entries only), the
/// constraint slack table, and the primal view when present.
pub fn write_outputs(
    output_dir: &Path,
    log_text: &str,
    lambda: &SparseVec,
    violation: &SparseVec,
    primal: Option<&PrimalTable>,
    format: TableFormat,
) -> Result<(), DriverError> {
    let log_dir = output_dir.join("log");
    fresh_dir(&log_dir)?;
    {
        let file = File::create(log_dir.join("log.txt"))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(log_text.as_bytes())?;
        writeln!(writer)?;
        writer.flush()?;
    }

    write_table(
        &output_dir.join("dual"),
        lambda.iter().filter(|&(_, &v)| v != 0.0),
        format,
    )?;
    write_table(&output_dir.join("violation"), violation.iter(), format)?;

    if let Some(table) = primal {
        let primal_dir = output_dir.join("primal");
        fresh_dir(&primal_dir)?;
        let file = File::create(primal_dir.join("part-00000.json"))?;
        let mut writer = BufWriter::new(file);
        for record in table {
            serde_json::to_writer(&mut writer, record).map_err(|e| DriverError::Malformed {
                path: primal_dir.display().to_string(),
                message: e.to_string(),
            })?;
            writeln!(writer)?;
        }
        writer.flush()?;
    }

    Ok(())
}

/// Path of the dual table written by [`write_outputs`], for warm restarts.
pub fn dual_table_path(output_dir: &Path, format: TableFormat) -> PathBuf {
    table_file(&output_dir.join("dual"), format)
}
