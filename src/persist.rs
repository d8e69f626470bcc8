//! Plain-text dump of a Q-matrix: one line per state, one column per action,
//! values separated by single spaces.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::Array2;

use crate::error::{Result, SvpError};

/// Writes `q` to `path`, replacing any existing file.
pub fn write_q_matrix(path: impl AsRef<Path>, q: &Array2<f64>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for row in q.outer_iter() {
        let line = row
            .iter()
            .map(|v| format!("{:e}", v))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a matrix written by [`write_q_matrix`]. Blank lines are skipped.
pub fn read_q_matrix(path: impl AsRef<Path>) -> Result<Array2<f64>> {
    let reader = BufReader::new(File::open(path)?);
    let mut values = Vec::new();
    let mut cols = None;
    let mut rows = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let before = values.len();
        for token in line.split_whitespace() {
            let value: f64 = token.parse().map_err(|_| SvpError::Parse {
                line: idx + 1,
                reason: format!("'{}' is not a number", token),
            })?;
            values.push(value);
        }
        let width = values.len() - before;
        match cols {
            None => cols = Some(width),
            Some(expected) if expected != width => {
                return Err(SvpError::Parse {
                    line: idx + 1,
                    reason: format!("expected {} columns, found {}", expected, width),
                });
            }
            Some(_) => {}
        }
        rows += 1;
    }

    let cols = cols.unwrap_or(0);
    Array2::from_shape_vec((rows, cols), values).map_err(|e| SvpError::Parse {
        line: rows,
        reason: e.to_string(),
    })
}
