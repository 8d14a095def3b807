//! CSV makespan-progress sink (`--write-makespan-graph`, §6): one row per
//! iteration recording the iteration's candidate cost alongside the
//! running best, so a run can be plotted without re-instrumenting the
//! search.

use std::io::{self, BufWriter, Write};
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProgressWriteError {
    #[error("cannot write progress file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// A single makespan-graph row: `iter; iterCost; bestCost;`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressRow {
    pub iteration: u64,
    pub iteration_cost: u32,
    pub best_cost: u32,
}

/// Appends rows to a `.csv` progress file, truncating any existing file of
/// the same name. Row 0 carries the initial best cost before the search
/// loop begins.
pub struct ProgressWriter<W: Write> {
    out: W,
}

impl ProgressWriter<BufWriter<std::fs::File>> {
    pub fn create(path: &Path) -> Result<Self, ProgressWriteError> {
        let file = std::fs::File::create(path).map_err(|source| ProgressWriteError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }
}

impl<W: Write> ProgressWriter<W> {
    pub fn write_row(&mut self, row: ProgressRow) -> io::Result<()> {
        writeln!(
            self.out,
            "{}; {}; {};",
            row.iteration, row.iteration_cost, row.best_cost
        )
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
