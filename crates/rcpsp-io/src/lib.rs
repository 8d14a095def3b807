//! # rcpsp-io
//!
//! Instance file parsing and result serialization for the RCPSP
//! tabu-search engine.
//!
//! This crate provides:
//! - [`load_instance_file`] / [`load_instance_str`]: readers for the two
//!   published PSP instance formats (PSP-SFX, PSPLIB/max 1.0).
//! - [`result_file`]: the binary `.res` result-file format.
//! - [`progress`]: the CSV makespan-progress sink (`--write-makespan-graph`).

pub mod progress;
pub mod result_file;

use std::collections::VecDeque;
use std::path::Path;

use rcpsp_core::{Instance, InstanceBuilder, InstanceError};
use thiserror::Error;

/// Errors raised while reading an instance file. Corresponds to
/// `ConfigError` (malformed file, unreadable path) except for
/// [`LoadError::Instance`], which wraps a semantically-inconsistent graph
/// (`InstanceError`, exit code 2 at the CLI boundary rather than 1).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read instance file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("empty instance file")]
    Empty,

    #[error("malformed instance file: {0}")]
    Malformed(String),

    #[error("activity id mismatch: expected {expected}, found {found}")]
    ActivityIdMismatch { expected: u32, found: u32 },

    #[error(transparent)]
    Instance(#[from] InstanceError),
}

/// Reads and parses an instance file, auto-detecting PSP-SFX vs.
/// PSPLIB/max 1.0 by its first line (§6).
pub fn load_instance_file(path: &Path) -> Result<Instance, LoadError> {
    tracing::debug!(path = %path.display(), "loading instance file");
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let instance = load_instance_str(&content)?;
    tracing::info!(
        activities = instance.num_activities(),
        resources = instance.num_resources(),
        critical_path = instance.critical_path_makespan(),
        "instance loaded"
    );
    Ok(instance)
}

/// Parses instance file contents already read into memory.
pub fn load_instance_str(content: &str) -> Result<Instance, LoadError> {
    let first_line = content.lines().next().ok_or(LoadError::Empty)?;
    let raw = if first_line.trim_start().starts_with('*') {
        parse_psp_sfx(content)?
    } else if !first_line.trim().is_empty() {
        parse_psplib_max(content)?
    } else {
        return Err(LoadError::Empty);
    };
    raw.into_instance()
}

/// Pre-`Instance` activity/resource data, shared by both format parsers.
struct RawInstance {
    num_activities: u32,
    num_resources: u32,
    duration: Vec<u32>,
    capacity: Vec<u32>,
    demand: Vec<Vec<u32>>,
    successors: Vec<Vec<u32>>,
}

impl RawInstance {
    fn into_instance(self) -> Result<Instance, LoadError> {
        let mut builder = InstanceBuilder::new(self.num_activities, self.num_resources);
        for (a, &d) in self.duration.iter().enumerate() {
            builder = builder.duration(a as u32, d);
        }
        for (r, &c) in self.capacity.iter().enumerate() {
            builder = builder.capacity(r as u32, c);
        }
        for (a, row) in self.demand.iter().enumerate() {
            for (r, &d) in row.iter().enumerate() {
                builder = builder.demand(a as u32, r as u32, d);
            }
        }
        for (a, succs) in self.successors.iter().enumerate() {
            for &s in succs {
                builder = builder.successor(a as u32, s);
            }
        }
        Ok(builder.build()?)
    }
}

/// Token cursor over whitespace-separated content spanning line
/// boundaries, mirroring C++ `istream >>` extraction semantics: tokens are
/// read without regard to line breaks, while [`Lexer::skip_lines`] discards
/// whole lines (used for the section-separator banners between PSP-SFX
/// data blocks).
struct Lexer<'a> {
    lines: std::str::Lines<'a>,
    queue: VecDeque<&'a str>,
}

impl<'a> Lexer<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            lines: content.lines(),
            queue: VecDeque::new(),
        }
    }

    fn next_raw_line(&mut self) -> Option<&'a str> {
        self.lines.next()
    }

    fn skip_lines(&mut self, n: usize) {
        for _ in 0..n {
            self.lines.next();
        }
    }

    fn next_token(&mut self) -> Result<&'a str, LoadError> {
        while self.queue.is_empty() {
            let line = self
                .lines
                .next()
                .ok_or_else(|| LoadError::Malformed("unexpected end of file".into()))?;
            self.queue.extend(line.split_whitespace());
        }
        Ok(self.queue.pop_front().unwrap())
    }

    fn next_u32(&mut self) -> Result<u32, LoadError> {
        let token = self.next_token()?;
        token
            .parse()
            .map_err(|_| LoadError::Malformed(format!("expected integer, found '{token}'")))
    }
}

/// Extracts the leading run of ASCII digits appearing anywhere in `line`,
/// matching `InputReader::readFromStream`'s digit-scan for the "- renewable"
/// anchor (the resource count may be preceded by other non-digit text on
/// the same line).
fn digits_in_line(line: &str) -> Option<u32> {
    let digits: String = line.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

/// Parses the PSP-SFX format: header anchored by `- renewable`, `MPM-Time`
/// and `#successors`, followed by successor, duration/demand, and capacity
/// blocks separated by banner lines that must be skipped rather than
/// tokenized (§6).
fn parse_psp_sfx(content: &str) -> Result<RawInstance, LoadError> {
    let mut lexer = Lexer::new(content);

    let mut num_resources = None;
    let mut num_jobs = None;

    while let Some(line) = lexer.next_raw_line() {
        if line.contains("- renewable") {
            num_resources = digits_in_line(line);
        }
        if line.contains("MPM-Time") {
            let data_line = lexer
                .next_raw_line()
                .ok_or_else(|| LoadError::Malformed("missing MPM-Time data row".into()))?;
            let jobs = data_line
                .split_whitespace()
                .nth(1)
                .ok_or_else(|| LoadError::Malformed("missing job count after MPM-Time".into()))?;
            num_jobs = Some(
                jobs.parse::<u32>()
                    .map_err(|_| LoadError::Malformed(format!("invalid job count '{jobs}'")))?,
            );
        }
        if line.contains("#successors") {
            break;
        }
    }

    let num_resources =
        num_resources.ok_or_else(|| LoadError::Malformed("missing '- renewable' header".into()))?;
    let num_jobs =
        num_jobs.ok_or_else(|| LoadError::Malformed("missing 'MPM-Time' header".into()))?;
    if num_resources == 0 || num_jobs == 0 {
        return Err(LoadError::Malformed(
            "number of resources and jobs must be positive".into(),
        ));
    }
    let num_activities = num_jobs + 2;

    let mut successors = vec![Vec::new(); num_activities as usize];
    for activity in 0..num_activities {
        let test_id = lexer.next_u32()?;
        if test_id != activity + 1 {
            return Err(LoadError::ActivityIdMismatch {
                expected: activity + 1,
                found: test_id,
            });
        }
        let _colon = lexer.next_token()?;
        let num_successors = lexer.next_u32()?;
        let mut row = Vec::with_capacity(num_successors as usize);
        for _ in 0..num_successors {
            let successor = lexer.next_u32()?;
            if successor == 0 || successor > num_activities {
                return Err(LoadError::Malformed(format!(
                    "successor id {successor} out of range for activity {activity}"
                )));
            }
            row.push(successor - 1);
        }
        successors[activity as usize] = row;
    }

    lexer.skip_lines(5);

    let mut duration = vec![0u32; num_activities as usize];
    let mut demand = vec![vec![0u32; num_resources as usize]; num_activities as usize];
    for activity in 0..num_activities {
        let test_id = lexer.next_u32()?;
        if test_id != activity + 1 {
            return Err(LoadError::ActivityIdMismatch {
                expected: activity + 1,
                found: test_id,
            });
        }
        let _mode = lexer.next_u32()?;
        duration[activity as usize] = lexer.next_u32()?;
        for r in 0..num_resources {
            demand[activity as usize][r as usize] = lexer.next_u32()?;
        }
    }

    lexer.skip_lines(4);

    let mut capacity = vec![0u32; num_resources as usize];
    for r in 0..num_resources {
        capacity[r as usize] = lexer.next_u32()?;
    }

    Ok(RawInstance {
        num_activities,
        num_resources,
        duration,
        capacity,
        demand,
        successors,
    })
}

/// Parses the PSPLIB/max 1.0 format: a single header line
/// `numActivities numResources _ _`, then tightly-packed successor and
/// duration/demand blocks with activity ids already 0-based (§6).
fn parse_psplib_max(content: &str) -> Result<RawInstance, LoadError> {
    let mut lexer = Lexer::new(content);

    let num_jobs = lexer.next_u32()?;
    let num_resources = lexer.next_u32()?;
    let _ = lexer.next_u32()?;
    let _ = lexer.next_u32()?;
    if num_jobs == 0 || num_resources == 0 {
        return Err(LoadError::Malformed(
            "number of activities and resources must be positive".into(),
        ));
    }
    let num_activities = num_jobs + 2;

    let mut successors = vec![Vec::new(); num_activities as usize];
    for activity in 0..num_activities {
        let test_id = lexer.next_u32()?;
        if test_id != activity {
            return Err(LoadError::ActivityIdMismatch {
                expected: activity,
                found: test_id,
            });
        }
        let _colon = lexer.next_token()?;
        let num_successors = lexer.next_u32()?;
        let mut row = Vec::with_capacity(num_successors as usize);
        for _ in 0..num_successors {
            let successor = lexer.next_u32()?;
            if successor >= num_activities {
                return Err(LoadError::Malformed(format!(
                    "successor id {successor} out of range for activity {activity}"
                )));
            }
            row.push(successor);
        }
        successors[activity as usize] = row;
    }

    let mut duration = vec![0u32; num_activities as usize];
    let mut demand = vec![vec![0u32; num_resources as usize]; num_activities as usize];
    for activity in 0..num_activities {
        let test_id = lexer.next_u32()?;
        if test_id != activity {
            return Err(LoadError::ActivityIdMismatch {
                expected: activity,
                found: test_id,
            });
        }
        let _mode = lexer.next_u32()?;
        duration[activity as usize] = lexer.next_u32()?;
        for r in 0..num_resources {
            demand[activity as usize][r as usize] = lexer.next_u32()?;
        }
    }

    let mut capacity = vec![0u32; num_resources as usize];
    for r in 0..num_resources {
        capacity[r as usize] = lexer.next_u32()?;
    }

    Ok(RawInstance {
        num_activities,
        num_resources,
        duration,
        capacity,
        demand,
        successors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PSPLIB_MAX_CHAIN: &str = "\
4 1 0 0
0 : 1 1
1 : 1 2
2 : 1 3
3 : 0
0 1 0
1 1 3
2 1 5
3 1 0
1
";

    #[test]
    fn parses_psplib_max_chain() {
        let instance = load_instance_str(PSPLIB_MAX_CHAIN).unwrap();
        assert_eq!(instance.num_activities(), 4);
        assert_eq!(instance.num_resources(), 1);
        assert_eq!(instance.duration(1), 3);
        assert_eq!(instance.duration(2), 5);
        assert_eq!(instance.capacity(0), 1);
        assert_eq!(instance.successors(0), &[1]);
        assert_eq!(instance.critical_path_makespan(), 8);
    }

    const PSP_SFX_CHAIN: &str = "\
*
pronr.  #jobs rel.date duedate tardcost  MPM-Time
  1      2       0       38      23       38
RESOURCES
  - renewable                 :  1   R
  - nonrenewable               :  0   N
PRECEDENCE RELATIONS:
jobnr.    #modes  #successors   successors
#successors
1 : 1 2
2 : 1 3
3 : 1 4
4 : 0
************************************************************************
REQUESTS/DURATIONS:
jobnr. mode duration  R 1
------------------------------------------------------------------------
1 1 0 0
2 1 3 1
3 1 5 1
4 1 0 0
************************************************************************
RESOURCEAVAILABILITIES:
  R 1
   1
";

    #[test]
    fn parses_psp_sfx_chain() {
        let instance = load_instance_str(PSP_SFX_CHAIN).unwrap();
        assert_eq!(instance.num_activities(), 4);
        assert_eq!(instance.num_resources(), 1);
        assert_eq!(instance.duration(1), 3);
        assert_eq!(instance.duration(2), 5);
        assert_eq!(instance.capacity(0), 1);
        assert_eq!(instance.successors(0), &[1]);
        assert_eq!(instance.critical_path_makespan(), 8);
    }

    #[test]
    fn rejects_empty_file() {
        assert!(matches!(load_instance_str(""), Err(LoadError::Empty)));
    }

    #[test]
    fn rejects_demand_exceeding_capacity() {
        let bad = "2 1 0 0\n0 : 1 1\n1 : 0\n0 1 5\n1 1 0\n1\n";
        assert!(matches!(
            load_instance_str(bad),
            Err(LoadError::Instance(InstanceError::DemandExceedsCapacity { .. }))
        ));
    }
}
