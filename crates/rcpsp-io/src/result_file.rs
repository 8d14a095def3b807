//! Binary `.res` result file (§6): a flat little-endian dump of an
//! instance's static data plus the best schedule found for it, so a
//! result can be inspected or diffed without re-running the search.

use std::io::{self, Read, Write};
use std::path::Path;

use rcpsp_core::Instance;
use thiserror::Error;

use crate::LoadError;

#[derive(Debug, Error)]
pub enum ResultFileError {
    #[error("cannot write result file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot read result file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("truncated result file: expected {expected} more bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error(transparent)]
    Instance(#[from] LoadError),
}

/// The schedule half of a `.res` file: the best ordering found and each
/// activity's resolved start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleResult {
    pub best_makespan: u32,
    pub best_order: Vec<u32>,
    pub start_time_by_id: Vec<u32>,
}

/// Writes `instance` and `schedule` to `path` in the `.res` binary layout
/// (§6): `numActivities`, `numResources`, then the instance's static
/// arrays, then the schedule.
pub fn write_result_file(
    path: &Path,
    instance: &Instance,
    schedule: &ScheduleResult,
) -> Result<(), ResultFileError> {
    let mut buf = Vec::new();
    write_u32(&mut buf, instance.num_activities());
    write_u32(&mut buf, instance.num_resources());

    for a in 0..instance.num_activities() {
        write_u32(&mut buf, instance.duration(a));
    }
    for r in 0..instance.num_resources() {
        write_u32(&mut buf, instance.capacity(r));
    }
    for a in 0..instance.num_activities() {
        for &d in instance.demands(a) {
            write_u32(&mut buf, d);
        }
    }

    for a in 0..instance.num_activities() {
        write_u32(&mut buf, instance.successors(a).len() as u32);
    }
    for a in 0..instance.num_activities() {
        for &s in instance.successors(a) {
            write_u32(&mut buf, s);
        }
    }
    for a in 0..instance.num_activities() {
        write_u32(&mut buf, instance.predecessors(a).len() as u32);
    }
    for a in 0..instance.num_activities() {
        for &p in instance.predecessors(a) {
            write_u32(&mut buf, p);
        }
    }

    write_u32(&mut buf, schedule.best_makespan);
    for &a in &schedule.best_order {
        write_u32(&mut buf, a);
    }
    for &t in &schedule.start_time_by_id {
        write_u32(&mut buf, t);
    }

    std::fs::write(path, &buf).map_err(|source| ResultFileError::Write {
        path: path.display().to_string(),
        source,
    })
}

/// Reads a `.res` file written by [`write_result_file`], reconstructing
/// both the instance and the schedule recorded for it.
pub fn read_result_file(path: &Path) -> Result<(Instance, ScheduleResult), ResultFileError> {
    let mut file = std::fs::File::open(path).map_err(|source| ResultFileError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|source| ResultFileError::Read {
            path: path.display().to_string(),
            source,
        })?;

    let mut cursor = Cursor { buf: &buf, pos: 0 };
    let num_activities = cursor.read_u32()?;
    let num_resources = cursor.read_u32()?;

    let duration: Vec<u32> = (0..num_activities)
        .map(|_| cursor.read_u32())
        .collect::<Result<_, _>>()?;
    let capacity: Vec<u32> = (0..num_resources)
        .map(|_| cursor.read_u32())
        .collect::<Result<_, _>>()?;
    let demand: Vec<Vec<u32>> = (0..num_activities)
        .map(|_| {
            (0..num_resources)
                .map(|_| cursor.read_u32())
                .collect::<Result<_, _>>()
        })
        .collect::<Result<_, _>>()?;

    let num_successors: Vec<u32> = (0..num_activities)
        .map(|_| cursor.read_u32())
        .collect::<Result<_, _>>()?;
    let successors: Vec<Vec<u32>> = num_successors
        .iter()
        .map(|&n| (0..n).map(|_| cursor.read_u32()).collect::<Result<_, _>>())
        .collect::<Result<_, _>>()?;

    let num_predecessors: Vec<u32> = (0..num_activities)
        .map(|_| cursor.read_u32())
        .collect::<Result<_, _>>()?;
    for &n in &num_predecessors {
        for _ in 0..n {
            cursor.read_u32()?;
        }
    }

    let mut builder = rcpsp_core::InstanceBuilder::new(num_activities, num_resources);
    for (a, &d) in duration.iter().enumerate() {
        builder = builder.duration(a as u32, d);
    }
    for (r, &c) in capacity.iter().enumerate() {
        builder = builder.capacity(r as u32, c);
    }
    for (a, row) in demand.iter().enumerate() {
        for (r, &d) in row.iter().enumerate() {
            builder = builder.demand(a as u32, r as u32, d);
        }
    }
    for (a, succs) in successors.iter().enumerate() {
        for &s in succs {
            builder = builder.successor(a as u32, s);
        }
    }
    let instance = builder.build().map_err(LoadError::from)?;

    let best_makespan = cursor.read_u32()?;
    let best_order: Vec<u32> = (0..num_activities)
        .map(|_| cursor.read_u32())
        .collect::<Result<_, _>>()?;
    let start_time_by_id: Vec<u32> = (0..num_activities)
        .map(|_| cursor.read_u32())
        .collect::<Result<_, _>>()?;

    Ok((
        instance,
        ScheduleResult {
            best_makespan,
            best_order,
            start_time_by_id,
        },
    ))
}

fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn read_u32(&mut self) -> Result<u32, ResultFileError> {
        let end = self.pos + 4;
        if end > self.buf.len() {
            return Err(ResultFileError::Truncated {
                expected: end - self.buf.len(),
                found: self.buf.len() - self.pos,
            });
        }
        let bytes: [u8; 4] = self.buf[self.pos..end].try_into().unwrap();
        self.pos = end;
        Ok(u32::from_le_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_instance() -> Instance {
        rcpsp_core::InstanceBuilder::new(4, 1)
            .duration(0, 0)
            .duration(1, 3)
            .duration(2, 5)
            .duration(3, 0)
            .capacity(0, 1)
            .demand(1, 0, 1)
            .demand(2, 0, 1)
            .successor(0, 1)
            .successor(1, 2)
            .successor(2, 3)
            .build()
            .unwrap()
    }

    #[test]
    fn round_trips_schedule_result() {
        let instance = chain_instance();
        let schedule = ScheduleResult {
            best_makespan: 8,
            best_order: vec![0, 1, 2, 3],
            start_time_by_id: vec![0, 0, 3, 8],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.res");

        write_result_file(&path, &instance, &schedule).unwrap();
        let (read_instance, read_schedule) = read_result_file(&path).unwrap();

        assert_eq!(read_instance.num_activities(), instance.num_activities());
        assert_eq!(read_instance.critical_path_makespan(), 8);
        assert_eq!(read_schedule, schedule);
    }

    #[test]
    fn rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truncated.res");
        std::fs::write(&path, [0u8, 1, 2]).unwrap();
        assert!(matches!(
            read_result_file(&path),
            Err(ResultFileError::Truncated { .. })
        ));
    }
}
