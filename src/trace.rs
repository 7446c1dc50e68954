use crate::solver::error::OutputError;
use crate::solver::linear_solver::SolveStats;
use crate::solver::options::SimulationConfig;
use crate::solver::projection::StepReport;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

const TRACE_FORMAT_VERSION: u32 = 1;

/// One line of a run trace (JSON lines).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TraceEvent {
    Header(TraceHeader),
    Step(TraceStepEvent),
    Footer(TraceFooter),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceHeader {
    pub format_version: u32,
    pub created_unix_ms: u64,
    pub config: SimulationConfig,
    pub mesh: TraceMesh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceMesh {
    pub elements: usize,
    pub velocity_dofs: usize,
    pub pressure_dofs: usize,
    pub min_edge_length: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStepEvent {
    pub step: u64,
    pub sim_time: f64,
    pub wall_time_ms: f32,
    pub linear_solves: Vec<TraceLinearSolverStats>,
    pub cfl: Option<f64>,
    pub divergence: Option<f64>,
    pub drag: Option<f64>,
    pub lift: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceLinearSolverStats {
    pub stage: String,
    pub iterations: u32,
    pub residual: f64,
    pub converged: bool,
}

impl TraceLinearSolverStats {
    pub fn new(stage: &str, stats: &SolveStats) -> Self {
        Self {
            stage: stage.to_owned(),
            iterations: stats.iterations as u32,
            residual: stats.residual,
            converged: stats.converged,
        }
    }
}

impl TraceStepEvent {
    pub fn from_report(report: &StepReport, wall_time: std::time::Duration) -> Self {
        Self {
            step: report.step as u64,
            sim_time: report.time,
            wall_time_ms: wall_time.as_secs_f32() * 1000.0,
            linear_solves: vec![
                TraceLinearSolverStats::new("momentum", &report.momentum),
                TraceLinearSolverStats::new("pressure", &report.pressure),
            ],
            cfl: None,
            divergence: None,
            drag: None,
            lift: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceFooter {
    pub closed_unix_ms: u64,
    pub steps: usize,
    pub non_converged_solves: usize,
    pub strouhal: Option<f64>,
}

pub struct TraceWriter {
    path: PathBuf,
    writer: std::io::BufWriter<std::fs::File>,
    events_written: usize,
    flush_every: usize,
}

impl TraceWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, OutputError> {
        let path = path.as_ref().to_owned();
        let file = std::fs::File::create(&path).map_err(|source| OutputError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            writer: std::io::BufWriter::new(file),
            events_written: 0,
            flush_every: 25,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_event(&mut self, event: &TraceEvent) -> Result<(), OutputError> {
        serde_json::to_writer(&mut self.writer, event).map_err(|source| {
            OutputError::Serialize {
                path: self.path.clone(),
                source,
            }
        })?;
        self.writer
            .write_all(b"\n")
            .map_err(|source| OutputError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.events_written += 1;
        if self.events_written % self.flush_every == 0 {
            let _ = self.writer.flush();
        }
        Ok(())
    }

    pub fn close(mut self) -> Result<(), OutputError> {
        self.writer.flush().map_err(|source| OutputError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Parses every event of a trace file.
pub fn read_trace(path: impl AsRef<Path>) -> Result<Vec<TraceEvent>, OutputError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| OutputError::Io {
        path: path.to_owned(),
        source,
    })?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            serde_json::from_str(l).map_err(|source| OutputError::Serialize {
                path: path.to_owned(),
                source,
            })
        })
        .collect()
}

pub fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn make_header(config: SimulationConfig, mesh: TraceMesh) -> TraceHeader {
    TraceHeader {
        format_version: TRACE_FORMAT_VERSION,
        created_unix_ms: now_unix_ms(),
        config,
        mesh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_events_are_tagged_json_lines() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("run.trace.jsonl");
        let mut writer = TraceWriter::create(&path).expect("create");
        let header = make_header(
            SimulationConfig::default(),
            TraceMesh {
                elements: 10,
                velocity_dofs: 200,
                pressure_dofs: 30,
                min_edge_length: 0.1,
            },
        );
        writer
            .write_event(&TraceEvent::Header(header))
            .expect("header");
        writer
            .write_event(&TraceEvent::Footer(TraceFooter {
                closed_unix_ms: now_unix_ms(),
                steps: 0,
                non_converged_solves: 0,
                strouhal: None,
            }))
            .expect("footer");
        writer.close().expect("close");

        let text = std::fs::read_to_string(&path).expect("read");
        let first = text.lines().next().expect("one line");
        assert!(first.starts_with("{\"type\":\"Header\""));

        let events = read_trace(&path).expect("parse");
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], TraceEvent::Footer(_)));
    }
}
