use crate::solver::diagnostics::ForceSample;
use crate::solver::error::OutputError;
use crate::solver::fem::FunctionSpace;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const FORCE_FILE: &str = "forces.csv";

/// Append-only `time,drag,lift` table, flushed after every row.
pub struct ForceLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ForceLog {
    /// Fails if `path` already exists; an earlier run's table is never
    /// truncated.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, OutputError> {
        let path = path.as_ref().to_owned();
        let io_err = |source| OutputError::Io {
            path: path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "time,drag,lift").map_err(io_err)?;
        writer.flush().map_err(io_err)?;
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, sample: &ForceSample) -> Result<(), OutputError> {
        let path = &self.path;
        let io_err = |source| OutputError::Io {
            path: path.clone(),
            source,
        };
        writeln!(self.writer, "{},{:e},{:e}", sample.time, sample.drag, sample.lift)
            .map_err(io_err)?;
        self.writer.flush().map_err(io_err)
    }
}

/// Reads back a force table written by [`ForceLog`].
pub fn read_force_log(path: impl AsRef<Path>) -> Result<Vec<ForceSample>, OutputError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| OutputError::Io {
        path: path.to_owned(),
        source,
    })?;
    let invalid = |line: &str| OutputError::Io {
        path: path.to_owned(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("bad force row '{}'", line),
        ),
    };
    text.lines()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let fields: Vec<f64> = line
                .split(',')
                .map(|f| f.trim().parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|_| invalid(line))?;
            match fields[..] {
                [time, drag, lift] => Ok(ForceSample { time, drag, lift }),
                _ => Err(invalid(line)),
            }
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Velocity,
    Pressure,
}

impl FieldKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Velocity => "velocity",
            Self::Pressure => "pressure",
        }
    }
}

/// One field at one output step, self-describing enough to be plotted
/// without the mesh.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub kind: FieldKind,
    pub index: usize,
    pub step: usize,
    pub time: f64,
    pub mesh: PathBuf,
    pub order: usize,
    pub components: usize,
    /// Node coordinates, one per scalar DOF.
    pub coordinates: Vec<[f64; 2]>,
    /// Component-blocked values.
    pub values: Vec<f64>,
}

impl FieldSnapshot {
    pub fn from_field(
        kind: FieldKind,
        index: usize,
        step: usize,
        time: f64,
        mesh: &Path,
        space: &FunctionSpace,
        values: &[f64],
    ) -> Self {
        Self {
            kind,
            index,
            step,
            time,
            mesh: mesh.to_owned(),
            order: space.order(),
            components: space.components(),
            coordinates: space.dof_coords().iter().map(|p| [p.x, p.y]).collect(),
            values: values.to_vec(),
        }
    }

    pub fn file_name(kind: FieldKind, index: usize) -> String {
        format!("{}_{:04}.json", kind.prefix(), index)
    }

    /// Writes into `dir`; an existing file with the same name is an error.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, OutputError> {
        let path = dir.join(Self::file_name(self.kind, self.index));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| OutputError::Io {
                path: path.clone(),
                source,
            })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).map_err(|source| OutputError::Serialize {
            path: path.clone(),
            source,
        })?;
        writer.flush().map_err(|source| OutputError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, OutputError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| OutputError::Io {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| OutputError::Serialize {
            path: path.to_owned(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::driver::run_on_mesh;
    use crate::solver::mesh::{
        generate_channel_with_obstacle, generate_structured_rect_mesh, BoundarySides,
    };
    use crate::solver::options::SimulationConfig;
    use crate::solver::parallel::SerialCommunicator;
    use nalgebra::Point2;

    #[test]
    fn test_force_log_rows_read_back() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(FORCE_FILE);
        let mut log = ForceLog::create(&path).expect("create");
        log.append(&ForceSample {
            time: 0.05,
            drag: 1.25,
            lift: -3.5e-4,
        })
        .expect("append");
        log.append(&ForceSample {
            time: 0.1,
            drag: 1.5,
            lift: 2.0e-4,
        })
        .expect("append");

        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.starts_with("time,drag,lift\n"));
        let rows = read_force_log(&path).expect("parse");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].lift, -3.5e-4);
        assert_eq!(rows[1].time, 0.1);
    }

    #[test]
    fn test_snapshot_round_trip_and_no_overwrite() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mesh = generate_structured_rect_mesh(2, 1, 2.0, 1.0, BoundarySides::channel())
            .expect("mesh");
        let space = FunctionSpace::new(&mesh, 1, 1);
        let values: Vec<f64> = (0..space.num_dofs()).map(|i| i as f64 * 0.5).collect();
        let snap = FieldSnapshot::from_field(
            FieldKind::Pressure,
            3,
            15,
            0.15,
            Path::new("channel.mesh"),
            &space,
            &values,
        );
        let path = snap.write(dir.path()).expect("write");
        assert!(path.ends_with("pressure_0003.json"));

        let loaded = FieldSnapshot::load(&path).expect("load");
        assert_eq!(loaded, snap);

        assert!(matches!(
            snap.write(dir.path()),
            Err(OutputError::Io { .. })
        ));
    }

    #[test]
    fn test_existing_force_log_is_not_truncated() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(FORCE_FILE);
        let mut log = ForceLog::create(&path).expect("create");
        log.append(&ForceSample {
            time: 0.5,
            drag: 1.0,
            lift: 0.0,
        })
        .expect("append");
        drop(log);
        let before = std::fs::read_to_string(&path).expect("read");

        assert!(matches!(
            ForceLog::create(&path),
            Err(OutputError::Io { .. })
        ));
        assert_eq!(std::fs::read_to_string(&path).expect("read"), before);
    }

    #[test]
    fn test_second_run_into_same_directory_keeps_first_forces() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mesh = generate_channel_with_obstacle(16, 8, 4.0, 2.0, Point2::new(1.0, 1.0), 0.3)
            .expect("mesh");
        let output_dir = dir.path().join("results");
        let config = |reynolds: f64| SimulationConfig {
            mesh_path: dir.path().join("channel.mesh"),
            reynolds,
            dt: 0.01,
            final_time: 0.04,
            output_interval: 2,
            output_dir: output_dir.clone(),
            write_snapshots: false,
            ..Default::default()
        };

        let first = run_on_mesh(config(100.0), &mesh, &SerialCommunicator).expect("first run");
        let path = output_dir.join(FORCE_FILE);
        let before = std::fs::read_to_string(&path).expect("read");
        assert_eq!(read_force_log(&path).expect("parse"), first.forces);

        let second = run_on_mesh(config(20.0), &mesh, &SerialCommunicator).expect("second run");
        assert_eq!(second.forces.len(), first.forces.len());
        assert_ne!(second.forces, first.forces);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), before);
    }
}
