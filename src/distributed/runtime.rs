//! MPI launcher and per-rank entrypoint of distributed runs.
//!
//! The launcher runs the `mpirun` found under the install root, which starts
//! `process_count` copies of the `dkmeans` program with the arguments
//! `[-seed <seed>] <sites-file> <k> <site-count>`. Rank 0 writes its final
//! centroids to a handoff file next to the sites file, which the launching
//! process reads back.

use super::communicator::Communicator;
use super::communicator::MASTER;
use super::master::run_master;
use super::worker::run_worker;
use super::MAX_ITERATIONS;
use crate::error::check_arguments;
use crate::geometry::Point2D;
use crate::io;
use crate::seed::seed_without_replacement;
use crate::site::Center;
use crate::site::ClusteringResult;
use crate::site::Site;
use crate::Error;
use rand::SeedableRng as _;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::time::Instant;

/// Environment variable holding the install root of the runtime.
pub const HOME_VAR: &str = "GEOKMEANS_HOME";

/// Name of the per-rank program, looked up in `$GEOKMEANS_HOME/bin`.
pub const ENTRYPOINT_NAME: &str = "dkmeans";

/// Name of the MPI launcher, looked up in `$GEOKMEANS_HOME/bin`.
pub const LAUNCHER_NAME: &str = "mpirun";

/// Name of the file rank 0 writes its result to, in the directory of the
/// sites file.
pub const HANDOFF_FILE_NAME: &str = "distributed_result.json";

const INPUT_FILE_NAME: &str = "temp_sites_input.json";

const USAGE: &str = "usage: dkmeans [-seed <seed>] <sites-file> <k> <site-count>";

fn home_from(value: Option<OsString>) -> Result<PathBuf, Error> {
    match value {
        Some(home) if !home.is_empty() => Ok(PathBuf::from(home)),
        _ => Err(Error::Configuration(format!(
            "{HOME_VAR} is not set, cannot run in distributed mode"
        ))),
    }
}

fn handoff_path(sites_path: &Path) -> PathBuf {
    sites_path.with_file_name(HANDOFF_FILE_NAME)
}

/// Starts the ranks of a distributed run with `mpirun`.
#[derive(Debug, Clone)]
pub struct Runtime {
    /// Install root; holds `bin/mpirun` and `bin/dkmeans`.
    pub home: PathBuf,

    /// Number of processes, master included. At least 2.
    pub process_count: usize,

    /// Where the sites input and the result handoff are written.
    pub work_dir: PathBuf,
}

impl Runtime {
    /// Configure the runtime from [`HOME_VAR`], with one process per CPU (at
    /// least two) and `results` as work directory.
    pub fn from_env() -> Result<Runtime, Error> {
        let home = home_from(env::var_os(HOME_VAR))?;
        Ok(Runtime {
            home,
            process_count: usize::max(2, num_cpus::get()),
            work_dir: PathBuf::from("results"),
        })
    }

    fn program_path(&self, name: &str) -> PathBuf {
        self.home
            .join("bin")
            .join(name)
            .with_extension(env::consts::EXE_EXTENSION)
    }

    pub fn entrypoint_path(&self) -> PathBuf {
        self.program_path(ENTRYPOINT_NAME)
    }

    pub fn launcher_path(&self) -> PathBuf {
        self.program_path(LAUNCHER_NAME)
    }

    /// Run every rank under `mpirun` and wait for the job to end.
    pub fn launch(
        &self,
        sites_path: &Path,
        k: usize,
        site_count: usize,
        seed: u64,
    ) -> Result<(), Error> {
        let launcher = self.launcher_path();
        let entrypoint = self.entrypoint_path();
        for program in [&launcher, &entrypoint] {
            if !program.is_file() {
                return Err(Error::Configuration(format!(
                    "{} not found, check {HOME_VAR}",
                    program.display(),
                )));
            }
        }
        let process_count = usize::max(2, self.process_count);
        tracing::info!(
            launcher = %launcher.display(),
            entrypoint = %entrypoint.display(),
            process_count,
            "launching distributed run",
        );

        let status = Command::new(&launcher)
            .env(HOME_VAR, &self.home)
            .arg("-np")
            .arg(process_count.to_string())
            .arg(&entrypoint)
            .arg("-seed")
            .arg(seed.to_string())
            .arg(sites_path)
            .arg(k.to_string())
            .arg(site_count.to_string())
            .status()?;
        if !status.success() {
            return Err(Error::Protocol(format!(
                "distributed run failed: {} exited with {status}",
                launcher.display(),
            )));
        }
        Ok(())
    }

    /// Cluster `sites` in a distributed run and read back its result.
    ///
    /// The master rank seeds its centroids from `seed`. The returned centers
    /// have no assigned sites.
    pub fn run(&self, sites: &[Site], k: usize, seed: u64) -> Result<ClusteringResult, Error> {
        fs::create_dir_all(&self.work_dir)?;
        let input = self.work_dir.join(INPUT_FILE_NAME);
        io::save_sites(&input, sites)?;

        let handoff = handoff_path(&input);
        match fs::remove_file(&handoff) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(Error::Io(err)),
        }

        self.launch(&input, k, sites.len(), seed)?;

        if !handoff.is_file() {
            return Err(Error::Protocol(format!(
                "distributed run did not produce {}",
                handoff.display(),
            )));
        }
        io::load_result(&handoff).map_err(|err| {
            Error::Protocol(format!(
                "malformed result handoff {}: {err}",
                handoff.display(),
            ))
        })
    }
}

/// Arguments of the per-rank program.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EngineArgs {
    seed: Option<u64>,
    sites_path: PathBuf,
    k: usize,
    site_count: usize,
}

impl EngineArgs {
    /// The engine arguments are always the last three; an optional
    /// `-seed <seed>` may come before them.
    fn parse(args: &[String]) -> Result<EngineArgs, Error> {
        let (flags, [sites_path, k, site_count]) = match args {
            [flags @ .., sites_path, k, site_count] => {
                (flags, [sites_path, k, site_count])
            }
            _ => return Err(Error::InvalidArgument(USAGE.to_string())),
        };
        let seed = match flags.iter().position(|flag| flag == "-seed") {
            Some(i) => {
                let value = flags
                    .get(i + 1)
                    .ok_or_else(|| Error::InvalidArgument(format!("missing seed; {USAGE}")))?;
                let seed = value.parse().map_err(|_| {
                    Error::InvalidArgument(format!("invalid seed {value:?}; {USAGE}"))
                })?;
                Some(seed)
            }
            None => None,
        };
        let k = k
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("invalid cluster count {k:?}; {USAGE}")))?;
        let site_count = site_count.parse().map_err(|_| {
            Error::InvalidArgument(format!("invalid site count {site_count:?}; {USAGE}"))
        })?;
        Ok(EngineArgs {
            seed,
            sites_path: PathBuf::from(sites_path),
            k,
            site_count,
        })
    }
}

fn master_process<C>(comm: &mut C, engine: &EngineArgs) -> Result<(), Error>
where
    C: Communicator,
{
    let seed = engine.seed.unwrap_or_else(rand::random);
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let sites = io::load_sites(&engine.sites_path, engine.site_count, &mut rng)?;
    tracing::info!(site_count = sites.len(), seed, "sites loaded");

    let points: Vec<Point2D> = sites.iter().map(Site::position).collect();
    check_arguments(points.len(), engine.k, MAX_ITERATIONS)?;
    let initial = seed_without_replacement(&mut rng, &points, engine.k);
    tracing::debug!(?initial, "initial centroids");

    let start = Instant::now();
    let centroids = run_master(comm, &points, initial, MAX_ITERATIONS)?;
    let duration_millis = start.elapsed().as_millis() as u64;

    for (i, centroid) in centroids.iter().enumerate() {
        tracing::info!(cluster = i, latitude = centroid.x, longitude = centroid.y);
    }

    let result = ClusteringResult {
        centers: centroids.into_iter().map(Center::at).collect(),
        cycles: MAX_ITERATIONS,
        duration_millis,
    };
    io::save_result(handoff_path(&engine.sites_path), &result)
}

/// Body of the per-rank program, once `comm` is connected.
///
/// `args` excludes the program name. The master rank loads the sites, runs
/// the master loop and writes the handoff file; other ranks run the worker
/// loop.
pub fn entrypoint<C>(comm: &mut C, args: &[String]) -> Result<(), Error>
where
    C: Communicator,
{
    let engine = EngineArgs::parse(args)?;

    let rank = comm.rank();
    let span = tracing::info_span!("rank", rank);
    let _enter = span.enter();

    if rank == MASTER {
        master_process(comm, &engine)
    } else {
        run_worker(comm, engine.k, MAX_ITERATIONS)
    }
}
