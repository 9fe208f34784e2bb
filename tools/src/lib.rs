use anyhow::Context as _;
use anyhow::Result;
use geokmeans::distributed::Runtime;
use geokmeans::Cluster;
use geokmeans::ClusteringResult;
use geokmeans::Distributed;
use geokmeans::Launcher;
use geokmeans::Parallel;
use geokmeans::Sequential;
use geokmeans::Site;
use rand::SeedableRng as _;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::Registry;
use tracing_tree::HierarchicalLayer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Sequential,
    Parallel,
    Distributed,
}

impl std::str::FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "seq" | "sequential" => Self::Sequential,
            "par" | "parallel" => Self::Parallel,
            "dist" | "distributed" => Self::Distributed,
            _ => anyhow::bail!("expected sequential, parallel or distributed"),
        })
    }
}

/// How to run the clustering.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub strategy: Strategy,

    /// Seed of the centroid selection, random if `None`.
    pub seed: Option<u64>,

    /// Parallel engine threads, one per CPU if `None`.
    pub thread_count: Option<usize>,

    /// Run distributed ranks as threads of this process instead of starting
    /// processes.
    pub in_process_workers: Option<usize>,

    /// Fall back to the parallel engine when the distributed run fails.
    pub fallback: bool,
}

impl RunOptions {
    pub fn engine(&self) -> Result<Box<dyn Cluster>> {
        let seed = self.seed.unwrap_or_else(rand::random);
        let rng = rand_pcg::Pcg64::seed_from_u64(seed);
        tracing::debug!(seed, strategy = ?self.strategy);

        Ok(match self.strategy {
            Strategy::Sequential => Box::new(Sequential { rng }),
            Strategy::Parallel => Box::new(Parallel {
                rng,
                thread_count: self.thread_count,
            }),
            Strategy::Distributed => {
                let launcher = match self.in_process_workers {
                    Some(worker_count) => Launcher::InProcess { worker_count },
                    None => Launcher::Processes(Runtime::from_env()?),
                };
                Box::new(Distributed { launcher, rng })
            }
        })
    }

    /// Cluster `sites` with the configured strategy.
    pub fn run(&self, sites: &[Site], k: usize, max_iterations: usize) -> Result<ClusteringResult> {
        let result = self.engine().and_then(|mut engine| {
            engine
                .cluster(sites, k, max_iterations)
                .with_context(|| format!("{:?} clustering failed", self.strategy))
        });
        match result {
            Err(err) if self.strategy == Strategy::Distributed && self.fallback => {
                tracing::warn!("{err:#}, falling back to the parallel engine");
                let fallback = RunOptions {
                    strategy: Strategy::Parallel,
                    ..self.clone()
                };
                fallback.run(sites, k, max_iterations)
            }
            result => result,
        }
    }
}

/// Install the global subscriber: a tree of spans on stderr, filtered by the
/// `LOG` environment variable, plus a chrome trace if `trace_file` is given.
///
/// The returned guard must be kept alive until the trace is complete.
pub fn init_tracing(trace_file: Option<String>) -> Option<tracing_chrome::FlushGuard> {
    let registry = Registry::default().with(EnvFilter::from_env("LOG")).with(
        HierarchicalLayer::new(4)
            .with_thread_ids(true)
            .with_targets(true)
            .with_bracketed_fields(true),
    );
    match trace_file {
        Some(filename) => {
            let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
                .file(filename)
                .build();
            registry.with(chrome_layer).init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}
