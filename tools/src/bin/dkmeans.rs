//! One rank of a distributed run, started by `mpirun`.

use anyhow::Context as _;
use anyhow::Result;
use geokmeans::mpi::topology::Communicator as _;
use std::env;

fn main() -> Result<()> {
    let _chrome_trace_guard = geokmeans_tools::init_tracing(None);

    let args: Vec<String> = env::args().skip(1).collect();
    let universe = geokmeans::mpi::initialize().context("MPI is already initialized")?;
    let mut world = universe.world();

    if let Err(err) = geokmeans::distributed::entrypoint(&mut world, &args) {
        eprintln!("Error: distributed rank failed: {err}");
        // Other ranks may be blocked on this one.
        world.abort(1);
    }
    Ok(())
}
