use anyhow::Context as _;
use anyhow::Result;
use geokmeans_tools::RunOptions;
use geokmeans_tools::Strategy;
use rand::SeedableRng as _;
use std::env;

const USAGE: &str = "Usage: site-cluster [options] -i sites.json -n SITES -k CLUSTERS";

fn main() -> Result<()> {
    let mut options = getopts::Options::new();
    options.optflag("h", "help", "print this help menu");
    options.optopt(
        "s",
        "strategy",
        "sequential (default), parallel or distributed",
        "NAME",
    );
    options.optopt("i", "sites", "sites file", "FILE");
    options.optopt("n", "count", "number of sites to cluster", "COUNT");
    options.optopt("k", "clusters", "number of clusters", "K");
    options.optopt("m", "max-iter", "iteration cap (default: 100)", "N");
    options.optopt("o", "output", "write the result to this file", "FILE");
    options.optopt("S", "seed", "seed of the random number generator", "SEED");
    options.optopt("j", "threads", "threads of the parallel engine", "N");
    options.optopt(
        "w",
        "workers",
        "run distributed workers as threads of this process",
        "N",
    );
    options.optflag(
        "f",
        "fallback",
        "use the parallel engine if the distributed run fails",
    );
    options.optopt("t", "trace", "emit a chrome trace", "FILE");

    let matches = options.parse(env::args().skip(1))?;

    if matches.opt_present("h") {
        eprintln!("{}", options.usage(USAGE));
        return Ok(());
    }
    if !matches.free.is_empty() {
        anyhow::bail!("too many arguments\n\n{}", options.usage(USAGE));
    }

    let _chrome_trace_guard = geokmeans_tools::init_tracing(matches.opt_str("t"));

    let strategy = matches
        .opt_get("s")
        .context("invalid value for -s, --strategy")?
        .unwrap_or(Strategy::Sequential);
    let sites_file = matches
        .opt_str("i")
        .context("missing required option 'sites'")?;
    let site_count: usize = matches
        .opt_get("n")
        .context("invalid value for -n, --count")?
        .context("missing required option 'count'")?;
    let k: usize = matches
        .opt_get("k")
        .context("invalid value for -k, --clusters")?
        .context("missing required option 'clusters'")?;
    let max_iterations = matches
        .opt_get("m")
        .context("invalid value for -m, --max-iter")?
        .unwrap_or(100);
    let seed: Option<u64> = matches.opt_get("S").context("invalid value for -S, --seed")?;

    let run_options = RunOptions {
        strategy,
        seed,
        thread_count: matches
            .opt_get("j")
            .context("invalid value for -j, --threads")?,
        in_process_workers: matches
            .opt_get("w")
            .context("invalid value for -w, --workers")?,
        fallback: matches.opt_present("f"),
    };

    let mut rng = match seed {
        Some(seed) => rand_pcg::Pcg64::seed_from_u64(seed),
        None => rand_pcg::Pcg64::from_rng(rand::thread_rng())?,
    };
    let sites = geokmeans::io::load_sites(&sites_file, site_count, &mut rng)
        .with_context(|| format!("failed to load sites from {sites_file:?}"))?;

    let result = run_options.run(&sites, k, max_iterations)?;

    println!("Cycles: {}", result.cycles);
    println!("Run time: {} ms", result.duration_millis);
    for (i, center) in result.centers.iter().enumerate() {
        eprintln!(
            "cluster {i}: ({:.5}, {:.5}), {} sites",
            center.latitude,
            center.longitude,
            center.assigned_sites.len(),
        );
    }

    if let Some(output) = matches.opt_str("o") {
        geokmeans::io::save_result(&output, &result)
            .with_context(|| format!("failed to write result to {output:?}"))?;
    }

    Ok(())
}
