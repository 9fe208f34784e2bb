//! JSON files: site datasets and clustering results.

use crate::site::ClusteringResult;
use crate::site::Site;
use crate::Error;
use itertools::Either;
use itertools::Itertools as _;
use rand::seq::SliceRandom as _;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;

/// Bounds of synthesized sites.
const LATITUDE_RANGE: std::ops::Range<f64> = 35.0..60.0;
const LONGITUDE_RANGE: std::ops::Range<f64> = -10.0..30.0;
const CAPACITY_RANGE: std::ops::Range<f64> = 100.0..30000.0;

/// The record shapes accepted in site files.
#[derive(Deserialize)]
#[serde(untagged)]
enum SiteRecord {
    Disposal {
        lat: f64,
        lon: f64,
        disposal_tons_per_year: f64,
    },
    Site(Site),
}

impl From<SiteRecord> for Site {
    fn from(record: SiteRecord) -> Site {
        match record {
            SiteRecord::Disposal {
                lat,
                lon,
                disposal_tons_per_year,
            } => Site::new(lat, lon, disposal_tons_per_year),
            SiteRecord::Site(site) => site,
        }
    }
}

/// Parse a JSON array of site records, skipping the ones that match neither
/// accepted shape.
pub fn read_sites<R>(r: R) -> Result<Vec<Site>, Error>
where
    R: io::Read,
{
    let records: Vec<serde_json::Value> = serde_json::from_reader(r)?;
    let record_count = records.len();
    let (sites, skipped): (Vec<Site>, Vec<usize>) = records
        .into_iter()
        .enumerate()
        .partition_map(|(i, record)| match SiteRecord::deserialize(record) {
            Ok(record) => Either::Left(Site::from(record)),
            Err(err) => {
                tracing::debug!(record = i, %err, "unrecognized site record");
                Either::Right(i)
            }
        });
    if !skipped.is_empty() {
        tracing::warn!(
            skipped = skipped.len(),
            record_count,
            first_skipped = skipped[0],
            "skipping unrecognized site records",
        );
    }
    Ok(sites)
}

/// Draw `count` sites uniformly in the synthesis bounding box.
pub fn generate_sites<R>(rng: &mut R, count: usize) -> Vec<Site>
where
    R: rand::Rng,
{
    (0..count)
        .map(|_| {
            Site::new(
                rng.gen_range(LATITUDE_RANGE),
                rng.gen_range(LONGITUDE_RANGE),
                rng.gen_range(CAPACITY_RANGE),
            )
        })
        .collect()
}

/// Load `requested` sites from the file at `path`.
///
/// When the file holds at least `requested` usable records, a uniform random
/// subset of them is returned. Otherwise every record is kept and the
/// remaining sites are synthesized.
pub fn load_sites<P, R>(path: P, requested: usize, rng: &mut R) -> Result<Vec<Site>, Error>
where
    P: AsRef<Path>,
    R: rand::Rng,
{
    let path = path.as_ref();
    let file = fs::File::open(path)
        .map_err(|err| Error::Data(format!("cannot open {}: {err}", path.display())))?;
    let mut sites = read_sites(io::BufReader::new(file))
        .map_err(|err| Error::Data(format!("cannot read sites from {}: {err}", path.display())))?;

    sites.shuffle(rng);
    if requested <= sites.len() {
        sites.truncate(requested);
    } else {
        let missing = requested - sites.len();
        tracing::info!(
            available = sites.len(),
            requested,
            "synthesizing {missing} sites",
        );
        sites.extend(generate_sites(rng, missing));
    }

    if sites.is_empty() {
        return Err(Error::Data(format!(
            "no usable site in {}",
            path.display()
        )));
    }
    Ok(sites)
}

fn write_json<P, T>(path: P, value: &T) -> Result<(), Error>
where
    P: AsRef<Path>,
    T: serde::Serialize,
{
    let file = fs::File::create(path)?;
    let mut w = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut w, value)?;
    io::Write::flush(&mut w)?;
    Ok(())
}

/// Save sites in the `{latitude, longitude, capacity}` shape.
pub fn save_sites<P>(path: P, sites: &[Site]) -> Result<(), Error>
where
    P: AsRef<Path>,
{
    write_json(path, &sites)
}

pub fn save_result<P>(path: P, result: &ClusteringResult) -> Result<(), Error>
where
    P: AsRef<Path>,
{
    write_json(path, result)
}

pub fn load_result<P>(path: P) -> Result<ClusteringResult, Error>
where
    P: AsRef<Path>,
{
    let file = fs::File::open(path)?;
    Ok(serde_json::from_reader(io::BufReader::new(file))?)
}
