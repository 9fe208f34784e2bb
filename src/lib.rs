//! A k-means library that clusters geolocated accumulation sites into
//! facility locations.
//!
//! # Crate Layout
//!
//! Geokmeans exposes a [`Cluster`] trait, implemented by three engines that
//! run Lloyd's algorithm with the same distance and tie-break rules:
//!
//! - [`Sequential`]: on the calling thread,
//! - [`Parallel`]: on a thread pool, splitting the assignment step in chunks
//!   of sites,
//! - [`Distributed`]: a master and worker ranks exchanging messages, either
//!   on threads or in separate processes (see [`distributed`]).
//!
//! Sites are read from and results written to JSON files with the functions
//! of the [`io`] module.

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    rust_2018_idioms
)]

#[cfg(test)]
#[macro_use]
extern crate approx;

pub mod distributed;
mod error;
mod geometry;
pub mod io;
mod parallel;
mod seed;
mod sequential;
mod site;
mod work_share;

pub use crate::distributed::Distributed;
pub use crate::distributed::Launcher;
pub use crate::error::Error;
pub use crate::geometry::assign_sites;
pub use crate::geometry::nearest;
pub use crate::geometry::squared_distance;
pub use crate::geometry::Point2D;
pub use crate::parallel::Parallel;
pub use crate::seed::seed_with_replacement;
pub use crate::seed::seed_without_replacement;
pub use crate::sequential::Sequential;
pub use crate::site::Center;
pub use crate::site::ClusteringResult;
pub use crate::site::Site;
pub use crate::work_share::work_share;

#[cfg(feature = "mpi")]
pub use mpi;
pub use nalgebra;
pub use rayon;

/// The `Cluster` trait groups sites around `k` centers.
///
/// Engines implement this trait. On success every site appears in exactly
/// one center's assignment list, and no partial result is ever returned on
/// failure.
pub trait Cluster {
    /// Cluster `sites` into `k` centers, in at most `max_iterations`
    /// iterations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `sites` is empty, if `k` is not
    /// in `1..=sites.len()`, or if `max_iterations` is zero.
    fn cluster(
        &mut self,
        sites: &[Site],
        k: usize,
        max_iterations: usize,
    ) -> Result<ClusteringResult, Error>;
}

impl<C> Cluster for &mut C
where
    C: Cluster + ?Sized,
{
    fn cluster(
        &mut self,
        sites: &[Site],
        k: usize,
        max_iterations: usize,
    ) -> Result<ClusteringResult, Error> {
        (**self).cluster(sites, k, max_iterations)
    }
}

impl<C> Cluster for Box<C>
where
    C: Cluster + ?Sized,
{
    fn cluster(
        &mut self,
        sites: &[Site],
        k: usize,
        max_iterations: usize,
    ) -> Result<ClusteringResult, Error> {
        (**self).cluster(sites, k, max_iterations)
    }
}
