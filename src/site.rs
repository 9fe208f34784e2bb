//! Sites, cluster centers and clustering results.

use crate::geometry::Point2D;
use serde::Deserialize;
use serde::Serialize;

/// A geolocated accumulation site.
///
/// `capacity` is carried through to the result for display; it takes no part
/// in distance or centroid computations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub latitude: f64,
    pub longitude: f64,
    pub capacity: f64,
}

impl Site {
    pub fn new(latitude: f64, longitude: f64, capacity: f64) -> Site {
        Site {
            latitude,
            longitude,
            capacity,
        }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.latitude, self.longitude)
    }
}

/// A cluster representative and the sites currently assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Center {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub assigned_sites: Vec<Site>,
}

impl Center {
    pub fn new(latitude: f64, longitude: f64) -> Center {
        Center {
            latitude,
            longitude,
            assigned_sites: Vec::new(),
        }
    }

    pub fn at(position: Point2D) -> Center {
        Center::new(position.x, position.y)
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.latitude, self.longitude)
    }

    /// Move the center to the mean of its assigned sites.
    ///
    /// Returns whether the coordinates changed. A center without sites stays
    /// where it is.
    pub fn update(&mut self) -> bool {
        if self.assigned_sites.is_empty() {
            return false;
        }
        let (lat_sum, lon_sum) = self
            .assigned_sites
            .iter()
            .fold((0.0, 0.0), |(lat, lon), site| {
                (lat + site.latitude, lon + site.longitude)
            });
        let count = self.assigned_sites.len() as f64;
        let latitude = lat_sum / count;
        let longitude = lon_sum / count;

        let changed = latitude != self.latitude || longitude != self.longitude;
        self.latitude = latitude;
        self.longitude = longitude;
        changed
    }
}

/// Outcome of a clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusteringResult {
    pub centers: Vec<Center>,

    /// Number of iterations actually run.
    pub cycles: usize,

    /// Wall-clock duration of the iterations.
    pub duration_millis: u64,
}
