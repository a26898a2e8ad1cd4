//! Polyline representation of a trajectory window.
//!
//! Stores decoded coordinates. Encoding to a compact wire format belongs at
//! the API boundary, not in the tracking core.

use serde::{Deserialize, Serialize};

use crate::haversine::{self, Coordinate};
use crate::model::LocationSample;

/// A path as an ordered list of coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Coordinate>,
}

impl Polyline {
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self { points }
    }

    /// Build from samples, collapsing consecutive duplicates.
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a LocationSample>) -> Self {
        let mut points: Vec<Coordinate> = Vec::new();
        for sample in samples {
            let point = sample.coordinate();
            if points.last() != Some(&point) {
                points.push(point);
            }
        }
        Self { points }
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Coordinate> {
        self.points
    }

    /// Path length along the polyline in meters.
    pub fn length_meters(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| haversine::distance_meters(pair[0], pair[1]))
            .sum()
    }
}
