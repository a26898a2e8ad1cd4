//! Route optimizer (greedy nearest-neighbor).
//!
//! Repeatedly visits the closest unvisited stop. O(n²) and not optimal, but
//! deterministic and cheap enough to rerun whenever a stop is added.
//!
//! `priority` and `time_window` on [`RouteStop`] are carried through but do
//! not influence the order yet; ties go to the stop listed first.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RouteError;
use crate::haversine::{self, Coordinate, DEFAULT_SPEED_KMH, TravelSpeed};
use crate::model::{PlannedStop, RoutePlan, RouteStop};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeOptions {
    /// Assumed average speed in km/h.
    pub speed_kmh: f64,
    /// Add each stop's service duration before departing for the next one.
    pub include_service_time: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
            include_service_time: false,
        }
    }
}

/// One independent planning request for [`RouteOptimizer::optimize_many`].
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub start: Coordinate,
    pub stops: Vec<RouteStop>,
    pub reference_time_ms: i64,
}

#[derive(Debug, Clone, Default)]
pub struct RouteOptimizer {
    options: OptimizeOptions,
}

impl RouteOptimizer {
    pub fn new(options: OptimizeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &OptimizeOptions {
        &self.options
    }

    /// Order `stops` from `start` and estimate arrival times.
    ///
    /// The first arrival is measured from `reference_time_ms`.
    pub fn optimize(
        &self,
        start: Coordinate,
        stops: &[RouteStop],
        reference_time_ms: i64,
    ) -> Result<RoutePlan, RouteError> {
        if stops.is_empty() {
            return Err(RouteError::EmptyStopSet);
        }

        let speed_kmh = self.options.speed_kmh;
        if !speed_kmh.is_finite() || speed_kmh <= 0.0 {
            return Err(RouteError::InvalidSpeed { speed_kmh });
        }
        let speed = TravelSpeed::new(speed_kmh);
        let mut remaining: Vec<&RouteStop> = stops.iter().collect();
        let mut planned = Vec::with_capacity(stops.len());
        let mut current = start;
        let mut clock = reference_time_ms;
        let mut total_distance = 0.0;
        let mut total_time = 0_i64;

        while !remaining.is_empty() {
            let next_index = nearest(current, &remaining);
            let stop = remaining.remove(next_index);

            let distance = haversine::distance_meters(current, stop.location);
            let travel = speed.millis_for(distance);
            clock = clock.saturating_add(travel);
            total_distance += distance;
            total_time = total_time.saturating_add(travel);

            planned.push(PlannedStop {
                stop_id: stop.correlation_id.clone(),
                sequence_index: planned.len(),
                estimated_arrival_ms: clock,
                travel_time_millis: travel,
                distance_meters: distance,
            });

            if self.options.include_service_time {
                let service = stop.estimated_service_duration_millis.max(0);
                clock = clock.saturating_add(service);
                total_time = total_time.saturating_add(service);
            }
            current = stop.location;
        }

        debug!(
            stops = planned.len(),
            total_distance_meters = total_distance,
            total_time_millis = total_time,
            "route optimized"
        );

        Ok(RoutePlan {
            stops: planned,
            total_distance_meters: total_distance,
            total_time_millis: total_time,
        })
    }

    /// Plan several independent requests in parallel. Results keep input order.
    pub fn optimize_many(&self, requests: &[RouteRequest]) -> Vec<Result<RoutePlan, RouteError>> {
        requests
            .par_iter()
            .map(|request| self.optimize(request.start, &request.stops, request.reference_time_ms))
            .collect()
    }
}

/// Index of the closest stop; the earliest one wins ties.
fn nearest(from: Coordinate, candidates: &[&RouteStop]) -> usize {
    let mut best_index = 0;
    let mut best_distance = f64::INFINITY;
    for (index, stop) in candidates.iter().enumerate() {
        let distance = haversine::distance_meters(from, stop.location);
        if distance < best_distance {
            best_distance = distance;
            best_index = index;
        }
    }
    best_index
}
