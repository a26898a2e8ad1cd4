//! End-to-end courier run on the Strip with the in-process channel.

mod fixtures;

use std::sync::Arc;

use geotrack::error::LocatorError;
use geotrack::events::{InMemoryChannel, TrackingEvent};
use geotrack::haversine::{self, Coordinate};
use geotrack::model::{ActivityKind, GeofenceArea, GeofenceKind, LocationSample, RouteStop};
use geotrack::polyline::Polyline;
use geotrack::solver::RouteOptimizer;
use geotrack::store::InMemoryStore;
use geotrack::tracker::{CancelToken, TrackingSessionManager};

use fixtures::las_vegas_locations::pickup;
use fixtures::{FakeGeocoder, FixedClock, quiet_config};

/// Straight-line samples from `from` to `to`, one every 15 s.
fn leg(from: Coordinate, to: Coordinate, steps: usize, start_ms: i64) -> Vec<LocationSample> {
    (0..=steps)
        .map(|step| {
            let t = step as f64 / steps as f64;
            LocationSample::new(
                from.latitude + (to.latitude - from.latitude) * t,
                from.longitude + (to.longitude - from.longitude) * t,
                start_ms + step as i64 * 15_000,
            )
            .with_accuracy(8.0)
            .with_speed(9.0)
        })
        .collect()
}

#[test]
fn pickup_and_dropoff_run() {
    let restaurant = pickup("The Crack Shack").coordinate();
    let customer = pickup("Yard House").coordinate();
    let store = Arc::new(InMemoryStore::with_geofences(vec![
        GeofenceArea::new("pickup", "The Crack Shack", restaurant, 60.0, GeofenceKind::Pickup).owned_by("order-77"),
        GeofenceArea::new("dropoff", "Customer", customer, 60.0, GeofenceKind::Delivery).owned_by("order-77"),
    ]));
    let channel = InMemoryChannel::new();
    let crossings = channel.subscribe("geofence.");
    let everything = channel.subscribe("");

    let manager = TrackingSessionManager::new(quiet_config(), store.clone(), channel.clone())
        .with_geocoder(FakeGeocoder::new())
        .with_clock(FixedClock::at(1_700_000_000_000));
    manager
        .start("courier-9", ActivityKind::Delivery, Some("order-77"))
        .unwrap();

    let start = pickup("MGM Grand").coordinate();
    let mut samples = leg(start, restaurant, 10, 0);
    let resume = samples.last().unwrap().timestamp_ms + 15_000;
    samples.extend(leg(restaurant, customer, 20, resume).into_iter().skip(1));
    let expected_distance: f64 = samples
        .windows(2)
        .map(|pair| haversine::distance_meters(pair[0].coordinate(), pair[1].coordinate()))
        .sum();

    let summary = manager
        .follow("courier-9", samples.clone().into_iter().map(Ok::<LocationSample, LocatorError>), &CancelToken::new())
        .unwrap();
    assert_eq!(summary.accepted, samples.len());

    let stops = vec![RouteStop::new("return-to-depot", start)];
    let plan = manager
        .replan("courier-9", &RouteOptimizer::default(), &stops)
        .unwrap();
    assert_eq!(plan.stops.len(), 1);

    let session = manager.stop("courier-9").unwrap();

    // Entered pickup, left it, entered drop-off.
    let seen: Vec<(String, String)> = crossings
        .drain()
        .into_iter()
        .map(|published| match published.event {
            TrackingEvent::GeofenceEntered { fence, .. } => ("entered".to_string(), fence.id),
            TrackingEvent::GeofenceExited { fence, .. } => ("exited".to_string(), fence.id),
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    assert_eq!(
        seen,
        vec![
            ("entered".to_string(), "pickup".to_string()),
            ("exited".to_string(), "pickup".to_string()),
            ("entered".to_string(), "dropoff".to_string()),
        ]
    );

    let all = everything.drain();
    assert!(all.iter().all(|published| published.topic.ends_with("/order-77")));
    assert_eq!(all.last().map(|p| p.event.name()), Some("route.updated"));

    assert!((session.total_distance_meters - expected_distance).abs() < 1e-6);
    assert_eq!(session.total_duration_millis, samples.last().unwrap().timestamp_ms);
    assert_eq!(store.session(&session.id).as_ref(), Some(&session));

    let path = Polyline::from_samples(&session.trajectory);
    assert!((path.length_meters() - session.total_distance_meters).abs() < 1.0);
    assert!(session.trajectory.iter().any(|sample| sample.address.is_some()));
}

#[test]
fn events_serialize_with_type_tag() {
    let event = TrackingEvent::GeofenceEntered {
        actor_id: "courier-9".to_string(),
        correlation_id: Some("order-77".to_string()),
        fence: GeofenceArea::new(
            "dropoff",
            "Customer",
            Coordinate::new(36.1177147, -115.1691992),
            60.0,
            GeofenceKind::DeliveryZone,
        ),
        point: Coordinate::new(36.1177, -115.1692),
    };

    let json = serde_json::to_value(&event).unwrap();

    assert_eq!(json["type"], "geofence_entered");
    assert_eq!(json["correlation_id"], "order-77");
    assert_eq!(json["fence"]["kind"], "delivery_zone");
    assert_eq!(json["fence"]["radius_meters"], 60.0);

    let back: TrackingEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
}
