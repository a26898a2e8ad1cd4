//! Real Las Vegas locations for courier fixtures.
//!
//! Coordinates sourced from OpenStreetMap.

use geotrack::haversine::Coordinate;

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

/// Pickup points along the Strip, listed north to south.
pub const STRIP_PICKUPS: &[Location] = &[
    Location::new("Sinatra", 36.1300035, -115.1654850),
    Location::new("Wynn Las Vegas", 36.1263781, -115.1658180),
    Location::new("Public House", 36.1219193, -115.1689317),
    Location::new("Yard House", 36.1177147, -115.1691992),
    Location::new("Gordon Ramsay BurGR", 36.1107195, -115.1720818),
    Location::new("The Crack Shack", 36.1050709, -115.1735287),
    Location::new("MGM Grand", 36.1023654, -115.1688720),
];

/// Drop-off points away from the Strip.
pub const DROPOFFS: &[Location] = &[
    Location::new("Longhorn Casino", 36.1070664, -115.0591256),
    Location::new("Henderson Pavilion", 36.0162, -115.0601),
    Location::new("North Las Vegas City Hall", 36.1989, -115.1175),
];

pub fn pickup(name: &str) -> &'static Location {
    STRIP_PICKUPS
        .iter()
        .chain(DROPOFFS.iter())
        .find(|location| location.name == name)
        .unwrap_or_else(|| panic!("unknown fixture location {}", name))
}
