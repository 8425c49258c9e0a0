//! Catalogue store: stops, buses, and the directed distance table.
//!
//! The catalogue owns every `Stop` and `Bus` record in arena order and hands
//! out compact integer ids. All other components (router, snapshot codec)
//! refer to entities through those ids, never by address or by owning copies.
//! The store is append-only for the lifetime of a process.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::geo::{self, Coordinates};

/// Arena index of a stop, assigned monotonically at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StopId(pub u32);

/// Arena index of a bus, assigned monotonically at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BusId(pub u32);

#[derive(Debug, Clone)]
pub struct Stop {
    pub name: String,
    pub coordinates: Coordinates,
}

/// A named route. For a roundtrip bus `stops` is the full cycle; otherwise it
/// is the one-way sequence and the return leg is derived by the consumers.
#[derive(Debug, Clone)]
pub struct Bus {
    pub name: String,
    pub stops: Vec<StopId>,
    pub is_roundtrip: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogueError {
    #[error("stop {0:?} is already in the catalogue")]
    DuplicateStop(String),
    #[error("bus {0:?} is already in the catalogue")]
    DuplicateBus(String),
    #[error("bus {bus:?} references unknown stop {stop:?}")]
    UnknownStop { bus: String, stop: String },
}

/// Answer to a `Bus` stat query.
#[derive(Debug, Clone, PartialEq)]
pub struct BusStats {
    pub stop_count: usize,
    pub unique_stop_count: usize,
    pub route_length: f64,
    pub geo_length: f64,
    pub curvature: f64,
}

#[derive(Debug, Default)]
pub struct Catalogue {
    stops: Vec<Stop>,
    buses: Vec<Bus>,
    stop_by_name: FxHashMap<String, StopId>,
    bus_by_name: FxHashMap<String, BusId>,
    // Parallel to `stops`: names of the buses serving each stop, ordered.
    stop_buses: Vec<BTreeSet<String>>,
    distances: FxHashMap<(StopId, StopId), f64>,
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stop. Names are unique keys: a second stop with the same
    /// name is rejected rather than shadowing the first.
    pub fn add_stop(
        &mut self,
        name: &str,
        coordinates: Coordinates,
    ) -> Result<StopId, CatalogueError> {
        if self.stop_by_name.contains_key(name) {
            return Err(CatalogueError::DuplicateStop(name.to_string()));
        }
        let id = StopId(self.stops.len() as u32);
        self.stops.push(Stop {
            name: name.to_string(),
            coordinates,
        });
        self.stop_buses.push(BTreeSet::new());
        self.stop_by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Registers a bus over already-known stops.
    pub fn add_bus(
        &mut self,
        name: &str,
        stop_names: &[String],
        is_roundtrip: bool,
    ) -> Result<BusId, CatalogueError> {
        if self.bus_by_name.contains_key(name) {
            return Err(CatalogueError::DuplicateBus(name.to_string()));
        }
        let mut stops = Vec::with_capacity(stop_names.len());
        for stop_name in stop_names {
            let id = self.find_stop(stop_name).ok_or_else(|| CatalogueError::UnknownStop {
                bus: name.to_string(),
                stop: stop_name.clone(),
            })?;
            stops.push(id);
        }

        let id = BusId(self.buses.len() as u32);
        for &stop in &stops {
            self.stop_buses[stop.0 as usize].insert(name.to_string());
        }
        self.buses.push(Bus {
            name: name.to_string(),
            stops,
            is_roundtrip,
        });
        self.bus_by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn find_stop(&self, name: &str) -> Option<StopId> {
        self.stop_by_name.get(name).copied()
    }

    pub fn find_bus(&self, name: &str) -> Option<BusId> {
        self.bus_by_name.get(name).copied()
    }

    pub fn stop(&self, id: StopId) -> &Stop {
        &self.stops[id.0 as usize]
    }

    pub fn bus(&self, id: BusId) -> &Bus {
        &self.buses[id.0 as usize]
    }

    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    /// Stops in insertion (id) order.
    pub fn stops(&self) -> impl Iterator<Item = (StopId, &Stop)> {
        self.stops.iter().enumerate().map(|(i, s)| (StopId(i as u32), s))
    }

    /// Buses in insertion (id) order.
    pub fn buses(&self) -> impl Iterator<Item = (BusId, &Bus)> {
        self.buses.iter().enumerate().map(|(i, b)| (BusId(i as u32), b))
    }

    /// Explicitly-set distance directions, for the snapshot codec.
    pub fn explicit_distances(&self) -> impl Iterator<Item = (StopId, StopId, f64)> + '_ {
        self.distances.iter().map(|(&(from, to), &d)| (from, to, d))
    }

    pub fn set_distance(&mut self, from: StopId, to: StopId, meters: f64) {
        self.distances.insert((from, to), meters);
    }

    /// Road distance in meters. Falls back to the reverse direction when the
    /// queried one was never set; 0 when neither direction is known.
    pub fn distance(&self, from: StopId, to: StopId) -> f64 {
        self.distances
            .get(&(from, to))
            .or_else(|| self.distances.get(&(to, from)))
            .copied()
            .unwrap_or(0.0)
    }

    /// Ordered names of the buses serving a stop. `None` means the stop is
    /// unknown; a stop served by no bus yields an empty set.
    pub fn buses_for_stop(&self, name: &str) -> Option<&BTreeSet<String>> {
        let id = self.find_stop(name)?;
        Some(&self.stop_buses[id.0 as usize])
    }

    /// Route statistics for a bus, or `None` for an unknown name.
    pub fn bus_stats(&self, name: &str) -> Option<BusStats> {
        let bus = self.bus(self.find_bus(name)?);
        let n = bus.stops.len();

        let stop_count = if bus.is_roundtrip {
            n
        } else {
            (n * 2).saturating_sub(1)
        };
        let unique_stop_count = bus.stops.iter().collect::<FxHashSet<_>>().len();

        let mut route_length = 0.0;
        let mut geo_length = 0.0;
        for pair in bus.stops.windows(2) {
            route_length += self.distance(pair[0], pair[1]);
            geo_length += geo::distance(self.stop(pair[0]).coordinates, self.stop(pair[1]).coordinates);
        }
        if !bus.is_roundtrip {
            // Return leg: road distances may differ per direction, the
            // geographic length never does.
            for pair in bus.stops.windows(2) {
                route_length += self.distance(pair[1], pair[0]);
            }
            geo_length *= 2.0;
        }

        let curvature = if route_length != 0.0 && geo_length != 0.0 {
            route_length / geo_length
        } else {
            0.0
        };

        Some(BusStats {
            stop_count,
            unique_stop_count,
            route_length,
            geo_length,
            curvature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lng: f64) -> Coordinates {
        Coordinates { lat, lng }
    }

    fn abc_catalogue() -> Catalogue {
        let mut c = Catalogue::new();
        let a = c.add_stop("A", coord(55.0, 37.0)).unwrap();
        let b = c.add_stop("B", coord(55.1, 37.1)).unwrap();
        let z = c.add_stop("C", coord(55.2, 37.2)).unwrap();
        c.set_distance(a, b, 1000.0);
        c.set_distance(b, z, 1000.0);
        c
    }

    #[test]
    fn test_find_after_add() {
        let mut c = Catalogue::new();
        let id = c.add_stop("Center", coord(55.0, 37.0)).unwrap();
        assert_eq!(c.find_stop("Center"), Some(id));
        assert_eq!(c.stop(id).name, "Center");
        assert_eq!(c.find_stop("Elsewhere"), None);
    }

    #[test]
    fn test_duplicate_stop_rejected() {
        let mut c = Catalogue::new();
        c.add_stop("A", coord(55.0, 37.0)).unwrap();
        assert_eq!(
            c.add_stop("A", coord(56.0, 38.0)),
            Err(CatalogueError::DuplicateStop("A".to_string()))
        );
        // The original record is untouched.
        assert_eq!(c.stop(c.find_stop("A").unwrap()).coordinates.lat, 55.0);
    }

    #[test]
    fn test_bus_with_unknown_stop_rejected() {
        let mut c = abc_catalogue();
        let err = c
            .add_bus("9", &["A".into(), "X".into()], true)
            .unwrap_err();
        assert_eq!(
            err,
            CatalogueError::UnknownStop {
                bus: "9".to_string(),
                stop: "X".to_string()
            }
        );
    }

    #[test]
    fn test_distance_fallback_until_overridden() {
        let mut c = abc_catalogue();
        let a = c.find_stop("A").unwrap();
        let b = c.find_stop("B").unwrap();
        // Only A->B was set: the reverse silently equals the forward one.
        assert_eq!(c.distance(b, a), c.distance(a, b));
        // An explicit reverse entry wins.
        c.set_distance(b, a, 1500.0);
        assert_eq!(c.distance(a, b), 1000.0);
        assert_eq!(c.distance(b, a), 1500.0);
    }

    #[test]
    fn test_distance_unknown_pair_is_zero() {
        let c = abc_catalogue();
        let a = c.find_stop("A").unwrap();
        let z = c.find_stop("C").unwrap();
        assert_eq!(c.distance(a, z), 0.0);
    }

    #[test]
    fn test_buses_for_stop_distinguishes_empty_from_unknown() {
        let mut c = abc_catalogue();
        c.add_bus("1", &["A".into(), "B".into()], true).unwrap();
        assert!(c.buses_for_stop("C").unwrap().is_empty());
        assert!(c.buses_for_stop("Nowhere").is_none());
        let at_a: Vec<_> = c.buses_for_stop("A").unwrap().iter().collect();
        assert_eq!(at_a, ["1"]);
    }

    #[test]
    fn test_buses_for_stop_ordered_by_name() {
        let mut c = abc_catalogue();
        c.add_bus("9", &["A".into()], true).unwrap();
        c.add_bus("10", &["A".into()], true).unwrap();
        c.add_bus("9", &["A".into()], true).unwrap_err();
        let at_a: Vec<_> = c.buses_for_stop("A").unwrap().iter().collect();
        // Lexicographic, unique.
        assert_eq!(at_a, ["10", "9"]);
    }

    #[test]
    fn test_stats_roundtrip_vs_one_way_counts() {
        let mut c = abc_catalogue();
        c.add_bus("ring", &["A".into(), "B".into(), "C".into()], true)
            .unwrap();
        c.add_bus("line", &["A".into(), "B".into(), "C".into()], false)
            .unwrap();
        assert_eq!(c.bus_stats("ring").unwrap().stop_count, 3);
        assert_eq!(c.bus_stats("line").unwrap().stop_count, 5);
        assert_eq!(c.bus_stats("ring").unwrap().unique_stop_count, 3);
        assert_eq!(c.bus_stats("absent"), None);
    }

    #[test]
    fn test_route_length_doubles_with_fallback() {
        let mut c = abc_catalogue();
        c.add_bus("line", &["A".into(), "B".into(), "C".into()], false)
            .unwrap();
        // No reverse entries set: both legs use the forward distances.
        assert_eq!(c.bus_stats("line").unwrap().route_length, 4000.0);
    }

    #[test]
    fn test_asymmetric_distances_change_return_leg() {
        let mut c = abc_catalogue();
        let a = c.find_stop("A").unwrap();
        let b = c.find_stop("B").unwrap();
        c.set_distance(b, a, 1200.0);
        c.add_bus("line", &["A".into(), "B".into(), "C".into()], false)
            .unwrap();
        // Forward 1000 + 1000, back 1000 (fallback C->B) + 1200 (explicit).
        assert_eq!(c.bus_stats("line").unwrap().route_length, 4200.0);
    }

    #[test]
    fn test_curvature_zero_when_no_distances() {
        let mut c = Catalogue::new();
        c.add_stop("A", coord(55.0, 37.0)).unwrap();
        c.add_stop("B", coord(55.1, 37.1)).unwrap();
        c.add_bus("1", &["A".into(), "B".into()], true).unwrap();
        let stats = c.bus_stats("1").unwrap();
        assert_eq!(stats.route_length, 0.0);
        assert!(stats.geo_length > 0.0);
        assert_eq!(stats.curvature, 0.0);
    }

    #[test]
    fn test_route_revisiting_a_stop() {
        let mut c = abc_catalogue();
        c.add_bus(
            "loop",
            &["A".into(), "B".into(), "A".into(), "B".into()],
            true,
        )
        .unwrap();
        let stats = c.bus_stats("loop").unwrap();
        assert_eq!(stats.stop_count, 4);
        assert_eq!(stats.unique_stop_count, 2);
        // A->B, B->A (fallback), A->B.
        assert_eq!(stats.route_length, 3000.0);
    }
}
