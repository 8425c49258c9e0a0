//! Route graph construction and minimum-time queries.
//!
//! Every stop becomes two vertices: a wait-entry vertex (reached before
//! boarding, pays the fixed wait time) and a ride-exit vertex (on board).
//! For each bus, a ride edge is materialized for every ordered stop pair
//! `i < j` with the cumulative forward distance from `i` to `j`, so "stay on
//! this bus through k stops" is a single edge and no spurious wait is ever
//! charged without a transfer. Non-roundtrip buses get the same treatment
//! over the reversed stop list with reverse-direction distances.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::catalogue::{BusId, Catalogue, StopId};
use crate::graph::{DirectedGraph, EdgeId, VertexId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Fixed boarding wait at a stop, minutes.
    pub bus_wait_time: f64,
    /// Bus velocity, km/h.
    pub bus_velocity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EdgeKind {
    Wait { stop: StopId },
    Ride { bus: BusId, span_count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct EdgeWeight {
    minutes: f64,
    kind: EdgeKind,
}

/// One leg of a returned itinerary. A well-formed plan strictly alternates
/// `Wait` and `Ride`, starting with a `Wait`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanItem {
    Wait { stop: String, minutes: f64 },
    Ride { bus: String, span_count: u32, minutes: f64 },
}

impl PlanItem {
    pub fn minutes(&self) -> f64 {
        match self {
            PlanItem::Wait { minutes, .. } | PlanItem::Ride { minutes, .. } => *minutes,
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, PlanItem::Wait { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutePlan {
    pub total_minutes: f64,
    pub items: Vec<PlanItem>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("no such stop {0:?}")]
    UnknownStop(String),
}

/// Weighted route graph over a finished catalogue plus the single-pair
/// shortest-path engine. Holds only ids into the catalogue and must not
/// outlive it.
pub struct TransportRouter<'a> {
    catalogue: &'a Catalogue,
    settings: RouterSettings,
    graph: DirectedGraph<EdgeWeight>,
}

fn wait_vertex(stop: StopId) -> VertexId {
    stop.0 * 2
}

fn ride_vertex(stop: StopId) -> VertexId {
    stop.0 * 2 + 1
}

impl<'a> TransportRouter<'a> {
    /// Builds the full graph in one pass. Re-run only if the catalogue
    /// changes; in practice once per process.
    pub fn build(catalogue: &'a Catalogue, settings: RouterSettings) -> Self {
        let mut graph = DirectedGraph::new(catalogue.stop_count() * 2);

        for (id, _) in catalogue.stops() {
            graph.add_edge(
                wait_vertex(id),
                ride_vertex(id),
                EdgeWeight {
                    minutes: settings.bus_wait_time,
                    kind: EdgeKind::Wait { stop: id },
                },
            );
        }

        for (bus_id, bus) in catalogue.buses() {
            add_ride_edges(&mut graph, catalogue, settings, bus_id, &bus.stops);
            if !bus.is_roundtrip {
                let reversed: Vec<StopId> = bus.stops.iter().rev().copied().collect();
                add_ride_edges(&mut graph, catalogue, settings, bus_id, &reversed);
            }
        }

        debug!(
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            "route graph built"
        );

        Self {
            catalogue,
            settings,
            graph,
        }
    }

    pub fn settings(&self) -> RouterSettings {
        self.settings
    }

    /// Minimum-time itinerary between two stops. `Ok(None)` means no path
    /// exists, which is a normal query outcome, not a failure.
    pub fn route(&self, from: &str, to: &str) -> Result<Option<RoutePlan>, RouteError> {
        let source = self
            .catalogue
            .find_stop(from)
            .ok_or_else(|| RouteError::UnknownStop(from.to_string()))?;
        let target = self
            .catalogue
            .find_stop(to)
            .ok_or_else(|| RouteError::UnknownStop(to.to_string()))?;

        let Some(edges) = self.dijkstra(wait_vertex(source), wait_vertex(target)) else {
            return Ok(None);
        };

        let mut total_minutes = 0.0;
        let mut items = Vec::with_capacity(edges.len());
        for edge_id in edges {
            let weight = self.graph.edge(edge_id).weight;
            total_minutes += weight.minutes;
            items.push(match weight.kind {
                EdgeKind::Wait { stop } => PlanItem::Wait {
                    stop: self.catalogue.stop(stop).name.clone(),
                    minutes: weight.minutes,
                },
                EdgeKind::Ride { bus, span_count } => PlanItem::Ride {
                    bus: self.catalogue.bus(bus).name.clone(),
                    span_count,
                    minutes: weight.minutes,
                },
            });
        }

        Ok(Some(RoutePlan {
            total_minutes,
            items,
        }))
    }

    /// Single-pair Dijkstra over the accumulated minutes; all weights are
    /// non-negative. Returns the traversed edges in order, or `None` when the
    /// target is unreachable. Source == target yields an empty edge list.
    fn dijkstra(&self, source: VertexId, target: VertexId) -> Option<Vec<EdgeId>> {
        let n = self.graph.vertex_count();
        let mut dist = vec![f64::INFINITY; n];
        let mut prev: Vec<Option<EdgeId>> = vec![None; n];
        let mut heap = BinaryHeap::new();

        dist[source as usize] = 0.0;
        heap.push(QueueState {
            vertex: source,
            cost: 0.0,
        });

        while let Some(QueueState { vertex, cost }) = heap.pop() {
            if vertex == target {
                break;
            }
            if cost > dist[vertex as usize] {
                continue;
            }
            for edge_id in self.graph.out_edges(vertex) {
                let edge = self.graph.edge(edge_id);
                let next = cost + edge.weight.minutes;
                if next < dist[edge.to as usize] {
                    dist[edge.to as usize] = next;
                    prev[edge.to as usize] = Some(edge_id);
                    heap.push(QueueState {
                        vertex: edge.to,
                        cost: next,
                    });
                }
            }
        }

        if dist[target as usize].is_infinite() {
            return None;
        }

        let mut path = Vec::new();
        let mut vertex = target;
        while let Some(edge_id) = prev[vertex as usize] {
            path.push(edge_id);
            vertex = self.graph.edge(edge_id).from;
        }
        path.reverse();
        Some(path)
    }
}

fn add_ride_edges(
    graph: &mut DirectedGraph<EdgeWeight>,
    catalogue: &Catalogue,
    settings: RouterSettings,
    bus_id: BusId,
    stops: &[StopId],
) {
    for i in 0..stops.len().saturating_sub(1) {
        let mut cumulative = 0.0;
        for j in (i + 1)..stops.len() {
            cumulative += catalogue.distance(stops[j - 1], stops[j]);
            graph.add_edge(
                ride_vertex(stops[i]),
                wait_vertex(stops[j]),
                EdgeWeight {
                    minutes: ride_minutes(cumulative, settings.bus_velocity),
                    kind: EdgeKind::Ride {
                        bus: bus_id,
                        span_count: (j - i) as u32,
                    },
                },
            );
        }
    }
}

fn ride_minutes(distance_meters: f64, velocity_kmh: f64) -> f64 {
    (distance_meters / 1000.0) / velocity_kmh * 60.0
}

#[derive(Debug, Clone, Copy)]
struct QueueState {
    vertex: VertexId,
    cost: f64,
}

impl PartialEq for QueueState {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for QueueState {}

impl PartialOrd for QueueState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other.cost.partial_cmp(&self.cost).unwrap_or(Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinates;

    fn coord(lat: f64, lng: f64) -> Coordinates {
        Coordinates { lat, lng }
    }

    fn settings() -> RouterSettings {
        RouterSettings {
            bus_wait_time: 3.0,
            bus_velocity: 30.0,
        }
    }

    fn abc_catalogue(roundtrip: bool) -> Catalogue {
        let mut c = Catalogue::new();
        let a = c.add_stop("A", coord(55.0, 37.0)).unwrap();
        let b = c.add_stop("B", coord(55.1, 37.1)).unwrap();
        let z = c.add_stop("C", coord(55.2, 37.2)).unwrap();
        c.set_distance(a, b, 1000.0);
        c.set_distance(b, z, 1000.0);
        c.add_bus("1", &["A".into(), "B".into(), "C".into()], roundtrip)
            .unwrap();
        c
    }

    #[test]
    fn test_single_ride_without_transfer() {
        // Wait 3 at A, then ride 2000 m at 30 km/h: 3 + 4 = 7 minutes.
        let catalogue = abc_catalogue(true);
        let router = TransportRouter::build(&catalogue, settings());
        let plan = router.route("A", "C").unwrap().unwrap();

        assert!((plan.total_minutes - 7.0).abs() < 1e-9);
        assert_eq!(
            plan.items,
            [
                PlanItem::Wait {
                    stop: "A".to_string(),
                    minutes: 3.0
                },
                PlanItem::Ride {
                    bus: "1".to_string(),
                    span_count: 2,
                    minutes: 4.0
                },
            ]
        );
    }

    #[test]
    fn test_reverse_leg_of_one_way_bus() {
        let catalogue = abc_catalogue(false);
        let router = TransportRouter::build(&catalogue, settings());
        let plan = router.route("C", "A").unwrap().unwrap();
        assert!((plan.total_minutes - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_roundtrip_bus_has_no_return_edges() {
        // The cycle [A,B,C] does not close itself: C -> A needs no edge and
        // the query must report "no route", not fail.
        let catalogue = abc_catalogue(true);
        let router = TransportRouter::build(&catalogue, settings());
        assert_eq!(router.route("C", "A").unwrap(), None);
    }

    #[test]
    fn test_same_stop_is_trivial_plan() {
        let catalogue = abc_catalogue(true);
        let router = TransportRouter::build(&catalogue, settings());
        let plan = router.route("A", "A").unwrap().unwrap();
        assert_eq!(plan.total_minutes, 0.0);
        assert!(plan.items.is_empty());
    }

    #[test]
    fn test_unknown_stop_is_an_error() {
        let catalogue = abc_catalogue(true);
        let router = TransportRouter::build(&catalogue, settings());
        assert_eq!(
            router.route("A", "Z").unwrap_err(),
            RouteError::UnknownStop("Z".to_string())
        );
    }

    #[test]
    fn test_plan_alternates_and_adds_up() {
        // Two one-way buses forcing a transfer at B.
        let mut c = Catalogue::new();
        let a = c.add_stop("A", coord(55.0, 37.0)).unwrap();
        let b = c.add_stop("B", coord(55.1, 37.1)).unwrap();
        let z = c.add_stop("C", coord(55.2, 37.2)).unwrap();
        c.set_distance(a, b, 1000.0);
        c.set_distance(b, z, 2000.0);
        c.add_bus("west", &["A".into(), "B".into()], false).unwrap();
        c.add_bus("east", &["B".into(), "C".into()], false).unwrap();

        let router = TransportRouter::build(&c, settings());
        let plan = router.route("A", "C").unwrap().unwrap();

        // Wait 3 + ride 2 + wait 3 + ride 4.
        assert!((plan.total_minutes - 12.0).abs() < 1e-9);
        let leg_sum: f64 = plan.items.iter().map(PlanItem::minutes).sum();
        assert!((plan.total_minutes - leg_sum).abs() < 1e-9);
        for (i, item) in plan.items.iter().enumerate() {
            assert_eq!(item.is_waiting(), i % 2 == 0);
        }
    }

    #[test]
    fn test_staying_on_the_bus_beats_transferring() {
        // One bus covers A..C directly; a plan through the all-pairs edge
        // must not charge an intermediate wait at B.
        let catalogue = abc_catalogue(true);
        let router = TransportRouter::build(&catalogue, settings());
        let plan = router.route("A", "C").unwrap().unwrap();
        assert_eq!(plan.items.len(), 2);
        match &plan.items[1] {
            PlanItem::Ride { span_count, .. } => assert_eq!(*span_count, 2),
            other => panic!("expected a ride leg, got {other:?}"),
        }
    }
}
