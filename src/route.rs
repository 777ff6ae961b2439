//! Route representation for both echelons of the 2E-CVRP.
//!
//! A route is an ordered sequence of node ids starting and ending at a depot
//! (first echelon) or at the same satellite (second echelon), paired with the
//! load delivered at every interior stop. Feasibility, distance and cost are
//! cached after every structural mutation; an infeasible route carries
//! `f64::INFINITY` as distance and cost.

use crate::instance::{LocationKind, TwoEcvrpInstance};
use serde::{Deserialize, Serialize};

/// Represents a route for a first- or second-echelon vehicle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// Visited node ids; the first and last entries are the endpoints
    pub locations: Vec<usize>,
    /// Load delivered at `locations[i + 1]`; the return leg has no entry
    pub served_load: Vec<i32>,
    /// Customer ids served by this route (second echelon only)
    pub customers: Vec<usize>,
    /// True if the route belongs to the first echelon
    pub first_echelon: bool,
    /// True if the route respects endpoints, capacity and range
    pub feasible: bool,
    /// Total distance driven, infinity if infeasible
    pub distance: f64,
    /// Handling + distance + vehicle cost, infinity if infeasible
    pub cost: f64,
}

impl Route {
    /// Build a route and evaluate feasibility, distance and cost
    pub fn new(
        locations: Vec<usize>,
        load: Vec<i32>,
        first_echelon: bool,
        instance: &TwoEcvrpInstance,
    ) -> Self {
        let mut route = Route {
            locations,
            served_load: load,
            customers: Vec::new(),
            first_echelon,
            feasible: false,
            distance: f64::INFINITY,
            cost: f64::INFINITY,
        };
        route.evaluate(instance);
        route
    }

    /// Refresh the cached feasibility, distance and cost
    fn evaluate(&mut self, instance: &TwoEcvrpInstance) {
        self.feasible = self.is_feasible(instance);
        if self.feasible {
            self.distance = self.compute_distance(instance);
            self.cost = self.compute_cost(instance);
        } else {
            self.distance = f64::INFINITY;
            self.cost = f64::INFINITY;
        }
    }

    /// Sum of the distances of all legs
    pub fn compute_distance(&self, instance: &TwoEcvrpInstance) -> f64 {
        let mut total = 0.0;
        for pair in self.locations.windows(2) {
            total += instance.distance(pair[0], pair[1]);
        }
        total
    }

    /// Total cost = load handling cost + distance + vehicle cost.
    ///
    /// Handling applies to the first echelon only; the vehicle cost is
    /// charged per visited location, not per route.
    pub fn compute_cost(&self, instance: &TwoEcvrpInstance) -> f64 {
        let distance = self.compute_distance(instance);
        let (cost_vehicle, handling) = if self.first_echelon {
            let load: i32 = self.served_load.iter().sum();
            (instance.cost_first, instance.cost_handling * load as f64)
        } else {
            (instance.cost_second, 0.0)
        };
        let vehicle_cost = cost_vehicle * self.locations.len() as f64;
        handling + distance + vehicle_cost
    }

    /// Check endpoint, kind, capacity and range feasibility
    pub fn is_feasible(&self, instance: &TwoEcvrpInstance) -> bool {
        if self.locations.len() < 2 || self.served_load.len() != self.locations.len() - 2 {
            return false;
        }

        let first = instance.location(self.locations[0]);
        let last = instance.location(self.locations[self.locations.len() - 1]);
        let (endpoint_kind, interior_kind, capacity) = if self.first_echelon {
            (LocationKind::Depot, LocationKind::Satellite, instance.capacity_first)
        } else {
            (LocationKind::Satellite, LocationKind::Customer, instance.capacity_second)
        };

        if first.kind != endpoint_kind || last.kind != endpoint_kind {
            return false;
        }
        // a second-echelon vehicle must return to the satellite it left from
        if !self.first_echelon && first.node_id != last.node_id {
            return false;
        }

        for &node in &self.locations[1..self.locations.len() - 1] {
            if instance.location(node).kind != interior_kind {
                return false;
            }
        }

        if !self.first_echelon && self.compute_distance(instance) > instance.range_second {
            return false;
        }

        let mut cur_load = 0i32;
        for &load in &self.served_load {
            cur_load = cur_load.saturating_add(load);
            if cur_load > capacity {
                return false;
            }
        }

        true
    }

    /// True for the degenerate endpoint-to-endpoint loop that serves nothing
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.locations.len() <= 2
    }

    /// Remove the first occurrence of a location from the route and refresh
    /// the cached values. Returns the removed index and its served load.
    pub fn remove_location(
        &mut self,
        node_id: usize,
        instance: &TwoEcvrpInstance,
    ) -> Option<(usize, i32)> {
        let index = self.locations.iter().position(|&n| n == node_id)?;
        if index == 0 || index + 1 == self.locations.len() {
            return None;
        }
        let load = self.served_load[index - 1];
        self.locations.remove(index);
        self.served_load.remove(index - 1);
        if !self.first_echelon {
            if let Some(pos) = self.customers.iter().position(|&c| c == node_id) {
                self.customers.remove(pos);
            }
        }
        self.evaluate(instance);
        Some((index, load))
    }

    /// Insert a location at the given index with its load at `index - 1`.
    /// Returns the new route if it is feasible.
    pub fn insert_at(
        &self,
        node_id: usize,
        load: i32,
        index: usize,
        instance: &TwoEcvrpInstance,
    ) -> Option<Route> {
        if index == 0 || index >= self.locations.len() {
            return None;
        }
        let mut after = self.clone();
        after.locations.insert(index, node_id);
        after.served_load.insert(index - 1, load);
        after.evaluate(instance);
        if after.feasible {
            Some(after)
        } else {
            None
        }
    }

    /// Insert the location at the position giving the shortest total
    /// distance. Returns the best feasible route, the first position found
    /// winning ties, or `None` when no feasible position exists.
    pub fn greedy_insert(
        &self,
        node_id: usize,
        load: i32,
        instance: &TwoEcvrpInstance,
    ) -> Option<Route> {
        if load <= 0 {
            return None;
        }
        let mut best: Option<Route> = None;
        let mut min_dist = f64::INFINITY;
        for index in 1..self.locations.len() {
            if let Some(after) = self.insert_at(node_id, load, index, instance) {
                if after.distance < min_dist {
                    min_dist = after.distance;
                    best = Some(after);
                }
            }
        }
        best
    }

    /// Explore all insertion positions for the location and return the best
    /// and second-best cost deltas relative to the current route cost,
    /// together with the best resulting route. Missing slots are `+∞`.
    pub fn find_regret(
        &self,
        node_id: usize,
        load: i32,
        instance: &TwoEcvrpInstance,
    ) -> (f64, f64, Option<Route>) {
        let cur_cost = self.cost;
        let mut best_cost = f64::INFINITY;
        let mut second_best_cost = f64::INFINITY;
        let mut best_route = None;

        if load <= 0 {
            return (f64::INFINITY, f64::INFINITY, best_route);
        }

        for index in 1..self.locations.len() {
            if let Some(after) = self.insert_at(node_id, load, index, instance) {
                if after.cost < best_cost {
                    second_best_cost = best_cost;
                    best_cost = after.cost;
                    best_route = Some(after);
                } else if after.cost < second_best_cost {
                    second_best_cost = after.cost;
                }
            }
        }

        (best_cost - cur_cost, second_best_cost - cur_cost, best_route)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Route ")?;
        for node in &self.locations {
            write!(f, "{} ", node)?;
        }
        write!(f, "cost = {:.2} load = {:?}", self.cost, self.served_load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Customer, Location, LocationKind};

    /// One depot at the origin, two satellites and three customers on the axes.
    fn test_instance() -> TwoEcvrpInstance {
        let depots = vec![Location::new(0, 0, 0, 0, LocationKind::Depot, 0)];
        let satellites = vec![
            Location::new(10, 0, 0, 0, LocationKind::Satellite, 0),
            Location::new(0, 10, 0, 0, LocationKind::Satellite, 0),
        ];
        let customers = vec![
            Customer::new(Location::new(20, 0, 10, 0, LocationKind::Customer, 0), 0),
            Customer::new(Location::new(30, 0, 20, 0, LocationKind::Customer, 0), 0),
            Customer::new(Location::new(0, 20, 30, 0, LocationKind::Customer, 0), 0),
        ];
        TwoEcvrpInstance::new("test".to_string(), depots, satellites, customers)
    }

    #[test]
    fn test_second_echelon_cost() {
        let instance = test_instance();
        // S1 -> C1 -> C2 -> S1
        let route = Route::new(vec![1, 3, 4, 1], vec![10, 20], false, &instance);
        assert!(route.feasible);
        assert!((route.distance - 40.0).abs() < 1e-9);
        // distance + per-visit vehicle cost
        assert!((route.cost - (40.0 + 25.0 * 4.0)).abs() < 1e-9);
    }

    #[test]
    fn test_first_echelon_cost_includes_handling() {
        let instance = test_instance();
        let route = Route::new(vec![0, 1, 0], vec![50], true, &instance);
        assert!(route.feasible);
        assert!((route.distance - 20.0).abs() < 1e-9);
        assert!((route.cost - (5.0 * 50.0 + 20.0 + 50.0 * 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_capacity_violation_is_infeasible() {
        let instance = test_instance();
        let route = Route::new(vec![1, 3, 4, 1], vec![30, 25], false, &instance);
        assert!(!route.feasible);
        assert!(route.cost.is_infinite());
    }

    #[test]
    fn test_range_violation_is_infeasible() {
        let mut instance = test_instance();
        instance.range_second = 30.0;
        let route = Route::new(vec![1, 3, 4, 1], vec![10, 20], false, &instance);
        assert!(!route.feasible);
    }

    #[test]
    fn test_endpoints_must_match() {
        let instance = test_instance();
        // ends at a different satellite
        let route = Route::new(vec![1, 3, 2], vec![10], false, &instance);
        assert!(!route.feasible);
        // first-echelon route anchored at a satellite
        let route = Route::new(vec![1, 1], vec![], true, &instance);
        assert!(!route.feasible);
    }

    #[test]
    fn test_greedy_insert_prefers_first_position_on_tie() {
        let instance = test_instance();
        let route = Route::new(vec![1, 3, 1], vec![10], false, &instance);
        // both internal positions give distance 40; the first one found wins
        let after = route.greedy_insert(4, 20, &instance).unwrap();
        assert_eq!(after.locations, vec![1, 4, 3, 1]);
        assert_eq!(after.served_load, vec![20, 10]);
    }

    #[test]
    fn test_greedy_insert_rejects_empty_load() {
        let instance = test_instance();
        let route = Route::new(vec![1, 3, 1], vec![10], false, &instance);
        assert!(route.greedy_insert(4, 0, &instance).is_none());
    }

    #[test]
    fn test_insert_then_remove_round_trip() {
        let instance = test_instance();
        let route = Route::new(vec![1, 3, 1], vec![10], false, &instance);
        let mut after = route.insert_at(4, 20, 2, &instance).unwrap();
        assert_eq!(after.locations, vec![1, 3, 4, 1]);

        let (index, load) = after.remove_location(4, &instance).unwrap();
        assert_eq!((index, load), (2, 20));
        assert_eq!(after.locations, route.locations);
        assert_eq!(after.served_load, route.served_load);
        assert!((after.distance - route.distance).abs() < 1e-9);
        assert!((after.cost - route.cost).abs() < 1e-9);
    }

    #[test]
    fn test_find_regret_with_single_position() {
        let instance = test_instance();
        let route = Route::new(vec![1, 1], vec![], false, &instance);
        let (best, second, best_route) = route.find_regret(3, 10, &instance);
        assert!(best.is_finite());
        assert!(second.is_infinite());
        assert_eq!(best_route.unwrap().locations, vec![1, 3, 1]);
    }

    #[test]
    fn test_find_regret_deltas() {
        let instance = test_instance();
        let route = Route::new(vec![1, 3, 1], vec![10], false, &instance);
        let (best, second, _) = route.find_regret(4, 20, &instance);
        // both positions lead to distance 40, cost 140; current cost is 95
        assert!((best - 45.0).abs() < 1e-9);
        assert!((second - 45.0).abs() < 1e-9);
    }
}
