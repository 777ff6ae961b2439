//! Solution representation and manipulation for the 2E-CVRP.
//!
//! A solution couples a set of first-echelon routes (depot to satellites)
//! with a set of second-echelon routes (satellite to customers), plus the
//! bookkeeping that ties the two levels together: which customers are
//! served and how much load each satellite receives. The destroy and
//! repair operators of the ALNS live in the `destroy` and `repair`
//! submodules as `impl Solution` blocks.

mod destroy;
mod repair;

use crate::instance::TwoEcvrpInstance;
use crate::route::Route;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Represents a solution to the 2E-CVRP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// Routes of the first-echelon vehicles
    pub routes_1: Vec<Route>,
    /// Routes of the second-echelon vehicles
    pub routes_2: Vec<Route>,
    /// Ids of customers served by the second-echelon routes
    pub served: Vec<usize>,
    /// Ids of customers not (yet) served
    pub not_served: Vec<usize>,
    /// Load delivered to each satellite by the first echelon
    pub sat_demand_served: Vec<i32>,
    /// Load awaiting first-echelon delivery at each satellite
    pub sat_demand_not_served: Vec<i32>,
    /// Total distance of all routes
    pub distance: f64,
    /// Total cost of all routes
    pub cost: f64,
}

impl Solution {
    /// An empty solution: no routes, every customer unserved
    pub fn empty(instance: &TwoEcvrpInstance) -> Self {
        Solution {
            routes_1: Vec::new(),
            routes_2: Vec::new(),
            served: Vec::new(),
            not_served: instance.customers.iter().map(|c| c.id).collect(),
            sat_demand_served: vec![0; instance.satellites.len()],
            sat_demand_not_served: vec![0; instance.satellites.len()],
            distance: 0.0,
            cost: 0.0,
        }
    }

    /// Sum the distances of all routes into `self.distance`
    pub fn compute_distance(&mut self) {
        self.distance = self
            .routes_1
            .iter()
            .chain(self.routes_2.iter())
            .map(|r| r.distance)
            .sum();
    }

    /// Recompute the solution cost as the sum of all route costs (each
    /// route cost already carries its handling and vehicle terms)
    pub fn compute_cost(&mut self) {
        self.compute_distance();
        self.cost = self
            .routes_1
            .iter()
            .chain(self.routes_2.iter())
            .map(|r| r.cost)
            .sum();
    }

    /// Remove a location from a route of the indicated echelon and update
    /// the served/not-served bookkeeping accordingly.
    pub(crate) fn remove_location(
        &mut self,
        node_id: usize,
        first_echelon: bool,
        route_idx: usize,
        instance: &TwoEcvrpInstance,
    ) {
        let routes = if first_echelon {
            &mut self.routes_1
        } else {
            &mut self.routes_2
        };
        let Some((_, load)) = routes[route_idx].remove_location(node_id, instance) else {
            return;
        };

        if first_echelon {
            let sat = instance.satellite_index(node_id);
            self.sat_demand_served[sat] -= load;
            self.sat_demand_not_served[sat] += load;
        } else if let Some(pos) = self.served.iter().position(|&c| c == node_id) {
            let customer = self.served.remove(pos);
            self.not_served.push(customer);
        }
    }

    /// Derive the per-satellite demand from the current second-echelon
    /// routes. All of it starts as not-served; the first-echelon repair
    /// moves it over as routes are built.
    pub(crate) fn compute_satellite_demand(&mut self, instance: &TwoEcvrpInstance) {
        let n_sat = instance.satellites.len();
        self.sat_demand_not_served = vec![0; n_sat];
        self.sat_demand_served = vec![0; n_sat];
        for route in &self.routes_2 {
            let sat = instance.satellite_index(route.locations[0]);
            let total: i32 = route.served_load.iter().sum();
            self.sat_demand_not_served[sat] += total;
        }
    }

    /// Indices of the routes of an echelon that still serve something
    pub(crate) fn non_degenerate_routes(&self, first_echelon: bool) -> Vec<usize> {
        let routes = if first_echelon {
            &self.routes_1
        } else {
            &self.routes_2
        };
        routes
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_degenerate())
            .map(|(i, _)| i)
            .collect()
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "First-echelon solution with satellite demand {:?}",
            self.sat_demand_served
        )?;
        for route in &self.routes_1 {
            writeln!(f, "{}", route)?;
        }
        writeln!(
            f,
            "Second-echelon solution with {} routes and {} unserved customers:",
            self.routes_2.len(),
            self.not_served.len()
        )?;
        for route in &self.routes_2 {
            writeln!(f, "{}", route)?;
        }
        Ok(())
    }
}

/// Multiplicative pertubation factor `r^u` with `r ∈ [0, 1)` and
/// `u ∈ [-0.2, 0.2]`, used to reorder ties and near-ties in operator
/// scores. Draws `r` first, then `u`.
pub(crate) fn perturb_factor(rng: &mut ChaCha8Rng) -> f64 {
    let r = rng.gen::<f64>();
    let u = rng.gen_range(-0.2..0.2);
    r.powf(u)
}

/// Apply the pertubation multiplier to a finite score; infinite sentinels
/// pass through untouched and consume no randomness.
pub(crate) fn perturbed(score: f64, pertubation: bool, rng: &mut ChaCha8Rng) -> f64 {
    if pertubation && score.is_finite() {
        score * perturb_factor(rng)
    } else {
        score
    }
}
