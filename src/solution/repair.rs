//! Repair operators of the ALNS.
//!
//! Every repair runs in two phases: first the unserved customers are
//! inserted into second-echelon routes, then the resulting satellite loads
//! are delivered by rebuilding the first-echelon routes from scratch. The
//! first echelon is always derived from the second, because satellite
//! demand is a function of the customer assignment.

use super::{perturbed, Solution};
use crate::instance::TwoEcvrpInstance;
use crate::route::Route;
use ordered_float::OrderedFloat;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Best and second-best insertion of one unserved item across all routes.
/// Each slot holds `(cost delta, route index)`; missing slots are `+∞`.
#[derive(Debug, Clone)]
struct RegretEntry {
    best: (f64, usize),
    second: (f64, usize),
    route: Option<Route>,
}

impl RegretEntry {
    fn new() -> Self {
        RegretEntry {
            best: (f64::INFINITY, 0),
            second: (f64::INFINITY, 0),
            route: None,
        }
    }

    /// Regret-2 value: gap between the second-best and best insertion.
    /// When neither exists the item has no preference and scores zero.
    fn value(&self) -> f64 {
        if self.best.0.is_infinite() && self.second.0.is_infinite() {
            0.0
        } else {
            self.second.0 - self.best.0
        }
    }

    /// Fold the best/second-best deltas of one route into the entry.
    fn offer(&mut self, best_delta: f64, second_delta: f64, route_idx: usize, route: Option<Route>) {
        if best_delta < self.best.0 {
            self.second = self.best;
            self.best = (best_delta, route_idx);
            self.route = route;
        } else if best_delta < self.second.0 {
            self.second = (best_delta, route_idx);
        }
        if second_delta < self.second.0 {
            self.second = (second_delta, route_idx);
        }
    }
}

/// Evaluate the full regret entry of an item against every route.
fn evaluate_regret(
    routes: &[Route],
    node_id: usize,
    load: i32,
    pertubation: bool,
    rng: &mut ChaCha8Rng,
    instance: &TwoEcvrpInstance,
) -> RegretEntry {
    let mut entry = RegretEntry::new();
    for (i, route) in routes.iter().enumerate() {
        let (b, s, r) = route.find_regret(node_id, load, instance);
        let b = perturbed(b, pertubation, rng);
        let s = perturbed(s, pertubation, rng);
        entry.offer(b, s, i, r);
    }
    entry
}

/// Index of the entry with the largest regret value; the first one wins ties.
fn pick_max_regret(entries: &[RegretEntry]) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, entry) in entries.iter().enumerate() {
        let value = entry.value();
        if value > best_value {
            best_value = value;
            best = i;
        }
    }
    best
}

/// Single-customer route at the nearest satellite that can feasibly host
/// it, scanning the satellites by increasing distance from the customer.
fn single_customer_route(
    cust_id: usize,
    demand: i32,
    instance: &TwoEcvrpInstance,
) -> Option<Route> {
    let mut order: Vec<usize> = (0..instance.satellites.len()).collect();
    order.sort_by_key(|&i| OrderedFloat(instance.distance(cust_id, instance.satellites[i].node_id)));
    for i in order {
        let sat = instance.satellites[i].node_id;
        let route = Route::new(vec![sat, cust_id, sat], vec![demand], false, instance);
        if route.feasible {
            return Some(route);
        }
    }
    None
}

impl Solution {
    /// Random insertion (repair operator 1).
    ///
    /// Returns false when some customer could not be placed anywhere; a
    /// complete repair leaves `not_served` empty.
    pub fn random_insertion(&mut self, rng: &mut ChaCha8Rng, instance: &TwoEcvrpInstance) -> bool {
        let complete = self.random_insertion_second(rng, instance);
        self.random_insertion_first(rng, instance);
        complete
    }

    /// Randomly insert the unserved customers into the second-echelon routes.
    fn random_insertion_second(&mut self, rng: &mut ChaCha8Rng, instance: &TwoEcvrpInstance) -> bool {
        self.routes_2.retain(|r| !r.is_degenerate());

        while !self.not_served.is_empty() {
            let pick = rng.gen_range(0..self.not_served.len());
            let cust_id = self.not_served[pick];
            let demand = instance.location(cust_id).demand;

            let mut potential: Vec<usize> = (0..self.routes_2.len()).collect();
            let mut inserted = false;
            while !potential.is_empty() {
                let k = rng.gen_range(0..potential.len());
                let route_idx = potential[k];
                match self.routes_2[route_idx].greedy_insert(cust_id, demand, instance) {
                    Some(mut after) => {
                        after.customers.push(cust_id);
                        self.routes_2[route_idx] = after;
                        inserted = true;
                        break;
                    }
                    None => {
                        potential.remove(k);
                    }
                }
            }

            if !inserted {
                // open a fresh route at a random satellite, falling back to
                // the remaining satellites when the draw is infeasible
                let sat_idx = rng.gen_range(0..instance.satellites.len());
                let sat = instance.satellites[sat_idx].node_id;
                let mut route = Route::new(vec![sat, cust_id, sat], vec![demand], false, instance);
                if !route.feasible {
                    match single_customer_route(cust_id, demand, instance) {
                        Some(r) => route = r,
                        None => return false,
                    }
                }
                route.customers.push(cust_id);
                self.routes_2.push(route);
            }

            self.not_served.remove(pick);
            self.served.push(cust_id);
        }

        true
    }

    /// Randomly insert the satellite loads into the first-echelon routes.
    fn random_insertion_first(&mut self, rng: &mut ChaCha8Rng, instance: &TwoEcvrpInstance) {
        self.routes_1.clear();
        self.compute_satellite_demand(instance);
        let depot = instance.depot().node_id;

        while self.sat_demand_not_served.iter().sum::<i32>() > 0 {
            let candidates: Vec<usize> = (0..self.sat_demand_not_served.len())
                .filter(|&i| self.sat_demand_not_served[i] > 0)
                .collect();
            let sat_idx = candidates[rng.gen_range(0..candidates.len())];
            let sat_node = instance.satellites[sat_idx].node_id;
            let load_max = self.sat_demand_not_served[sat_idx];

            let mut potential: Vec<usize> = (0..self.routes_1.len()).collect();
            let mut delivered = 0;
            while !potential.is_empty() {
                let k = rng.gen_range(0..potential.len());
                let route_idx = potential[k];
                let remain =
                    instance.capacity_first - self.routes_1[route_idx].served_load.iter().sum::<i32>();
                let load = load_max.min(remain);
                match self.routes_1[route_idx].greedy_insert(sat_node, load, instance) {
                    Some(after) => {
                        self.routes_1[route_idx] = after;
                        delivered = load;
                        break;
                    }
                    None => {
                        potential.remove(k);
                    }
                }
            }

            if delivered == 0 {
                let load = load_max.min(instance.capacity_first);
                let route = Route::new(vec![depot, sat_node, depot], vec![load], true, instance);
                self.routes_1.push(route);
                delivered = load;
            }

            self.sat_demand_not_served[sat_idx] -= delivered;
            self.sat_demand_served[sat_idx] += delivered;
        }
    }

    /// Greedy insertion (repair operator 2).
    pub fn greedy_insertion(
        &mut self,
        rng: &mut ChaCha8Rng,
        pertubation: bool,
        instance: &TwoEcvrpInstance,
    ) -> bool {
        let complete = self.greedy_insertion_second(rng, pertubation, instance);
        self.greedy_insertion_first(instance);
        complete
    }

    /// Insert each unserved customer (in random order) at the overall
    /// cheapest feasible position, opening a single-customer route when
    /// that beats every in-place insertion.
    fn greedy_insertion_second(
        &mut self,
        rng: &mut ChaCha8Rng,
        pertubation: bool,
        instance: &TwoEcvrpInstance,
    ) -> bool {
        self.routes_2.retain(|r| !r.is_degenerate());

        while !self.not_served.is_empty() {
            let pick = rng.gen_range(0..self.not_served.len());
            let cust_id = self.not_served[pick];
            let demand = instance.location(cust_id).demand;

            // best greedy insertion per route, ranked by (perturbed) delta
            let mut candidates: Vec<(f64, Option<Route>)> = Vec::with_capacity(self.routes_2.len());
            for route in &self.routes_2 {
                match route.greedy_insert(cust_id, demand, instance) {
                    Some(after) => {
                        let delta = perturbed(after.cost - route.cost, pertubation, rng);
                        candidates.push((delta, Some(after)));
                    }
                    None => candidates.push((f64::INFINITY, None)),
                }
            }
            let mut best_idx = 0;
            let mut min_cost = f64::INFINITY;
            for (i, (delta, _)) in candidates.iter().enumerate() {
                if *delta < min_cost {
                    min_cost = *delta;
                    best_idx = i;
                }
            }

            let mut inserted = false;
            if min_cost > instance.cost_second {
                // a dedicated route may be cheaper than the best insertion
                let sat = instance.satellites[instance.nearest_satellite(cust_id)].node_id;
                let mut route = Route::new(vec![sat, cust_id, sat], vec![demand], false, instance);
                if route.feasible && route.cost < min_cost {
                    route.customers.push(cust_id);
                    self.routes_2.push(route);
                    inserted = true;
                }
            }

            if !inserted {
                let best_route = if min_cost.is_finite() {
                    candidates[best_idx].1.take()
                } else {
                    None
                };
                match best_route {
                    Some(mut after) => {
                        after.customers.push(cust_id);
                        self.routes_2[best_idx] = after;
                    }
                    None => match single_customer_route(cust_id, demand, instance) {
                        Some(mut route) => {
                            route.customers.push(cust_id);
                            self.routes_2.push(route);
                        }
                        None => return false,
                    },
                }
            }

            self.not_served.remove(pick);
            self.served.push(cust_id);
        }

        true
    }

    /// Nearest-satellite sweep for the first echelon: starting from the
    /// depot, repeatedly jump to the closest satellite with unserved load
    /// and insert it at the best position of the open route; on
    /// infeasibility close the route and open a new one.
    fn greedy_insertion_first(&mut self, instance: &TwoEcvrpInstance) {
        self.routes_1.clear();
        self.compute_satellite_demand(instance);
        let depot = instance.depot().node_id;

        let mut unserved: Vec<usize> = (0..self.sat_demand_not_served.len())
            .filter(|&i| self.sat_demand_not_served[i] > 0)
            .collect();
        let mut current_node = depot;
        let mut open_new = true;

        while !unserved.is_empty() {
            let Some((k, &sat_idx)) = unserved.iter().enumerate().min_by_key(|&(_, &i)| {
                OrderedFloat(instance.distance(current_node, instance.satellites[i].node_id))
            }) else {
                break;
            };
            let sat_node = instance.satellites[sat_idx].node_id;
            current_node = sat_node;
            let demand = self.sat_demand_not_served[sat_idx];

            if open_new {
                let load = demand.min(instance.capacity_first);
                let route = Route::new(vec![depot, sat_node, depot], vec![load], true, instance);
                self.routes_1.push(route);
                if load == demand {
                    unserved.remove(k);
                    open_new = false;
                }
                self.sat_demand_not_served[sat_idx] -= load;
                self.sat_demand_served[sat_idx] += load;
            } else {
                let last = self.routes_1.len() - 1;
                match self.routes_1[last].greedy_insert(sat_node, demand, instance) {
                    Some(after) => {
                        self.routes_1[last] = after;
                        unserved.remove(k);
                        self.sat_demand_not_served[sat_idx] -= demand;
                        self.sat_demand_served[sat_idx] += demand;
                    }
                    None => {
                        // the open route cannot take this load any more
                        open_new = true;
                    }
                }
            }
        }
    }

    /// Regret-2 insertion (repair operator 3).
    pub fn regret_insertion(
        &mut self,
        rng: &mut ChaCha8Rng,
        pertubation: bool,
        instance: &TwoEcvrpInstance,
    ) -> bool {
        let complete = self.regret_insertion_second(rng, pertubation, instance);
        self.regret_insertion_first(rng, pertubation, instance);
        complete
    }

    /// Regret-2 insertion of the unserved customers into the
    /// second-echelon routes.
    fn regret_insertion_second(
        &mut self,
        rng: &mut ChaCha8Rng,
        pertubation: bool,
        instance: &TwoEcvrpInstance,
    ) -> bool {
        self.routes_2.retain(|r| !r.is_degenerate());

        let mut regrets: Vec<RegretEntry> = self
            .not_served
            .iter()
            .map(|&cid| {
                evaluate_regret(
                    &self.routes_2,
                    cid,
                    instance.location(cid).demand,
                    pertubation,
                    rng,
                    instance,
                )
            })
            .collect();

        while !self.not_served.is_empty() {
            let pick = pick_max_regret(&regrets);
            let cust_id = self.not_served[pick];
            let demand = instance.location(cust_id).demand;
            let entry = regrets[pick].clone();

            let mut inserted = false;
            let mut affected = entry.best.1;
            if entry.best.0 > instance.cost_second {
                let sat = instance.satellites[instance.nearest_satellite(cust_id)].node_id;
                let mut route = Route::new(vec![sat, cust_id, sat], vec![demand], false, instance);
                if route.feasible && route.cost < entry.best.0 {
                    route.customers.push(cust_id);
                    self.routes_2.push(route);
                    affected = self.routes_2.len() - 1;
                    inserted = true;
                }
            }
            if !inserted {
                match entry.route {
                    Some(mut route) => {
                        route.customers.push(cust_id);
                        self.routes_2[entry.best.1] = route;
                        affected = entry.best.1;
                    }
                    None => match single_customer_route(cust_id, demand, instance) {
                        Some(mut route) => {
                            route.customers.push(cust_id);
                            self.routes_2.push(route);
                            affected = self.routes_2.len() - 1;
                        }
                        None => return false,
                    },
                }
            }

            self.not_served.remove(pick);
            self.served.push(cust_id);
            regrets.remove(pick);

            // refresh the table: entries whose best or second-best points
            // at the affected route are re-evaluated against all routes,
            // the rest only against the affected route
            for (j, &cid2) in self.not_served.iter().enumerate() {
                let load = instance.location(cid2).demand;
                if regrets[j].best.1 == affected || regrets[j].second.1 == affected {
                    regrets[j] =
                        evaluate_regret(&self.routes_2, cid2, load, pertubation, rng, instance);
                } else {
                    let (b, s, r) = self.routes_2[affected].find_regret(cid2, load, instance);
                    let b = perturbed(b, pertubation, rng);
                    let s = perturbed(s, pertubation, rng);
                    regrets[j].offer(b, s, affected, r);
                }
            }
        }

        true
    }

    /// Regret-2 insertion of the satellite loads into the first-echelon
    /// routes. Loads larger than the vehicle capacity are delivered in
    /// capacity-sized chunks, so a satellite stays in the table until its
    /// whole demand is covered.
    fn regret_insertion_first(
        &mut self,
        rng: &mut ChaCha8Rng,
        pertubation: bool,
        instance: &TwoEcvrpInstance,
    ) {
        self.routes_1.clear();
        self.compute_satellite_demand(instance);
        let depot = instance.depot().node_id;

        let mut unserved: Vec<usize> = (0..self.sat_demand_not_served.len())
            .filter(|&i| self.sat_demand_not_served[i] > 0)
            .collect();
        let mut regrets: Vec<RegretEntry> = unserved
            .iter()
            .map(|&si| {
                evaluate_regret(
                    &self.routes_1,
                    instance.satellites[si].node_id,
                    self.sat_demand_not_served[si],
                    pertubation,
                    rng,
                    instance,
                )
            })
            .collect();

        while !unserved.is_empty() {
            let pick = pick_max_regret(&regrets);
            let sat_idx = unserved[pick];
            let sat_node = instance.satellites[sat_idx].node_id;
            let demand = self.sat_demand_not_served[sat_idx];
            let entry = regrets[pick].clone();

            let mut inserted = false;
            let mut affected = entry.best.1;
            let mut delivered = 0;
            if entry.best.0 > instance.cost_first {
                let load = demand.min(instance.capacity_first);
                let route = Route::new(vec![depot, sat_node, depot], vec![load], true, instance);
                if route.cost < entry.best.0 {
                    self.routes_1.push(route);
                    affected = self.routes_1.len() - 1;
                    delivered = load;
                    inserted = true;
                }
            }
            if !inserted {
                match entry.route {
                    Some(route) => {
                        self.routes_1[entry.best.1] = route;
                        affected = entry.best.1;
                        delivered = demand;
                    }
                    None => {
                        let load = demand.min(instance.capacity_first);
                        let route =
                            Route::new(vec![depot, sat_node, depot], vec![load], true, instance);
                        self.routes_1.push(route);
                        affected = self.routes_1.len() - 1;
                        delivered = load;
                    }
                }
            }

            self.sat_demand_not_served[sat_idx] -= delivered;
            self.sat_demand_served[sat_idx] += delivered;
            let fully_served = self.sat_demand_not_served[sat_idx] == 0;
            if fully_served {
                unserved.remove(pick);
                regrets.remove(pick);
            }

            for j in 0..unserved.len() {
                let si = unserved[j];
                let node = instance.satellites[si].node_id;
                let load = self.sat_demand_not_served[si];
                let needs_full = (!fully_served && j == pick)
                    || regrets[j].best.1 == affected
                    || regrets[j].second.1 == affected;
                if needs_full {
                    regrets[j] =
                        evaluate_regret(&self.routes_1, node, load, pertubation, rng, instance);
                } else {
                    let (b, s, r) = self.routes_1[affected].find_regret(node, load, instance);
                    let b = perturbed(b, pertubation, rng);
                    let s = perturbed(s, pertubation, rng);
                    regrets[j].offer(b, s, affected, r);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Customer, Location, LocationKind};
    use rand::SeedableRng;

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
            Customer::new(Location::new(0, 30, 15, 0, LocationKind::Customer, 0), 0),
        ];
        TwoEcvrpInstance::new("test".to_string(), depots, satellites, customers)
    }

    /// Every post-repair invariant from the solution contract.
    fn assert_valid(solution: &Solution, instance: &TwoEcvrpInstance) {
        assert!(solution.not_served.is_empty());
        assert_eq!(solution.served.len(), instance.customers.len());

        for route in &solution.routes_2 {
            assert!(route.feasible);
            assert_eq!(route.locations[0], route.locations[route.locations.len() - 1]);
            // the customer set of the route equals its interior
            let interior: Vec<usize> =
                route.locations[1..route.locations.len() - 1].to_vec();
            let mut customers = route.customers.clone();
            customers.sort();
            let mut sorted_interior = interior.clone();
            sorted_interior.sort();
            assert_eq!(customers, sorted_interior);
        }
        for route in &solution.routes_1 {
            assert!(route.feasible);
        }

        // coupling: first echelon delivers exactly the satellite demand
        let total_demand: i32 = instance.customers.iter().map(|c| c.demand()).sum();
        assert_eq!(solution.sat_demand_served.iter().sum::<i32>(), total_demand);
        assert!(solution.sat_demand_not_served.iter().all(|&d| d == 0));
        for (i, &served) in solution.sat_demand_served.iter().enumerate() {
            let sat_node = instance.satellites[i].node_id;
            let from_routes: i32 = solution
                .routes_2
                .iter()
                .filter(|r| r.locations[0] == sat_node)
                .map(|r| r.served_load.iter().sum::<i32>())
                .sum();
            assert_eq!(served, from_routes);
            let delivered: i32 = solution
                .routes_1
                .iter()
                .map(|r| {
                    r.locations[1..r.locations.len() - 1]
                        .iter()
                        .enumerate()
                        .filter(|(_, &n)| n == sat_node)
                        .map(|(k, _)| r.served_load[k])
                        .sum::<i32>()
                })
                .sum();
            assert_eq!(served, delivered);
        }
    }

    #[test]
    fn test_random_insertion_builds_complete_solution() {
        let instance = test_instance();
        let mut solution = Solution::empty(&instance);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(solution.random_insertion(&mut rng, &instance));
        assert_valid(&solution, &instance);
    }

    #[test]
    fn test_greedy_insertion_builds_complete_solution() {
        let instance = test_instance();
        let mut solution = Solution::empty(&instance);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(solution.greedy_insertion(&mut rng, true, &instance));
        assert_valid(&solution, &instance);
    }

    #[test]
    fn test_regret_insertion_builds_complete_solution() {
        let instance = test_instance();
        let mut solution = Solution::empty(&instance);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(solution.regret_insertion(&mut rng, true, &instance));
        assert_valid(&solution, &instance);
    }

    #[test]
    fn test_repair_fails_on_oversized_customer() {
        let mut instance = test_instance();
        instance.customers[0].delivery_loc.demand = 60; // above capacity_second
        let mut solution = Solution::empty(&instance);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(!solution.random_insertion(&mut rng, &instance));
    }

    #[test]
    fn test_repair_fails_on_unreachable_customer() {
        let mut instance = test_instance();
        instance.range_second = 30.0;
        // customer 6 sits 20+ away from every satellite, twice that is out
        // of range
        let mut solution = Solution::empty(&instance);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(!solution.random_insertion(&mut rng, &instance));
    }

    #[test]
    fn test_repairs_drop_degenerate_routes() {
        let instance = test_instance();
        let mut solution = Solution::empty(&instance);
        solution
            .routes_2
            .push(Route::new(vec![1, 1], vec![], false, &instance));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        solution.greedy_insertion(&mut rng, false, &instance);
        assert!(solution.routes_2.iter().all(|r| !r.is_degenerate()));
    }

    #[test]
    fn test_destroy_then_repair_round_trip() {
        let instance = test_instance();
        let mut solution = Solution::empty(&instance);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        assert!(solution.random_insertion(&mut rng, &instance));

        solution.random_removal(2, &mut rng, false, &instance);
        assert_eq!(solution.not_served.len(), 2);
        assert!(solution.regret_insertion(&mut rng, true, &instance));
        assert_valid(&solution, &instance);
    }

    #[test]
    fn test_repairs_are_reproducible() {
        let instance = test_instance();

        let mut first = Solution::empty(&instance);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        first.greedy_insertion(&mut rng, true, &instance);
        first.compute_cost();

        let mut second = Solution::empty(&instance);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        second.greedy_insertion(&mut rng, true, &instance);
        second.compute_cost();

        assert_eq!(first.cost.to_bits(), second.cost.to_bits());
    }

    #[test]
    fn test_oversized_satellite_demand_is_split() {
        let mut instance = test_instance();
        // all demand lands on one satellite and exceeds capacity_first
        instance.capacity_first = 40;
        let mut solution = Solution::empty(&instance);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(solution.regret_insertion(&mut rng, true, &instance));
        assert!(solution.sat_demand_not_served.iter().all(|&d| d == 0));
        for route in &solution.routes_1 {
            assert!(route.served_load.iter().sum::<i32>() <= instance.capacity_first);
        }
    }
}
