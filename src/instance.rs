//! Module for parsing and representing 2E-CVRP instances.
//!
//! This module handles the fixed-column ASCII files used for the two-echelon
//! capacitated VRP. It manages node coordinates, demands, the precomputed
//! distance matrix and the fleet/cost parameters of both echelons.

use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};

/// Role of a location in the two-echelon network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationKind {
    /// Start and end point of first-echelon routes
    Depot,
    /// Transshipment point; start and end point of second-echelon routes
    Satellite,
    /// Delivery point served by a second-echelon vehicle
    Customer,
}

/// Represents a node in the 2E-CVRP instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// X coordinate
    pub x: i32,
    /// Y coordinate
    pub y: i32,
    /// Demand quantity; zero for depots and satellites
    pub demand: i32,
    /// Service time (informational, not part of the objective)
    pub service_time: i32,
    /// Role of this location
    pub kind: LocationKind,
    /// Dense node id, used as index into the distance matrix
    pub node_id: usize,
}

impl Location {
    pub fn new(x: i32, y: i32, demand: i32, service_time: i32, kind: LocationKind, node_id: usize) -> Self {
        Location { x, y, demand, service_time, kind, node_id }
    }

    /// Euclidean distance between two locations
    pub fn distance(&self, other: &Location) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Locations are identified by their node id, not by structural equality.
impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id
    }
}

impl Eq for Location {}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {:?})", self.node_id, self.kind)
    }
}

/// A customer together with its delivery location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// Customer identifier; equals the node id of the delivery location
    pub id: usize,
    /// Where the customer must be delivered
    pub delivery_loc: Location,
}

impl Customer {
    pub fn new(delivery_loc: Location, id: usize) -> Self {
        Customer { id, delivery_loc }
    }

    /// Demand of this customer
    #[inline]
    pub fn demand(&self) -> i32 {
        self.delivery_loc.demand
    }
}

/// Customers are identified by their id.
impl PartialEq for Customer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Customer {}

/// Represents a complete 2E-CVRP instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoEcvrpInstance {
    /// Name of the instance
    pub name: String,
    /// Depots, node ids `0..n_depots`
    pub depots: Vec<Location>,
    /// Satellites, node ids `n_depots..n_depots + n_satellites`
    pub satellites: Vec<Location>,
    /// Customers, node ids `n_depots + n_satellites..`
    pub customers: Vec<Customer>,
    /// Precomputed distance matrix over all node ids; arcs between a depot
    /// and a customer carry `f64::INFINITY`
    #[serde(skip)]
    pub dist_matrix: Vec<Vec<f64>>,
    /// First-echelon vehicle capacity
    pub capacity_first: i32,
    /// First-echelon vehicle cost (charged per visit)
    pub cost_first: f64,
    /// Second-echelon vehicle capacity
    pub capacity_second: i32,
    /// Second-echelon vehicle cost (charged per visit)
    pub cost_second: f64,
    /// Handling fee per transshipped unit at a satellite
    pub cost_handling: f64,
    /// Maximum total distance of a second-echelon route
    pub range_second: f64,
}

impl TwoEcvrpInstance {
    /// Build an instance from its node sets. Node ids are (re)assigned
    /// depots first, then satellites, then customers, and the distance
    /// matrix is precomputed. Parameters take the reference-set defaults.
    pub fn new(
        name: String,
        mut depots: Vec<Location>,
        mut satellites: Vec<Location>,
        mut customers: Vec<Customer>,
    ) -> Self {
        let mut count = 0;
        for d in depots.iter_mut() {
            d.node_id = count;
            count += 1;
        }
        for s in satellites.iter_mut() {
            s.node_id = count;
            count += 1;
        }
        for c in customers.iter_mut() {
            c.delivery_loc.node_id = count;
            c.id = count;
            count += 1;
        }

        let mut instance = TwoEcvrpInstance {
            name,
            depots,
            satellites,
            customers,
            dist_matrix: Vec::new(),
            capacity_first: 200,
            cost_first: 50.0,
            capacity_second: 50,
            cost_second: 25.0,
            cost_handling: 5.0,
            range_second: 200.0,
        };
        instance.dist_matrix = instance.compute_distance_matrix();
        instance
    }

    /// Compute the distance matrix. Direct arcs between a depot and a
    /// customer are forbidden and carry positive infinity.
    fn compute_distance_matrix(&self) -> Vec<Vec<f64>> {
        let n = self.n_locations();
        let mut matrix = vec![vec![0.0; n]; n];

        for i in self.locations() {
            for j in self.locations() {
                let cross = (i.kind == LocationKind::Depot && j.kind == LocationKind::Customer)
                    || (i.kind == LocationKind::Customer && j.kind == LocationKind::Depot);
                matrix[i.node_id][j.node_id] = if cross {
                    f64::INFINITY
                } else {
                    i.distance(j)
                };
            }
        }

        matrix
    }

    /// Iterate over all locations in node-id order
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.depots
            .iter()
            .chain(self.satellites.iter())
            .chain(self.customers.iter().map(|c| &c.delivery_loc))
    }

    /// Total number of locations
    #[inline]
    pub fn n_locations(&self) -> usize {
        self.depots.len() + self.satellites.len() + self.customers.len()
    }

    /// Get the distance between two node ids
    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.dist_matrix[i][j]
    }

    /// Look up a location by its node id
    pub fn location(&self, node_id: usize) -> &Location {
        let n_d = self.depots.len();
        let n_s = self.satellites.len();
        if node_id < n_d {
            &self.depots[node_id]
        } else if node_id < n_d + n_s {
            &self.satellites[node_id - n_d]
        } else {
            &self.customers[node_id - n_d - n_s].delivery_loc
        }
    }

    /// The echelon-1 anchor depot (the data model carries a list, the
    /// search anchors first-echelon routes at the first depot)
    #[inline]
    pub fn depot(&self) -> &Location {
        &self.depots[0]
    }

    /// Look up a customer by its id
    #[inline]
    pub fn customer(&self, id: usize) -> &Customer {
        &self.customers[id - self.depots.len() - self.satellites.len()]
    }

    /// Map a satellite node id to its dense satellite index
    #[inline]
    pub fn satellite_index(&self, node_id: usize) -> usize {
        node_id - self.depots.len()
    }

    /// Index of the satellite nearest to the given node (first one wins on ties)
    pub fn nearest_satellite(&self, node_id: usize) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, sat) in self.satellites.iter().enumerate() {
            let d = self.distance(node_id, sat.node_id);
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        best
    }

    /// Parse a 2E-CVRP instance from a fixed-column ASCII file. The numbers
    /// of depots, satellites and customers are encoded in the filename,
    /// `Ca{v}-{D},{S},{C}.txt`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| format!("Invalid instance path: {:?}", path))?;
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Cannot open file {:?}: {}", path, e))?;
        Self::from_str(file_name, &contents)
    }

    /// Parse an instance from its file name and contents
    pub fn from_str(file_name: &str, contents: &str) -> Result<Self, String> {
        let (n_depots, n_satellites, n_customers) = parse_header(file_name)?;

        let mut depots = Vec::with_capacity(n_depots);
        let mut satellites = Vec::with_capacity(n_satellites);
        let mut customers = Vec::with_capacity(n_customers);

        let mut n_line = 0usize;
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_fixed(line);
            let x = parse_field(&fields, 0, n_line, "x")?;
            let y = parse_field(&fields, 1, n_line, "y")?;

            if n_line < n_customers {
                let demand = parse_field(&fields, 4, n_line, "demand")?;
                let service_time = parse_field(&fields, 5, n_line, "service time")?;
                let loc = Location::new(x, y, demand, service_time, LocationKind::Customer, 0);
                customers.push(Customer::new(loc, 0));
            } else if n_line < n_customers + n_satellites {
                let service_time = parse_field(&fields, 2, n_line, "service time")?;
                satellites.push(Location::new(x, y, 0, service_time, LocationKind::Satellite, 0));
            } else if n_line < n_customers + n_satellites + n_depots {
                let service_time = parse_field(&fields, 2, n_line, "service time")?;
                depots.push(Location::new(x, y, 0, service_time, LocationKind::Depot, 0));
            } else {
                return Err(format!(
                    "Instance {}: expected {} records, found more",
                    file_name,
                    n_customers + n_satellites + n_depots
                ));
            }
            n_line += 1;
        }

        if n_line != n_customers + n_satellites + n_depots {
            return Err(format!(
                "Instance {}: expected {} records, found {}",
                file_name,
                n_customers + n_satellites + n_depots,
                n_line
            ));
        }

        Ok(TwoEcvrpInstance::new(
            file_name.to_string(),
            depots,
            satellites,
            customers,
        ))
    }

    /// Get statistics about the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let demands: Vec<i32> = self.customers.iter().map(|c| c.demand()).collect();
        let total_demand: i32 = demands.iter().sum();
        let max_demand = demands.iter().copied().max().unwrap_or(0);
        let avg_demand = if demands.is_empty() {
            0.0
        } else {
            total_demand as f64 / demands.len() as f64
        };

        let mut distances: Vec<f64> = Vec::new();
        let n = self.n_locations();
        for i in 0..n {
            for j in i + 1..n {
                let d = self.distance(i, j);
                if d.is_finite() {
                    distances.push(d);
                }
            }
        }
        let avg_distance = if distances.is_empty() {
            0.0
        } else {
            distances.iter().sum::<f64>() / distances.len() as f64
        };
        let max_distance = distances.iter().cloned().fold(0.0, f64::max);

        InstanceStatistics {
            name: self.name.clone(),
            n_depots: self.depots.len(),
            n_satellites: self.satellites.len(),
            n_customers: self.customers.len(),
            total_demand,
            avg_demand,
            max_demand,
            avg_distance,
            max_distance,
        }
    }
}

impl std::fmt::Display for TwoEcvrpInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "2E-CVRP problem {} with {} customers",
            self.name,
            self.customers.len()
        )
    }
}

/// Decode depot/satellite/customer counts from a `Ca{v}-{D},{S},{C}.txt` name
fn parse_header(file_name: &str) -> Result<(usize, usize, usize), String> {
    let stem = file_name.strip_suffix(".txt").unwrap_or(file_name);
    let counts = stem
        .split_once('-')
        .map(|(_, c)| c)
        .ok_or_else(|| format!("Instance name {} lacks the D,S,C header", file_name))?;
    let parts: Vec<&str> = counts.split(',').collect();
    if parts.len() != 3 {
        return Err(format!("Instance name {} lacks the D,S,C header", file_name));
    }
    let parse = |s: &str, what: &str| -> Result<usize, String> {
        s.trim()
            .parse()
            .map_err(|_| format!("Instance name {}: invalid {} count", file_name, what))
    };
    Ok((
        parse(parts[0], "depot")?,
        parse(parts[1], "satellite")?,
        parse(parts[2], "customer")?,
    ))
}

/// Cut a physical line into 6-character fields
fn split_fixed(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    chars
        .chunks(6)
        .map(|c| c.iter().collect::<String>().trim().to_string())
        .collect()
}

fn parse_field(fields: &[String], index: usize, line: usize, what: &str) -> Result<i32, String> {
    let raw = fields
        .get(index)
        .ok_or_else(|| format!("Line {}: missing {} field", line + 1, what))?;
    // some reference files carry a trailing ".0" on integer fields
    let raw = raw.strip_suffix(".0").unwrap_or(raw.as_str());
    raw.parse()
        .map_err(|_| format!("Line {}: invalid {} field '{}'", line + 1, what, raw))
}

/// Statistics about a 2E-CVRP instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub n_depots: usize,
    pub n_satellites: usize,
    pub n_customers: usize,
    pub total_demand: i32,
    pub avg_demand: f64,
    pub max_demand: i32,
    pub avg_distance: f64,
    pub max_distance: f64,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(
            f,
            "  Nodes: {} ({} depots + {} satellites + {} customers)",
            self.n_depots + self.n_satellites + self.n_customers,
            self.n_depots,
            self.n_satellites,
            self.n_customers
        )?;
        writeln!(f, "  Total demand: {}", self.total_demand)?;
        writeln!(f, "  Avg demand: {:.2}", self.avg_demand)?;
        writeln!(f, "  Max demand: {}", self.max_demand)?;
        writeln!(f, "  Avg distance: {:.2}", self.avg_distance)?;
        writeln!(f, "  Max distance: {:.2}", self.max_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(v: i32) -> String {
        format!("{:>6}", v)
    }

    fn customer_line(x: i32, y: i32, demand: i32, service: i32) -> String {
        format!(
            "{}{}{}{}{}{}",
            field(x),
            field(y),
            field(0),
            field(0),
            field(demand),
            field(service)
        )
    }

    fn facility_line(x: i32, y: i32, service: i32) -> String {
        format!("{}{}{}", field(x), field(y), field(service))
    }

    #[test]
    fn test_distance_calculation() {
        let a = Location::new(0, 0, 0, 0, LocationKind::Depot, 0);
        let b = Location::new(3, 4, 0, 0, LocationKind::Satellite, 1);
        assert!((a.distance(&b) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_location_identity() {
        let a = Location::new(0, 0, 5, 0, LocationKind::Customer, 7);
        let b = Location::new(9, 9, 1, 3, LocationKind::Customer, 7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header("Ca1-2,3,15.txt").unwrap(), (2, 3, 15));
        assert_eq!(parse_header("Ca3-6,4,50.txt").unwrap(), (6, 4, 50));
        assert!(parse_header("nonsense.txt").is_err());
    }

    #[test]
    fn test_from_str_assigns_node_ids() {
        let contents = [
            customer_line(10, 10, 5, 2),
            customer_line(20, 5, 8, 2),
            facility_line(5, 5, 1),
            facility_line(0, 0, 0),
        ]
        .join("\n");
        let instance = TwoEcvrpInstance::from_str("Ca1-1,1,2.txt", &contents).unwrap();

        assert_eq!(instance.depots.len(), 1);
        assert_eq!(instance.satellites.len(), 1);
        assert_eq!(instance.customers.len(), 2);
        // depots first, then satellites, then customers
        assert_eq!(instance.depots[0].node_id, 0);
        assert_eq!(instance.satellites[0].node_id, 1);
        assert_eq!(instance.customers[0].delivery_loc.node_id, 2);
        assert_eq!(instance.customers[0].id, 2);
        assert_eq!(instance.customers[1].id, 3);
        assert_eq!(instance.customers[0].demand(), 5);
        assert_eq!(instance.customers[1].demand(), 8);
    }

    #[test]
    fn test_depot_customer_arcs_forbidden() {
        let contents = [
            customer_line(10, 10, 5, 2),
            facility_line(5, 5, 1),
            facility_line(0, 0, 0),
        ]
        .join("\n");
        let instance = TwoEcvrpInstance::from_str("Ca1-1,1,1.txt", &contents).unwrap();

        assert!(instance.distance(0, 2).is_infinite());
        assert!(instance.distance(2, 0).is_infinite());
        assert!(instance.distance(0, 1).is_finite());
        assert!(instance.distance(1, 2).is_finite());
    }

    #[test]
    fn test_record_count_mismatch_is_fatal() {
        let contents = customer_line(10, 10, 5, 2);
        assert!(TwoEcvrpInstance::from_str("Ca1-1,1,2.txt", &contents).is_err());
    }

    #[test]
    fn test_nearest_satellite() {
        let depots = vec![Location::new(0, 0, 0, 0, LocationKind::Depot, 0)];
        let satellites = vec![
            Location::new(10, 0, 0, 0, LocationKind::Satellite, 0),
            Location::new(40, 0, 0, 0, LocationKind::Satellite, 0),
        ];
        let customers = vec![Customer::new(
            Location::new(30, 0, 5, 0, LocationKind::Customer, 0),
            0,
        )];
        let instance = TwoEcvrpInstance::new("test".to_string(), depots, satellites, customers);

        let cust_id = instance.customers[0].id;
        assert_eq!(instance.nearest_satellite(cust_id), 1);
    }
}
