//! Batch driver for running the ALNS over sets of 2E-CVRP instances.
//!
//! Provides tools for running one engine per instance, collecting final
//! costs and wall times, exporting the records to CSV and rendering a
//! plain-text summary report.

use crate::alns::{Alns, AlnsOutcome, AlnsParameters};
use crate::instance::TwoEcvrpInstance;

use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::Path;

/// Result of running the ALNS on a single instance
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    /// Instance name
    pub instance: String,
    /// Number of customers
    pub n_customers: usize,
    /// Number of satellites
    pub n_satellites: usize,
    /// Cost of the best solution found
    pub cost: f64,
    /// Wall time in seconds
    pub time: f64,
    /// Number of ALNS iterations
    pub iterations: usize,
}

/// A set of problems solved one after the other
pub struct ProblemSet {
    /// The parsed instances, in input order
    pub problems: Vec<TwoEcvrpInstance>,
}

impl ProblemSet {
    /// Load the given instance files; any parse error is fatal
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, String> {
        let mut problems = Vec::with_capacity(paths.len());
        for path in paths {
            problems.push(TwoEcvrpInstance::from_file(path)?);
        }
        Ok(ProblemSet { problems })
    }

    /// Load every `.txt` instance in a directory, sorted by file name
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, String> {
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| format!("Cannot read directory {:?}: {}", dir.as_ref(), e))?;
        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "txt").unwrap_or(false))
            .collect();
        paths.sort();
        Self::from_files(&paths)
    }

    /// Run one ALNS per problem and return the outcomes in problem order
    pub fn run_alns(
        &self,
        n_destroy_ops: usize,
        n_repair_ops: usize,
        params: &AlnsParameters,
        verbose: bool,
    ) -> Result<Vec<AlnsOutcome>, String> {
        let mut outcomes = Vec::with_capacity(self.problems.len());
        for problem in &self.problems {
            log::info!("Running ALNS on {}", problem);
            let mut engine = Alns::new(problem, n_destroy_ops, n_repair_ops, params.clone(), verbose);
            outcomes.push(engine.run()?);
        }
        Ok(outcomes)
    }

    /// Pair the outcomes with their instances into flat result records
    pub fn records(&self, outcomes: &[AlnsOutcome]) -> Vec<RunRecord> {
        self.problems
            .iter()
            .zip(outcomes)
            .map(|(problem, outcome)| RunRecord {
                instance: problem.name.clone(),
                n_customers: problem.customers.len(),
                n_satellites: problem.satellites.len(),
                cost: outcome.best_cost,
                time: outcome.elapsed,
                iterations: outcome.iterations,
            })
            .collect()
    }
}

/// Export result records to CSV
pub fn export_to_csv<P: AsRef<Path>>(records: &[RunRecord], path: P) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Render a plain-text summary of a batch run
pub fn generate_report(records: &[RunRecord]) -> String {
    let mut report = String::new();

    report.push_str("========================================\n");
    report.push_str("       2E-CVRP ALNS Report\n");
    report.push_str("========================================\n\n");

    report.push_str(&format!(
        "{:<20} {:>10} {:>12} {:>10} {:>10}\n",
        "Instance", "Customers", "Cost", "Time", "Iter"
    ));
    report.push_str("-".repeat(66).as_str());
    report.push('\n');

    for record in records {
        report.push_str(&format!(
            "{:<20} {:>10} {:>12.2} {:>10.3} {:>10}\n",
            record.instance, record.n_customers, record.cost, record.time, record.iterations
        ));
    }
    report.push_str("-".repeat(66).as_str());
    report.push('\n');

    if !records.is_empty() {
        let total_time: f64 = records.iter().map(|r| r.time).sum();
        let avg_cost: f64 = records.iter().map(|r| r.cost).sum::<f64>() / records.len() as f64;
        report.push_str(&format!(
            "{} instances, avg cost {:.2}, total time {:.3}s\n",
            records.len(),
            avg_cost,
            total_time
        ));
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Customer, Location, LocationKind};

    fn tiny_instance(name: &str) -> TwoEcvrpInstance {
        let depots = vec![Location::new(0, 0, 0, 0, LocationKind::Depot, 0)];
        let satellites = vec![
            Location::new(10, 0, 0, 0, LocationKind::Satellite, 0),
            Location::new(0, 10, 0, 0, LocationKind::Satellite, 0),
        ];
        let customers = vec![
            Customer::new(Location::new(20, 0, 10, 0, LocationKind::Customer, 0), 0),
            Customer::new(Location::new(0, 20, 15, 0, LocationKind::Customer, 0), 0),
        ];
        TwoEcvrpInstance::new(name.to_string(), depots, satellites, customers)
    }

    #[test]
    fn test_problem_set_runs_every_instance() {
        let set = ProblemSet {
            problems: vec![tiny_instance("a"), tiny_instance("b")],
        };
        let params = AlnsParameters {
            n_iterations: 20,
            ..AlnsParameters::default()
        };
        let outcomes = set.run_alns(4, 3, &params, false).unwrap();
        assert_eq!(outcomes.len(), 2);

        let records = set.records(&outcomes);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].instance, "a");
        assert!(records.iter().all(|r| r.cost.is_finite()));
    }

    #[test]
    fn test_report_lists_instances() {
        let records = vec![RunRecord {
            instance: "Ca1-2,3,15.txt".to_string(),
            n_customers: 15,
            n_satellites: 3,
            cost: 1800.0,
            time: 1.25,
            iterations: 500,
        }];
        let report = generate_report(&records);
        assert!(report.contains("Ca1-2,3,15.txt"));
        assert!(report.contains("1800.00"));
    }

    #[test]
    fn test_csv_serialization_shape() {
        let records = vec![RunRecord {
            instance: "a".to_string(),
            n_customers: 2,
            n_satellites: 2,
            cost: 100.0,
            time: 0.5,
            iterations: 20,
        }];
        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in &records {
            writer.serialize(record).unwrap();
        }
        let data = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(data.starts_with("instance,n_customers,n_satellites,cost,time,iterations"));
        assert!(data.contains("a,2,2,100.0,0.5,20"));
    }
}
