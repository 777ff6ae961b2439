//! 2E-CVRP ALNS Solver Library
//!
//! A solver for the Two-Echelon Capacitated Vehicle Routing Problem
//! (2E-CVRP) built around an Adaptive Large Neighborhood Search with
//! simulated-annealing acceptance.
//!
//! # Features
//!
//! - Fixed-column instance parsing with precomputed distance matrix
//! - Two-level route representation with incremental insertion primitives
//! - Destroy operators (random, related, worst deterministic/randomised)
//! - Repair operators (random, greedy, regret-2 insertion)
//! - Adaptive operator weighting with time-regularized selection
//! - Batch driver with CSV export and SVG visualization
//!
//! # Example
//!
//! ```no_run
//! use te_cvrp_solver::instance::TwoEcvrpInstance;
//! use te_cvrp_solver::alns::{Alns, AlnsParameters};
//!
//! // Load instance
//! let instance = TwoEcvrpInstance::from_file("Instances/Ca1-2,3,15.txt").unwrap();
//!
//! // Run the ALNS with the full operator catalogue
//! let mut engine = Alns::new(&instance, 4, 3, AlnsParameters::default(), false);
//! let outcome = engine.run().unwrap();
//!
//! println!("Best cost: {:.2}", outcome.best_cost);
//! ```

pub mod alns;
pub mod benchmark;
pub mod instance;
pub mod route;
pub mod solution;
pub mod visualization;

pub use alns::{Alns, AlnsOutcome, AlnsParameters};
pub use instance::TwoEcvrpInstance;
pub use route::Route;
pub use solution::Solution;
