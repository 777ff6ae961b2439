//! 2E-CVRP ALNS Solver - Command Line Interface
//!
//! Solves Two-Echelon Capacitated VRP instances with an Adaptive Large
//! Neighborhood Search.

use clap::{Parser, Subcommand};
use te_cvrp_solver::alns::{Alns, AlnsOutcome, AlnsParameters};
use te_cvrp_solver::benchmark::{export_to_csv, generate_report, ProblemSet};
use te_cvrp_solver::instance::TwoEcvrpInstance;
use te_cvrp_solver::visualization::Visualizer;

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "te-cvrp-solver")]
#[command(author = "M2 AI2D Student")]
#[command(version = "1.0")]
#[command(about = "An ALNS solver for the Two-Echelon Capacitated VRP")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a single instance
    Solve {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,

        /// Number of destroy operators to enable (1-4)
        #[arg(long, default_value = "4")]
        n_destroy: usize,

        /// Number of repair operators to enable (1-3)
        #[arg(long, default_value = "3")]
        n_repair: usize,

        /// Number of ALNS iterations
        #[arg(short = 'n', long, default_value = "500")]
        iterations: usize,

        /// Random seed
        #[arg(short, long, default_value = "1")]
        seed: u64,

        /// Output best solution to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write route and convergence plots to Plots/
        #[arg(long)]
        plot: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run the ALNS over a set of instances
    Batch {
        /// Instance files to solve
        #[arg(short, long, num_args = 1..)]
        instances: Vec<PathBuf>,

        /// Number of destroy operators to enable (1-4)
        #[arg(long, default_value = "4")]
        n_destroy: usize,

        /// Number of repair operators to enable (1-3)
        #[arg(long, default_value = "3")]
        n_repair: usize,

        /// Number of ALNS iterations per instance
        #[arg(short = 'n', long, default_value = "500")]
        iterations: usize,

        /// Random seed
        #[arg(short, long, default_value = "1")]
        seed: u64,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Write convergence plots to Plots/
        #[arg(long)]
        plot: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Analyze an instance
    Analyze {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            instance,
            n_destroy,
            n_repair,
            iterations,
            seed,
            output,
            plot,
            verbose,
        } => {
            solve_instance(
                &instance, n_destroy, n_repair, iterations, seed, output, plot, verbose,
            );
        }

        Commands::Batch {
            instances,
            n_destroy,
            n_repair,
            iterations,
            seed,
            output,
            plot,
            verbose,
        } => {
            run_batch(
                &instances, n_destroy, n_repair, iterations, seed, &output, plot, verbose,
            );
        }

        Commands::Analyze { instance } => {
            analyze_instance(&instance);
        }
    }
}

fn load_instance(path: &Path) -> TwoEcvrpInstance {
    match TwoEcvrpInstance::from_file(path) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("Error loading instance: {}", e);
            std::process::exit(1);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn solve_instance(
    path: &Path,
    n_destroy: usize,
    n_repair: usize,
    iterations: usize,
    seed: u64,
    output: Option<PathBuf>,
    plot: bool,
    verbose: bool,
) {
    println!("Loading instance from {:?}...", path);
    let instance = load_instance(path);

    if verbose {
        println!("{}", instance.statistics());
    }

    let params = AlnsParameters {
        n_iterations: iterations,
        random_seed: seed,
        ..AlnsParameters::default()
    };

    println!(
        "Solving with ALNS ({} destroy / {} repair operators, {} iterations)...",
        n_destroy, n_repair, iterations
    );
    let mut engine = Alns::new(&instance, n_destroy, n_repair, params, verbose);
    let outcome = match engine.run() {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("ALNS failed: {}", e);
            std::process::exit(1);
        }
    };

    println!("\n========== Results ==========");
    println!("Instance: {}", instance.name);
    println!("Cost: {:.2}", outcome.best_cost);
    println!("Distance: {:.2}", outcome.best.distance);
    println!(
        "Routes: {} first-echelon, {} second-echelon",
        outcome.best.routes_1.len(),
        outcome.best.routes_2.len()
    );
    println!("Time: {:.4}s", outcome.elapsed);
    println!("Iterations: {}", outcome.iterations);

    println!("\nDestroy operators:");
    for stats in &outcome.destroy_stats {
        println!(
            "  {}: weight {:.3}, used {} times, mean time {:.6}s",
            stats.operator, stats.weight, stats.uses, stats.mean_time
        );
    }
    println!("Repair operators:");
    for stats in &outcome.repair_stats {
        println!(
            "  {}: weight {:.3}, used {} times, mean time {:.6}s",
            stats.operator, stats.weight, stats.uses, stats.mean_time
        );
    }

    if verbose {
        println!("\n{}", outcome.best);
    }

    if let Some(out_path) = output {
        let json = serde_json::to_string_pretty(&outcome.best).expect("Failed to serialize solution");
        std::fs::write(&out_path, json).expect("Failed to write output");
        println!("\nSolution saved to {:?}", out_path);
    }

    if plot {
        write_plots(&instance, &outcome);
    }
}

#[allow(clippy::too_many_arguments)]
fn run_batch(
    instances: &[PathBuf],
    n_destroy: usize,
    n_repair: usize,
    iterations: usize,
    seed: u64,
    output: &Path,
    plot: bool,
    verbose: bool,
) {
    if instances.is_empty() {
        eprintln!("No instances given");
        std::process::exit(1);
    }

    let set = match ProblemSet::from_files(instances) {
        Ok(set) => set,
        Err(e) => {
            eprintln!("Error loading instances: {}", e);
            std::process::exit(1);
        }
    };
    println!("Loaded {} instances", set.problems.len());

    let params = AlnsParameters {
        n_iterations: iterations,
        random_seed: seed,
        ..AlnsParameters::default()
    };

    let outcomes = match set.run_alns(n_destroy, n_repair, &params, verbose) {
        Ok(outcomes) => outcomes,
        Err(e) => {
            eprintln!("ALNS failed: {}", e);
            std::process::exit(1);
        }
    };
    let records = set.records(&outcomes);

    std::fs::create_dir_all(output).expect("Failed to create output directory");
    let results_path = output.join("results.csv");
    export_to_csv(&records, &results_path).expect("Failed to export results");
    println!("Results exported to {:?}", results_path);

    let report = generate_report(&records);
    println!("\n{}", report);
    let report_path = output.join("report.txt");
    std::fs::write(&report_path, &report).expect("Failed to save report");
    println!("Report saved to {:?}", report_path);

    if plot {
        for (problem, outcome) in set.problems.iter().zip(&outcomes) {
            write_plots(problem, outcome);
        }
    }
}

fn analyze_instance(path: &Path) {
    let instance = load_instance(path);

    println!("========== Instance Analysis ==========\n");
    println!("{}", instance.statistics());

    // quick solution estimate with a short search
    let params = AlnsParameters {
        n_iterations: 50,
        ..AlnsParameters::default()
    };
    let mut engine = Alns::new(&instance, 4, 3, params, false);
    match engine.run() {
        Ok(outcome) => {
            println!("\nQuick Solution Estimate (50 iterations):");
            println!("  Cost: {:.2} in {:.3}s", outcome.best_cost, outcome.elapsed);
        }
        Err(e) => {
            println!("\nNo feasible solution found: {}", e);
        }
    }
}

/// Write route and convergence plots for one run into Plots/
fn write_plots(instance: &TwoEcvrpInstance, outcome: &AlnsOutcome) {
    let plots_dir = Path::new("Plots");
    std::fs::create_dir_all(plots_dir).expect("Failed to create Plots directory");
    let viz = Visualizer::new();
    let stem = instance.name.trim_end_matches(".txt");

    let routes_svg = viz.generate_routes_svg(instance, &outcome.best);
    let routes_path = plots_dir.join(format!("{}_routes.svg", stem));
    viz.save_svg(&routes_svg, &routes_path)
        .expect("Failed to save route plot");

    let conv_svg = viz.generate_convergence_svg(&outcome.current_trend, &outcome.best_trend);
    let conv_path = plots_dir.join(format!("{}_convergence.svg", stem));
    viz.save_svg(&conv_svg, &conv_path)
        .expect("Failed to save convergence plot");

    println!("Plots saved to {:?} and {:?}", routes_path, conv_path);
}
