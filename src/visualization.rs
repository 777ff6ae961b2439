//! Visualization utilities for 2E-CVRP solutions.
//!
//! Generates SVG renderings of the two-echelon routes and of the
//! convergence trajectories of an ALNS run. Plot files go to a `Plots/`
//! directory by convention.

use crate::instance::{LocationKind, TwoEcvrpInstance};
use crate::solution::Solution;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// SVG visualization generator
pub struct Visualizer {
    /// Canvas width
    pub width: f64,
    /// Canvas height
    pub height: f64,
    /// Margin
    pub margin: f64,
    /// Node radius
    pub node_radius: f64,
}

impl Default for Visualizer {
    fn default() -> Self {
        Visualizer {
            width: 800.0,
            height: 800.0,
            margin: 50.0,
            node_radius: 6.0,
        }
    }
}

impl Visualizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate an SVG of all first- and second-echelon routes
    pub fn generate_routes_svg(&self, instance: &TwoEcvrpInstance, solution: &Solution) -> String {
        let mut svg = String::new();

        let (min_x, max_x, min_y, max_y) = self.bounds(instance);
        let scale_x = (self.width - 2.0 * self.margin) / (max_x - min_x).max(1.0);
        let scale_y = (self.height - 2.0 * self.margin) / (max_y - min_y).max(1.0);
        let scale = scale_x.min(scale_y);

        svg.push_str(&format!(
            r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
<style>
    .depot {{ fill: #2c3e50; stroke: #1a252f; stroke-width: 2; }}
    .satellite {{ fill: #e74c3c; stroke: #c0392b; stroke-width: 2; }}
    .customer {{ fill: #3498db; stroke: #2980b9; stroke-width: 1; }}
    .edge1 {{ stroke: #c0392b; stroke-width: 2.5; fill: none; }}
    .edge2 {{ stroke: #2980b9; stroke-width: 1.5; fill: none; }}
    .label {{ font-family: Arial; font-size: 10px; fill: #2c3e50; }}
    .title {{ font-family: Arial; font-size: 14px; fill: #2c3e50; font-weight: bold; }}
</style>
<rect width="100%" height="100%" fill="#ecf0f1"/>
"##,
            self.width, self.height, self.width, self.height
        ));

        svg.push_str(&format!(
            r##"<text x="{}" y="25" class="title">Instance: {} | Cost: {:.2}</text>
"##,
            self.margin, instance.name, solution.cost
        ));

        let transform = |x: f64, y: f64| -> (f64, f64) {
            let tx = self.margin + (x - min_x) * scale;
            let ty = self.height - self.margin - (y - min_y) * scale;
            (tx, ty)
        };

        // second-echelon routes below, first-echelon on top
        for (routes, class) in [(&solution.routes_2, "edge2"), (&solution.routes_1, "edge1")] {
            for route in routes.iter() {
                for pair in route.locations.windows(2) {
                    let from = instance.location(pair[0]);
                    let to = instance.location(pair[1]);
                    let (x1, y1) = transform(from.x as f64, from.y as f64);
                    let (x2, y2) = transform(to.x as f64, to.y as f64);
                    svg.push_str(&format!(
                        r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" class="{}"/>
"#,
                        x1, y1, x2, y2, class
                    ));
                }
            }
        }

        for node in instance.locations() {
            let (x, y) = transform(node.x as f64, node.y as f64);
            let class = match node.kind {
                LocationKind::Depot => "depot",
                LocationKind::Satellite => "satellite",
                LocationKind::Customer => "customer",
            };
            svg.push_str(&format!(
                r##"<circle cx="{:.2}" cy="{:.2}" r="{}" class="{}"/>
"##,
                x, y, self.node_radius, class
            ));
            svg.push_str(&format!(
                r##"<text x="{:.2}" y="{:.2}" class="label" text-anchor="middle">{}</text>
"##,
                x,
                y - self.node_radius - 3.0,
                node.node_id
            ));
        }

        svg.push_str("</svg>\n");
        svg
    }

    /// Generate an SVG of the current- and best-cost trajectories
    pub fn generate_convergence_svg(&self, current_trend: &[f64], best_trend: &[f64]) -> String {
        let mut svg = String::new();

        let max_cost = current_trend
            .iter()
            .chain(best_trend.iter())
            .cloned()
            .fold(0.0, f64::max)
            .max(1.0);
        let min_cost = current_trend
            .iter()
            .chain(best_trend.iter())
            .cloned()
            .fold(f64::INFINITY, f64::min)
            .min(max_cost);
        let n = current_trend.len().max(best_trend.len()).max(2);

        svg.push_str(&format!(
            r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
<style>
    .current {{ stroke: #95a5a6; stroke-width: 1; fill: none; }}
    .best {{ stroke: #27ae60; stroke-width: 2; fill: none; }}
    .axis {{ stroke: #2c3e50; stroke-width: 1; }}
    .label {{ font-family: Arial; font-size: 12px; fill: #2c3e50; }}
</style>
<rect width="100%" height="100%" fill="#ffffff"/>
"##,
            self.width, self.height, self.width, self.height
        ));

        let transform = |i: usize, cost: f64| -> (f64, f64) {
            let x = self.margin + (self.width - 2.0 * self.margin) * i as f64 / (n - 1) as f64;
            let span = (max_cost - min_cost).max(1e-9);
            let y = self.height - self.margin
                - (self.height - 2.0 * self.margin) * (cost - min_cost) / span;
            (x, y)
        };

        for (trend, class) in [(current_trend, "current"), (best_trend, "best")] {
            if trend.is_empty() {
                continue;
            }
            let points: Vec<String> = trend
                .iter()
                .enumerate()
                .map(|(i, &cost)| {
                    let (x, y) = transform(i, cost);
                    format!("{:.2},{:.2}", x, y)
                })
                .collect();
            svg.push_str(&format!(
                r#"<polyline points="{}" class="{}"/>
"#,
                points.join(" "),
                class
            ));
        }

        // axes and labels
        svg.push_str(&format!(
            r#"<line x1="{m}" y1="{b}" x2="{r}" y2="{b}" class="axis"/>
<line x1="{m}" y1="{t}" x2="{m}" y2="{b}" class="axis"/>
<text x="{r}" y="{by}" class="label" text-anchor="end">Iteration</text>
<text x="{m}" y="{ty}" class="label">Cost</text>
"#,
            m = self.margin,
            b = self.height - self.margin,
            r = self.width - self.margin,
            t = self.margin,
            by = self.height - self.margin + 20.0,
            ty = self.margin - 10.0,
        ));

        svg.push_str("</svg>\n");
        svg
    }

    /// Save an SVG string to a file
    pub fn save_svg<P: AsRef<Path>>(&self, svg: &str, path: P) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(svg.as_bytes())
    }

    /// Bounding box over all instance coordinates
    fn bounds(&self, instance: &TwoEcvrpInstance) -> (f64, f64, f64, f64) {
        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for node in instance.locations() {
            min_x = min_x.min(node.x as f64);
            max_x = max_x.max(node.x as f64);
            min_y = min_y.min(node.y as f64);
            max_y = max_y.max(node.y as f64);
        }
        if !min_x.is_finite() {
            (0.0, 1.0, 0.0, 1.0)
        } else {
            (min_x, max_x, min_y, max_y)
        }
    }
}
