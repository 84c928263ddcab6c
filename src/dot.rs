use crate::{graph::Dag, job::RuleId, persistence::Persistence, rule::Rule};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Deterministic, well-saturated HSV hue per rule, rendered as `#rrggbb`.
/// Golden-angle stepping keeps adjacent rule ids visually distinct even for
/// small rule counts.
fn rule_color(index: usize) -> String {
    let hue = (index as f64 * 137.508) % 360.0;
    let (r, g, b) = hsv_to_rgb(hue, 0.6, 0.95);
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (u8, u8, u8) {
    let c = v * s;
    let h_prime = h / 60.0;
    let x = c * (1.0 - (h_prime.rem_euclid(2.0) - 1.0).abs());
    let (r1, g1, b1) = match h_prime as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    (
        ((r1 + m) * 255.0).round() as u8,
        ((g1 + m) * 255.0).round() as u8,
        ((b1 + m) * 255.0).round() as u8,
    )
}

impl<R: Rule, P: Persistence> Dag<R, P> {
    /// Render the currently-resolved graph as Graphviz DOT. Nodes are
    /// coloured by rule, dashed if the job needs to run, bold-outlined if
    /// it's a dynamic placeholder. `legend` additionally emits one node per
    /// rule mapping colour to name, useful for a key in the rendered image.
    pub fn dot(&self, legend: bool) -> String {
        let mut out = String::new();
        writeln!(out, "digraph dag {{").unwrap();
        writeln!(out, "    node [shape=box, style=rounded];").unwrap();

        let mut colors: HashMap<RuleId, String> = HashMap::new();
        for (index, rule_id) in self.rules.ids().enumerate() {
            colors.insert(rule_id, rule_color(index));
        }

        for job in self.jobs() {
            let record = self.job(job);
            let rule = self.rule(record.rule);
            let color = &colors[&record.rule];
            let mut style = vec!["filled".to_string()];
            if self.needrun(job) {
                style.push("dashed".to_string());
            }
            let penwidth = if self.dynamic(job) { 3 } else { 1 };
            writeln!(
                out,
                "    {} [label=\"{}\\n{}\", color=\"{}\", fillcolor=\"{}\", style=\"{}\", penwidth={}];",
                job.0,
                rule.name(),
                record,
                color,
                color,
                style.join(","),
                penwidth,
            )
            .unwrap();
        }

        for (job, producers) in &self.deps {
            for producer in producers.keys() {
                writeln!(out, "    {} -> {};", producer.0, job.0).unwrap();
            }
        }

        if legend {
            writeln!(out, "    subgraph cluster_legend {{").unwrap();
            writeln!(out, "    label=\"rules\";").unwrap();
            for rule_id in self.rules.ids() {
                let rule = self.rule(rule_id);
                writeln!(
                    out,
                    "    legend_{} [label=\"{}\", shape=box, style=filled, fillcolor=\"{}\"];",
                    rule_id.0,
                    rule.name(),
                    colors[&rule_id],
                )
                .unwrap();
            }
            writeln!(out, "    }}").unwrap();
        }

        writeln!(out, "}}").unwrap();
        out
    }
}
