//! Per-edge statistics overlaid onto a request's textual graph
//!
//! Edge lines are matched by recomputing `"<src_name>-><dest_name>"` from the
//! record's own node declarations. Every supplied annotation must land on at
//! least one edge line; a miss means the statistics and the graph disagree,
//! and rendering would be misleading, so it is an error.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::decoder::{parse_edge, parse_node};
use crate::error::{DiagnosisError, Result};

/// Statistics rendered onto one edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeAnnotation {
    /// Latency differs significantly between the periods
    pub significant: bool,
    /// `None` when the comparison was not run
    pub p_value: Option<f64>,
    /// Mean latency per snapshot
    pub mean: [f64; 2],
    /// Latency standard deviation per snapshot
    pub stddev: [f64; 2],
}

impl EdgeAnnotation {
    pub fn color(&self) -> &'static str {
        if self.significant {
            "red"
        } else {
            "black"
        }
    }

    /// DOT attribute list; the latency label stays first so the line still
    /// parses as an edge
    fn attributes(&self, latency: f64) -> String {
        let p_value = self
            .p_value
            .map(|p| format!("{:.4}", p))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "[label=\"R: {} us\\np: {}\\na: {:.0} / {:.0} us\\ns: {:.0} / {:.0} us\" color=\"{}\"]",
            latency,
            p_value,
            self.mean[0],
            self.mean[1],
            self.stddev[0],
            self.stddev[1],
            self.color()
        )
    }
}

/// Substitute annotations into the edge lines of `raw`
pub fn overlay_annotations(
    raw: &str,
    annotations: &BTreeMap<String, EdgeAnnotation>,
) -> Result<String> {
    let names: HashMap<String, String> = raw.lines().filter_map(parse_node).collect();
    let name_of = |id: &str| names.get(id).cloned().unwrap_or_else(|| id.to_string());

    let mut placed: HashSet<&str> = HashSet::new();
    let mut out = String::with_capacity(raw.len());

    for line in raw.split_inclusive('\n') {
        let Some(edge) = parse_edge(line) else {
            out.push_str(line);
            continue;
        };
        let edge_name = format!("{}->{}", name_of(&edge.src), name_of(&edge.dest));
        let Some((key, annotation)) = annotations.get_key_value(&edge_name) else {
            out.push_str(line);
            continue;
        };

        let indent_len = line.len() - line.trim_start().len();
        out.push_str(&line[..indent_len]);
        out.push_str(&format!(
            "{} -> {} {}",
            edge.src,
            edge.dest,
            annotation.attributes(edge.latency)
        ));
        if line.ends_with('\n') {
            out.push('\n');
        }
        placed.insert(key.as_str());
    }

    if let Some(missing) = annotations.keys().find(|k| !placed.contains(k.as_str())) {
        return Err(DiagnosisError::OverlayEdgeNotFound(missing.clone()));
    }

    Ok(out)
}
