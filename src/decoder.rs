//! Request record decoding
//!
//! A snapshot file holds one record per request:
//!
//! ```text
//! # 7  R: 123.45 usecs
//! Digraph G {
//!   1.1 [label="A\nDEFAULT"]
//!   1.2 [label="B\nDEFAULT"]
//!   1.1 -> 1.2 [label="R: 10.5 us" color="black"]
//! }
//! ```
//!
//! The header line carries the snapshot-local id and the request's total
//! latency. Node declarations map a node id to a name, edge lines carry
//! per-edge latency, and a line starting with `}` terminates the record.
//! Anything else is decoration and is skipped silently.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Node identifier as written in the record (e.g. `"1.2"`)
pub type NodeId = String;

const HEADER_PATTERN: &str = r"^#\s*(\d+)\s+R:\s*([-+]?[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)";
const NODE_PATTERN: &str = r#"^\s*(\d+\.\d+)\s*\[\s*label\s*=\s*"([^"\\]*)"#;
const EDGE_PATTERN: &str = r#"^\s*(\d+\.\d+)\s*->\s*(\d+\.\d+)\s*\[\s*label\s*=\s*"R:\s*([-+]?[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)\s*us"#;

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(HEADER_PATTERN).expect("Invalid header pattern"))
}

fn node_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NODE_PATTERN).expect("Invalid node pattern"))
}

fn edge_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EDGE_PATTERN).expect("Invalid edge pattern"))
}

/// Parsed request header: `# <local_id> R: <latency>`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestHeader {
    pub local_id: u64,
    pub latency: f64,
}

/// Parse a request header line, `None` for any non-header line
pub fn parse_header(line: &str) -> Option<RequestHeader> {
    let caps = header_regex().captures(line)?;
    let local_id = caps.get(1)?.as_str().parse().ok()?;
    let latency = caps.get(2)?.as_str().parse().ok()?;
    Some(RequestHeader { local_id, latency })
}

/// Is this line the record terminator?
pub fn is_terminator(line: &str) -> bool {
    line.trim_start().starts_with('}')
}

/// Parse a node declaration line into `(node id, name)`
pub fn parse_node(line: &str) -> Option<(NodeId, String)> {
    let caps = node_regex().captures(line)?;
    Some((caps[1].to_string(), caps[2].trim().to_string()))
}

/// Parse an edge line into `(source id, dest id, latency)`
pub fn parse_edge(line: &str) -> Option<DecodedEdge> {
    let caps = edge_regex().captures(line)?;
    let latency = caps[3].parse().ok()?;
    Some(DecodedEdge {
        src: caps[1].to_string(),
        dest: caps[2].to_string(),
        latency,
    })
}

/// One edge measurement, in record order
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEdge {
    pub src: NodeId,
    pub dest: NodeId,
    pub latency: f64,
}

/// Result of decoding one request record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRequest {
    pub header: Option<RequestHeader>,
    /// node id -> node name
    pub nodes: HashMap<NodeId, String>,
    /// Ordered edge list; the first edge's source is the root
    pub edges: Vec<DecodedEdge>,
}

impl DecodedRequest {
    /// Name for a node id, falling back to the id for undeclared nodes
    pub fn node_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.nodes.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Edge name `"<src_name>-><dest_name>"`
    pub fn edge_name(&self, edge: &DecodedEdge) -> String {
        format!("{}->{}", self.node_name(&edge.src), self.node_name(&edge.dest))
    }
}

/// Collaborator that turns raw request text into nodes and edges
pub trait TraceDecoder: Send + Sync {
    fn decode(&self, record: &str) -> DecodedRequest;
}

/// Decoder for the DOT-like snapshot format described in the module docs
#[derive(Debug, Clone, Copy, Default)]
pub struct DotTraceDecoder;

impl TraceDecoder for DotTraceDecoder {
    fn decode(&self, record: &str) -> DecodedRequest {
        let mut decoded = DecodedRequest::default();

        for line in record.lines() {
            if decoded.header.is_none() {
                if let Some(header) = parse_header(line) {
                    decoded.header = Some(header);
                    continue;
                }
            }
            if is_terminator(line) {
                break;
            }
            // Edge lines also carry a label, so try them first
            if let Some(edge) = parse_edge(line) {
                decoded.edges.push(edge);
            } else if let Some((id, name)) = parse_node(line) {
                decoded.nodes.insert(id, name);
            }
        }

        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = "# 3  R: 42.5 usecs\n\
Digraph G {\n\
  1.1 [label=\"e10__t3__A\\nDEFAULT\"]\n\
  1.2 [label=\"B\"]\n\
  1.3 [label=\"C\"]\n\
  1.1 -> 1.2 [label=\"R: 10.5 us\" color=\"black\"]\n\
  1.2 -> 1.3 [label=\"R: 2 us\"]\n\
}\n";

    #[test]
    fn test_parse_header_whitespace_tolerant() {
        let header = parse_header("#   7   R:   123.45").unwrap();
        assert_eq!(header.local_id, 7);
        assert!((header.latency - 123.45).abs() < 1e-9);

        let header = parse_header("# 7  R: 123.45").unwrap();
        assert_eq!(header.local_id, 7);
    }

    #[test]
    fn test_parse_header_rejects_decoration() {
        assert!(parse_header("# Request graphs for snapshot 0").is_none());
        assert!(parse_header("Digraph G {").is_none());
        assert!(parse_header("").is_none());
    }

    #[test]
    fn test_parse_node_strips_label_suffix() {
        let (id, name) = parse_node("  1.1 [label=\"e10__t3__A\\nDEFAULT\"]").unwrap();
        assert_eq!(id, "1.1");
        assert_eq!(name, "e10__t3__A");
    }

    #[test]
    fn test_parse_edge() {
        let edge = parse_edge("1.1 -> 1.2 [label=\"R: 10.5 us\" color=\"black\"]").unwrap();
        assert_eq!(edge.src, "1.1");
        assert_eq!(edge.dest, "1.2");
        assert!((edge.latency - 10.5).abs() < 1e-9);
        assert!(parse_node("1.1 -> 1.2 [label=\"R: 10.5 us\"]").is_none());
    }

    #[test]
    fn test_decode_record() {
        let decoded = DotTraceDecoder.decode(RECORD);
        assert_eq!(decoded.header.unwrap().local_id, 3);
        assert_eq!(decoded.nodes.len(), 3);
        assert_eq!(decoded.edges.len(), 2);
        assert_eq!(decoded.edge_name(&decoded.edges[0]), "e10__t3__A->B");
        assert_eq!(decoded.edge_name(&decoded.edges[1]), "B->C");
    }

    #[test]
    fn test_decode_stops_at_terminator() {
        let text = format!("{}  1.3 -> 1.1 [label=\"R: 1 us\"]\n", RECORD);
        let decoded = DotTraceDecoder.decode(&text);
        assert_eq!(decoded.edges.len(), 2);
    }

    #[test]
    fn test_decode_header_without_edges() {
        let decoded = DotTraceDecoder.decode("# 7  R: 123.45\nnot an edge\n}\n");
        assert_eq!(decoded.header.unwrap().local_id, 7);
        assert!(decoded.edges.is_empty());
    }

    #[test]
    fn test_terminator() {
        assert!(is_terminator("}"));
        assert!(is_terminator("  }\n"));
        assert!(!is_terminator("1.1 -> 1.2"));
    }
}
