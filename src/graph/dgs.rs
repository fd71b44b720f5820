//! DGS export.
//!
//! Line syntax consumed by the external viewer:
//!
//! ```text
//! DGS004
//! <graph_name> 0 0
//! an "p<id>" label:"<name>" team:"<team>" nationality:"<nat>" position:"<pos>" birth_date:"<date>"
//! ae "e_p<a>_p<b>" "p<a>" "p<b>" weight:<w>
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::{Edge, GraphError, GraphSnapshot, NodeAttributes};

const HEADER: &str = "DGS004";

/// Backslash-escape `\` and `"` so a value fits inside quotes
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '"') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// The header carries the name as a bare token
pub fn validate_graph_name(name: &str) -> Result<(), GraphError> {
    let bad = |c: char| c.is_whitespace() || c.is_control() || c == '"';
    if name.is_empty() || name.chars().any(bad) {
        return Err(GraphError::InvalidGraphName(name.to_string()));
    }
    Ok(())
}

fn node_line(node: &NodeAttributes) -> String {
    let attr = |v: &Option<String>| escape(v.as_deref().unwrap_or(""));
    format!(
        "an \"p{}\" label:\"{}\" team:\"{}\" nationality:\"{}\" position:\"{}\" birth_date:\"{}\"",
        node.id,
        escape(&node.label),
        attr(&node.team),
        attr(&node.nationality),
        attr(&node.position),
        attr(&node.birth_date),
    )
}

fn edge_line(edge: &Edge) -> String {
    format!(
        "ae \"e_p{a}_p{b}\" \"p{a}\" \"p{b}\" weight:{w}",
        a = edge.a,
        b = edge.b,
        w = edge.weight
    )
}

/// Write the snapshot; nodes by ascending id, edges by ascending `(a, b)`
pub fn write_dgs<W: Write>(
    out: &mut W,
    graph_name: &str,
    snapshot: &GraphSnapshot,
) -> io::Result<()> {
    validate_graph_name(graph_name)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let mut nodes: Vec<&NodeAttributes> = snapshot.nodes.iter().collect();
    nodes.sort_by_key(|n| n.id);
    let mut edges: Vec<&Edge> = snapshot.edges.iter().collect();
    edges.sort_by_key(|e| (e.a, e.b));

    writeln!(out, "{}", HEADER)?;
    writeln!(out, "{} 0 0", graph_name)?;
    for node in nodes {
        writeln!(out, "{}", node_line(node))?;
    }
    for edge in edges {
        writeln!(out, "{}", edge_line(edge))?;
    }
    out.flush()
}

/// Write the export to `path`, creating parent directories
pub fn export_to_path(
    path: &Path,
    graph_name: &str,
    snapshot: &GraphSnapshot,
) -> Result<(), GraphError> {
    validate_graph_name(graph_name)?;

    let io_err = |source| GraphError::Export {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = File::create(path).map_err(io_err)?;
    let mut out = BufWriter::new(file);
    write_dgs(&mut out, graph_name, snapshot).map_err(io_err)
}
