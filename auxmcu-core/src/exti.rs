//! External edge trigger setup

use crate::hal::{Edge, EdgeInterrupts, EdgeLine};

/// Edge sensitivity of each external line
pub const fn edge_for(line: EdgeLine) -> Edge {
    match line {
        // Reset button release
        EdgeLine::ResetDetect => Edge::Rising,
        // Chip-select changes in either direction
        EdgeLine::BusSelect => Edge::Both,
    }
}

/// Configure and enable both external lines
pub fn configure_edge_triggers<E: EdgeInterrupts>(edges: &mut E) -> Result<(), E::Error> {
    for line in [EdgeLine::ResetDetect, EdgeLine::BusSelect] {
        edges.configure_edge(line, edge_for(line))?;
        edges.enable_line(line, true)?;
    }
    Ok(())
}
