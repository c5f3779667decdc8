//! Core index types for the magnetic network.

use std::fmt;

/// A node of the magnetic network (carries a scalar magnetic potential).
/// Node 0 is always the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The reference node (always index 0).
    pub const GROUND: NodeId = NodeId(0);

    /// Check if this is the reference node.
    pub fn is_ground(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ground() {
            write!(f, "GND")
        } else {
            write!(f, "N{}", self.0)
        }
    }
}

/// Index of a material region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub usize);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Index of an extra unknown: the terminal current of a voltage-driven coil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchId(pub usize);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

/// Variable index in the solution vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarIndex {
    /// Magnetic scalar potential of a node
    Potential(NodeId),
    /// Coil terminal current
    Current(BranchId),
}

impl VarIndex {
    /// Get the raw index into the solution vector.
    /// Potentials come first (excluding the reference node), then currents.
    pub fn to_index(&self, num_nodes: usize) -> usize {
        match self {
            VarIndex::Potential(NodeId(n)) => {
                debug_assert!(*n > 0, "Reference node is not in the solution vector");
                n - 1
            }
            VarIndex::Current(BranchId(b)) => (num_nodes - 1) + b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_index_layout() {
        assert_eq!(VarIndex::Potential(NodeId(1)).to_index(4), 0);
        assert_eq!(VarIndex::Potential(NodeId(3)).to_index(4), 2);
        assert_eq!(VarIndex::Current(BranchId(0)).to_index(4), 3);
        assert_eq!(VarIndex::Current(BranchId(2)).to_index(4), 5);
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeId::GROUND.to_string(), "GND");
        assert_eq!(NodeId(2).to_string(), "N2");
        assert_eq!(BranchId(1).to_string(), "I1");
    }
}
