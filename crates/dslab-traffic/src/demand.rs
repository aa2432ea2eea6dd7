//! Origin-destination demand.

use crate::error::NetworkError;
use crate::node::NodeId;

/// Sparse square table of trips between nodes.
///
/// Only positive entries are stored, zero demand means no trips. Indices are 0-based.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DemandMatrix {
    rows: Vec<Vec<(NodeId, f64)>>,
}

impl DemandMatrix {
    /// Creates a matrix without trips.
    pub fn new(node_count: usize) -> Self {
        Self {
            rows: vec![Vec::new(); node_count],
        }
    }

    /// Creates a matrix from dense rows, `rows[origin][destination]`.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, NetworkError> {
        let mut matrix = Self::new(rows.len());
        for (origin, row) in rows.iter().enumerate() {
            if row.len() != rows.len() {
                return Err(NetworkError::DemandSize {
                    rows: row.len(),
                    expected: rows.len(),
                });
            }
            for (destination, &value) in row.iter().enumerate() {
                matrix.set(origin, destination, value)?;
            }
        }
        Ok(matrix)
    }

    /// Number of rows and columns.
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Sets the demand between two nodes, replacing the previous value.
    ///
    /// Demand of an origin to itself is ignored.
    pub fn set(&mut self, origin: NodeId, destination: NodeId, value: f64) -> Result<(), NetworkError> {
        let size = self.size();
        for node in [origin, destination] {
            if node >= size {
                return Err(NetworkError::InvalidNode {
                    node: node + 1,
                    node_count: size,
                });
            }
        }
        if !(value.is_finite() && value >= 0.) {
            return Err(NetworkError::InvalidDemand {
                origin: origin + 1,
                destination: destination + 1,
                value,
            });
        }
        let row = &mut self.rows[origin];
        match row.binary_search_by_key(&destination, |(dest, _)| *dest) {
            Ok(pos) => {
                if value > 0. && origin != destination {
                    row[pos].1 = value;
                } else {
                    row.remove(pos);
                }
            }
            Err(pos) => {
                if value > 0. && origin != destination {
                    row.insert(pos, (destination, value));
                }
            }
        }
        Ok(())
    }

    /// Returns the demand between two nodes.
    pub fn get(&self, origin: NodeId, destination: NodeId) -> f64 {
        self.rows
            .get(origin)
            .and_then(|row| {
                row.binary_search_by_key(&destination, |(dest, _)| *dest)
                    .ok()
                    .map(|pos| row[pos].1)
            })
            .unwrap_or(0.)
    }

    /// Destinations with positive demand from the origin, in increasing order.
    pub fn destinations(&self, origin: NodeId) -> &[(NodeId, f64)] {
        self.rows.get(origin).map(|row| row.as_slice()).unwrap_or(&[])
    }

    /// Origins with positive demand to at least one destination.
    pub fn origins(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !row.is_empty())
            .map(|(origin, _)| origin)
    }

    /// Total demand of the origin.
    pub fn origin_total(&self, origin: NodeId) -> f64 {
        self.destinations(origin).iter().map(|(_, value)| value).sum()
    }

    /// Total number of trips.
    pub fn total(&self) -> f64 {
        (0..self.size()).map(|origin| self.origin_total(origin)).sum()
    }
}
