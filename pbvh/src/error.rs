// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Validation errors for primitive sources.
//!
//! Only source construction can fail. Once a source exists, building and querying a tree
//! never returns errors; broken tree invariants are debug assertions.

use core::fmt;

/// Error returned when source attributes are inconsistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceError {
    /// An attribute array does not have one entry per element.
    AttributeLength {
        /// Which attribute.
        attribute: &'static str,
        /// Required length.
        expected: usize,
        /// Provided length.
        actual: usize,
    },
    /// A topology array references a vertex that does not exist.
    VertexOutOfRange {
        /// The offending vertex index.
        vertex: u32,
        /// Number of vertices.
        vertex_count: usize,
    },
    /// A polygon has fewer than three corners, or its offsets decrease or run past the corner
    /// array.
    InvalidPolygon {
        /// Polygon index.
        face: usize,
    },
    /// Grid side length must be at least 2.
    InvalidGridSize {
        /// The rejected side length.
        grid_size: usize,
    },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttributeLength {
                attribute,
                expected,
                actual,
            } => write!(
                f,
                "attribute `{attribute}` has {actual} entries, expected {expected}"
            ),
            Self::VertexOutOfRange {
                vertex,
                vertex_count,
            } => write!(
                f,
                "vertex index {vertex} out of range for {vertex_count} vertices"
            ),
            Self::InvalidPolygon { face } => {
                write!(f, "polygon {face} has fewer than 3 corners or invalid offsets")
            }
            Self::InvalidGridSize { grid_size } => {
                write!(f, "grid size {grid_size} is smaller than 2")
            }
        }
    }
}

impl core::error::Error for SourceError {}

pub(crate) fn check_len(
    attribute: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), SourceError> {
    if expected == actual {
        Ok(())
    } else {
        Err(SourceError::AttributeLength {
            attribute,
            expected,
            actual,
        })
    }
}

pub(crate) fn check_verts(verts: &[u32], vertex_count: usize) -> Result<(), SourceError> {
    match verts.iter().find(|&&v| v as usize >= vertex_count) {
        Some(&vertex) => Err(SourceError::VertexOutOfRange {
            vertex,
            vertex_count,
        }),
        None => Ok(()),
    }
}
