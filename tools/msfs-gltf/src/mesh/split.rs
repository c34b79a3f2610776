//! Index splitting
//!
//! The simulator reads 16-bit indices and rejects the restart value, so no
//! primitive may address a vertex more than `threshold` past its
//! `BaseVertexIndex`. Triangles are grouped greedily: each round rebases the
//! remaining triangles on their smallest index and keeps every triangle that
//! fits; the rest move on to the next round. Triangles are never split.

use tracing::debug;

use crate::error::SplitError;

/// Swap the first and last index of every triangle
///
/// Flips front faces for the simulator's handedness. Index values are
/// unchanged, only their order.
pub fn reverse_winding(indices: &mut [u32]) {
    for triangle in indices.chunks_exact_mut(3) {
        triangle.swap(0, 2);
    }
}

/// Group of triangles addressable with 16-bit indices from a common base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexChunk {
    /// Added to every index to recover the source index
    pub base_vertex_index: u32,
    pub indices: Vec<u16>,
}

impl IndexChunk {
    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }

    /// Largest source index addressed by this chunk
    pub fn max_source_index(&self) -> Option<u32> {
        self.source_indices().max()
    }

    /// Source indices (index + base), in order
    pub fn source_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.indices
            .iter()
            .map(move |&i| i as u32 + self.base_vertex_index)
    }
}

/// Partition a triangle list into chunks whose rebased indices stay `<= threshold`
///
/// A list already within the threshold yields one chunk with base 0.
/// `threshold` must not exceed `u16::MAX`.
pub fn split_indices(indices: &[u32], threshold: u32) -> Result<Vec<IndexChunk>, SplitError> {
    if indices.len() % 3 != 0 {
        return Err(SplitError::PartialTriangle(indices.len()));
    }

    let mut remaining: Vec<[u32; 3]> = indices
        .chunks_exact(3)
        .map(|t| [t[0], t[1], t[2]])
        .collect();
    let mut chunks = Vec::new();

    while !remaining.is_empty() {
        let max = remaining.iter().flatten().copied().max().unwrap_or(0);
        let min = remaining.iter().flatten().copied().min().unwrap_or(0);
        let base = if max <= threshold { 0 } else { min };

        let (fits, rest): (Vec<[u32; 3]>, Vec<[u32; 3]>) = remaining
            .into_iter()
            .partition(|t| t.iter().all(|&i| i - base <= threshold));

        if fits.is_empty() {
            // The triangle holding the minimum index spans past the threshold on its own
            let [a, b, c] = rest
                .iter()
                .copied()
                .find(|t| t.contains(&base))
                .unwrap_or(rest[0]);
            return Err(SplitError::UnsplittableTriangle { a, b, c, threshold });
        }

        chunks.push(IndexChunk {
            base_vertex_index: base,
            indices: fits.iter().flatten().map(|&i| (i - base) as u16).collect(),
        });
        remaining = rest;
    }

    if chunks.len() > 1 {
        debug!(chunks = chunks.len(), threshold, "split primitive indices");
    }

    Ok(chunks)
}
