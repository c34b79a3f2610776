//! Joint influence limiting for skinned primitives
//!
//! The blend layouts hold a single `JOINTS_0` / `WEIGHTS_0` pair. Extra
//! influence sets are folded into it (strongest four, renormalized) or
//! dropped, depending on `all_vertex_influences`.

use glam::Vec4;
use std::collections::BTreeMap;
use tracing::warn;

use super::Stream;

/// Influences one vertex record can hold
pub const MAX_INFLUENCES: usize = 4;

fn influence_set(name: &str) -> Option<u32> {
    name.strip_prefix("JOINTS_")
        .or_else(|| name.strip_prefix("WEIGHTS_"))?
        .parse()
        .ok()
}

fn normalize(weights: Vec4) -> Vec4 {
    let sum = weights.element_sum();
    if sum > 0.0 { weights / sum } else { weights }
}

/// Reduce the influence sets of one primitive to `JOINTS_0` / `WEIGHTS_0`
///
/// `normalize_weights` renormalizes set 0 per vertex (four-bone layouts);
/// single-bone layouts keep their weight as given.
pub(crate) fn limit_influences(
    streams: &mut BTreeMap<String, Stream>,
    all_vertex_influences: bool,
    normalize_weights: bool,
    mesh: &str,
    primitive: usize,
) {
    let mut extra_sets: Vec<u32> = streams
        .keys()
        .filter_map(|name| influence_set(name))
        .filter(|&set| set > 0)
        .collect();
    extra_sets.sort_unstable();
    extra_sets.dedup();

    if !extra_sets.is_empty() {
        if all_vertex_influences {
            warn!(
                mesh,
                primitive,
                sets = extra_sets.len() + 1,
                "vertex layout holds one influence set, dropping the others"
            );
        } else {
            let influences = (extra_sets.len() + 1) * MAX_INFLUENCES;
            keep_strongest(streams, &extra_sets);
            warn!(
                mesh,
                primitive,
                influences,
                "more than {MAX_INFLUENCES} joint influences per vertex, keeping the strongest"
            );
        }
        for set in &extra_sets {
            streams.remove(&format!("JOINTS_{set}"));
            streams.remove(&format!("WEIGHTS_{set}"));
        }
    }

    if normalize_weights
        && !all_vertex_influences
        && let Some(weights) = streams.get_mut("WEIGHTS_0")
        && weights.components == MAX_INFLUENCES
    {
        for element in weights.data.chunks_exact_mut(MAX_INFLUENCES) {
            element.copy_from_slice(&normalize(Vec4::from_slice(element)).to_array());
        }
    }
}

/// Merge every influence set into set 0, keeping the four largest weights per vertex
fn keep_strongest(streams: &mut BTreeMap<String, Stream>, extra_sets: &[u32]) {
    let sets: Vec<(&Stream, &Stream)> = std::iter::once(0)
        .chain(extra_sets.iter().copied())
        .filter_map(|set| {
            Some((
                streams.get(&format!("JOINTS_{set}"))?,
                streams.get(&format!("WEIGHTS_{set}"))?,
            ))
        })
        .collect();
    let count = sets
        .iter()
        .map(|(joints, weights)| joints.count().min(weights.count()))
        .max()
        .unwrap_or(0);

    let mut joints = Vec::with_capacity(count * MAX_INFLUENCES);
    let mut weights = Vec::with_capacity(count * MAX_INFLUENCES);
    for vertex in 0..count {
        let mut influences: Vec<(f32, f32)> = sets
            .iter()
            .flat_map(|(j, w)| {
                j.element(vertex)
                    .iter()
                    .copied()
                    .zip(w.element(vertex).iter().copied())
            })
            .collect();
        influences.sort_by(|a, b| b.1.total_cmp(&a.1));
        influences.resize(MAX_INFLUENCES, (0.0, 0.0));

        let strongest = normalize(Vec4::new(
            influences[0].1,
            influences[1].1,
            influences[2].1,
            influences[3].1,
        ));
        joints.extend(influences.iter().map(|&(joint, _)| joint));
        weights.extend_from_slice(&strongest.to_array());
    }

    streams.insert("JOINTS_0".to_string(), Stream::new(MAX_INFLUENCES, joints));
    streams.insert("WEIGHTS_0".to_string(), Stream::new(MAX_INFLUENCES, weights));
}
