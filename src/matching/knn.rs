//! Two-nearest-neighbor descriptor matching with the ratio test

use super::detect::Descriptor;

/// A candidate is kept only if its distance is below this fraction of the runner-up's
pub const RATIO_TEST: f32 = 0.75;

/// Correspondence between a query descriptor and a train descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
}

pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Best and second-best train descriptor for every query descriptor.
///
/// Each entry holds at most two matches, nearest first; earlier train
/// indices win ties.
pub fn knn2(query: &[Descriptor], train: &[Descriptor]) -> Vec<Vec<Match>> {
    query
        .iter()
        .enumerate()
        .map(|(qi, q)| {
            let mut best: Option<Match> = None;
            let mut second: Option<Match> = None;

            for (ti, t) in train.iter().enumerate() {
                let candidate = Match {
                    query: qi,
                    train: ti,
                    distance: hamming(q, t),
                };
                if best.is_none_or(|b| candidate.distance < b.distance) {
                    second = best;
                    best = Some(candidate);
                } else if second.is_none_or(|s| candidate.distance < s.distance) {
                    second = Some(candidate);
                }
            }

            best.into_iter().chain(second).collect()
        })
        .collect()
}

/// Keep the nearest neighbor of each candidate list that clearly beats the runner-up
pub fn ratio_filter(candidates: &[Vec<Match>], ratio: f32) -> Vec<Match> {
    candidates
        .iter()
        .filter_map(|c| match c.as_slice() {
            [m, n, ..] if (m.distance as f32) < ratio * n.distance as f32 => Some(*m),
            _ => None,
        })
        .collect()
}

pub fn match_descriptors(query: &[Descriptor], train: &[Descriptor]) -> Vec<Match> {
    ratio_filter(&knn2(query, train), RATIO_TEST)
}
