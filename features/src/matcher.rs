use crate::descriptor::Descriptors;
use pano_core::{FeatureMatch, Matches};

/// Brute-force Hamming matcher with optional Lowe ratio test and
/// cross-check filtering.
pub struct Matcher {
    cross_check: bool,
    ratio_threshold: Option<f32>,
}

impl Matcher {
    pub fn new() -> Self {
        Self {
            cross_check: false,
            ratio_threshold: None,
        }
    }

    pub fn with_cross_check(mut self) -> Self {
        self.cross_check = true;
        self
    }

    pub fn with_ratio_test(mut self, threshold: f32) -> Self {
        self.ratio_threshold = Some(threshold);
        self
    }

    pub fn match_descriptors(&self, query: &Descriptors, train: &Descriptors) -> Matches {
        let mut matches = Matches::with_capacity(query.len());

        for (query_idx, q_desc) in query.iter().enumerate() {
            let mut best: Option<(usize, u32)> = None;
            let mut second_best: Option<u32> = None;

            for (train_idx, t_desc) in train.iter().enumerate() {
                let distance = q_desc.hamming_distance(t_desc);
                match best {
                    None => best = Some((train_idx, distance)),
                    Some((_, best_dist)) => {
                        if distance < best_dist {
                            second_best = Some(best_dist);
                            best = Some((train_idx, distance));
                        } else if second_best.map_or(true, |s| distance < s) {
                            second_best = Some(distance);
                        }
                    }
                }
            }

            let Some((train_idx, distance)) = best else {
                continue;
            };

            if let (Some(threshold), Some(second)) = (self.ratio_threshold, second_best) {
                if second > 0 && distance as f32 / second as f32 > threshold {
                    continue;
                }
            }

            if self.cross_check && best_train_for(train, query, train_idx) != Some(query_idx) {
                continue;
            }

            matches.push(FeatureMatch::new(query_idx, train_idx, distance as f32));
        }

        matches
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

fn best_train_for(query: &Descriptors, train: &Descriptors, query_idx: usize) -> Option<usize> {
    let q_desc = &query.descriptors[query_idx];
    let mut best: Option<(usize, u32)> = None;
    for (train_idx, t_desc) in train.iter().enumerate() {
        let distance = q_desc.hamming_distance(t_desc);
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((train_idx, distance));
        }
    }
    best.map(|(idx, _)| idx)
}
