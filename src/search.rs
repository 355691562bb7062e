use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::record::Record;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Column id of the text field the index is keyed on.
    pub key: String,
    /// Highest accepted score. 0.0 only accepts exact matches at the start of the text.
    pub threshold: f64,
    /// How many characters a match may drift from the start of the text before it
    /// costs a full point. 0 ignores the match position.
    pub distance: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            key: "name".to_string(),
            threshold: 0.3,
            distance: 100,
        }
    }
}

/// Approximate match index over one text field of the record store.
///
/// The index keeps a lower-cased copy of the key field of every record and is
/// built once; the store does not change during a session.
pub struct SearchIndex {
    keys: Vec<Vec<char>>,
    options: SearchOptions,
}

impl SearchIndex {
    pub fn new(records: &[Record], options: SearchOptions) -> Self {
        let start_time = Instant::now();
        let keys: Vec<Vec<char>> = records
            .par_iter()
            .map(|r| {
                r.display(&options.key)
                    .unwrap_or_default()
                    .to_lowercase()
                    .chars()
                    .collect()
            })
            .collect();
        debug!(
            "Built search index on \"{}\" over {} records in {}ms",
            options.key,
            keys.len(),
            start_time.elapsed().as_millis()
        );
        Self { keys, options }
    }

    /// Record indices matching `query`, best match first. Equal scores keep
    /// store order. An empty query is not a search and yields the whole store.
    pub fn search(&self, query: &str) -> Vec<usize> {
        let query: Vec<char> = query.trim().to_lowercase().chars().collect();
        if query.is_empty() {
            return (0..self.keys.len()).collect();
        }

        let mut scored: Vec<(usize, f64)> = self
            .keys
            .iter()
            .enumerate()
            .filter_map(|(idx, key)| {
                let score = self.score(&query, key);
                (score <= self.options.threshold).then_some((idx, score))
            })
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        trace!(
            "Search \"{}\" matched {}/{} records",
            query.iter().collect::<String>(),
            scored.len(),
            self.keys.len()
        );
        scored.into_iter().map(|(idx, _)| idx).collect()
    }

    // Best score over all windows of `text` close to the query length. A window
    // costs its edit distance relative to the query length plus its start
    // position relative to `distance`.
    fn score(&self, query: &[char], text: &[char]) -> f64 {
        let qlen = query.len();
        let pattern: String = query.iter().collect();
        let mut best = f64::INFINITY;

        for wlen in [qlen.saturating_sub(1).max(1), qlen, qlen + 1] {
            if text.len() <= wlen {
                let window: String = text.iter().collect();
                let errors = strsim::levenshtein(&pattern, &window);
                best = best.min(errors as f64 / qlen as f64);
                continue;
            }
            for start in 0..=(text.len() - wlen) {
                let proximity = self.proximity(start);
                if proximity >= best {
                    break;
                }
                let window: String = text[start..start + wlen].iter().collect();
                let errors = strsim::levenshtein(&pattern, &window);
                best = best.min(errors as f64 / qlen as f64 + proximity);
                if best == 0.0 {
                    return best;
                }
            }
        }
        best
    }

    fn proximity(&self, start: usize) -> f64 {
        if self.options.distance == 0 {
            0.0
        } else {
            start as f64 / self.options.distance as f64
        }
    }
}
