//! Text similarity for the golden-answer short-circuit.
//!
//! `ratio` is the Ratcliff/Obershelp measure: `2*M / (len_a + len_b)` where
//! `M` is the total length of the matching blocks found by recursively
//! taking the longest common substring. Inputs are expected to go through
//! `normalize` first so punctuation and casing differences do not count
//! against the learner.

use std::collections::HashMap;

/// Lowercase, strip everything but alphanumerics to spaces, collapse runs
/// of whitespace.
pub fn normalize(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity ratio in `[0.0, 1.0]`. Two empty strings are identical (1.0).
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let matches = match_size(&a, &b, 0, a.len(), 0, b.len());
    2.0 * matches as f64 / (a.len() + b.len()) as f64
}

/// Total matched length over `a[alo..ahi]` vs `b[blo..bhi]`.
///
/// Explicit worklist rather than recursion: the number of matching blocks
/// is unbounded in the input length, and learner submissions can be long.
fn match_size(a: &[char], b: &[char], alo: usize, ahi: usize, blo: usize, bhi: usize) -> usize {
    let mut total = 0;
    let mut queue = vec![(alo, ahi, blo, bhi)];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = find_longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        total += k;
        queue.push((alo, i, blo, j));
        queue.push((i + k, ahi, j + k, bhi));
    }
    total
}

/// Longest matching block in `a[alo..ahi]` x `b[blo..bhi]`; earliest on ties.
fn find_longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, &c) in b.iter().enumerate().take(bhi).skip(blo) {
        b2j.entry(c).or_default().push(j);
    }

    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0usize);
    let mut j2len: HashMap<usize, usize> = HashMap::new();

    for i in alo..ahi {
        let mut new_j2len: HashMap<usize, usize> = HashMap::new();
        if let Some(indices) = b2j.get(&a[i]) {
            for &j in indices {
                let k = if j == blo {
                    1
                } else {
                    j2len.get(&(j - 1)).copied().unwrap_or(0) + 1
                };
                new_j2len.insert(j, k);
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
            }
        }
        j2len = new_j2len;
    }

    (best_i, best_j, best_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_strings() {
        assert!((ratio("correlation is not causation", "correlation is not causation") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_strings() {
        assert!((ratio("", "") - 1.0).abs() < 1e-9);
        assert!((ratio("abc", "") - 0.0).abs() < 1e-9);
        assert!((ratio("", "abc") - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_known_ratio_value() {
        // "bcd" matches out of 4+4 characters: 2*3/8.
        assert!((ratio("abcd", "bcde") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_strings() {
        assert!((ratio("aaaa", "bbbb") - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_strips_punctuation_and_case() {
        assert_eq!(
            normalize("  Correlation, does NOT imply... causation!  "),
            "correlation does not imply causation"
        );
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("a\t b\n\nc"), "a b c");
    }

    #[test]
    fn test_ratio_survives_many_single_char_blocks() {
        // Every matching block has length 1, so the block count (and the
        // worklist) scales with the input; a multi-kilobyte submission
        // must score without blowing the stack.
        let a: String = (0..2000u32)
            .map(|i| char::from_u32(0x4E00 + i).unwrap())
            .collect();
        let b: String = a.chars().flat_map(|c| [c, '|']).collect();
        // 2000 matched chars over 2000 + 4000 total.
        assert!((ratio(&a, &b) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_close_paraphrase_clears_threshold() {
        let golden = normalize("A confounder is related to both variables and creates a false impression of a relationship.");
        let learner = normalize("A confounder is related to both variables and creates a false impression of a relationship");
        assert!(ratio(&learner, &golden) >= 0.8);
    }

    #[test]
    fn test_unrelated_answer_stays_below_threshold() {
        let golden = normalize("Correlation describes the strength and direction of a relationship between two variables.");
        let learner = normalize("I like trains.");
        assert!(ratio(&learner, &golden) < 0.8);
    }
}
