//! Edit distance over re-cleaned strings.
//!
//! Distances are computed on [`clean_for_distance`] output so that grouping is
//! insensitive to punctuation and spacing the normalizer may not have seen
//! (callers can pass raw or normalized text alike). Word boundaries do not
//! count: `"aperto de"` is compared as `"apertode"`.

/// Lower-case and drop every character that is not alphanumeric.
pub fn clean_for_distance(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Classic Levenshtein distance over `char`s (insert/delete/substitute = 1,
/// no transposition).
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two DP rows: distances between `a[..i]` and `b[..j]`.
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr: Vec<usize> = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Edit distance after cleaning both sides.
pub fn edit_distance(a: &str, b: &str) -> usize {
    levenshtein(&clean_for_distance(a), &clean_for_distance(b))
}

/// `edit_distance(a, b) <= max_dist`, with an early exit once every cell of a
/// DP row exceeds the bound.
pub fn within_distance(a: &str, b: &str, max_dist: usize) -> bool {
    let a: Vec<char> = clean_for_distance(a).chars().collect();
    let b: Vec<char> = clean_for_distance(b).chars().collect();
    if a.len().abs_diff(b.len()) > max_dist {
        return false;
    }
    if a.is_empty() || b.is_empty() {
        return a.len().max(b.len()) <= max_dist;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr: Vec<usize> = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            let d = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
            curr[j + 1] = d;
            row_min = row_min.min(d);
        }
        if row_min > max_dist {
            return false;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()] <= max_dist
}

/// `1 - edit_distance / max(len)`, in `[0, 1]`; two empty strings are `1.0`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = clean_for_distance(a);
    let b = clean_for_distance(b);
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}
