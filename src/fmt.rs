/// Format a success rate as a percentage with two decimals: 66.67%
pub fn percent(val: f64) -> String {
    format!("{val:.2}%")
}

/// `1 row`, `3 rows`.
pub fn count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}
