use std::cmp::Ordering;

/// Separator between the segments of a branch path (`A-B-C`).
pub const SEPARATOR: char = '-';

/// Bijective base-26 label for `index`: 0 → `A`, 25 → `Z`, 26 → `AA`.
pub fn index_to_alpha(index: u64) -> String {
    let mut out = Vec::new();
    let mut n = index;
    loop {
        out.push(b'A' + (n % 26) as u8);
        n /= 26;
        if n == 0 {
            break;
        }
        n -= 1;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Inverse of [`index_to_alpha`]; `None` for anything but upper-case ASCII.
pub fn alpha_to_index(segment: &str) -> Option<u64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    let mut n: u64 = 0;
    for b in segment.bytes() {
        n = n.checked_mul(26)?.checked_add(u64::from(b - b'A' + 1))?;
    }
    Some(n - 1)
}

/// The segment following the highest well-formed one among `existing`.
///
/// Gaps left by deleted siblings are never refilled below the maximum, so
/// surviving labels keep their meaning.
pub fn next_segment<'a>(existing: impl IntoIterator<Item = &'a str>) -> String {
    existing
        .into_iter()
        .filter_map(alpha_to_index)
        .max()
        .map_or_else(|| index_to_alpha(0), |max| index_to_alpha(max + 1))
}

/// Last segment of a path, the part siblings are numbered by.
pub fn last_segment(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or(path)
}

pub fn child_path(parent: &str, segment: &str) -> String {
    format!("{parent}{SEPARATOR}{segment}")
}

/// Hierarchical order: segment by segment, numerically (`B` < `AA`), with a
/// parent before its descendants.
pub fn compare(a: &str, b: &str) -> Ordering {
    let key = |path: &str| -> Vec<(u64, String)> {
        path.split(SEPARATOR)
            .map(|seg| (alpha_to_index(seg).unwrap_or(u64::MAX), seg.to_string()))
            .collect()
    };
    key(a).cmp(&key(b))
}
