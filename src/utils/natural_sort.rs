//! Numeric-aware filename ordering
//!
//! Digit runs compare as numbers of arbitrary width, so `frame9` sorts before
//! `frame10` and zero padding does not matter (`f007` == `f7` numerically,
//! ties broken by the raw text to keep the order total).

use regex::Regex;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::LazyLock;

static CHUNK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+|\D+").expect("static regex"));

/// Compare two strings treating embedded digit runs as numbers.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = CHUNK_RE.find_iter(a).map(|m| m.as_str());
    let mut right = CHUNK_RE.find_iter(b).map(|m| m.as_str());

    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (is_digits(l), is_digits(r)) {
                    (true, true) => cmp_digit_runs(l, r),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Compare two paths by file name (falls back to the full path text).
pub fn natural_cmp_paths(a: &Path, b: &Path) -> Ordering {
    let name = |p: &Path| {
        p.file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| p.to_string_lossy().into_owned())
    };
    natural_cmp(&name(a), &name(b)).then_with(|| a.cmp(b))
}

fn is_digits(s: &str) -> bool {
    s.as_bytes().first().is_some_and(u8::is_ascii_digit)
}

/// Compare digit runs without parsing, so runs longer than u64 still order correctly
fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
