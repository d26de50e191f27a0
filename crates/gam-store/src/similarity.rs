//! Trigram text similarity, registered as a SQL scalar function.
//!
//! The memory-retrieval queries rank scratchpads with
//! `similarity(text, query)` in SQL, keeping the store contract of the
//! original trigram engine. The score is Jaccard over the 3-gram sets of
//! the lowercased inputs, padded so short strings still produce grams.

use std::collections::HashSet;

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

/// Score in `[0, 1]`: 1.0 for identical trigram sets, 0.0 for disjoint.
#[must_use]
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() && tb.is_empty() {
        return if a.trim().eq_ignore_ascii_case(b.trim()) && !a.trim().is_empty() {
            1.0
        } else {
            0.0
        };
    }
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    let total = ta.union(&tb).count();
    shared as f64 / total as f64
}

fn trigrams(text: &str) -> HashSet<[char; 3]> {
    let mut grams = HashSet::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        // Two leading pads and one trailing, per the usual trigram scheme.
        let padded: Vec<char> = std::iter::repeat(' ')
            .take(2)
            .chain(word.chars().flat_map(char::to_lowercase))
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            grams.insert([window[0], window[1], window[2]]);
        }
    }
    grams
}

/// Register `similarity(a, b)` on a connection. Null arguments score 0.
pub fn register_similarity(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "similarity",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a: Option<String> = ctx.get(0)?;
            let b: Option<String> = ctx.get(1)?;
            Ok(match (a, b) {
                (Some(a), Some(b)) => trigram_similarity(&a, &b),
                _ => 0.0,
            })
        },
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
