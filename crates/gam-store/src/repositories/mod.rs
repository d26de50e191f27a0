//! SQL data access layer.
//!
//! All methods take a `&Connection` and are stateless — pure translation
//! between domain types and SQL. Callers borrow a connection from the
//! pool (or run inside a transaction) and pass it down, so one approval
//! can span several repositories atomically.

pub mod concept;
pub mod flow;
pub mod plan;
pub mod proposal;
pub mod quality;
pub mod region;
pub mod sync;
pub mod turn;

pub use concept::ConceptRepository;
pub use flow::FlowRepository;
pub use plan::PlanRepository;
pub use proposal::ProposalRepository;
pub use quality::QualityRepository;
pub use region::RegionRepository;
pub use sync::SyncRepository;
pub use turn::TurnRepository;

use chrono::{DateTime, Utc};

/// Current UTC timestamp as an ISO-8601 string (second resolution).
/// Fixed-width UTC strings compare correctly in SQL.
#[must_use]
pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Format an arbitrary instant the way [`now_iso`] does.
#[must_use]
pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parse a stored timestamp; epoch on malformed input.
#[must_use]
pub fn parse_iso(s: &str) -> DateTime<Utc> {
    s.parse().unwrap_or_default()
}

/// SQL predicate: the row's `column` is an ancestor (inclusive) of the
/// path expression `param` (a placeholder or another column).
#[must_use]
pub fn ancestor_of(column: &str, param: &str) -> String {
    format!("({column} = {param} OR {param} LIKE {column} || '.%')")
}

/// SQL predicate: the row's `column` is a descendant (inclusive) of the
/// path expression `param` (a placeholder or another column).
#[must_use]
pub fn descendant_of(column: &str, param: &str) -> String {
    format!("({column} = {param} OR {column} LIKE {param} || '.%')")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_roundtrip() {
        let now = Utc::now();
        let parsed = parse_iso(&to_iso(now));
        assert_eq!(parsed.timestamp(), now.timestamp());
    }

    #[test]
    fn malformed_timestamp_parses_to_epoch() {
        assert_eq!(parse_iso("not-a-time").timestamp(), 0);
    }

    #[test]
    fn path_predicates_compose() {
        let conn = testutil::setup_conn();
        conn.execute_batch(
            "INSERT INTO regions (id, path, lifecycle_state, created_at, updated_at)
             VALUES ('r1', 'app', 'draft', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z'),
                    ('r2', 'app.search', 'draft', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z'),
                    ('r3', 'app.search.sources', 'draft', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z'),
                    ('r4', 'apparel', 'draft', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z');",
        )
        .unwrap();

        let sql = format!(
            "SELECT COUNT(*) FROM regions r WHERE {}",
            ancestor_of("r.path", "?1")
        );
        let ancestors: u32 = conn
            .query_row(&sql, ["app.search.sources"], |row| row.get(0))
            .unwrap();
        // app, app.search, app.search.sources — but never apparel.
        assert_eq!(ancestors, 3);

        let sql = format!(
            "SELECT COUNT(*) FROM regions r WHERE {}",
            descendant_of("r.path", "?1")
        );
        let descendants: u32 = conn.query_row(&sql, ["app.search"], |row| row.get(0)).unwrap();
        assert_eq!(descendants, 2);
    }
}
