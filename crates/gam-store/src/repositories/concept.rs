//! Concepts and their region assignments.
//!
//! The governing-concept query is the ancestor walk: a concept governs a
//! region when any ancestor (inclusive) of that region carries an
//! assignment.

use rusqlite::{params, Connection, OptionalExtension};

use gam_core::concept::{AssignmentRole, Concept, ConceptSpec, Invariant, StateMachine};
use gam_core::ids::ConceptId;

use crate::errors::{Result, StoreError};
use crate::repositories::{ancestor_of, now_iso, parse_iso};

/// Concept repository.
pub struct ConceptRepository;

impl ConceptRepository {
    /// Insert or update a concept by name.
    pub fn upsert(
        conn: &Connection,
        name: &str,
        purpose: &str,
        spec: &ConceptSpec,
        state_machine: &StateMachine,
        invariants: &[Invariant],
    ) -> Result<Concept> {
        let now = now_iso();
        conn.execute(
            "INSERT INTO concepts (id, name, purpose, spec, state_machine, invariants, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(name) DO UPDATE SET
                 purpose = excluded.purpose,
                 spec = excluded.spec,
                 state_machine = excluded.state_machine,
                 invariants = excluded.invariants,
                 updated_at = excluded.updated_at",
            params![
                ConceptId::new().as_str(),
                name,
                purpose,
                serde_json::to_string(spec)?,
                serde_json::to_string(state_machine)?,
                serde_json::to_string(invariants)?,
                now,
            ],
        )?;
        Self::get_by_name(conn, name)?.ok_or_else(|| StoreError::not_found("Concept", name))
    }

    /// Fetch a concept by name.
    pub fn get_by_name(conn: &Connection, name: &str) -> Result<Option<Concept>> {
        let row = conn
            .query_row(
                "SELECT id, name, purpose, spec, state_machine, invariants, created_at, updated_at
                 FROM concepts WHERE name = ?1",
                params![name],
                concept_from_row,
            )
            .optional()?;
        row.transpose()
    }

    /// All concepts ordered by name.
    pub fn list(conn: &Connection) -> Result<Vec<Concept>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, purpose, spec, state_machine, invariants, created_at, updated_at
             FROM concepts ORDER BY name",
        )?;
        let rows = stmt.query_map([], concept_from_row)?;
        let mut concepts = Vec::new();
        for row in rows {
            concepts.push(row??);
        }
        Ok(concepts)
    }

    /// Assign a concept to a region with a role. Idempotent.
    pub fn assign(
        conn: &Connection,
        concept_name: &str,
        region_path: &str,
        role: AssignmentRole,
    ) -> Result<()> {
        let concept_id: Option<String> = conn
            .query_row(
                "SELECT id FROM concepts WHERE name = ?1",
                params![concept_name],
                |row| row.get(0),
            )
            .optional()?;
        let concept_id =
            concept_id.ok_or_else(|| StoreError::not_found("Concept", concept_name))?;

        let region_id: Option<String> = conn
            .query_row(
                "SELECT id FROM regions WHERE path = ?1",
                params![region_path],
                |row| row.get(0),
            )
            .optional()?;
        let region_id = region_id.ok_or_else(|| StoreError::not_found("Region", region_path))?;

        conn.execute(
            "INSERT INTO concept_region_assignments (concept_id, region_id, role)
             VALUES (?1, ?2, ?3)
             ON CONFLICT DO NOTHING",
            params![concept_id, region_id, role.as_str()],
        )?;
        Ok(())
    }

    /// Concepts governing `region_path`: the union over its ancestors
    /// (inclusive) of assigned concepts, ordered by name.
    pub fn governing(conn: &Connection, region_path: &str) -> Result<Vec<Concept>> {
        let sql = format!(
            "SELECT DISTINCT c.id, c.name, c.purpose, c.spec, c.state_machine, c.invariants,
                    c.created_at, c.updated_at
             FROM regions r
             JOIN concept_region_assignments cra ON cra.region_id = r.id
             JOIN concepts c ON c.id = cra.concept_id
             WHERE {}
             ORDER BY c.name",
            ancestor_of("r.path", "?1")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![region_path], concept_from_row)?;
        let mut concepts = Vec::new();
        for row in rows {
            concepts.push(row??);
        }
        Ok(concepts)
    }

    /// `(concept_name, role)` pairs assigned at or above `region_path`.
    pub fn governing_roles(
        conn: &Connection,
        region_path: &str,
    ) -> Result<Vec<(String, AssignmentRole)>> {
        let sql = format!(
            "SELECT DISTINCT c.name, cra.role
             FROM regions r
             JOIN concept_region_assignments cra ON cra.region_id = r.id
             JOIN concepts c ON c.id = cra.concept_id
             WHERE {}
             ORDER BY c.name",
            ancestor_of("r.path", "?1")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![region_path], |row| {
                let role: String = row.get(1)?;
                Ok((row.get::<_, String>(0)?, AssignmentRole::parse(&role)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Whether a concept declares `action` in its spec.
    pub fn action_exists(conn: &Connection, concept_name: &str, action: &str) -> Result<bool> {
        Ok(Self::get_by_name(conn, concept_name)?
            .is_some_and(|c| c.spec.has_action(action)))
    }

    /// Whether a concept declares state component `field` in its spec.
    pub fn state_field_exists(conn: &Connection, concept_name: &str, field: &str) -> Result<bool> {
        Ok(Self::get_by_name(conn, concept_name)?
            .is_some_and(|c| c.spec.has_state_field(field)))
    }
}

fn concept_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Concept>> {
    let spec_json: String = row.get(3)?;
    let sm_json: String = row.get(4)?;
    let inv_json: String = row.get(5)?;
    let created: String = row.get(6)?;
    let updated: String = row.get(7)?;

    let build = || -> Result<Concept> {
        Ok(Concept {
            id: ConceptId::from(row.get::<_, String>(0)?),
            name: row.get(1)?,
            purpose: row.get(2)?,
            spec: serde_json::from_str(&spec_json)?,
            state_machine: serde_json::from_str(&sm_json)?,
            invariants: serde_json::from_str(&inv_json)?,
            created_at: parse_iso(&created),
            updated_at: parse_iso(&updated),
        })
    };
    Ok(build())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
