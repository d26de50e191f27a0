//! Region rows: the store mirror of the architecture manifest.

use rusqlite::{params, Connection, OptionalExtension};

use gam_core::ids::RegionId;
use gam_core::region::{LifecycleState, Region};

use crate::errors::{Result, StoreError};
use crate::repositories::{now_iso, parse_iso};

/// Region repository.
pub struct RegionRepository;

impl RegionRepository {
    /// Insert a region in `draft` state if its path is new. Returns true
    /// when a row was inserted.
    pub fn insert_if_absent(conn: &Connection, path: &str) -> Result<bool> {
        let now = now_iso();
        let inserted = conn.execute(
            "INSERT INTO regions (id, path, lifecycle_state, created_at, updated_at)
             VALUES (?1, ?2, 'draft', ?3, ?3)
             ON CONFLICT(path) DO NOTHING",
            params![RegionId::new().as_str(), path, now],
        )?;
        Ok(inserted == 1)
    }

    /// Set a region's description.
    pub fn set_description(conn: &Connection, path: &str, description: &str) -> Result<()> {
        let changed = conn.execute(
            "UPDATE regions SET description = ?1, updated_at = ?2 WHERE path = ?3",
            params![description, now_iso(), path],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("Region", path));
        }
        Ok(())
    }

    /// Whether a region path exists.
    pub fn exists(conn: &Connection, path: &str) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM regions WHERE path = ?1)",
            params![path],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Fetch a region by path.
    pub fn get_by_path(conn: &Connection, path: &str) -> Result<Option<Region>> {
        let region = conn
            .query_row(
                "SELECT id, path, description, lifecycle_state, created_at, updated_at
                 FROM regions WHERE path = ?1",
                params![path],
                region_from_row,
            )
            .optional()?;
        Ok(region)
    }

    /// Fetch a region by id.
    pub fn get_by_id(conn: &Connection, id: &RegionId) -> Result<Option<Region>> {
        let region = conn
            .query_row(
                "SELECT id, path, description, lifecycle_state, created_at, updated_at
                 FROM regions WHERE id = ?1",
                params![id.as_str()],
                region_from_row,
            )
            .optional()?;
        Ok(region)
    }

    /// All regions ordered by path.
    pub fn list(conn: &Connection) -> Result<Vec<Region>> {
        let mut stmt = conn.prepare(
            "SELECT id, path, description, lifecycle_state, created_at, updated_at
             FROM regions ORDER BY path",
        )?;
        let regions = stmt
            .query_map([], region_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(regions)
    }

    /// All region paths ordered by path.
    pub fn paths(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT path FROM regions ORDER BY path")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(paths)
    }

    /// Update a region's lifecycle state.
    pub fn set_lifecycle_state(
        conn: &Connection,
        path: &str,
        state: LifecycleState,
    ) -> Result<()> {
        let changed = conn.execute(
            "UPDATE regions SET lifecycle_state = ?1, updated_at = ?2 WHERE path = ?3",
            params![state.as_str(), now_iso(), path],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("Region", path));
        }
        Ok(())
    }

    /// Paths of regions whose lifecycle state is not `deprecated`.
    pub fn live_paths(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT path FROM regions WHERE lifecycle_state != 'deprecated' ORDER BY path",
        )?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(paths)
    }
}

fn region_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Region> {
    let state: String = row.get(3)?;
    let created: String = row.get(4)?;
    let updated: String = row.get(5)?;
    Ok(Region {
        id: RegionId::from(row.get::<_, String>(0)?),
        path: row.get(1)?,
        description: row.get(2)?,
        lifecycle_state: LifecycleState::parse(&state),
        created_at: parse_iso(&created),
        updated_at: parse_iso(&updated),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
