//! Quality grades, golden principles, and persisted gardener findings.

use rusqlite::{params, Connection, OptionalExtension};

use gam_core::ids::RegionId;
use gam_core::quality::{FindingCategory, GardenFinding, GoldenPrinciple, QualityGrade};

use crate::errors::{Result, StoreError};
use crate::repositories::{now_iso, parse_iso};

/// Quality repository.
pub struct QualityRepository;

impl QualityRepository {
    /// Insert or update a grade for `(region, category)`.
    pub fn upsert_grade(
        conn: &Connection,
        region_path: &str,
        category: &str,
        grade: &str,
        details: &serde_json::Value,
        assessed_by: &str,
    ) -> Result<()> {
        let region_id: Option<String> = conn
            .query_row(
                "SELECT id FROM regions WHERE path = ?1",
                params![region_path],
                |row| row.get(0),
            )
            .optional()?;
        let region_id = region_id.ok_or_else(|| StoreError::not_found("Region", region_path))?;

        conn.execute(
            "INSERT INTO quality_grades (region_id, category, grade, details, assessed_at, assessed_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(region_id, category) DO UPDATE SET
                 grade = excluded.grade,
                 details = excluded.details,
                 assessed_at = excluded.assessed_at,
                 assessed_by = excluded.assessed_by",
            params![
                region_id,
                category,
                grade,
                serde_json::to_string(details)?,
                now_iso(),
                assessed_by,
            ],
        )?;
        Ok(())
    }

    /// Grades for one region.
    pub fn grades_for_region(conn: &Connection, region_path: &str) -> Result<Vec<QualityGrade>> {
        let mut stmt = conn.prepare(
            "SELECT qg.region_id, qg.category, qg.grade, qg.details, qg.assessed_at, qg.assessed_by
             FROM quality_grades qg
             JOIN regions r ON r.id = qg.region_id
             WHERE r.path = ?1
             ORDER BY qg.category",
        )?;
        let rows = stmt.query_map(params![region_path], grade_from_row)?;
        let mut grades = Vec::new();
        for row in rows {
            grades.push(row??);
        }
        Ok(grades)
    }

    /// All grades as `(region_path, grade)` pairs, ordered by path then
    /// category.
    pub fn all_grades(conn: &Connection) -> Result<Vec<(String, QualityGrade)>> {
        let mut stmt = conn.prepare(
            "SELECT r.path, qg.region_id, qg.category, qg.grade, qg.details, qg.assessed_at, qg.assessed_by
             FROM quality_grades qg
             JOIN regions r ON r.id = qg.region_id
             ORDER BY r.path, qg.category",
        )?;
        let rows = stmt.query_map([], |row| {
            let path: String = row.get(0)?;
            let details_json: String = row.get(4)?;
            let assessed: String = row.get(5)?;
            Ok((path, details_json, assessed, row.get::<_, String>(1)?, row.get::<_, String>(2)?, row.get::<_, String>(3)?, row.get::<_, String>(6)?))
        })?;
        let mut grades = Vec::new();
        for row in rows {
            let (path, details_json, assessed, region_id, category, grade, assessed_by) = row?;
            grades.push((
                path,
                QualityGrade {
                    region_id: RegionId::from(region_id),
                    category,
                    grade,
                    details: serde_json::from_str(&details_json)?,
                    assessed_at: parse_iso(&assessed),
                    assessed_by,
                },
            ));
        }
        Ok(grades)
    }

    /// `(region_path, category, grade)` rows whose grade is in `grades`.
    pub fn regions_graded(
        conn: &Connection,
        grades: &[&str],
    ) -> Result<Vec<(String, String, String)>> {
        if grades.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (0..grades.len()).map(|i| format!("?{}", i + 1)).collect();
        let sql = format!(
            "SELECT r.path, qg.category, qg.grade
             FROM quality_grades qg
             JOIN regions r ON r.id = qg.region_id
             WHERE qg.grade IN ({})
             ORDER BY r.path",
            placeholders.join(", ")
        );
        let values: Vec<&dyn rusqlite::types::ToSql> =
            grades.iter().map(|g| g as &dyn rusqlite::types::ToSql).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(values.as_slice(), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Insert or update a golden principle by name.
    pub fn upsert_principle(conn: &Connection, principle: &GoldenPrinciple) -> Result<()> {
        conn.execute(
            "INSERT INTO golden_principles (name, rule, lint_check, remediation, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET
                 rule = excluded.rule,
                 lint_check = excluded.lint_check,
                 remediation = excluded.remediation,
                 enabled = excluded.enabled",
            params![
                principle.name,
                principle.rule,
                principle.lint_check,
                principle.remediation,
                principle.enabled,
            ],
        )?;
        Ok(())
    }

    /// Principles ordered by name; optionally only enabled ones.
    pub fn list_principles(conn: &Connection, enabled_only: bool) -> Result<Vec<GoldenPrinciple>> {
        let sql = if enabled_only {
            "SELECT name, rule, lint_check, remediation, enabled
             FROM golden_principles WHERE enabled = 1 ORDER BY name"
        } else {
            "SELECT name, rule, lint_check, remediation, enabled
             FROM golden_principles ORDER BY name"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(GoldenPrinciple {
                    name: row.get(0)?,
                    rule: row.get(1)?,
                    lint_check: row.get(2)?,
                    remediation: row.get(3)?,
                    enabled: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Persist a gardener finding for human review.
    pub fn insert_finding(conn: &Connection, finding: &GardenFinding) -> Result<()> {
        conn.execute(
            "INSERT INTO garden_findings (region_path, category, description, mechanical, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                finding.region_path,
                finding.category.as_str(),
                finding.description,
                finding.mechanical,
                now_iso(),
            ],
        )?;
        Ok(())
    }

    /// Persisted findings, newest first.
    pub fn list_findings(conn: &Connection, limit: u32) -> Result<Vec<GardenFinding>> {
        let mut stmt = conn.prepare(
            "SELECT region_path, category, description, mechanical
             FROM garden_findings ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                let category: String = row.get(1)?;
                Ok(GardenFinding {
                    region_path: row.get(0)?,
                    category: FindingCategory::parse(&category),
                    description: row.get(2)?,
                    mechanical: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn grade_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<QualityGrade>> {
    let details_json: String = row.get(3)?;
    let assessed: String = row.get(4)?;
    let build = || -> Result<QualityGrade> {
        Ok(QualityGrade {
            region_id: RegionId::from(row.get::<_, String>(0)?),
            category: row.get(1)?,
            grade: row.get(2)?,
            details: serde_json::from_str(&details_json)?,
            assessed_at: parse_iso(&assessed),
            assessed_by: row.get(5)?,
        })
    };
    Ok(build())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
