//! Proposals: persistence for the structured change requests.

use rusqlite::{params, Connection, OptionalExtension};

use gam_core::ids::{ProposalId, RegionId, TurnId};
use gam_core::proposal::{
    DeferredAction, Evidence, Proposal, ProposalStatus, ReviewComment, SyncChanges,
};
use gam_core::validation::ValidationDetail;

use crate::errors::Result;
use crate::repositories::{parse_iso, to_iso};

const SELECT_PROPOSAL: &str = "SELECT p.id, p.turn_id, p.region_id, r.path, p.action_taken,
        p.current_state, p.proposed_state, p.sync_changes, p.evidence, p.deferred_actions,
        p.status, p.review_iterations, p.review_history, p.validation_error_code,
        p.rejection_reason, p.created_at
 FROM proposals p
 JOIN regions r ON r.id = p.region_id";

/// Proposal repository.
pub struct ProposalRepository;

impl ProposalRepository {
    /// Persist a new proposal.
    pub fn insert(conn: &Connection, proposal: &Proposal) -> Result<()> {
        conn.execute(
            "INSERT INTO proposals
                 (id, turn_id, region_id, action_taken, current_state, proposed_state,
                  sync_changes, evidence, deferred_actions, status, review_iterations,
                  review_history, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                proposal.id.as_str(),
                proposal.turn_id.as_str(),
                proposal.region_id.as_str(),
                proposal.action_taken,
                proposal.current_state,
                proposal.proposed_state,
                proposal.sync_changes.as_ref().map(serde_json::to_string).transpose()?,
                serde_json::to_string(&proposal.evidence)?,
                serde_json::to_string(&proposal.deferred_actions)?,
                proposal.status.as_str(),
                proposal.review_iterations,
                serde_json::to_string(&proposal.review_history)?,
                to_iso(proposal.created_at),
            ],
        )?;
        Ok(())
    }

    /// Fetch a proposal with its region path joined in.
    pub fn get(conn: &Connection, id: &ProposalId) -> Result<Option<Proposal>> {
        let sql = format!("{SELECT_PROPOSAL} WHERE p.id = ?1");
        let row = conn
            .query_row(&sql, params![id.as_str()], proposal_from_row)
            .optional()?;
        row.transpose()
    }

    /// Set a proposal's status.
    pub fn set_status(conn: &Connection, id: &ProposalId, status: ProposalStatus) -> Result<()> {
        conn.execute(
            "UPDATE proposals SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.as_str()],
        )?;
        Ok(())
    }

    /// Record a rejection: status, error code, detail list, briefing.
    pub fn record_rejection(
        conn: &Connection,
        id: &ProposalId,
        code: i32,
        details: &[ValidationDetail],
        briefing: &str,
    ) -> Result<()> {
        conn.execute(
            "UPDATE proposals
             SET status = 'REJECTED', validation_error_code = ?1,
                 violation_details = ?2, rejection_reason = ?3
             WHERE id = ?4",
            params![code, serde_json::to_string(details)?, briefing, id.as_str()],
        )?;
        Ok(())
    }

    /// Record an escalation: the proposal stays `PENDING` and carries the
    /// human-review briefing plus the audit error code.
    pub fn record_escalation(
        conn: &Connection,
        id: &ProposalId,
        code: i32,
        briefing: &str,
    ) -> Result<()> {
        conn.execute(
            "UPDATE proposals
             SET status = 'PENDING', validation_error_code = ?1, rejection_reason = ?2
             WHERE id = ?3",
            params![code, briefing, id.as_str()],
        )?;
        Ok(())
    }

    /// Append a review comment and bump the iteration counter. Returns the
    /// new iteration count.
    pub fn append_review(conn: &Connection, id: &ProposalId, review: &ReviewComment) -> Result<u32> {
        let history_json: Option<String> = conn
            .query_row(
                "SELECT review_history FROM proposals WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let mut history: Vec<ReviewComment> = match history_json.as_deref() {
            Some(json) => serde_json::from_str(json)?,
            None => return Err(crate::errors::StoreError::not_found("Proposal", id.as_str())),
        };
        history.push(review.clone());

        conn.execute(
            "UPDATE proposals
             SET review_history = ?1, review_iterations = review_iterations + 1
             WHERE id = ?2",
            params![serde_json::to_string(&history)?, id.as_str()],
        )?;
        let iterations: u32 = conn.query_row(
            "SELECT review_iterations FROM proposals WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(iterations)
    }

    /// Proposals escalated to human review: still `PENDING` with the
    /// audit iterations exhausted.
    pub fn escalated(conn: &Connection, max_iterations: u32) -> Result<Vec<Proposal>> {
        let sql = format!(
            "{SELECT_PROPOSAL} WHERE p.status = 'PENDING' AND p.review_iterations >= ?1
             ORDER BY p.created_at"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![max_iterations], proposal_from_row)?;
        let mut proposals = Vec::new();
        for row in rows {
            proposals.push(row??);
        }
        Ok(proposals)
    }
}

fn proposal_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Proposal>> {
    let sync_changes_json: Option<String> = row.get(7)?;
    let evidence_json: String = row.get(8)?;
    let deferred_json: String = row.get(9)?;
    let status: String = row.get(10)?;
    let history_json: String = row.get(12)?;
    let created: String = row.get(15)?;

    let build = || -> Result<Proposal> {
        let sync_changes: Option<SyncChanges> =
            sync_changes_json.as_deref().map(serde_json::from_str).transpose()?;
        let evidence: Evidence = serde_json::from_str(&evidence_json)?;
        let deferred_actions: Vec<DeferredAction> = serde_json::from_str(&deferred_json)?;
        let review_history: Vec<ReviewComment> = serde_json::from_str(&history_json)?;
        Ok(Proposal {
            id: ProposalId::from(row.get::<_, String>(0)?),
            turn_id: TurnId::from(row.get::<_, String>(1)?),
            region_id: RegionId::from(row.get::<_, String>(2)?),
            region_path: row.get(3)?,
            action_taken: row.get(4)?,
            current_state: row.get(5)?,
            proposed_state: row.get(6)?,
            sync_changes,
            evidence,
            deferred_actions,
            status: ProposalStatus::parse(&status),
            review_iterations: row.get(11)?,
            review_history,
            validation_error_code: row.get(13)?,
            rejection_reason: row.get(14)?,
            created_at: parse_iso(&created),
        })
    };
    Ok(build())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
