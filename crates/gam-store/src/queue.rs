//! The durable two-stream queue with consumer-group semantics.
//!
//! Streams `agent_tasks` (work to do) and `agent_proposals` (results) live
//! in their own SQLite database, persistent across restarts. A read
//! atomically claims the oldest message with no live claim for the group;
//! an unacked claim becomes re-deliverable after the visibility timeout,
//! giving exactly-once processing per group under consumer failure.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use gam_core::ids::{ProposalId, TurnId};
use gam_core::turn::TaskKind;

use crate::connection::{new_file, new_in_memory, ConnectionConfig, ConnectionPool};
use crate::errors::Result;
use crate::migrations::run_queue_migrations;
use crate::repositories::now_iso;

/// Stream carrying work for researchers.
pub const STREAM_TASKS: &str = "agent_tasks";
/// Stream carrying proposals back to the memorizer.
pub const STREAM_PROPOSALS: &str = "agent_proposals";

/// Consumer group for researcher agents.
pub const GROUP_RESEARCHER: &str = "researcher_pool";
/// Consumer group for memorizer agents.
pub const GROUP_MEMORIZER: &str = "memorizer_pool";

/// How long an unacked claim stays invisible before re-delivery.
const VISIBILITY: Duration = Duration::from_secs(60);
/// Poll interval for blocking reads.
const READ_POLL: Duration = Duration::from_millis(100);

/// Payload pushed to the task stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskMessage {
    pub turn_id: TurnId,
    pub region_path: String,
    #[serde(default)]
    pub context_ref: Option<String>,
    #[serde(rename = "task_type")]
    pub task_kind: TaskKind,
    #[serde(default)]
    pub prompt: Option<String>,
    /// Review feedback for `review_response` tasks.
    #[serde(default)]
    pub review: Option<String>,
}

/// Payload pushed to the proposal stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalMessage {
    pub turn_id: TurnId,
    pub proposal_id: ProposalId,
    pub region_path: String,
}

/// Opaque delivery handle, passed back on ack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageId(i64);

/// Pending counts for both streams.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueStatus {
    pub tasks: u64,
    pub proposals: u64,
}

/// Handle to the queue substrate.
#[derive(Clone)]
pub struct Queue {
    pool: ConnectionPool,
}

impl Queue {
    /// Open (and migrate) a file-backed queue database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).ok();
            }
        }
        let pool = new_file(path, &ConnectionConfig::default())?;
        run_queue_migrations(&*pool.get()?)?;
        Ok(Self { pool })
    }

    /// Open an in-memory queue (tests).
    pub fn open_in_memory() -> Result<Self> {
        let pool = new_in_memory(&ConnectionConfig::default())?;
        run_queue_migrations(&*pool.get()?)?;
        Ok(Self { pool })
    }

    /// Append a task message. Returns its delivery id.
    pub fn push_task(&self, msg: &TaskMessage) -> Result<MessageId> {
        self.push(STREAM_TASKS, &serde_json::to_string(msg)?)
    }

    /// Append a proposal message. Returns its delivery id.
    pub fn push_proposal(&self, msg: &ProposalMessage) -> Result<MessageId> {
        self.push(STREAM_PROPOSALS, &serde_json::to_string(msg)?)
    }

    fn push(&self, stream: &str, payload: &str) -> Result<MessageId> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO queue_messages (stream, payload, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![stream, payload, now_iso()],
        )?;
        let id = conn.last_insert_rowid();
        debug!(stream, message_id = id, "message enqueued");
        Ok(MessageId(id))
    }

    /// Claim the next task for `consumer`, without blocking.
    pub fn try_read_task(&self, consumer: &str) -> Result<Option<(TaskMessage, MessageId)>> {
        self.try_read(STREAM_TASKS, GROUP_RESEARCHER, consumer)
    }

    /// Claim the next proposal for `consumer`, without blocking.
    pub fn try_read_proposal(
        &self,
        consumer: &str,
    ) -> Result<Option<(ProposalMessage, MessageId)>> {
        self.try_read(STREAM_PROPOSALS, GROUP_MEMORIZER, consumer)
    }

    /// Block until a task arrives or `cancel` fires.
    pub fn read_task(
        &self,
        consumer: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<(TaskMessage, MessageId)>> {
        self.read_blocking(consumer, cancel, Self::try_read_task)
    }

    /// Block until a proposal arrives or `cancel` fires.
    pub fn read_proposal(
        &self,
        consumer: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<(ProposalMessage, MessageId)>> {
        self.read_blocking(consumer, cancel, Self::try_read_proposal)
    }

    fn read_blocking<T>(
        &self,
        consumer: &str,
        cancel: &CancellationToken,
        try_read: impl Fn(&Self, &str) -> Result<Option<(T, MessageId)>>,
    ) -> Result<Option<(T, MessageId)>> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if let Some(found) = try_read(self, consumer)? {
                return Ok(Some(found));
            }
            std::thread::sleep(READ_POLL);
        }
    }

    fn try_read<T: for<'de> Deserialize<'de>>(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Option<(T, MessageId)>> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let visibility_cutoff = (Utc::now()
            - chrono::Duration::from_std(VISIBILITY).unwrap_or_else(|_| chrono::Duration::seconds(60)))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string();

        let claimed: Option<(i64, String)> = tx
            .query_row(
                "SELECT m.id, m.payload FROM queue_messages m
                 WHERE m.stream = ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM queue_claims c
                       WHERE c.message_id = m.id AND c.group_name = ?2
                         AND (c.acked_at IS NOT NULL OR c.claimed_at > ?3)
                   )
                 ORDER BY m.id LIMIT 1",
                rusqlite::params![stream, group, visibility_cutoff],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some((id, payload)) = claimed else {
            tx.finish()?;
            return Ok(None);
        };

        tx.execute(
            "INSERT INTO queue_claims (group_name, message_id, consumer, claimed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(group_name, message_id)
             DO UPDATE SET consumer = excluded.consumer,
                           claimed_at = excluded.claimed_at,
                           acked_at = NULL",
            rusqlite::params![group, id, consumer, now_iso()],
        )?;
        tx.commit()?;

        let message: T = serde_json::from_str(&payload)?;
        debug!(stream, group, consumer, message_id = id, "message claimed");
        Ok(Some((message, MessageId(id))))
    }

    /// Acknowledge a task delivery.
    pub fn ack_task(&self, id: MessageId) -> Result<()> {
        self.ack(GROUP_RESEARCHER, id)
    }

    /// Acknowledge a proposal delivery.
    pub fn ack_proposal(&self, id: MessageId) -> Result<()> {
        self.ack(GROUP_MEMORIZER, id)
    }

    fn ack(&self, group: &str, id: MessageId) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE queue_claims SET acked_at = ?1 WHERE group_name = ?2 AND message_id = ?3",
            rusqlite::params![now_iso(), group, id.0],
        )?;
        Ok(())
    }

    /// Unacked message counts for both streams.
    pub fn status(&self) -> Result<QueueStatus> {
        Ok(QueueStatus {
            tasks: self.pending(STREAM_TASKS, GROUP_RESEARCHER)?,
            proposals: self.pending(STREAM_PROPOSALS, GROUP_MEMORIZER)?,
        })
    }

    fn pending(&self, stream: &str, group: &str) -> Result<u64> {
        let conn = self.pool.get()?;
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM queue_messages m
             WHERE m.stream = ?1
               AND NOT EXISTS (
                   SELECT 1 FROM queue_claims c
                   WHERE c.message_id = m.id AND c.group_name = ?2 AND c.acked_at IS NOT NULL
               )",
            rusqlite::params![stream, group],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn task(turn: &str, region: &str) -> TaskMessage {
        TaskMessage {
            turn_id: TurnId::from(turn),
            region_path: region.to_owned(),
            context_ref: None,
            task_kind: TaskKind::Implement,
            prompt: None,
            review: None,
        }
    }

    #[test]
    fn push_then_read_then_ack() {
        let queue = Queue::open_in_memory().unwrap();
        queue.push_task(&task("T_1", "app.search")).unwrap();

        let (msg, id) = queue.try_read_task("researcher_1").unwrap().unwrap();
        assert_eq!(msg.region_path, "app.search");

        // In flight: not re-delivered to the same group.
        assert!(queue.try_read_task("researcher_2").unwrap().is_none());

        queue.ack_task(id).unwrap();
        assert!(queue.try_read_task("researcher_1").unwrap().is_none());
        assert_eq!(queue.status().unwrap().tasks, 0);
    }

    #[test]
    fn fifo_order_within_stream() {
        let queue = Queue::open_in_memory().unwrap();
        queue.push_task(&task("T_1", "first")).unwrap();
        queue.push_task(&task("T_2", "second")).unwrap();

        let (a, ida) = queue.try_read_task("c").unwrap().unwrap();
        queue.ack_task(ida).unwrap();
        let (b, _) = queue.try_read_task("c").unwrap().unwrap();
        assert_eq!(a.region_path, "first");
        assert_eq!(b.region_path, "second");
    }

    #[test]
    fn streams_are_independent() {
        let queue = Queue::open_in_memory().unwrap();
        queue.push_task(&task("T_1", "app")).unwrap();
        queue
            .push_proposal(&ProposalMessage {
                turn_id: TurnId::from("T_1"),
                proposal_id: ProposalId::from("prp-1"),
                region_path: "app".to_owned(),
            })
            .unwrap();

        let status = queue.status().unwrap();
        assert_eq!(status.tasks, 1);
        assert_eq!(status.proposals, 1);

        let (p, _) = queue.try_read_proposal("m1").unwrap().unwrap();
        assert_eq!(p.proposal_id.as_str(), "prp-1");
        // The proposal read did not consume the task stream.
        assert!(queue.try_read_task("r1").unwrap().is_some());
    }

    #[test]
    fn blocking_read_returns_on_cancel() {
        let queue = Queue::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let got = queue.read_task("r1", &cancel).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn payload_survives_roundtrip() {
        let queue = Queue::open_in_memory().unwrap();
        let mut msg = task("T_9", "app.web");
        msg.context_ref = Some("/tmp/ctx.md".to_owned());
        msg.task_kind = TaskKind::ReviewResponse;
        msg.review = Some("tighten the invariant".to_owned());
        queue.push_task(&msg).unwrap();

        let (back, _) = queue.try_read_task("r").unwrap().unwrap();
        assert_eq!(back.context_ref.as_deref(), Some("/tmp/ctx.md"));
        assert_eq!(back.task_kind, TaskKind::ReviewResponse);
        assert_eq!(back.review.as_deref(), Some("tighten the invariant"));
    }
}
