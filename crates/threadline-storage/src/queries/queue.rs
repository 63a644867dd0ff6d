// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background job queue backing the task worker.
//!
//! Delivery is at-least-once. A claimed job carries a lease; a worker that
//! dies without calling `ack` or `fail` lets the lease lapse and the job is
//! claimed again.

use rusqlite::{OptionalExtension, Row, params};
use threadline_core::ThreadlineError;

use crate::database::{Database, map_tr_err};
use crate::models::QueueEntry;

/// Lease length as an SQLite datetime modifier.
const LEASE: &str = "+300 seconds";

const ENTRY_COLUMNS: &str =
    "id, queue_name, payload, status, attempts, max_attempts, created_at, updated_at, locked_until";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    Ok(QueueEntry {
        id: row.get("id")?,
        queue_name: row.get("queue_name")?,
        payload: row.get("payload")?,
        status: row.get("status")?,
        attempts: row.get("attempts")?,
        max_attempts: row.get("max_attempts")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        locked_until: row.get("locked_until")?,
    })
}

/// Adds a job to `queue_name` and returns its id.
pub async fn enqueue(db: &Database, queue_name: &str, payload: &str) -> Result<i64, ThreadlineError> {
    let (queue_name, payload) = (queue_name.to_owned(), payload.to_owned());
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO queue (queue_name, payload) VALUES (?1, ?2)",
                params![queue_name, payload],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Claims the oldest claimable job: pending, or processing with a lapsed lease.
///
/// The select and the lease stamp happen in one statement, so two workers
/// never claim the same job.
pub async fn dequeue(db: &Database, queue_name: &str) -> Result<Option<QueueEntry>, ThreadlineError> {
    let queue_name = queue_name.to_owned();
    db.connection()
        .call(move |conn| -> Result<Option<QueueEntry>, rusqlite::Error> {
            let sql = format!(
                "UPDATE queue
                 SET status = 'processing',
                     locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = (
                     SELECT id FROM queue
                     WHERE queue_name = ?1
                       AND (status = 'pending'
                            OR (status = 'processing'
                                AND locked_until < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')))
                     ORDER BY id
                     LIMIT 1)
                 RETURNING {ENTRY_COLUMNS}"
            );
            conn.query_row(&sql, params![queue_name, LEASE], entry_from_row)
                .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Marks a job done.
pub async fn ack(db: &Database, id: i64) -> Result<(), ThreadlineError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE queue
                 SET status = 'completed', locked_until = NULL,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Records a failed attempt. The job goes back to `pending` until it has
/// used `max_attempts`, after which it stays `failed`.
pub async fn fail(db: &Database, id: i64) -> Result<(), ThreadlineError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE queue
                 SET attempts = attempts + 1,
                     status = CASE WHEN attempts + 1 >= max_attempts THEN 'failed' ELSE 'pending' END,
                     locked_until = NULL,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::setup_db;

    async fn row_state(db: &Database, id: i64) -> (String, i32) {
        db.connection()
            .call(move |conn| -> Result<(String, i32), rusqlite::Error> {
                conn.query_row(
                    "SELECT status, attempts FROM queue WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn claimed_job_is_leased_and_hidden() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "tasks", r#"{"task_id":"t1"}"#).await.unwrap();

        let entry = dequeue(&db, "tasks").await.unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.status, "processing");
        assert_eq!(entry.payload, r#"{"task_id":"t1"}"#);
        assert!(entry.locked_until.is_some());

        assert!(dequeue(&db, "tasks").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn jobs_come_out_oldest_first() {
        let (db, _dir) = setup_db().await;
        let first = enqueue(&db, "tasks", "a").await.unwrap();
        let second = enqueue(&db, "tasks", "b").await.unwrap();
        assert_eq!(dequeue(&db, "tasks").await.unwrap().unwrap().id, first);
        assert_eq!(dequeue(&db, "tasks").await.unwrap().unwrap().id, second);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn ack_completes_the_job() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "tasks", "job").await.unwrap();
        dequeue(&db, "tasks").await.unwrap().unwrap();

        ack(&db, id).await.unwrap();
        assert_eq!(row_state(&db, id).await, ("completed".to_string(), 0));
        assert!(dequeue(&db, "tasks").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_job_is_retried_until_attempts_run_out() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "tasks", "job").await.unwrap();

        dequeue(&db, "tasks").await.unwrap().unwrap();
        fail(&db, id).await.unwrap();
        assert_eq!(row_state(&db, id).await, ("pending".to_string(), 1));

        // Default max_attempts is 3.
        for _ in 0..2 {
            dequeue(&db, "tasks").await.unwrap().unwrap();
            fail(&db, id).await.unwrap();
        }
        assert_eq!(row_state(&db, id).await, ("failed".to_string(), 3));
        assert!(dequeue(&db, "tasks").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn lapsed_lease_is_claimed_again() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "tasks", "job").await.unwrap();
        dequeue(&db, "tasks").await.unwrap().unwrap();

        db.connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "UPDATE queue SET locked_until = '2000-01-01T00:00:00.000Z' WHERE id = ?1",
                    params![id],
                )
            })
            .await
            .unwrap();

        assert_eq!(dequeue(&db, "tasks").await.unwrap().unwrap().id, id);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn queues_are_isolated_by_name() {
        let (db, _dir) = setup_db().await;
        enqueue(&db, "tasks", "a").await.unwrap();
        assert!(dequeue(&db, "other").await.unwrap().is_none());
        assert!(dequeue(&db, "tasks").await.unwrap().is_some());
        db.close().await.unwrap();
    }
}
