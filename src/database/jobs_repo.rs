// Jobs repository for Clearscribe
// Queue operations: create, atomic claim, terminal transitions, visibility queries

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{Job, JobStatus};
use super::DatabaseManager;

impl DatabaseManager {
    /// Insert a new pending job (called by the upload side of the system)
    pub fn create_job(&self, job: &Job) -> Result<()> {
        create_job_impl(&*self.conn()?, job)
    }

    /// Fetch a job by id
    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        get_job_impl(&*self.conn()?, job_id)
    }

    /// All jobs belonging to a user, newest first
    pub fn get_jobs_for_user(&self, user_id: &str) -> Result<Vec<Job>> {
        get_jobs_for_user_impl(&*self.conn()?, user_id)
    }

    /// Number of jobs currently in the given status
    pub fn count_jobs_by_status(&self, status: JobStatus) -> Result<i64> {
        self.conn()?
            .query_row(
                "SELECT COUNT(*) FROM jobs WHERE status = ?",
                params![status.as_str()],
                |row| row.get(0),
            )
            .context("Failed to count jobs")
    }

    /// Atomically claim the oldest pending job, transitioning it to
    /// `processing` with `processing_started` set. Returns None when the
    /// queue is empty or another claimant won the race.
    pub fn claim_next_pending(&self) -> Result<Option<Job>> {
        claim_next_pending_impl(&*self.conn()?)
    }

    /// Move jobs left in `processing` by a crashed worker back to `pending`.
    /// Returns the number of requeued jobs.
    pub fn requeue_stale_processing(&self) -> Result<usize> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn()?
            .execute(
                "UPDATE jobs
                 SET status = 'pending', processing_started = NULL, updated_at = ?1
                 WHERE status = 'processing'",
                params![now],
            )
            .context("Failed to requeue stale processing jobs")
    }

    /// Terminal success: store the transcript and stamp `processing_ended`
    pub fn finalize_success(&self, job_id: &str, transcript: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn()?
            .execute(
                "UPDATE jobs
                 SET status = 'completed', transcript = ?1, processing_ended = ?2, updated_at = ?2
                 WHERE id = ?3",
                params![transcript, now, job_id],
            )
            .context("Failed to finalize job as completed")?;
        Ok(())
    }

    /// Terminal failure: capture the error and stamp `processing_ended`
    pub fn finalize_failure(&self, job_id: &str, error_message: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn()?
            .execute(
                "UPDATE jobs
                 SET status = 'failed', error_message = ?1, processing_ended = ?2, updated_at = ?2
                 WHERE id = ?3",
                params![error_message, now, job_id],
            )
            .context("Failed to finalize job as failed")?;
        Ok(())
    }

    /// Remove a job and, through cascades, its segments and corrections
    pub fn delete_job(&self, job_id: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM jobs WHERE id = ?", params![job_id])
            .context("Failed to delete job")?;
        Ok(())
    }
}

fn create_job_impl(conn: &Connection, job: &Job) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO jobs (
            id, user_id, status, audio_path, original_filename,
            transcript, processing_started, processing_ended, error_message,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            job.id,
            job.user_id,
            job.status.as_str(),
            job.audio_path,
            job.original_filename,
            job.transcript,
            job.processing_started,
            job.processing_ended,
            job.error_message,
            job.created_at,
            job.updated_at,
        ],
    ).context("Failed to create job")?;

    Ok(())
}

fn get_job_impl(conn: &Connection, job_id: &str) -> Result<Option<Job>> {
    conn.query_row(
        r#"
        SELECT id, user_id, status, audio_path, original_filename,
               transcript, processing_started, processing_ended, error_message,
               created_at, updated_at
        FROM jobs
        WHERE id = ?
        "#,
        params![job_id],
        row_to_job,
    )
    .optional()
    .context("Failed to query job")
}

fn get_jobs_for_user_impl(conn: &Connection, user_id: &str) -> Result<Vec<Job>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, user_id, status, audio_path, original_filename,
               transcript, processing_started, processing_ended, error_message,
               created_at, updated_at
        FROM jobs
        WHERE user_id = ?
        ORDER BY created_at DESC
        "#
    ).context("Failed to prepare get_jobs_for_user query")?;

    let jobs = stmt.query_map(params![user_id], row_to_job)
        .context("Failed to query jobs for user")?;

    jobs.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect jobs for user")
}

/// The claim is a single UPDATE statement, so no concurrent claimant can
/// observe the row half-updated. The inner SELECT picks the oldest pending
/// job and the outer `status = 'pending'` guard re-checks it, so if another
/// worker got there first the statement matches nothing and this attempt
/// observes an empty queue instead of double-claiming. Lock contention is
/// absorbed by the connection's busy timeout.
fn claim_next_pending_impl(conn: &Connection) -> Result<Option<Job>> {
    let now = chrono::Utc::now().to_rfc3339();

    let claimed_id: Option<String> = conn.query_row(
        "UPDATE jobs
         SET status = 'processing', processing_started = ?1, updated_at = ?1
         WHERE id = (SELECT id FROM jobs WHERE status = 'pending'
                     ORDER BY created_at ASC, id ASC LIMIT 1)
           AND status = 'pending'
         RETURNING id",
        params![now],
        |row| row.get(0),
    ).optional().context("Failed to claim pending job")?;

    match claimed_id {
        Some(job_id) => get_job_impl(conn, &job_id),
        None => Ok(None),
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let status_raw: String = row.get(2)?;
    let status = JobStatus::from_str(&status_raw).unwrap_or(JobStatus::Failed);

    Ok(Job {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status,
        audio_path: row.get(3)?,
        original_filename: row.get(4)?,
        transcript: row.get(5)?,
        processing_started: row.get(6)?,
        processing_ended: row.get(7)?,
        error_message: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
