// Corrections repository for Clearscribe
// Insert-only audit trail of second-pass attempts

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::models::Correction;
use super::DatabaseManager;

impl DatabaseManager {
    /// Record one second-pass attempt. Corrections are never updated.
    pub fn save_correction(&self, correction: &Correction) -> Result<()> {
        save_correction_impl(&*self.conn()?, correction)
    }

    /// All corrections attempted for a job, joined through its segments,
    /// in ascending clip order
    pub fn get_corrections_for_job(&self, job_id: &str) -> Result<Vec<Correction>> {
        get_corrections_for_job_impl(&*self.conn()?, job_id)
    }

    /// How many corrections for a job passed the safety checks
    pub fn count_applied_corrections(&self, job_id: &str) -> Result<i64> {
        self.conn()?
            .query_row(
                r#"
                SELECT COUNT(*)
                FROM corrections c
                JOIN segments s ON s.id = c.segment_id
                WHERE s.job_id = ? AND c.should_apply = 1
                "#,
                params![job_id],
                |row| row.get(0),
            )
            .context("Failed to count applied corrections")
    }

    /// Clear the clip path after the temporary file has been removed
    pub fn clear_correction_clip_path(&self, correction_id: &str) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE corrections SET clip_path = NULL WHERE id = ?",
                params![correction_id],
            )
            .context("Failed to clear correction clip path")?;
        Ok(())
    }
}

fn save_correction_impl(conn: &Connection, correction: &Correction) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO corrections (
            id, segment_id, original_text, corrected_text, trigger_confidence,
            clip_path, clip_start, clip_end, edit_distance,
            should_apply, reject_reason, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            correction.id,
            correction.segment_id,
            correction.original_text,
            correction.corrected_text,
            correction.trigger_confidence,
            correction.clip_path,
            correction.clip_start,
            correction.clip_end,
            correction.edit_distance,
            correction.should_apply as i32,
            correction.reject_reason,
            correction.created_at,
        ],
    ).context("Failed to save correction")?;

    Ok(())
}

fn get_corrections_for_job_impl(conn: &Connection, job_id: &str) -> Result<Vec<Correction>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT c.id, c.segment_id, c.original_text, c.corrected_text, c.trigger_confidence,
               c.clip_path, c.clip_start, c.clip_end, c.edit_distance,
               c.should_apply, c.reject_reason, c.created_at
        FROM corrections c
        JOIN segments s ON s.id = c.segment_id
        WHERE s.job_id = ?
        ORDER BY c.clip_start ASC
        "#
    ).context("Failed to prepare get_corrections_for_job query")?;

    let corrections = stmt.query_map(params![job_id], |row| {
        Ok(Correction {
            id: row.get(0)?,
            segment_id: row.get(1)?,
            original_text: row.get(2)?,
            corrected_text: row.get(3)?,
            trigger_confidence: row.get(4)?,
            clip_path: row.get(5)?,
            clip_start: row.get(6)?,
            clip_end: row.get(7)?,
            edit_distance: row.get(8)?,
            should_apply: row.get::<_, i32>(9)? != 0,
            reject_reason: row.get(10)?,
            created_at: row.get(11)?,
        })
    }).context("Failed to query corrections")?;

    corrections.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect corrections")
}
