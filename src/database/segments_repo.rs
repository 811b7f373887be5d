// Segments repository for Clearscribe
// Bulk persistence and range lookups for first-pass word segments

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::Segment;
use super::DatabaseManager;

impl DatabaseManager {
    /// Save a job's word segments in a single all-or-nothing batch
    pub fn save_segments_batch(&self, segments: &[Segment]) -> Result<()> {
        save_segments_batch_impl(&*self.conn()?, segments)
    }

    /// All segments for a job in ascending start order
    pub fn get_segments(&self, job_id: &str) -> Result<Vec<Segment>> {
        get_segments_impl(&*self.conn()?, job_id)
    }

    /// Any one segment fully contained in `[start, end]`, used as the
    /// foreign-key anchor for a correction record
    pub fn find_segment_in_range(&self, job_id: &str, start: f64, end: f64) -> Result<Option<Segment>> {
        find_segment_in_range_impl(&*self.conn()?, job_id, start, end)
    }

    /// Number of segments persisted for a job
    pub fn count_segments(&self, job_id: &str) -> Result<i64> {
        self.conn()?
            .query_row(
                "SELECT COUNT(*) FROM segments WHERE job_id = ?",
                params![job_id],
                |row| row.get(0),
            )
            .context("Failed to count segments")
    }
}

fn save_segments_batch_impl(conn: &Connection, segments: &[Segment]) -> Result<()> {
    let tx = conn.unchecked_transaction()
        .context("Failed to start segment batch transaction")?;

    for segment in segments {
        tx.execute(
            r#"
            INSERT INTO segments (id, job_id, word, start_time, end_time, confidence)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                segment.id,
                segment.job_id,
                segment.word,
                segment.start_time,
                segment.end_time,
                segment.confidence,
            ],
        ).context("Failed to save segment in batch")?;
    }

    tx.commit().context("Failed to commit segment batch")?;
    Ok(())
}

fn get_segments_impl(conn: &Connection, job_id: &str) -> Result<Vec<Segment>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, job_id, word, start_time, end_time, confidence
        FROM segments
        WHERE job_id = ?
        ORDER BY start_time ASC
        "#
    ).context("Failed to prepare get_segments query")?;

    let segments = stmt.query_map(params![job_id], row_to_segment)
        .context("Failed to query segments")?;

    segments.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect segments")
}

fn find_segment_in_range_impl(
    conn: &Connection,
    job_id: &str,
    start: f64,
    end: f64,
) -> Result<Option<Segment>> {
    conn.query_row(
        r#"
        SELECT id, job_id, word, start_time, end_time, confidence
        FROM segments
        WHERE job_id = ?1 AND start_time >= ?2 AND end_time <= ?3
        ORDER BY start_time ASC
        LIMIT 1
        "#,
        params![job_id, start, end],
        row_to_segment,
    )
    .optional()
    .context("Failed to find segment in range")
}

fn row_to_segment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Segment> {
    Ok(Segment {
        id: row.get(0)?,
        job_id: row.get(1)?,
        word: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        confidence: row.get(5)?,
    })
}
