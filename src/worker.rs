// Transcription worker
//
// Single long-running loop: claim a pending job, run it through the
// pipeline (first pass, clustering, per-window second pass, merge), finalize,
// repeat. One job in flight at a time; window failures degrade gracefully
// while first-pass failures fail the job.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{error, info, warn};

use crate::asr::{SpeechRecognizer, WordTiming};
use crate::audio::{clip_output_path, ClipSlicer};
use crate::clustering::{cluster_low_confidence, Cluster, ClusteringParams};
use crate::config::WorkerConfig;
use crate::corrector::ClipCorrector;
use crate::database::models::{Correction, Job, Segment};
use crate::database::DatabaseManager;
use crate::notify::Notifier;
use crate::reconcile::{evaluate_correction, merge_corrections, MergeResult, PlannedCorrection};

pub struct Worker {
    db: Arc<DatabaseManager>,
    recognizer: Arc<dyn SpeechRecognizer>,
    corrector: Arc<dyn ClipCorrector>,
    slicer: Arc<dyn ClipSlicer>,
    notifier: Notifier,
    config: WorkerConfig,
    is_processing: AtomicBool,
    should_stop: AtomicBool,
}

impl Worker {
    pub fn new(
        db: Arc<DatabaseManager>,
        recognizer: Arc<dyn SpeechRecognizer>,
        corrector: Arc<dyn ClipCorrector>,
        slicer: Arc<dyn ClipSlicer>,
        notifier: Notifier,
        config: WorkerConfig,
    ) -> Self {
        Self {
            db,
            recognizer,
            corrector,
            slicer,
            notifier,
            config,
            is_processing: AtomicBool::new(false),
            should_stop: AtomicBool::new(false),
        }
    }

    /// Signal the loop to exit after the in-flight job (if any) finishes
    pub fn request_stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }

    /// Main poll loop. Returns when a stop has been requested and the
    /// current job, if any, has run to completion.
    pub async fn run(&self) {
        // Jobs stranded in `processing` by a previous crash go back to the
        // queue before polling starts
        match self.db.requeue_stale_processing() {
            Ok(0) => {}
            Ok(count) => warn!("Requeued {} stale processing job(s) from a previous run", count),
            Err(e) => error!("Failed to sweep stale processing jobs: {:#}", e),
        }

        info!(
            "Worker started (poll interval {}ms, confidence threshold {:.2})",
            self.config.poll_interval.as_millis(),
            self.config.confidence_threshold
        );

        loop {
            if self.should_stop.load(Ordering::SeqCst) {
                info!("Stop requested, worker loop exiting");
                break;
            }

            if !self.is_processing.load(Ordering::SeqCst) {
                match self.db.claim_next_pending() {
                    Ok(Some(job)) => {
                        self.is_processing.store(true, Ordering::SeqCst);
                        self.process_job(&job).await;
                        self.is_processing.store(false, Ordering::SeqCst);
                    }
                    Ok(None) => {}
                    Err(e) => error!("Queue poll failed: {:#}", e),
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Run one claimed job to a terminal state. Never propagates errors:
    /// pipeline failures land in the job row as `failed`.
    pub async fn process_job(&self, job: &Job) {
        info!("Processing job {} ({})", job.id, job.original_filename);
        let started = Instant::now();

        self.notifier.job_started(job).await;

        match self.run_pipeline(job).await {
            Ok(merged) => {
                let elapsed = started.elapsed().as_secs_f64();
                info!(
                    "Job {} completed in {:.1}s ({} corrections applied, {} skipped)",
                    job.id, elapsed, merged.applied_corrections, merged.skipped_corrections
                );
                self.notifier
                    .job_completed(job, elapsed, merged.applied_corrections as i64)
                    .await;
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!("Job {} failed: {}", job.id, message);

                if let Err(db_err) = self.db.finalize_failure(&job.id, &message) {
                    error!("Failed to record failure for job {}: {:#}", job.id, db_err);
                }

                self.notifier.job_failed(job, &message).await;
            }
        }
    }

    /// The per-job pipeline. An error anywhere here (outside a window scope)
    /// is fatal to the job.
    async fn run_pipeline(&self, job: &Job) -> Result<MergeResult> {
        let audio_path = Path::new(&job.audio_path);

        // First pass: whole-file word-level recognition
        let transcription = self
            .recognizer
            .transcribe(audio_path)
            .await
            .context("First-pass recognition failed")?;

        let words: Vec<WordTiming> = transcription
            .words
            .iter()
            .map(|w| WordTiming {
                word: w.word.trim().to_string(),
                start: w.start,
                end: w.end,
                probability: w.probability,
            })
            .collect();

        let segments: Vec<Segment> = words
            .iter()
            .map(|w| Segment::new(&job.id, w.word.clone(), w.start, w.end, w.probability))
            .collect();
        self.db
            .save_segments_batch(&segments)
            .context("Failed to persist segments")?;

        if words.is_empty() {
            // Recognizer gave no word timings; nothing to correct against
            warn!("Job {} produced no word timings, using plain text", job.id);
            let text = transcription.text.trim().to_string();
            self.db
                .finalize_success(&job.id, &text)
                .context("Failed to finalize job")?;
            return Ok(MergeResult {
                text,
                applied_corrections: 0,
                skipped_corrections: 0,
            });
        }

        // Clip windows may only reach to the end of the source audio
        let source_duration = match self.slicer.duration(audio_path).await {
            Ok(seconds) => Some(seconds),
            Err(e) => {
                warn!("Duration probe failed for job {}: {}", job.id, e);
                transcription.duration
            }
        };

        let params = ClusteringParams {
            confidence_threshold: self.config.confidence_threshold,
            proximity_seconds: self.config.proximity_seconds,
            correction_window_seconds: self.config.correction_window_seconds,
        };
        let clusters = cluster_low_confidence(&words, &params);
        info!(
            "Job {}: {} words, {} low-confidence window(s)",
            job.id,
            words.len(),
            clusters.len()
        );

        // Second pass, one window at a time. The multimodal model is the
        // bottleneck resource; there is nothing to gain from concurrency
        // within a single job. A failing window is logged and skipped.
        let mut planned: Vec<PlannedCorrection> = Vec::new();
        for cluster in &clusters {
            match self.process_window(job, &words, cluster, source_duration).await {
                Ok(Some(correction)) => planned.push(correction),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        "Job {}: window [{:.1}s, {:.1}s] failed, continuing: {:#}",
                        job.id, cluster.clip_start, cluster.clip_end, e
                    );
                }
            }
        }

        let merged = merge_corrections(&words, &planned);
        self.db
            .finalize_success(&job.id, &merged.text)
            .context("Failed to finalize job")?;

        Ok(merged)
    }

    /// One correction window: slice, re-transcribe, evaluate, persist the
    /// audit row, clean up the clip. Errors here are contained to the window.
    async fn process_window(
        &self,
        job: &Job,
        words: &[WordTiming],
        cluster: &Cluster,
        source_duration: Option<f64>,
    ) -> Result<Option<PlannedCorrection>> {
        let clip_start = cluster.clip_start;
        let clip_end = match source_duration {
            Some(duration) => cluster.clip_end.min(duration),
            None => cluster.clip_end,
        };

        if clip_end <= clip_start {
            warn!(
                "Job {}: window [{:.1}s, {:.1}s] collapsed after clamping, skipping",
                job.id, cluster.clip_start, cluster.clip_end
            );
            return Ok(None);
        }

        let clip_path = clip_output_path(&self.config.upload_dir, clip_start, clip_end);

        let result = self
            .correct_window(job, words, cluster, clip_start, clip_end, &clip_path)
            .await;

        // The clip is ephemeral regardless of how the window went; slicing
        // may have failed before the file existed, so ignore the outcome
        let _ = tokio::fs::remove_file(&clip_path).await;

        result
    }

    async fn correct_window(
        &self,
        job: &Job,
        words: &[WordTiming],
        cluster: &Cluster,
        clip_start: f64,
        clip_end: f64,
        clip_path: &Path,
    ) -> Result<Option<PlannedCorrection>> {
        self.slicer
            .slice(
                Path::new(&job.audio_path),
                clip_path,
                clip_start,
                clip_end - clip_start,
            )
            .await
            .context("Clip extraction failed")?;

        let candidate = self
            .corrector
            .transcribe_clip(clip_path)
            .await
            .context("Second-pass transcription failed")?;

        let outcome = evaluate_correction(words, &candidate, clip_start, clip_end);

        if outcome.should_apply {
            info!(
                "Job {}: accepted correction in [{:.1}s, {:.1}s] (distance {})",
                job.id, clip_start, clip_end, outcome.levenshtein_distance
            );
        } else {
            info!(
                "Job {}: rejected correction in [{:.1}s, {:.1}s]: {}",
                job.id,
                clip_start,
                clip_end,
                outcome.reason.as_deref().unwrap_or("unknown")
            );
        }

        // Anchor the audit row to any one segment inside the window
        let anchor = self
            .db
            .find_segment_in_range(&job.id, clip_start, clip_end)
            .context("Failed to look up anchor segment")?;

        let Some(anchor) = anchor else {
            warn!(
                "Job {}: no segment inside [{:.1}s, {:.1}s], correction not recorded",
                job.id, clip_start, clip_end
            );
            return Ok(None);
        };

        let correction = Correction::new(
            anchor.id,
            outcome.original_text.clone(),
            outcome.corrected_text.clone(),
            cluster.average_confidence,
            Some(clip_path.to_string_lossy().to_string()),
            clip_start,
            clip_end,
            outcome.levenshtein_distance as i64,
            outcome.should_apply,
            outcome.reason.clone(),
        );
        self.db
            .save_correction(&correction)
            .context("Failed to persist correction")?;

        // The clip is about to be deleted; drop the stale path from the row
        if let Err(e) = self.db.clear_correction_clip_path(&correction.id) {
            warn!("Failed to clear clip path for {}: {:#}", correction.id, e);
        }

        Ok(Some(PlannedCorrection {
            clip_start,
            clip_end,
            corrected_text: outcome.corrected_text,
            should_apply: outcome.should_apply,
        }))
    }
}
