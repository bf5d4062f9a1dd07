use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::detection::domain::face_detector::FaceDetector;
use crate::persistence::domain::face_repository::FaceRepository;
use crate::pipeline::frame_processor::{FrameProcessor, FrameReport};
use crate::pipeline::run_logger::RunLogger;
use crate::pipeline::tracking_error::TrackingError;
use crate::shared::clock::Clock;
use crate::shared::video_metadata::VideoMetadata;
use crate::tracking::domain::identity_registry::IdentityRegistry;
use crate::video::domain::video_reader::VideoReader;

/// Callback invoked with every frame report. Returning `false` stops the
/// run after the current frame.
pub type FrameCallback = Box<dyn FnMut(&FrameReport) -> bool + Send>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum StopReason {
    EndOfStream,
    /// A frame could not be read; everything before it was processed.
    AcquisitionFailure(String),
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames_processed: usize,
    pub identities_created: usize,
    pub detections_recorded: usize,
    pub detections_skipped: usize,
    pub stop_reason: StopReason,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            frames_processed: 0,
            identities_created: 0,
            detections_recorded: 0,
            detections_skipped: 0,
            stop_reason: StopReason::EndOfStream,
        }
    }

    fn add(&mut self, report: &FrameReport) {
        self.frames_processed += 1;
        self.identities_created += report.new_identities();
        self.detections_recorded += report.faces.len();
        self.detections_skipped += report.skipped.len();
    }
}

/// Runs the tracking loop over an opened frame source.
///
/// Each frame is read, detected, stamped and handed to the
/// [`FrameProcessor`] before the next one is read, so a stop request or a
/// read failure never leaves a frame half-applied. The reader is closed on
/// every exit path.
pub struct TrackFacesUseCase {
    reader: Box<dyn VideoReader>,
    detector: Box<dyn FaceDetector>,
    processor: FrameProcessor,
    clock: Box<dyn Clock>,
    logger: Box<dyn RunLogger>,
    on_frame: Option<FrameCallback>,
    cancelled: Arc<AtomicBool>,
}

impl TrackFacesUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reader: Box<dyn VideoReader>,
        detector: Box<dyn FaceDetector>,
        processor: FrameProcessor,
        clock: Box<dyn Clock>,
        logger: Box<dyn RunLogger>,
        on_frame: Option<FrameCallback>,
        cancelled: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            reader,
            detector,
            processor,
            clock,
            logger,
            on_frame,
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn execute(
        &mut self,
        metadata: &VideoMetadata,
        registry: &mut IdentityRegistry,
        repository: &mut dyn FaceRepository,
    ) -> Result<RunSummary, TrackingError> {
        let result = self.run(metadata, registry, repository);
        self.reader.close();
        self.logger.summary();

        if let Ok(summary) = &result {
            match &summary.stop_reason {
                StopReason::EndOfStream => {}
                StopReason::Cancelled => self.logger.info("Tracking cancelled"),
                StopReason::AcquisitionFailure(message) => {
                    self.logger.info(&format!("Tracking stopped early: {message}"))
                }
            }
        }
        result
    }

    fn run(
        &mut self,
        metadata: &VideoMetadata,
        registry: &mut IdentityRegistry,
        repository: &mut dyn FaceRepository,
    ) -> Result<RunSummary, TrackingError> {
        let mut summary = RunSummary::new();
        let total = metadata.total_frames;
        let mut frames = self.reader.frames();

        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                summary.stop_reason = StopReason::Cancelled;
                break;
            }

            let frame = match frames.next() {
                None => break,
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    let err = TrackingError::AcquisitionFailure(e.to_string());
                    log::warn!("{err}, stopping after {} frames", summary.frames_processed);
                    summary.stop_reason = StopReason::AcquisitionFailure(e.to_string());
                    break;
                }
            };

            let t0 = Instant::now();
            let detections =
                self.detector
                    .detect(&frame)
                    .map_err(|e| TrackingError::DetectionFailure {
                        frame_index: frame.index(),
                        message: e.to_string(),
                    })?;
            self.logger
                .timing("detect", t0.elapsed().as_secs_f64() * 1000.0);

            let t0 = Instant::now();
            let report = self.processor.process(
                registry,
                repository,
                &frame,
                &detections,
                self.clock.now(),
            )?;
            self.logger
                .timing("track", t0.elapsed().as_secs_f64() * 1000.0);

            summary.add(&report);
            self.logger.frame(&report);
            self.logger.progress(summary.frames_processed, total);

            if let Some(callback) = self.on_frame.as_mut() {
                if !callback(&report) {
                    summary.stop_reason = StopReason::Cancelled;
                    break;
                }
            }
        }

        Ok(summary)
    }
}
