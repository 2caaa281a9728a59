//! 关键帧提取流程：读帧 → 选帧 → 落盘

use super::config::DetectorConfig;
use super::error::KeyframeError;
use super::events::{EventHook, LogEventHook, SelectorEvent, PROGRESS_INTERVAL};
use super::selector::{FrameSelector, SelectReason, StepAction};
use super::sink::{FrameSink, JpegDirSink};
use super::source::{FfmpegSource, FrameSource};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Checked once per frame; cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyframeRecord {
    pub index: u64,
    pub identifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub processed_frames: u64,
    pub skipped_frames: u64,
    pub extracted_frames: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub message: String,
    pub keyframes: Vec<KeyframeRecord>,
    pub stats: ExtractionStats,
}

impl ProcessingResult {
    pub fn failure(error: &KeyframeError) -> Self {
        Self {
            success: false,
            message: format!("Processing failed: {}", error),
            keyframes: Vec::new(),
            stats: ExtractionStats::default(),
        }
    }

    pub fn indices(&self) -> Vec<u64> {
        self.keyframes.iter().map(|k| k.index).collect()
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.keyframes.iter().map(|k| k.identifier.as_str()).collect()
    }

    pub fn to_json(&self) -> Result<String, KeyframeError> {
        Ok(serde_json::to_string(self)?)
    }
}

pub struct KeyframeProcessor {
    config: DetectorConfig,
    hook: Arc<dyn EventHook>,
    cancel: CancelToken,
}

impl KeyframeProcessor {
    pub fn new(config: DetectorConfig) -> Result<Self, KeyframeError> {
        config.validate()?;
        Ok(Self {
            config,
            hook: Arc::new(LogEventHook),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_hook(mut self, hook: Arc<dyn EventHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Runs the selection loop to completion. Any error discards the
    /// keyframes collected so far; files already written stay on disk.
    pub fn extract_keyframes<S, K>(
        &self,
        source: &mut S,
        sink: &mut K,
    ) -> Result<(Vec<KeyframeRecord>, ExtractionStats), KeyframeError>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        let mut selector = FrameSelector::new(self.config.clone())?;
        let mut stats = ExtractionStats::default();
        let mut keyframes = Vec::new();
        let mut position = 0u64;

        self.hook
            .on_event(&SelectorEvent::SourceOpened(source.info().clone()));

        loop {
            if self.cancel.is_cancelled() {
                return Err(KeyframeError::Cancelled);
            }

            let frame = match source.next_frame()? {
                Some(frame) => frame,
                None => break,
            };
            let action = selector.push(frame)?;
            position += 1;

            match action {
                StepAction::Undecodable => {
                    stats.skipped_frames += 1;
                    self.hook.on_event(&SelectorEvent::FrameUndecodable {
                        position: position - 1,
                    });
                    continue;
                }
                StepAction::Keep { index, reason } => {
                    self.persist(&selector, sink, index, reason, &mut keyframes)?;
                }
                StepAction::Discard { .. } => {}
            }

            stats.processed_frames += 1;
            self.hook.on_event(&SelectorEvent::FrameProcessed {
                index: stats.processed_frames - 1,
            });
            if stats.processed_frames % PROGRESS_INTERVAL == 0 {
                self.hook.on_event(&SelectorEvent::Progress {
                    processed: stats.processed_frames,
                });
            }
        }

        if let Some(StepAction::Keep { index, reason }) = selector.finish() {
            self.persist(&selector, sink, index, reason, &mut keyframes)?;
        }

        stats.extracted_frames = keyframes.len() as u64;
        self.hook.on_event(&SelectorEvent::Finished {
            processed: stats.processed_frames,
            keyframes: keyframes.len(),
        });

        Ok((keyframes, stats))
    }

    fn persist<K: FrameSink + ?Sized>(
        &self,
        selector: &FrameSelector,
        sink: &mut K,
        index: u64,
        reason: SelectReason,
        keyframes: &mut Vec<KeyframeRecord>,
    ) -> Result<(), KeyframeError> {
        let frame = selector.selected_frame().ok_or_else(|| {
            KeyframeError::DecodeFailure(format!("no frame held for keyframe {}", index))
        })?;

        let identifier = sink.persist(frame, index)?;
        let gates = match &reason {
            SelectReason::SceneChange(metrics) => metrics.exceeded(&self.config),
            _ => Vec::new(),
        };
        self.hook.on_event(&SelectorEvent::KeyframeSelected {
            index,
            reason,
            gates,
            identifier: identifier.clone(),
        });
        keyframes.push(KeyframeRecord { index, identifier });
        Ok(())
    }

    /// Same as [`extract_keyframes`](Self::extract_keyframes), with every
    /// error folded into a failed `ProcessingResult`.
    pub fn process<S, K>(&self, source: &mut S, sink: &mut K) -> ProcessingResult
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        let duration = source.info().duration();
        let outcome = self.extract_keyframes(source, sink);
        self.to_result(outcome, duration)
    }

    /// Decodes `video_path` with ffmpeg and writes keyframes as JPEGs into
    /// `output_dir`, replacing keyframes from earlier runs.
    pub fn process_video(
        &self,
        video_path: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> ProcessingResult {
        let mut duration = None;
        let outcome = (|| {
            let mut source = FfmpegSource::open(video_path)?;
            let mut sink = JpegDirSink::create(output_dir)?;
            sink.clear_previous()?;
            duration = source.info().duration();
            self.extract_keyframes(&mut source, &mut sink)
        })();
        self.to_result(outcome, duration)
    }

    fn to_result(
        &self,
        outcome: Result<(Vec<KeyframeRecord>, ExtractionStats), KeyframeError>,
        duration: Option<Duration>,
    ) -> ProcessingResult {
        match outcome {
            Ok((keyframes, stats)) => {
                let mut message = format!("Extracted {} keyframes", keyframes.len());
                if let Some(duration) = duration.filter(|_| !keyframes.is_empty()) {
                    message.push_str(&format!(
                        ", average interval {:.2}s",
                        duration.as_secs_f64() / keyframes.len() as f64
                    ));
                }
                ProcessingResult {
                    success: true,
                    message,
                    keyframes,
                    stats,
                }
            }
            Err(e) => {
                self.hook.on_event(&SelectorEvent::Failed {
                    message: e.to_string(),
                });
                ProcessingResult::failure(&e)
            }
        }
    }
}
