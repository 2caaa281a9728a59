use super::selector::SelectReason;
use super::source::SourceInfo;
use log::{debug, error, info, warn};
use std::sync::Mutex;

pub const PROGRESS_INTERVAL: u64 = 100;

/// Events emitted by the keyframe loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorEvent {
    SourceOpened(SourceInfo),
    FrameProcessed { index: u64 },
    FrameUndecodable { position: u64 },
    KeyframeSelected {
        index: u64,
        reason: SelectReason,
        /// Thresholds exceeded for a scene change, empty otherwise.
        gates: Vec<&'static str>,
        identifier: String,
    },
    Progress { processed: u64 },
    Finished { processed: u64, keyframes: usize },
    Failed { message: String },
}

pub trait EventHook: Send + Sync {
    fn on_event(&self, event: &SelectorEvent);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventHook;

impl EventHook for LogEventHook {
    fn on_event(&self, event: &SelectorEvent) {
        match event {
            SelectorEvent::SourceOpened(info) => {
                info!(
                    "📼 Video info: {}x{}, fps={:.2}, total_frames={:?}, duration={:?}",
                    info.width,
                    info.height,
                    info.fps,
                    info.total_frames,
                    info.duration()
                );
            }
            SelectorEvent::FrameProcessed { .. } => {}
            SelectorEvent::FrameUndecodable { position } => {
                warn!("⚠️ Frame at position {} is empty, skipped", position);
            }
            SelectorEvent::KeyframeSelected {
                index,
                reason,
                gates,
                identifier,
            } => match reason {
                SelectReason::FirstFrame => info!("🖼️ First frame saved: {}", identifier),
                SelectReason::TailCoverage => {
                    info!("🖼️ Last frame {} saved: {}", index, identifier)
                }
                SelectReason::SceneChange(metrics) => info!(
                    "🎯 Keyframe {} [{}]: diff={:.2}, edge={:.2}, hist={:.2} -> {}",
                    index,
                    gates.join("+"),
                    metrics.mean_abs_diff,
                    metrics.edge_score,
                    metrics.hist_distance,
                    identifier
                ),
            },
            SelectorEvent::Progress { processed } => debug!("Processed {} frames...", processed),
            SelectorEvent::Finished {
                processed,
                keyframes,
            } => info!(
                "✅ Finished: {} frames processed, {} keyframes",
                processed, keyframes
            ),
            SelectorEvent::Failed { message } => error!("❌ Keyframe extraction failed: {}", message),
        }
    }
}

/// Keeps every event, for callers that inspect the run afterwards.
#[derive(Debug, Default)]
pub struct RecordingHook {
    events: Mutex<Vec<SelectorEvent>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SelectorEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventHook for RecordingHook {
    fn on_event(&self, event: &SelectorEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
