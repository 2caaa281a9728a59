use super::config::DetectorConfig;
use super::decision::is_scene_change;
use super::error::KeyframeError;
use super::frame::{Frame, GrayFrame};
use super::metrics::{compute_metrics, MetricSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorPhase {
    Init,
    Streaming,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectReason {
    FirstFrame,
    SceneChange(MetricSet),
    TailCoverage,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepAction {
    /// Keep the frame now held in `last_valid_frame` under `index`.
    Keep { index: u64, reason: SelectReason },
    Discard { index: u64, metrics: Option<MetricSet> },
    /// Frame had no pixels and was ignored entirely.
    Undecodable,
}

/// 选帧状态，逐帧推进
#[derive(Debug, Clone)]
pub struct SelectorState {
    phase: SelectorPhase,
    previous_gray: Option<GrayFrame>,
    last_valid_frame: Option<Frame>,
    last_keyframe_index: i64,
    frame_count: u64,
}

impl SelectorState {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            phase: SelectorPhase::Init,
            previous_gray: None,
            last_valid_frame: None,
            last_keyframe_index: -(config.min_gap as i64),
            frame_count: 0,
        }
    }

    pub fn advance(
        &mut self,
        frame: Frame,
        config: &DetectorConfig,
    ) -> Result<StepAction, KeyframeError> {
        if self.phase == SelectorPhase::Done {
            return Err(KeyframeError::SelectorClosed);
        }
        if frame.is_empty() {
            return Ok(StepAction::Undecodable);
        }

        let index = self.frame_count;
        let gray = frame.to_gray();

        let action = if index == 0 {
            self.last_keyframe_index = 0;
            StepAction::Keep {
                index,
                reason: SelectReason::FirstFrame,
            }
        } else {
            match &self.previous_gray {
                Some(previous) if self.gap_since_keyframe(index) > config.min_gap as i64 => {
                    let metrics = compute_metrics(&gray, previous)?;
                    if is_scene_change(&metrics, config) {
                        self.last_keyframe_index = index as i64;
                        StepAction::Keep {
                            index,
                            reason: SelectReason::SceneChange(metrics),
                        }
                    } else {
                        StepAction::Discard {
                            index,
                            metrics: Some(metrics),
                        }
                    }
                }
                _ => StepAction::Discard {
                    index,
                    metrics: None,
                },
            }
        };

        self.last_valid_frame = Some(frame);
        self.previous_gray = Some(gray);
        self.frame_count += 1;
        self.phase = SelectorPhase::Streaming;

        Ok(action)
    }

    /// Closes the stream. Keeps the last valid frame when the tail since
    /// the previous keyframe is longer than `min_gap`.
    pub fn finish(&mut self, config: &DetectorConfig) -> Option<StepAction> {
        if self.phase == SelectorPhase::Done {
            return None;
        }
        self.phase = SelectorPhase::Done;
        self.previous_gray = None;

        if self.last_valid_frame.is_none() {
            return None;
        }
        if self.gap_since_keyframe(self.frame_count) > config.min_gap as i64 {
            let index = self.frame_count - 1;
            self.last_keyframe_index = index as i64;
            return Some(StepAction::Keep {
                index,
                reason: SelectReason::TailCoverage,
            });
        }
        None
    }

    fn gap_since_keyframe(&self, index: u64) -> i64 {
        index as i64 - self.last_keyframe_index
    }

    pub fn phase(&self) -> SelectorPhase {
        self.phase
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn last_keyframe_index(&self) -> i64 {
        self.last_keyframe_index
    }

    pub fn last_valid_frame(&self) -> Option<&Frame> {
        self.last_valid_frame.as_ref()
    }
}

/// 关键帧选择器：配置 + 状态
pub struct FrameSelector {
    config: DetectorConfig,
    state: SelectorState,
}

impl FrameSelector {
    pub fn new(config: DetectorConfig) -> Result<Self, KeyframeError> {
        config.validate()?;
        Ok(Self {
            state: SelectorState::new(&config),
            config,
        })
    }

    pub fn push(&mut self, frame: Frame) -> Result<StepAction, KeyframeError> {
        self.state.advance(frame, &self.config)
    }

    pub fn finish(&mut self) -> Option<StepAction> {
        self.state.finish(&self.config)
    }

    /// The frame a `Keep` action refers to.
    pub fn selected_frame(&self) -> Option<&Frame> {
        self.state.last_valid_frame()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn state(&self) -> &SelectorState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = SelectorState::new(&self.config);
    }
}
