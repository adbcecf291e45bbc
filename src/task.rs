// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 停留时间分析任务循环
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::sync::mpsc::{SyncSender, TrySendError};

use tracing::{debug, error, info, warn};

use crate::{
  BoxError,
  config::SessionConfig,
  finalize::{FinalizedResult, finalize},
  frame::Frame,
  input::FrameSource,
  model::{DetectResult, Model, filter_detections},
  occupancy::Accumulator,
  session::{CancelHandle, SessionError, SessionEvent},
  track::{Track, Tracker, TrackerAdapter},
};

#[cfg(feature = "preview")]
use crate::output::{DirectoryRecordOutput, Render};

pub trait Task<I, M, T>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, tracker: T) -> Result<Self::Output, Self::Error>;
}

/// 采样 → 检测 → 过滤 → 跟踪 → 累加，直到帧源读完或收到取消信号
pub struct DwellTask {
  config: SessionConfig,
  cancel: CancelHandle,
  events: SyncSender<SessionEvent>,
  #[cfg(feature = "preview")]
  preview: Option<DirectoryRecordOutput>,
}

impl DwellTask {
  pub fn new(
    config: SessionConfig,
    cancel: CancelHandle,
    events: SyncSender<SessionEvent>,
  ) -> Self {
    Self {
      config,
      cancel,
      events,
      #[cfg(feature = "preview")]
      preview: None,
    }
  }

  #[cfg(feature = "preview")]
  pub fn with_preview(mut self, preview: Option<DirectoryRecordOutput>) -> Self {
    self.preview = preview;
    self
  }

  // 进度只保留最新值，通道满或观察端已退出时直接丢弃
  fn report_progress(&self, sampled: u64, index: u64) {
    if let Err(TrySendError::Full(_)) = self
      .events
      .try_send(SessionEvent::Progress { sampled, index })
    {
      debug!("事件通道已满，丢弃第 {} 帧的进度", index);
    }
  }

  #[cfg(feature = "preview")]
  fn render_preview(&self, frame: &Frame, tracks: &[Track]) {
    if let Some(preview) = self.preview.as_ref()
      && let Err(e) = preview.render_result(frame, tracks)
    {
      warn!("第 {} 帧预览保存失败: {}", frame.index, e);
    }
  }

  #[cfg(not(feature = "preview"))]
  fn render_preview(&self, _frame: &Frame, _tracks: &[Track]) {}
}

impl<I, M, T> Task<I, M, T> for DwellTask
where
  I: FrameSource,
  M: Model<Input = Frame, Output = DetectResult>,
  M::Error: Into<BoxError>,
  T: Tracker,
  T::Error: Into<BoxError>,
{
  type Output = FinalizedResult;
  type Error = SessionError;

  fn run_task(self, input: I, model: M, tracker: T) -> Result<FinalizedResult, SessionError> {
    let fps = input.fps();
    let (width, height) = (input.width(), input.height());
    info!(
      "开始任务: {}x{} @ {:.2} fps, 采样步长 {}",
      width, height, fps, self.config.stride
    );

    let mut accumulator = Accumulator::new(width as usize, height as usize);
    let mut tracker = TrackerAdapter::new(tracker);
    let mut sampled = input.sampled(self.config.stride);
    let mut cancelled = false;

    loop {
      if self.cancel.is_cancelled() {
        warn!("收到取消信号，退出任务循环");
        cancelled = true;
        break;
      }

      let frame = match sampled.next() {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => {
          error!("解码失败: {}", e);
          return Err(SessionError::Decode(e));
        }
        None => break,
      };

      if frame.width() != width || frame.height() != height {
        warn!(
          "第 {} 帧尺寸 {}x{} 与会话尺寸 {}x{} 不一致",
          frame.index,
          frame.width(),
          frame.height(),
          width,
          height
        );
      }

      let result = model.infer(&frame).map_err(|e| {
        let e: BoxError = e.into();
        error!("第 {} 帧检测失败: {}", frame.index, e);
        SessionError::Detector(e)
      })?;
      let detections = filter_detections(&result.items, &self.config.filter);

      let tracks = tracker.confirmed(&frame, &detections).map_err(|e| {
        let e: BoxError = e.into();
        error!("第 {} 帧跟踪失败: {}", frame.index, e);
        SessionError::Tracker(e)
      })?;

      accumulator.observe_frame(&tracks);
      self.render_preview(&frame, &tracks);

      debug!(
        "第 {} 帧: {} 个检测, {} 条已确认轨迹",
        frame.index,
        detections.len(),
        tracks.len()
      );
      self.report_progress(accumulator.frames(), frame.index);
    }

    info!(
      "任务循环结束: 解码 {} 帧, 采样 {} 帧",
      sampled.decoded(),
      accumulator.frames()
    );
    Ok(finalize(&accumulator, fps, &self.config, cancelled))
  }
}

#[cfg(test)]
mod tests {
  use std::{num::NonZeroU32, sync::mpsc};

  use image::RgbImage;

  use super::*;
  use crate::{input::InputError, model::ReplayDetector, track::IouTracker};

  struct Blank {
    frames: u64,
    next: u64,
  }

  impl Iterator for Blank {
    type Item = Result<Frame, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
      (self.next < self.frames).then(|| {
        let index = self.next;
        self.next += 1;
        Ok(Frame::new(RgbImage::new(16, 12), index, index * 40))
      })
    }
  }

  impl FrameSource for Blank {
    fn fps(&self) -> f64 {
      25.0
    }

    fn width(&self) -> u32 {
      16
    }

    fn height(&self) -> u32 {
      12
    }
  }

  fn task(events: SyncSender<SessionEvent>) -> DwellTask {
    let config = SessionConfig::default().with_stride(NonZeroU32::new(1).unwrap());
    DwellTask::new(config, CancelHandle::default(), events)
  }

  #[test]
  fn progress_is_dropped_when_nobody_reads() {
    let (tx, rx) = mpsc::sync_channel(4);
    let source = Blank {
      frames: 500,
      next: 0,
    };
    let result = task(tx)
      .run_task(source, ReplayDetector::default(), IouTracker::default())
      .unwrap();
    assert_eq!(result.sampled_frames(), 500);

    let sampled: Vec<u64> = rx
      .try_iter()
      .map(|event| match event {
        SessionEvent::Progress { sampled, .. } => sampled,
        other => panic!("unexpected event: {:?}", other),
      })
      .collect();
    assert_eq!(sampled, vec![1, 2, 3, 4]);
  }

  #[test]
  fn closed_channel_does_not_stop_the_loop() {
    let (tx, rx) = mpsc::sync_channel(1);
    drop(rx);
    let source = Blank {
      frames: 10,
      next: 0,
    };
    let result = task(tx)
      .run_task(source, ReplayDetector::default(), IouTracker::default())
      .unwrap();
    assert_eq!(result.sampled_frames(), 10);
  }
}
