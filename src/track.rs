// 该文件是 Shanan （山南西风） 项目的一部分。
// src/track.rs - 身份跟踪
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

use crate::{
  config::TrackerConfig,
  frame::Frame,
  model::{BBox, Detection},
};

mod iou;
pub use self::iou::{IouTracker, IouTrackerBuilder};

pub type TrackId = u64;

/// 轨迹状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
  /// 新建轨迹，证据不足
  #[default]
  Tentative,
  /// 已确认，可交给下游统计
  Confirmed,
  /// 已确认但本次更新未匹配到检测
  Lost,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
  pub id: TrackId,
  pub state: TrackState,
  pub bbox: BBox,
}

impl Track {
  pub fn is_confirmed(&self) -> bool {
    self.state == TrackState::Confirmed
  }
}

/// 多目标跟踪器
///
/// 每个采样帧调用一次 `update_tracks`，返回跟踪器当前持有的全部轨迹（任意状态）。
pub trait Tracker {
  type Error;

  fn update_tracks(
    &mut self,
    frame: &Frame,
    detections: &[Detection],
  ) -> Result<Vec<Track>, Self::Error>;
}

/// 跟踪器构造器，在工作线程中按会话的跟踪配置创建跟踪器
pub trait OpenTracker: Send + 'static {
  type Tracker: Tracker;

  fn open(self, config: &TrackerConfig) -> Self::Tracker;
}

/// 跟踪器适配层，只向下游暴露已确认的轨迹
pub struct TrackerAdapter<T> {
  tracker: T,
}

impl<T: Tracker> TrackerAdapter<T> {
  pub fn new(tracker: T) -> Self {
    Self { tracker }
  }

  pub fn confirmed(
    &mut self,
    frame: &Frame,
    detections: &[Detection],
  ) -> Result<Vec<Track>, T::Error> {
    let tracks = self.tracker.update_tracks(frame, detections)?;
    Ok(tracks.into_iter().filter(Track::is_confirmed).collect())
  }

  pub fn into_inner(self) -> T {
    self.tracker
  }
}

#[cfg(test)]
mod tests {
  use std::convert::Infallible;

  use image::RgbImage;

  use super::*;

  struct Fixed(Vec<Track>);

  impl Tracker for Fixed {
    type Error = Infallible;

    fn update_tracks(&mut self, _: &Frame, _: &[Detection]) -> Result<Vec<Track>, Infallible> {
      Ok(self.0.clone())
    }
  }

  fn track(id: TrackId, state: TrackState) -> Track {
    Track {
      id,
      state,
      bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
    }
  }

  #[test]
  fn adapter_surfaces_confirmed_tracks_only() {
    let mut adapter = TrackerAdapter::new(Fixed(vec![
      track(1, TrackState::Tentative),
      track(2, TrackState::Confirmed),
      track(3, TrackState::Lost),
      track(4, TrackState::Confirmed),
    ]));
    let frame = Frame::new(RgbImage::new(2, 2), 0, 0);
    let ids: Vec<TrackId> = adapter
      .confirmed(&frame, &[])
      .unwrap()
      .iter()
      .map(|t| t.id)
      .collect();
    assert_eq!(ids, vec![2, 4]);
  }
}
