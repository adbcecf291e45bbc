// 该文件是 Shanan （山南西风） 项目的一部分。
// src/track/iou.rs - 基于 IoU 的多目标跟踪器
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

use std::convert::Infallible;

use tracing::debug;

use super::{OpenTracker, Track, TrackId, TrackState, Tracker};
use crate::{
  config::TrackerConfig,
  frame::Frame,
  model::{BBox, Detection},
};

#[derive(Debug, Clone)]
struct TrackEntry {
  id: TrackId,
  state: TrackState,
  bbox: BBox,
  /// 连续命中次数
  hits: u32,
  /// 连续丢失次数
  misses: u32,
}

impl TrackEntry {
  fn to_track(&self) -> Track {
    Track {
      id: self.id,
      state: self.state,
      bbox: self.bbox,
    }
  }
}

/// 贪心 IoU 关联的跟踪器
///
/// - 新轨迹为 `Tentative`，连续命中 `n_init` 次后确认；
/// - `Tentative` 轨迹一旦未匹配即删除；
/// - 已确认轨迹未匹配时转为 `Lost`，连续丢失超过 `max_age` 次后删除，期间重新匹配则恢复为 `Confirmed`。
#[derive(Debug, Clone)]
pub struct IouTracker {
  config: TrackerConfig,
  tracks: Vec<TrackEntry>,
  next_id: TrackId,
}

impl IouTracker {
  pub fn new(config: TrackerConfig) -> Self {
    Self {
      config,
      tracks: Vec::new(),
      next_id: 1,
    }
  }

  fn associate(&self, detections: &[Detection]) -> Vec<(usize, usize)> {
    let mut candidates = Vec::new();
    for (t, track) in self.tracks.iter().enumerate() {
      for (d, detection) in detections.iter().enumerate() {
        let iou = track.bbox.iou(&detection.bbox);
        if iou >= self.config.iou_threshold && iou > 0.0 {
          candidates.push((iou, t, d));
        }
      }
    }
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut track_used = vec![false; self.tracks.len()];
    let mut detection_used = vec![false; detections.len()];
    let mut matches = Vec::new();
    for (_, t, d) in candidates {
      if !track_used[t] && !detection_used[d] {
        track_used[t] = true;
        detection_used[d] = true;
        matches.push((t, d));
      }
    }
    matches
  }
}

impl Default for IouTracker {
  fn default() -> Self {
    Self::new(TrackerConfig::default())
  }
}

/// 按会话配置创建 [`IouTracker`]
#[derive(Debug, Clone, Copy, Default)]
pub struct IouTrackerBuilder;

impl OpenTracker for IouTrackerBuilder {
  type Tracker = IouTracker;

  fn open(self, config: &TrackerConfig) -> IouTracker {
    IouTracker::new(*config)
  }
}

impl Tracker for IouTracker {
  type Error = Infallible;

  fn update_tracks(
    &mut self,
    frame: &Frame,
    detections: &[Detection],
  ) -> Result<Vec<Track>, Self::Error> {
    let matches = self.associate(detections);
    let mut track_matched = vec![false; self.tracks.len()];
    let mut detection_matched = vec![false; detections.len()];

    for &(t, d) in &matches {
      track_matched[t] = true;
      detection_matched[d] = true;

      let entry = &mut self.tracks[t];
      entry.bbox = detections[d].bbox;
      entry.hits += 1;
      entry.misses = 0;
      entry.state = match entry.state {
        TrackState::Tentative if entry.hits >= self.config.n_init => TrackState::Confirmed,
        TrackState::Tentative => TrackState::Tentative,
        TrackState::Confirmed | TrackState::Lost => TrackState::Confirmed,
      };
    }

    let max_age = self.config.max_age;
    let mut matched = track_matched.into_iter();
    self.tracks.retain_mut(|entry| {
      if matched.next().unwrap_or(false) {
        return true;
      }
      entry.hits = 0;
      entry.misses += 1;
      match entry.state {
        TrackState::Tentative => false,
        TrackState::Confirmed | TrackState::Lost => {
          entry.state = TrackState::Lost;
          entry.misses <= max_age
        }
      }
    });

    for (d, detection) in detections.iter().enumerate() {
      if detection_matched[d] {
        continue;
      }
      let state = if self.config.n_init <= 1 {
        TrackState::Confirmed
      } else {
        TrackState::Tentative
      };
      self.tracks.push(TrackEntry {
        id: self.next_id,
        state,
        bbox: detection.bbox,
        hits: 1,
        misses: 0,
      });
      self.next_id += 1;
    }

    debug!(
      "第 {} 帧: {} 个检测, {} 个关联, {} 条轨迹",
      frame.index,
      detections.len(),
      matches.len(),
      self.tracks.len()
    );

    Ok(self.tracks.iter().map(TrackEntry::to_track).collect())
  }
}

#[cfg(test)]
mod tests {
  use image::RgbImage;

  use super::*;

  fn frame(index: u64) -> Frame {
    Frame::new(RgbImage::new(1, 1), index, 0)
  }

  fn detection(x: f32, y: f32) -> Detection {
    Detection {
      bbox: BBox::new(x, y, 20.0, 40.0),
      confidence: 0.9,
      class_id: 0,
    }
  }

  fn config(max_age: u32, n_init: u32) -> TrackerConfig {
    TrackerConfig {
      max_age,
      n_init,
      iou_threshold: 0.3,
    }
  }

  #[test]
  fn track_is_confirmed_after_n_init_hits() {
    let mut tracker = IouTracker::new(config(5, 3));
    let states: Vec<TrackState> = (0..3)
      .map(|i| tracker.update_tracks(&frame(i), &[detection(10.0 + i as f32, 10.0)]).unwrap()[0].state)
      .collect();
    assert_eq!(
      states,
      vec![
        TrackState::Tentative,
        TrackState::Tentative,
        TrackState::Confirmed
      ]
    );
  }

  #[test]
  fn tentative_track_is_deleted_on_miss() {
    let mut tracker = IouTracker::new(config(5, 3));
    tracker.update_tracks(&frame(0), &[detection(10.0, 10.0)]).unwrap();
    let tracks = tracker.update_tracks(&frame(1), &[]).unwrap();
    assert!(tracks.is_empty());

    let tracks = tracker.update_tracks(&frame(2), &[detection(10.0, 10.0)]).unwrap();
    assert_eq!(tracks[0].id, 2);
  }

  #[test]
  fn confirmed_track_survives_gaps_up_to_max_age() {
    let mut tracker = IouTracker::new(config(2, 1));
    let first = tracker.update_tracks(&frame(0), &[detection(10.0, 10.0)]).unwrap();
    assert_eq!(first[0].state, TrackState::Confirmed);

    let lost = tracker.update_tracks(&frame(1), &[]).unwrap();
    assert_eq!(lost[0].state, TrackState::Lost);
    tracker.update_tracks(&frame(2), &[]).unwrap();

    let back = tracker.update_tracks(&frame(3), &[detection(12.0, 10.0)]).unwrap();
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].id, 1);
    assert_eq!(back[0].state, TrackState::Confirmed);

    for i in 4..7 {
      tracker.update_tracks(&frame(i), &[]).unwrap();
    }
    assert!(tracker.update_tracks(&frame(7), &[]).unwrap().is_empty());
  }

  #[test]
  fn builder_applies_tracker_config() {
    let mut tracker = IouTrackerBuilder.open(&config(5, 1));
    let tracks = tracker.update_tracks(&frame(0), &[detection(10.0, 10.0)]).unwrap();
    assert_eq!(tracks[0].state, TrackState::Confirmed);

    let mut tracker = IouTrackerBuilder.open(&config(5, 2));
    let tracks = tracker.update_tracks(&frame(0), &[detection(10.0, 10.0)]).unwrap();
    assert_eq!(tracks[0].state, TrackState::Tentative);
  }

  #[test]
  fn disjoint_detections_get_distinct_ids() {
    let mut tracker = IouTracker::new(config(5, 1));
    let tracks = tracker
      .update_tracks(&frame(0), &[detection(0.0, 0.0), detection(300.0, 300.0)])
      .unwrap();
    assert_eq!(tracks.len(), 2);
    assert_ne!(tracks[0].id, tracks[1].id);

    let tracks = tracker
      .update_tracks(&frame(1), &[detection(302.0, 301.0), detection(1.0, 0.0)])
      .unwrap();
    assert_eq!(tracks[0].bbox.x, 1.0);
    assert_eq!(tracks[1].bbox.x, 302.0);
  }
}
