// 该文件是 Shanan （山南西风） 项目的一部分。
// src/occupancy.rs - 停留计数与空间占用网格
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

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use crate::track::{Track, TrackId};

/// 二维占用网格，行优先存储，尺寸在会话开始时固定
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
  width: usize,
  height: usize,
  cells: Vec<f64>,
}

impl OccupancyGrid {
  pub fn new(width: usize, height: usize) -> Self {
    Self {
      width,
      height,
      cells: vec![0.0; width * height],
    }
  }

  pub(crate) fn from_cells(width: usize, height: usize, cells: Vec<f64>) -> Self {
    debug_assert_eq!(cells.len(), width * height);
    Self {
      width,
      height,
      cells,
    }
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn cells(&self) -> &[f64] {
    &self.cells
  }

  pub fn get(&self, x: usize, y: usize) -> Option<f64> {
    (x < self.width && y < self.height).then(|| self.cells[y * self.width + x])
  }

  pub fn max(&self) -> f64 {
    self.cells.iter().copied().fold(0.0, f64::max)
  }

  pub fn is_all_zero(&self) -> bool {
    self.cells.iter().all(|&v| v == 0.0)
  }

  /// 在质心所在的格子加一；质心越界时不做任何修改并返回 `false`
  pub fn increment(&mut self, cx: f32, cy: f32) -> bool {
    let (cx, cy) = (cx.floor(), cy.floor());
    if !(cx >= 0.0 && cy >= 0.0 && (cx as usize) < self.width && (cy as usize) < self.height) {
      return false;
    }
    self.cells[cy as usize * self.width + cx as usize] += 1.0;
    true
  }
}

/// 身份 -> 出现帧数
pub type IdentityPresence = BTreeMap<TrackId, u64>;

/// 占用累加器，是停留计数与占用网格的唯一写入点
#[derive(Debug, Clone)]
pub struct Accumulator {
  grid: OccupancyGrid,
  presence: IdentityPresence,
  frames: u64,
}

impl Accumulator {
  pub fn new(width: usize, height: usize) -> Self {
    Self {
      grid: OccupancyGrid::new(width, height),
      presence: IdentityPresence::new(),
      frames: 0,
    }
  }

  /// 记录一条已确认轨迹在当前采样帧中的出现
  pub fn observe(&mut self, track: &Track) {
    *self.presence.entry(track.id).or_insert(0) += 1;

    let (cx, cy) = track.bbox.centroid();
    if !self.grid.increment(cx, cy) {
      debug!("轨迹 {} 的质心 ({:.1}, {:.1}) 超出画面，忽略", track.id, cx, cy);
    }
  }

  /// 记录一个采样帧中的全部已确认轨迹，同一帧内重复的身份只计一次
  pub fn observe_frame(&mut self, tracks: &[Track]) {
    let mut seen = HashSet::with_capacity(tracks.len());
    for track in tracks {
      if !seen.insert(track.id) {
        warn!("同一帧中出现重复的轨迹 {}，忽略", track.id);
        continue;
      }
      self.observe(track);
    }
    self.frames += 1;
  }

  pub fn grid(&self) -> &OccupancyGrid {
    &self.grid
  }

  pub fn presence(&self) -> &IdentityPresence {
    &self.presence
  }

  /// 已处理的采样帧数
  pub fn frames(&self) -> u64 {
    self.frames
  }
}
