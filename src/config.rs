// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 会话配置
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

use std::num::NonZeroU32;

/// COCO 数据集中 `person` 的类别编号
pub const COCO_PERSON_CLASS_ID: u32 = 0;

pub const DEFAULT_STRIDE: NonZeroU32 = NonZeroU32::new(3).unwrap();
pub const DEFAULT_CONFIDENCE: f32 = 0.4;
pub const DEFAULT_MAX_AGE: u32 = 50;
pub const DEFAULT_N_INIT: u32 = 3;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.3;
pub const DEFAULT_SIGMA: f64 = 30.0;

/// 检测过滤配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterConfig {
  /// 需要跟踪的类别
  pub class_id: u32,
  /// 置信度阈值，严格大于该值才保留
  pub confidence: f32,
}

impl Default for FilterConfig {
  fn default() -> Self {
    Self {
      class_id: COCO_PERSON_CLASS_ID,
      confidence: DEFAULT_CONFIDENCE,
    }
  }
}

/// 跟踪器配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
  /// 连续丢失多少次更新后删除轨迹
  pub max_age: u32,
  /// 连续命中多少次后确认轨迹
  pub n_init: u32,
  /// 检测框与轨迹关联的最小 IoU
  pub iou_threshold: f32,
}

impl Default for TrackerConfig {
  fn default() -> Self {
    Self {
      max_age: DEFAULT_MAX_AGE,
      n_init: DEFAULT_N_INIT,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
    }
  }
}

/// 停留时间换算公式
///
/// `Legacy` 沿用原有报表的算法 `floor(count / fps * stride)`；
/// `DividedByStride` 为 `floor(count / (fps * stride))`，只有显式指定时才会启用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ElapsedFormula {
  #[default]
  Legacy,
  DividedByStride,
}

/// 会话配置，在会话开始时一次性传入
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
  /// 采样步长，每 `stride` 帧处理一帧
  pub stride: NonZeroU32,
  pub filter: FilterConfig,
  pub tracker: TrackerConfig,
  /// 热力图高斯平滑的标准差（网格单位）
  pub sigma: f64,
  pub elapsed_formula: ElapsedFormula,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      stride: DEFAULT_STRIDE,
      filter: FilterConfig::default(),
      tracker: TrackerConfig::default(),
      sigma: DEFAULT_SIGMA,
      elapsed_formula: ElapsedFormula::default(),
    }
  }
}

impl SessionConfig {
  pub fn with_stride(mut self, stride: NonZeroU32) -> Self {
    self.stride = stride;
    self
  }

  pub fn with_filter(mut self, filter: FilterConfig) -> Self {
    self.filter = filter;
    self
  }

  pub fn with_tracker(mut self, tracker: TrackerConfig) -> Self {
    self.tracker = tracker;
    self
  }

  pub fn with_sigma(mut self, sigma: f64) -> Self {
    self.sigma = sigma;
    self
  }

  pub fn with_elapsed_formula(mut self, formula: ElapsedFormula) -> Self {
    self.elapsed_formula = formula;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_follow_the_analysis_tool() {
    let config = SessionConfig::default();
    assert_eq!(config.stride.get(), 3);
    assert_eq!(config.filter.class_id, 0);
    assert_eq!(config.filter.confidence, 0.4);
    assert_eq!(config.tracker.max_age, 50);
    assert_eq!(config.sigma, 30.0);
    assert_eq!(config.elapsed_formula, ElapsedFormula::Legacy);
  }
}
