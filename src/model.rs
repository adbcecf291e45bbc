// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 检测模型与检测结果过滤
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

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{BoxError, FromUrl, config::FilterConfig, frame::Frame};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 检测器输出的原始检测项
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，像素坐标
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 原点加尺寸形式的边界框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl BBox {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 从角点形式转换，尺寸为负或坐标非有限值时返回 `None`
  pub fn from_corners(corners: &[f32; 4]) -> Option<Self> {
    let [x_min, y_min, x_max, y_max] = *corners;
    if corners.iter().any(|v| !v.is_finite()) || x_max < x_min || y_max < y_min {
      return None;
    }
    Some(Self::new(x_min, y_min, x_max - x_min, y_max - y_min))
  }

  pub fn to_corners(&self) -> [f32; 4] {
    [self.x, self.y, self.x + self.width, self.y + self.height]
  }

  pub fn centroid(&self) -> (f32, f32) {
    (self.x + self.width / 2.0, self.y + self.height / 2.0)
  }

  pub fn area(&self) -> f32 {
    self.width * self.height
  }

  pub fn iou(&self, other: &BBox) -> f32 {
    let left = self.x.max(other.x);
    let top = self.y.max(other.y);
    let right = (self.x + self.width).min(other.x + other.width);
    let bottom = (self.y + self.height).min(other.y + other.height);

    let intersection = (right - left).max(0.0) * (bottom - top).max(0.0);
    let union = self.area() + other.area() - intersection;
    if union <= 0.0 {
      0.0
    } else {
      intersection / union
    }
  }
}

/// 过滤后交给跟踪器的检测
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub bbox: BBox,
  pub confidence: f32,
  pub class_id: u32,
}

/// 只保留指定类别且置信度严格大于阈值的检测，并转换为原点加尺寸形式
///
/// 尺寸为负的畸形检测框会被丢弃。
pub fn filter_detections(items: &[DetectItem], config: &FilterConfig) -> Vec<Detection> {
  items
    .iter()
    .filter(|item| item.class_id == config.class_id && item.score > config.confidence)
    .filter_map(|item| match BBox::from_corners(&item.bbox) {
      Some(bbox) => Some(Detection {
        bbox,
        confidence: item.score,
        class_id: item.class_id,
      }),
      None => {
        debug!("丢弃畸形检测框: {:?}", item.bbox);
        None
      }
    })
    .collect()
}

mod replay;
pub use self::replay::{ReplayDetector, ReplayError};

#[cfg(feature = "model_yolo26")]
mod yolo26;
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{Yolo26, Yolo26Builder, Yolo26Error};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("检测回放错误: {0}")]
  ReplayError(#[from] ReplayError),
  #[cfg(feature = "model_yolo26")]
  #[error("YOLO26 模型错误: {0}")]
  Yolo26Error(#[from] Yolo26Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum ModelWrapper {
  Replay(ReplayDetector),
  #[cfg(feature = "model_yolo26")]
  Yolo26(Yolo26),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    match url.scheme() {
      ReplayDetector::SCHEME => Ok(ModelWrapper::Replay(ReplayDetector::from_url(url)?)),
      #[cfg(feature = "model_yolo26")]
      Yolo26Builder::SCHEME => Ok(ModelWrapper::Yolo26(Yolo26Builder::from_url(url)?.build()?)),
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Model for ModelWrapper {
  type Input = Frame;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &Frame) -> Result<DetectResult, ModelError> {
    match self {
      ModelWrapper::Replay(model) => model.infer(input).map_err(ModelError::from),
      #[cfg(feature = "model_yolo26")]
      ModelWrapper::Yolo26(model) => model.infer(input).map_err(ModelError::from),
    }
  }
}

/// 检测模型引用，在工作线程中被加载
pub trait OpenModel: Send + 'static {
  type Model: Model<Input = Frame, Output = DetectResult>;

  fn open(self) -> Result<Self::Model, BoxError>;
}

impl OpenModel for Url {
  type Model = ModelWrapper;

  fn open(self) -> Result<Self::Model, BoxError> {
    Ok(ModelWrapper::from_url(&self)?)
  }
}

impl OpenModel for ReplayDetector {
  type Model = ReplayDetector;

  fn open(self) -> Result<Self::Model, BoxError> {
    Ok(self)
  }
}
