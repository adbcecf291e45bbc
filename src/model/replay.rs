// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/replay.rs - 检测结果回放
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

//! 从 JSON Lines 文件回放预先计算好的检测结果。
//!
//! 每行一个对象，`frame` 为解码帧索引（从 0 开始）：
//!
//! ```text
//! {"frame": 2, "detections": [{"class_id": 0, "score": 0.91, "bbox": [12.0, 40.0, 80.0, 200.0]}]}
//! ```
//!
//! 文件中没有出现的帧视为没有检测结果。

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use super::{DetectItem, DetectResult, Model};
use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行解析失败: {source}")]
  ParseError {
    line: usize,
    #[source]
    source: serde_json::Error,
  },
}

#[derive(Debug, Deserialize)]
struct ReplayRecord {
  frame: u64,
  #[serde(default)]
  detections: Vec<DetectItem>,
}

/// 按帧索引回放检测结果的检测器
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
  frames: HashMap<u64, Vec<DetectItem>>,
}

impl FromUrlWithScheme for ReplayDetector {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayDetector {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayError::SchemeMismatch);
    }

    Self::load(Path::new(url.path()))
  }
}

impl ReplayDetector {
  pub fn load(path: &Path) -> Result<Self, ReplayError> {
    info!("加载检测回放文件: {}", path.display());
    let file = std::fs::File::open(path)?;
    let detector = Self::from_reader(std::io::BufReader::new(file))?;
    info!("回放文件包含 {} 帧检测结果", detector.frames.len());
    Ok(detector)
  }

  pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ReplayError> {
    let mut frames: HashMap<u64, Vec<DetectItem>> = HashMap::new();
    for (number, line) in reader.lines().enumerate() {
      let line = line?;
      if line.trim().is_empty() {
        continue;
      }
      let record: ReplayRecord =
        serde_json::from_str(&line).map_err(|source| ReplayError::ParseError {
          line: number + 1,
          source,
        })?;
      frames
        .entry(record.frame)
        .or_default()
        .extend(record.detections);
    }
    Ok(Self { frames })
  }

  /// 直接指定某一帧的检测结果
  pub fn with_frame(mut self, index: u64, items: Vec<DetectItem>) -> Self {
    self.frames.entry(index).or_default().extend(items);
    self
  }
}

impl Model for ReplayDetector {
  type Input = Frame;
  type Output = DetectResult;
  type Error = ReplayError;

  fn infer(&self, input: &Frame) -> Result<DetectResult, ReplayError> {
    let items = self.frames.get(&input.index).cloned().unwrap_or_default();
    debug!("第 {} 帧回放 {} 个检测", input.index, items.len());
    Ok(DetectResult::from(items))
  }
}
