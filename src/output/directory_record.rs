// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 预览帧目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::{
  frame::Frame,
  output::{Render, draw::Draw},
  track::Track,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 将每个采样帧连同已确认轨迹的标注保存到目录中
///
/// 文件名为 `frame-<帧序号>.png`，帧序号补零到 6 位。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, draw: Draw) -> Result<Self, DirectoryRecordOutputError> {
    let directory = directory.into();
    std::fs::create_dir_all(&directory)?;
    Ok(Self { directory, draw })
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn frame_path(&self, frame: &Frame) -> PathBuf {
    self.directory.join(format!("frame-{:06}.png", frame.index))
  }
}

impl Render<Frame, [Track]> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Frame, tracks: &[Track]) -> Result<(), Self::Error> {
    let path = self.frame_path(frame);
    self.draw.draw_tracks(&frame.image, tracks).save(&path)?;
    debug!("预览帧已保存: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use image::{Rgb, RgbImage};

  use super::*;
  use crate::{model::BBox, track::TrackState};

  #[test]
  fn frames_are_saved_by_index() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path().join("preview"), Draw::default()).unwrap();
    let frame = Frame::new(RgbImage::new(32, 32), 42, 1400);
    let tracks = [Track {
      id: 5,
      state: TrackState::Confirmed,
      bbox: BBox::new(4.0, 4.0, 10.0, 10.0),
    }];

    output.render_result(&frame, &tracks).unwrap();

    let saved = image::open(output.directory().join("frame-000042.png"))
      .unwrap()
      .to_rgb8();
    assert_eq!(saved.dimensions(), (32, 32));
    assert_ne!(*saved.get_pixel(4, 4), Rgb([0, 0, 0]));
  }
}
