// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件与图像序列输入
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

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use super::{FrameSource, InputError, fps_from_query};
use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("No image files in directory: {0}")]
  EmptySequence(String),
}

fn load_rgb(path: &Path) -> Result<RgbImage, ImageFileInputError> {
  Ok(ImageReader::open(path)?.decode()?.to_rgb8())
}

fn timestamp_ms(index: u64, fps: f64) -> u64 {
  (index as f64 * 1000.0 / fps) as u64
}

fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      let ext = ext.to_lowercase();
      IMAGE_EXTENSIONS.contains(&ext.as_str())
    })
    .unwrap_or(false)
}

/// 单张图片，视为只有一帧的视频
pub struct ImageFileInput {
  image: Option<RgbImage>,
  width: u32,
  height: u32,
  fps: f64,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch.into());
    }

    let fps = fps_from_query(url)?;
    let image = load_rgb(Path::new(url.path()))?;
    let (width, height) = image.dimensions();
    info!("打开图片文件: {} ({}x{})", url.path(), width, height);

    Ok(ImageFileInput {
      image: Some(image),
      width,
      height,
      fps,
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take().map(|image| Ok(Frame::new(image, 0, 0)))
  }
}

impl FrameSource for ImageFileInput {
  fn fps(&self) -> f64 {
    self.fps
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }
}

/// 图像序列：目录中的全部图片按文件名排序后逐帧读取
pub struct ImageSequenceInput {
  paths: std::vec::IntoIter<PathBuf>,
  next_index: u64,
  width: u32,
  height: u32,
  fps: f64,
}

impl FromUrlWithScheme for ImageSequenceInput {
  const SCHEME: &'static str = "frames";
}

impl FromUrl for ImageSequenceInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch.into());
    }

    let fps = fps_from_query(url)?;
    Ok(Self::open(Path::new(url.path()), fps)?)
  }
}

impl ImageSequenceInput {
  pub fn open(directory: &Path, fps: f64) -> Result<Self, ImageFileInputError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let path = entry?.path();
      if path.is_file() && is_image_file(&path) {
        paths.push(path);
      }
    }
    paths.sort();

    let first = paths
      .first()
      .ok_or_else(|| ImageFileInputError::EmptySequence(directory.display().to_string()))?;
    let (width, height) = image::image_dimensions(first)?;

    info!(
      "打开图像序列: {} ({} 帧, {}x{}, {} fps)",
      directory.display(),
      paths.len(),
      width,
      height,
      fps
    );

    Ok(Self {
      paths: paths.into_iter(),
      next_index: 0,
      width,
      height,
      fps,
    })
  }
}

impl Iterator for ImageSequenceInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.paths.next()?;
    let index = self.next_index;
    self.next_index += 1;
    debug!("读取第 {} 帧: {}", index, path.display());

    Some(
      load_rgb(&path)
        .map(|image| Frame::new(image, index, timestamp_ms(index, self.fps)))
        .map_err(InputError::from),
    )
  }
}

impl FrameSource for ImageSequenceInput {
  fn fps(&self) -> f64 {
    self.fps
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sequence_reads_images_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    for (name, width) in [("b.png", 8), ("a.png", 8), ("c.png", 8)] {
      RgbImage::new(width, 6).save(dir.path().join(name)).unwrap();
    }
    std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

    let url = Url::parse(&format!("frames://{}?fps=10", dir.path().display())).unwrap();
    let input = ImageSequenceInput::from_url(&url).unwrap();
    assert_eq!((input.width(), input.height()), (8, 6));
    assert_eq!(input.fps(), 10.0);

    let frames: Vec<Frame> = input.map(|f| f.unwrap()).collect();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2].index, 2);
    assert_eq!(frames[2].timestamp_ms, 200);
  }

  #[test]
  fn empty_directory_cannot_be_opened() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ImageSequenceInput::open(dir.path(), 30.0),
      Err(ImageFileInputError::EmptySequence(_))
    ));
  }

  #[test]
  fn single_image_is_a_one_frame_video() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.png");
    RgbImage::new(5, 3).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.fps(), super::super::DEFAULT_FPS);
    assert!(input.next().unwrap().is_ok());
    assert!(input.next().is_none());
  }
}
