// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 确保目标文件的父目录存在
pub fn ensure_parent_dir(path: &Path) -> Result<(), std::io::Error> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }
  Ok(())
}

/// 将图像保存到单个文件
///
/// 未指定格式时由扩展名决定。
pub struct SaveImageFileOutput {
  path: PathBuf,
  format: Option<ImageFormat>,
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      format: None,
    }
  }

  /// 固定输出格式，忽略扩展名
  pub fn with_format(mut self, format: ImageFormat) -> Self {
    self.format = Some(format);
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn save(&self, image: &RgbImage) -> Result<(), SaveImageFileError> {
    ensure_parent_dir(&self.path)?;
    match self.format {
      Some(format) => image.save_with_format(&self.path, format)?,
      None => image.save(&self.path)?,
    }

    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;

  #[test]
  fn save_creates_missing_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a/b/c.png");
    let output = SaveImageFileOutput::new(&path);
    output.save(&RgbImage::from_pixel(3, 2, Rgb([1, 2, 3]))).unwrap();

    let image = image::open(output.path()).unwrap().to_rgb8();
    assert_eq!(image.dimensions(), (3, 2));
    assert_eq!(*image.get_pixel(2, 1), Rgb([1, 2, 3]));
  }

  #[test]
  fn fixed_format_ignores_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.jpg");
    SaveImageFileOutput::new(&path)
      .with_format(ImageFormat::Png)
      .save(&RgbImage::new(2, 2))
      .unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
  }

  #[test]
  fn unsupported_extension_is_an_image_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = SaveImageFileOutput::new(dir.path().join("x.unknown"));
    let err = output.save(&RgbImage::new(1, 1)).unwrap_err();
    assert!(matches!(err, SaveImageFileError::ImageError(_)));
  }
}
