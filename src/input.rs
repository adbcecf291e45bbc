// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 视频/图像序列输入与帧采样
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, frame::Frame};

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError, ImageSequenceInput};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError};

/// 未指定帧率时使用的默认值
pub const DEFAULT_FPS: f64 = 30.0;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
  #[error("Invalid frame rate: {0}")]
  InvalidFrameRate(f64),
}

/// 可逐帧读取的有限帧源
///
/// 迭代器每次产出一帧或一次解码错误；返回 `None` 表示帧源已读完。
pub trait FrameSource: Iterator<Item = Result<Frame, InputError>> {
  /// 帧率（帧/秒）
  fn fps(&self) -> f64;

  /// 帧宽度
  fn width(&self) -> u32;

  /// 帧高度
  fn height(&self) -> u32;

  /// 按固定步长采样
  fn sampled(self, stride: NonZeroU32) -> Sampled<Self>
  where
    Self: Sized,
  {
    Sampled::new(self, stride)
  }
}

/// 帧源引用，在工作线程中被打开
pub trait OpenSource: Send + 'static {
  type Source: FrameSource;

  fn open(self) -> Result<Self::Source, InputError>;
}

impl OpenSource for Url {
  type Source = InputWrapper;

  fn open(self) -> Result<Self::Source, InputError> {
    InputWrapper::from_url(&self)
  }
}

/// 从 URL 查询参数中读取帧率
pub(crate) fn fps_from_query(url: &Url) -> Result<f64, InputError> {
  let fps = url
    .query_pairs()
    .find(|(k, _)| k == "fps")
    .map(|(_, v)| v.parse::<f64>().map_err(|_| InputError::InvalidFrameRate(f64::NAN)))
    .transpose()?
    .unwrap_or(DEFAULT_FPS);
  validate_fps(fps)
}

pub(crate) fn validate_fps(fps: f64) -> Result<f64, InputError> {
  if fps.is_finite() && fps > 0.0 {
    Ok(fps)
  } else {
    Err(InputError::InvalidFrameRate(fps))
  }
}

/// 采样迭代器
///
/// 解码计数从 1 开始，只产出序号为 `stride` 整数倍的帧，其余帧直接丢弃。
/// 遇到解码错误时产出一次错误并结束。
pub struct Sampled<I> {
  inner: I,
  stride: NonZeroU32,
  decoded: u64,
  finished: bool,
}

impl<I> Sampled<I> {
  pub fn new(inner: I, stride: NonZeroU32) -> Self {
    Self {
      inner,
      stride,
      decoded: 0,
      finished: false,
    }
  }

  /// 已解码（包括被跳过）的帧数
  pub fn decoded(&self) -> u64 {
    self.decoded
  }
}

impl<I: Iterator<Item = Result<Frame, InputError>>> Iterator for Sampled<I> {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    loop {
      match self.inner.next() {
        Some(Ok(frame)) => {
          self.decoded += 1;
          if self.decoded % u64::from(self.stride.get()) == 0 {
            return Some(Ok(frame));
          }
        }
        Some(Err(e)) => {
          self.finished = true;
          return Some(Err(e));
        }
        None => {
          self.finished = true;
          return None;
        }
      }
    }
  }
}

pub enum InputWrapper {
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
  ImageFile(ImageFileInput),
  ImageSequence(ImageSequenceInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    match url.scheme() {
      #[cfg(feature = "gstreamer_input")]
      GStreamerInput::SCHEME => Ok(InputWrapper::GStreamerInput(GStreamerInput::from_url(url)?)),
      ImageFileInput::SCHEME => Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?)),
      ImageSequenceInput::SCHEME => Ok(InputWrapper::ImageSequence(
        ImageSequenceInput::from_url(url)?,
      )),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.next(),
      InputWrapper::ImageFile(input) => input.next(),
      InputWrapper::ImageSequence(input) => input.next(),
    }
  }
}

impl FrameSource for InputWrapper {
  fn fps(&self) -> f64 {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.fps(),
      InputWrapper::ImageFile(input) => input.fps(),
      InputWrapper::ImageSequence(input) => input.fps(),
    }
  }

  fn width(&self) -> u32 {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.width(),
      InputWrapper::ImageFile(input) => input.width(),
      InputWrapper::ImageSequence(input) => input.width(),
    }
  }

  fn height(&self) -> u32 {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.height(),
      InputWrapper::ImageFile(input) => input.height(),
      InputWrapper::ImageSequence(input) => input.height(),
    }
  }
}
