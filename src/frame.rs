// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 采样帧定义
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

use image::RgbImage;

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 解码帧索引（从 0 开始）
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

#[cfg(feature = "model_yolo26")]
pub use self::nhwc::RgbNhwcFrame;

#[cfg(feature = "model_yolo26")]
mod nhwc {
  use image::imageops::{self, FilterType};

  use super::Frame;

  const RGB_CHANNELS: usize = 3;

  /// 定长 NHWC 张量，供 NPU 模型输入使用
  #[derive(Debug, Clone)]
  pub struct RgbNhwcFrame<const W: u32, const H: u32> {
    data: Box<[u8]>,
  }

  impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
    pub fn height(&self) -> usize {
      H as usize
    }

    pub fn width(&self) -> usize {
      W as usize
    }

    pub fn channels(&self) -> usize {
      RGB_CHANNELS
    }

    pub fn as_nhwc(&self) -> &[u8] {
      &self.data
    }
  }

  impl<const W: u32, const H: u32> From<&Frame> for RgbNhwcFrame<W, H> {
    fn from(frame: &Frame) -> Self {
      // RgbImage 本身即为 HWC 排布，缩放后直接取底层缓冲区
      let resized = if frame.width() == W && frame.height() == H {
        frame.image.clone()
      } else {
        imageops::resize(&frame.image, W, H, FilterType::Triangle)
      };
      Self {
        data: resized.into_raw().into_boxed_slice(),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frame_reports_image_dimensions() {
    let frame = Frame::new(RgbImage::new(64, 48), 7, 233);
    assert_eq!(frame.width(), 64);
    assert_eq!(frame.height(), 48);
    assert_eq!(frame.index, 7);
  }
}
