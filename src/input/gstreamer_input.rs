// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件输入
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

//! # GStreamer 视频文件输入
//!
//! 通过 `filesrc ! decodebin ! videoconvert` 解码本地视频文件，输出 RGB 帧。
//! 与实时流不同，离线分析不允许丢帧，因此 appsink 关闭了 `drop`，并且不与时钟同步。
//!
//! ```no_run
//! use shanan_dwell::{FromUrl, input::{FrameSource, GStreamerInput}};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let url = Url::parse("gst://file/data/clip.mp4")?;
//! let input = GStreamerInput::from_url(&url)?;
//! println!("{}x{} @ {} fps", input.width(), input.height(), input.fps());
//! # Ok(())
//! # }
//! ```
//!
//! 使用前需要安装 GStreamer 开发库（`libgstreamer1.0-dev`、`libgstreamer-plugins-base1.0-dev`）。

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::{FrameSource, InputError, validate_fps};
use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

const PIPELINE_DESCRIPTION: &str = "filesrc name=src ! decodebin ! videoconvert ! \
  video/x-raw,format=RGB ! appsink name=sink sync=false max-buffers=4 drop=false";

/// 等待管道预滚的超时时间
const PREROLL_TIMEOUT_SECS: u64 = 10;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://file/..."）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
}

/// GStreamer 视频文件输入
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  width: u32,
  height: u32,
  fps: f64,
  next_index: u64,
  finished: bool,
}

impl FromUrlWithScheme for GStreamerInput {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME || url.host_str() != Some("file") {
      return Err(GStreamerInputError::SchemeMismatch.into());
    }

    let input = Self::open_file(url.path())?;
    validate_fps(input.fps)?;
    Ok(input)
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerInput {
  fn build_pipeline(path: &str) -> Result<(gst::Pipeline, gst_app::AppSink), GStreamerInputError> {
    gst::init()?;

    info!("GStreamer pipeline: {} -> {}", path, PIPELINE_DESCRIPTION);

    let pipeline = gst::parse::launch(PIPELINE_DESCRIPTION)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    // 文件路径作为属性设置，不拼进管道描述
    pipeline
      .by_name("src")
      .ok_or_else(|| GStreamerInputError::PipelineError("Failed to get filesrc element".to_string()))?
      .set_property("location", path);

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkNotFound)?;

    Ok((pipeline, appsink))
  }

  pub fn open_file(path: &str) -> Result<Self, GStreamerInputError> {
    let (pipeline, appsink) = Self::build_pipeline(path)?;

    // 预滚后 caps 已协商完成，可以读取分辨率与帧率；预滚样本仍会作为第一帧被 pull_sample 返回
    pipeline.set_state(gst::State::Paused)?;
    let (result, _, _) = pipeline.state(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS));
    if let Err(e) = result {
      let _ = pipeline.set_state(gst::State::Null);
      return Err(e.into());
    }

    let preroll = appsink.pull_preroll()?;
    let caps = preroll
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    let fps = video_info.fps();
    let fps = if fps.denom() == 0 {
      0.0
    } else {
      fps.numer() as f64 / fps.denom() as f64
    };

    pipeline.set_state(gst::State::Playing)?;
    info!(
      "视频已打开: {}x{} @ {:.2} fps",
      video_info.width(),
      video_info.height(),
      fps
    );

    Ok(GStreamerInput {
      pipeline,
      appsink,
      width: video_info.width(),
      height: video_info.height(),
      fps,
      next_index: 0,
      finished: false,
    })
  }

  fn bus_error(&self) -> GStreamerInputError {
    let message = self
      .pipeline
      .bus()
      .and_then(|bus| bus.pop_filtered(&[gst::MessageType::Error]));
    match message.as_ref().map(|m| m.view()) {
      Some(gst::MessageView::Error(err)) => GStreamerInputError::PipelineError(format!(
        "{} ({})",
        err.error(),
        err.debug().map(|d| d.to_string()).unwrap_or_default()
      )),
      _ => GStreamerInputError::PipelineError("Failed to pull sample".to_string()),
    }
  }

  fn convert_sample(&mut self, sample: gst::Sample) -> Result<Frame, GStreamerInputError> {
    let buffer = sample
      .buffer()
      .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
    let caps = sample
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
    if video_info.format() != gst_video::VideoFormat::Rgb {
      return Err(GStreamerInputError::UnsupportedFormat);
    }

    let width = video_info.width() as usize;
    let height = video_info.height() as usize;
    let stride = video_info.stride()[0] as usize;

    let map = buffer.map_readable().map_err(|e| {
      GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
    })?;
    let data = map.as_slice();

    let row_bytes = width * 3;
    let expected = stride * (height.saturating_sub(1)) + row_bytes;
    if data.len() < expected {
      return Err(GStreamerInputError::BufferSizeMismatch {
        expected,
        actual: data.len(),
      });
    }

    // 行可能按 4 字节对齐，需要逐行拷贝
    let mut pixels = Vec::with_capacity(row_bytes * height);
    for y in 0..height {
      let start = y * stride;
      pixels.extend_from_slice(&data[start..start + row_bytes]);
    }

    let image = image::RgbImage::from_raw(width as u32, height as u32, pixels).ok_or(
      GStreamerInputError::BufferSizeMismatch {
        expected: row_bytes * height,
        actual: data.len(),
      },
    )?;

    let index = self.next_index;
    self.next_index += 1;
    let timestamp_ms = buffer.pts().map_or(0, |pts| pts.mseconds());
    debug!("解码第 {} 帧, 时间戳 {}ms", index, timestamp_ms);

    Ok(Frame::new(image, index, timestamp_ms))
  }
}

impl Iterator for GStreamerInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    match self.appsink.pull_sample() {
      Ok(sample) => Some(self.convert_sample(sample).map_err(InputError::from)),
      Err(_) if self.appsink.is_eos() => {
        info!("视频读取完毕，共 {} 帧", self.next_index);
        self.finished = true;
        None
      }
      Err(_) => {
        self.finished = true;
        Some(Err(self.bus_error().into()))
      }
    }
  }
}

impl FrameSource for GStreamerInput {
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
