// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{num::NonZeroU32, path::PathBuf};

use clap::Parser;
use url::Url;

use shanan_dwell::config::{
  COCO_PERSON_CLASS_ID, DEFAULT_CONFIDENCE, DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_AGE, DEFAULT_N_INIT,
  DEFAULT_SIGMA, ElapsedFormula, FilterConfig, SessionConfig, TrackerConfig,
};

/// 录像停留时间与占用热力图分析
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  /// 支持格式:
  /// - 图片目录: frames:///path/to/dir?fps=30
  /// - 单张图片: image:///path/to/file.png?fps=30
  /// - 视频文件: gst://file/path/to/video.mp4（需要 gstreamer_input 特性）
  #[arg(long, value_name = "URL")]
  pub input: Option<Url>,

  /// 检测模型
  /// 支持格式:
  /// - 检测回放: replay:///path/to/detections.jsonl
  /// - RKNN 模型: yolo26:///path/to/model.rknn（需要 model_yolo26 特性）
  #[arg(long, value_name = "URL")]
  pub model: Url,

  /// 文本报告输出路径
  #[arg(long, value_name = "FILE", default_value = "report.txt")]
  pub report: PathBuf,

  /// 热力图输出路径（PNG）
  #[arg(long, value_name = "FILE", default_value = "heatmap.png")]
  pub heatmap: PathBuf,

  /// 采样步长，每 N 帧处理一帧
  #[arg(long, default_value = "3", value_name = "N")]
  pub stride: NonZeroU32,

  /// 置信度阈值 (0.0 - 1.0)，严格大于该值的检测才会保留
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// 保留的检测类别
  #[arg(long, default_value_t = COCO_PERSON_CLASS_ID, value_name = "ID")]
  pub class_id: u32,

  /// 已确认轨迹允许的最大连续丢失次数
  #[arg(long, default_value_t = DEFAULT_MAX_AGE, value_name = "COUNT")]
  pub max_age: u32,

  /// 轨迹确认所需的连续命中次数
  #[arg(long, default_value_t = DEFAULT_N_INIT, value_name = "COUNT")]
  pub n_init: u32,

  /// 轨迹关联的 IoU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub iou_threshold: f32,

  /// 热力图高斯平滑标准差（像素）
  #[arg(long, default_value_t = DEFAULT_SIGMA, value_name = "SIGMA")]
  pub sigma: f64,

  /// 停留时间换算公式
  #[arg(long, value_enum, default_value_t = ElapsedFormula::Legacy)]
  pub elapsed_formula: ElapsedFormula,

  /// 标注预览帧保存目录
  #[arg(long, value_name = "DIR")]
  pub preview_dir: Option<PathBuf>,

  /// 预览标签字体（TTF/OTF），缺失时只画框
  #[arg(long, value_name = "FILE")]
  pub preview_font: Option<PathBuf>,
}

impl Args {
  pub fn session_config(&self) -> SessionConfig {
    SessionConfig::default()
      .with_stride(self.stride)
      .with_filter(FilterConfig {
        class_id: self.class_id,
        confidence: self.confidence,
      })
      .with_tracker(TrackerConfig {
        max_age: self.max_age,
        n_init: self.n_init,
        iou_threshold: self.iou_threshold,
      })
      .with_sigma(self.sigma)
      .with_elapsed_formula(self.elapsed_formula)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_session_defaults() {
    let args = Args::parse_from(["shanan-dwell", "--model", "replay:///tmp/d.jsonl"]);
    assert!(args.input.is_none());
    assert_eq!(args.session_config(), SessionConfig::default());
  }

  #[test]
  fn flags_override_config() {
    let args = Args::parse_from([
      "shanan-dwell",
      "--input",
      "frames:///data/clip?fps=25",
      "--model",
      "replay:///tmp/d.jsonl",
      "--stride",
      "5",
      "--confidence",
      "0.6",
      "--elapsed-formula",
      "divided-by-stride",
    ]);
    let config = args.session_config();
    assert_eq!(config.stride.get(), 5);
    assert_eq!(config.filter.confidence, 0.6);
    assert_eq!(config.elapsed_formula, ElapsedFormula::DividedByStride);
    assert_eq!(args.input.unwrap().scheme(), "frames");
  }

  #[test]
  fn zero_stride_is_rejected() {
    let parsed = Args::try_parse_from([
      "shanan-dwell",
      "--model",
      "replay:///tmp/d.jsonl",
      "--stride",
      "0",
    ]);
    assert!(parsed.is_err());
  }
}
