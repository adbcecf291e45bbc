// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 文本报告与热力图输出
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

use std::fmt::Write as _;
use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};
use thiserror::Error;
use tracing::info;

use crate::finalize::FinalizedResult;

pub trait Render<Frame: ?Sized, Output: ?Sized>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput, ensure_parent_dir};

#[cfg(feature = "preview")]
pub mod draw;

#[cfg(feature = "preview")]
mod directory_record;
#[cfg(feature = "preview")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

pub const REPORT_HEADER: &str = "Work Study Analysis Report";
pub const REPORT_LABEL: &str = "Worker durations:";

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 生成文本报告，每个身份一行，按编号升序
pub fn format_report(result: &FinalizedResult) -> String {
  let mut report = String::new();
  let _ = writeln!(report, "{}", REPORT_HEADER);
  let _ = writeln!(report);
  let _ = writeln!(report, "{}", REPORT_LABEL);
  for dwell in result.dwell_times() {
    let _ = writeln!(report, "Worker {}: {} seconds", dwell.id, dwell.seconds);
  }
  report
}

// matplotlib "jet" 的分段线性定义
const JET_RED: [(f64, f64); 5] = [(0.0, 0.0), (0.35, 0.0), (0.66, 1.0), (0.89, 1.0), (1.0, 0.5)];
const JET_GREEN: [(f64, f64); 6] = [
  (0.0, 0.0),
  (0.125, 0.0),
  (0.375, 1.0),
  (0.64, 1.0),
  (0.91, 0.0),
  (1.0, 0.0),
];
const JET_BLUE: [(f64, f64); 5] = [(0.0, 0.5), (0.11, 1.0), (0.34, 1.0), (0.65, 0.0), (1.0, 0.0)];

fn interpolate(points: &[(f64, f64)], value: f64) -> f64 {
  for pair in points.windows(2) {
    let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
    if value <= x1 {
      return y0 + (y1 - y0) * (value - x0) / (x1 - x0);
    }
  }
  points.last().map_or(0.0, |p| p.1)
}

/// 将 [0, 1] 的值映射到 jet 色带，0 为深蓝，1 为深红
pub fn jet(value: f64) -> Rgb<u8> {
  let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
  let channel = |points: &[(f64, f64)]| (interpolate(points, value) * 255.0).round() as u8;
  Rgb([channel(&JET_RED), channel(&JET_GREEN), channel(&JET_BLUE)])
}

/// 按网格分辨率生成伪彩色热力图
pub fn render_heatmap(result: &FinalizedResult) -> RgbImage {
  let heatmap = result.heatmap();
  let width = heatmap.width() as u32;
  RgbImage::from_fn(width, heatmap.height() as u32, |x, y| {
    jet(heatmap.cells()[y as usize * heatmap.width() + x as usize])
  })
}

pub fn export_report(result: &FinalizedResult, path: &Path) -> Result<(), OutputError> {
  ensure_parent_dir(path)?;
  std::fs::write(path, format_report(result))?;
  info!("报告已保存: {}", path.display());
  Ok(())
}

/// 热力图总是以 PNG 写出，与扩展名无关
pub fn export_heatmap(result: &FinalizedResult, path: &Path) -> Result<(), OutputError> {
  SaveImageFileOutput::new(path)
    .with_format(ImageFormat::Png)
    .save(&render_heatmap(result))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::num::NonZeroU32;

  use super::*;
  use crate::{
    config::SessionConfig,
    finalize::finalize,
    model::BBox,
    occupancy::Accumulator,
    track::{Track, TrackState},
  };

  fn result_with(ids: &[(u64, u32)]) -> FinalizedResult {
    let mut acc = Accumulator::new(40, 30);
    let max = ids.iter().map(|&(_, n)| n).max().unwrap_or(0);
    for frame in 0..max {
      let tracks: Vec<Track> = ids
        .iter()
        .filter(|&&(_, n)| frame < n)
        .map(|&(id, _)| Track {
          id,
          state: TrackState::Confirmed,
          bbox: BBox::new(10.0, 10.0, 4.0, 4.0),
        })
        .collect();
      acc.observe_frame(&tracks);
    }
    let config = SessionConfig::default().with_stride(NonZeroU32::new(3).unwrap());
    finalize(&acc, 30.0, &config, false)
  }

  #[test]
  fn report_lists_workers_in_id_order() {
    let result = result_with(&[(12, 30), (3, 3), (7, 100)]);
    let report = format_report(&result);
    assert_eq!(
      report,
      "Work Study Analysis Report\n\nWorker durations:\n\
       Worker 3: 0 seconds\nWorker 7: 10 seconds\nWorker 12: 3 seconds\n"
    );
  }

  #[test]
  fn report_without_identities_has_empty_body() {
    let result = result_with(&[]);
    assert_eq!(
      format_report(&result),
      "Work Study Analysis Report\n\nWorker durations:\n"
    );
  }

  #[test]
  fn jet_endpoints() {
    assert_eq!(jet(0.0), Rgb([0, 0, 128]));
    assert_eq!(jet(1.0), Rgb([128, 0, 0]));
    assert_eq!(jet(0.5), Rgb([123, 255, 123]));
    assert_eq!(jet(-3.0), jet(0.0));
    assert_eq!(jet(f64::NAN), jet(0.0));
  }

  #[test]
  fn heatmap_has_grid_resolution() {
    let result = result_with(&[(1, 4)]);
    let image = render_heatmap(&result);
    assert_eq!(image.dimensions(), (40, 30));
  }

  #[test]
  fn exports_write_files() {
    let dir = tempfile::tempdir().unwrap();
    let result = result_with(&[]);
    let report = dir.path().join("out/report.txt");
    let heatmap = dir.path().join("out/heatmap.png");

    export_report(&result, &report).unwrap();
    export_heatmap(&result, &heatmap).unwrap();

    assert_eq!(std::fs::read_to_string(&report).unwrap(), format_report(&result));
    let image = image::open(&heatmap).unwrap().to_rgb8();
    assert_eq!(image.dimensions(), (40, 30));
    assert!(image.pixels().all(|p| *p == jet(0.0)));
  }

  #[test]
  fn heatmap_is_png_without_extension() {
    let dir = tempfile::tempdir().unwrap();
    let result = result_with(&[(1, 4)]);
    let heatmap = dir.path().join("heatmap");

    export_heatmap(&result, &heatmap).unwrap();

    let bytes = std::fs::read(&heatmap).unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
      .unwrap()
      .to_rgb8();
    assert_eq!(image.dimensions(), (40, 30));
  }
}
