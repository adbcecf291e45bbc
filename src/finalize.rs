// 该文件是 Shanan （山南西风） 项目的一部分。
// src/finalize.rs - 热力图平滑归一化与停留时间换算
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

use tracing::{info, warn};

use crate::{
  config::{ElapsedFormula, SessionConfig},
  occupancy::{Accumulator, IdentityPresence, OccupancyGrid},
  track::TrackId,
};

/// 高斯核截断半径（以 sigma 为单位）
const GAUSSIAN_TRUNCATE: f64 = 4.0;

/// 单个身份的停留时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DwellTime {
  pub id: TrackId,
  /// 出现的采样帧数
  pub frames: u64,
  pub seconds: u64,
}

/// 会话结束时生成的不可变结果
#[derive(Debug, Clone)]
pub struct FinalizedResult {
  heatmap: OccupancyGrid,
  dwell: Vec<DwellTime>,
  fps: f64,
  stride: NonZeroU32,
  formula: ElapsedFormula,
  sampled_frames: u64,
  cancelled: bool,
  degenerate: bool,
}

impl FinalizedResult {
  /// 平滑并归一化后的热力图，取值范围 [0, 1]
  pub fn heatmap(&self) -> &OccupancyGrid {
    &self.heatmap
  }

  /// 按身份编号升序排列
  pub fn dwell_times(&self) -> &[DwellTime] {
    &self.dwell
  }

  pub fn fps(&self) -> f64 {
    self.fps
  }

  pub fn stride(&self) -> NonZeroU32 {
    self.stride
  }

  pub fn formula(&self) -> ElapsedFormula {
    self.formula
  }

  pub fn sampled_frames(&self) -> u64 {
    self.sampled_frames
  }

  /// 会话是否因取消而提前结束
  pub fn cancelled(&self) -> bool {
    self.cancelled
  }

  /// 原始占用网格是否全为零
  pub fn degenerate(&self) -> bool {
    self.degenerate
  }
}

/// 出现帧数换算为秒，向下取整
pub fn elapsed_seconds(count: u64, fps: f64, stride: NonZeroU32, formula: ElapsedFormula) -> u64 {
  let stride = f64::from(stride.get());
  let seconds = match formula {
    ElapsedFormula::Legacy => count as f64 / fps * stride,
    ElapsedFormula::DividedByStride => count as f64 / (fps * stride),
  };
  seconds.floor() as u64
}

pub fn dwell_times(
  presence: &IdentityPresence,
  fps: f64,
  stride: NonZeroU32,
  formula: ElapsedFormula,
) -> Vec<DwellTime> {
  presence
    .iter()
    .map(|(&id, &frames)| DwellTime {
      id,
      frames,
      seconds: elapsed_seconds(frames, fps, stride, formula),
    })
    .collect()
}

/// 归一化的一维高斯核，半径为 `truncate * sigma` 四舍五入
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
  if !(sigma > 0.0) {
    return vec![1.0];
  }
  let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as isize;
  let mut kernel: Vec<f64> = (-radius..=radius)
    .map(|x| {
      let x = x as f64 / sigma;
      (-0.5 * x * x).exp()
    })
    .collect();
  let sum: f64 = kernel.iter().sum();
  kernel.iter_mut().for_each(|w| *w /= sum);
  kernel
}

/// 半像素对称反射：`d c b a | a b c d | d c b a`
fn reflect(index: isize, len: usize) -> usize {
  let period = 2 * len as isize;
  let m = index.rem_euclid(period) as usize;
  if m < len { m } else { 2 * len - 1 - m }
}

fn convolve_line(src: &[f64], dst: &mut [f64], kernel: &[f64]) {
  let len = src.len();
  let radius = (kernel.len() / 2) as isize;

  if src.iter().all(|&v| v == 0.0) {
    dst.iter_mut().for_each(|v| *v = 0.0);
    return;
  }

  for (i, out) in dst.iter_mut().enumerate() {
    let i = i as isize;
    let start = i - radius;
    *out = if start >= 0 && ((i + radius) as usize) < len {
      let window = &src[start as usize..=(i + radius) as usize];
      window.iter().zip(kernel).map(|(v, w)| v * w).sum()
    } else {
      kernel
        .iter()
        .enumerate()
        .map(|(k, w)| src[reflect(start + k as isize, len)] * w)
        .sum()
    };
  }
}

/// 可分离高斯平滑，边界采用反射模式
pub fn gaussian_smooth(grid: &OccupancyGrid, sigma: f64) -> OccupancyGrid {
  let (width, height) = (grid.width(), grid.height());
  if width == 0 || height == 0 {
    return grid.clone();
  }
  let kernel = gaussian_kernel(sigma);

  // 水平方向
  let mut horizontal = vec![0.0; width * height];
  for (src, dst) in grid
    .cells()
    .chunks_exact(width)
    .zip(horizontal.chunks_exact_mut(width))
  {
    convolve_line(src, dst, &kernel);
  }

  // 垂直方向
  let mut cells = vec![0.0; width * height];
  let mut column = vec![0.0; height];
  let mut smoothed = vec![0.0; height];
  for x in 0..width {
    for (y, v) in column.iter_mut().enumerate() {
      *v = horizontal[y * width + x];
    }
    convolve_line(&column, &mut smoothed, &kernel);
    for (y, v) in smoothed.iter().enumerate() {
      cells[y * width + x] = *v;
    }
  }

  OccupancyGrid::from_cells(width, height, cells)
}

/// 平滑后按最大值归一化；原始网格全为零时返回全零网格
///
/// 返回值的第二项表示原始网格是否全为零。
pub fn normalized_heatmap(raw: &OccupancyGrid, sigma: f64) -> (OccupancyGrid, bool) {
  let zeros = || OccupancyGrid::new(raw.width(), raw.height());
  if raw.is_all_zero() {
    return (zeros(), true);
  }

  let smoothed = gaussian_smooth(raw, sigma);
  let max = smoothed.max();
  if !(max > 0.0) {
    return (zeros(), true);
  }

  let cells = smoothed.cells().iter().map(|v| v / max).collect();
  (
    OccupancyGrid::from_cells(raw.width(), raw.height(), cells),
    false,
  )
}

/// 根据会话累加结果生成最终结果
pub fn finalize(
  accumulator: &Accumulator,
  fps: f64,
  config: &SessionConfig,
  cancelled: bool,
) -> FinalizedResult {
  let (heatmap, degenerate) = normalized_heatmap(accumulator.grid(), config.sigma);
  if degenerate {
    warn!("整个会话没有有效的占用记录，热力图为全零");
  }

  let dwell = dwell_times(
    accumulator.presence(),
    fps,
    config.stride,
    config.elapsed_formula,
  );
  info!(
    "结果已生成: {} 个采样帧, {} 个身份, 热力图 {}x{}",
    accumulator.frames(),
    dwell.len(),
    heatmap.width(),
    heatmap.height()
  );

  FinalizedResult {
    heatmap,
    dwell,
    fps,
    stride: config.stride,
    formula: config.elapsed_formula,
    sampled_frames: accumulator.frames(),
    cancelled,
    degenerate,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::BBox,
    track::{Track, TrackState},
  };

  fn stride(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap()
  }

  fn track(id: TrackId, cx: f32, cy: f32) -> Track {
    Track {
      id,
      state: TrackState::Confirmed,
      bbox: BBox::new(cx - 5.0, cy - 10.0, 10.0, 20.0),
    }
  }

  #[test]
  fn legacy_formula_for_three_sampled_frames() {
    assert_eq!(elapsed_seconds(3, 30.0, stride(3), ElapsedFormula::Legacy), 0);
    assert_eq!(elapsed_seconds(30, 30.0, stride(3), ElapsedFormula::Legacy), 3);
    assert_eq!(
      elapsed_seconds(300, 30.0, stride(3), ElapsedFormula::DividedByStride),
      3
    );
  }

  #[test]
  fn elapsed_time_is_monotone_in_presence() {
    for formula in [ElapsedFormula::Legacy, ElapsedFormula::DividedByStride] {
      let mut last = 0;
      for count in 0..500 {
        let seconds = elapsed_seconds(count, 29.97, stride(3), formula);
        assert!(seconds >= last);
        last = seconds;
      }
    }
  }

  #[test]
  fn kernel_is_normalized_and_truncated_at_four_sigma() {
    let kernel = gaussian_kernel(30.0);
    assert_eq!(kernel.len(), 241);
    assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    assert_eq!(gaussian_kernel(0.0), vec![1.0]);
  }

  #[test]
  fn reflect_mirrors_around_edges() {
    assert_eq!(reflect(-1, 4), 0);
    assert_eq!(reflect(-2, 4), 1);
    assert_eq!(reflect(4, 4), 3);
    assert_eq!(reflect(5, 4), 2);
    assert_eq!(reflect(8, 4), 0);
    assert_eq!(reflect(-9, 4), 0);
  }

  #[test]
  fn smoothing_preserves_mass_near_edges() {
    let mut grid = OccupancyGrid::new(20, 10);
    grid.increment(0.0, 0.0);
    grid.increment(19.0, 9.0);
    grid.increment(7.0, 3.0);
    let smoothed = gaussian_smooth(&grid, 30.0);
    let total: f64 = smoothed.cells().iter().sum();
    assert!((total - 3.0).abs() < 1e-9);
  }

  #[test]
  fn normalized_maximum_is_exactly_one() {
    let mut grid = OccupancyGrid::new(120, 80);
    grid.increment(30.0, 40.0);
    grid.increment(30.0, 40.0);
    grid.increment(90.0, 20.0);
    let (heatmap, degenerate) = normalized_heatmap(&grid, 30.0);
    assert!(!degenerate);
    assert_eq!(heatmap.max(), 1.0);
    assert!(heatmap.cells().iter().all(|&v| (0.0..=1.0).contains(&v)));
  }

  #[test]
  fn all_zero_grid_stays_zero() {
    let grid = OccupancyGrid::new(64, 48);
    let (heatmap, degenerate) = normalized_heatmap(&grid, 30.0);
    assert!(degenerate);
    assert_eq!((heatmap.width(), heatmap.height()), (64, 48));
    assert!(heatmap.is_all_zero());
  }

  #[test]
  fn disjoint_regions_stay_separate() {
    let mut acc = Accumulator::new(400, 200);
    for _ in 0..20 {
      acc.observe_frame(&[track(1, 50.0, 100.0), track(2, 350.0, 100.0)]);
    }
    let result = finalize(&acc, 30.0, &SessionConfig::default(), false);
    let heatmap = result.heatmap();

    let left = heatmap.get(50, 100).unwrap();
    let right = heatmap.get(350, 100).unwrap();
    let middle = heatmap.get(200, 100).unwrap();
    assert!(left > 0.9 && right > 0.9);
    assert!(middle < 0.01);

    for y in 0..heatmap.height() {
      for x in 150..250 {
        assert!(heatmap.get(x, y).unwrap() < 0.1);
      }
    }
  }

  #[test]
  fn finalize_reports_dwell_sorted_by_id() {
    let mut acc = Accumulator::new(100, 100);
    for _ in 0..3 {
      acc.observe_frame(&[track(9, 50.0, 50.0), track(2, 20.0, 20.0)]);
    }
    let config = SessionConfig::default();
    let result = finalize(&acc, 30.0, &config, true);
    let ids: Vec<TrackId> = result.dwell_times().iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![2, 9]);
    assert_eq!(result.dwell_times()[0].frames, 3);
    assert_eq!(result.dwell_times()[0].seconds, 0);
    assert_eq!(result.sampled_frames(), 3);
    assert!(result.cancelled());
  }
}
