// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 跟踪结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use tracing::warn;

use crate::track::Track;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const BOX_THICKNESS: i32 = 2;

/// 加载标签字体，失败时只画框不画字
pub fn load_font(path: Option<&Path>) -> Option<FontVec> {
  let path = path?;
  let data = match std::fs::read(path) {
    Ok(data) => data,
    Err(e) => {
      warn!("无法读取字体文件 {}: {}，预览不绘制标签", path.display(), e);
      return None;
    }
  };
  match FontVec::try_from_vec(data) {
    Ok(font) => Some(font),
    Err(e) => {
      warn!("无法解析字体文件 {}: {}，预览不绘制标签", path.display(), e);
      None
    }
  }
}

pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  font: Option<FontVec>,
  box_color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(None)
  }
}

impl Draw {
  pub fn new(font: Option<FontVec>) -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      box_color: BOX_COLOR,
      font,
    }
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  // 在图像上绘制一个矩形边框，bbox 为像素坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: [f32; 4], label: &str) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = Rgb(self.box_color);
    for thickness in 0..BOX_THICKNESS {
      let left = (x_min + thickness).min(x_max);
      let top = (y_min + thickness).min(y_max);
      let right = (x_max - thickness).max(x_min);
      let bottom = (y_max - thickness).max(y_min);

      for x in left..=right {
        image.put_pixel(x as u32, top as u32, color);
        image.put_pixel(x as u32, bottom as u32, color);
      }
      for y in top..=bottom {
        image.put_pixel(left as u32, y as u32, color);
        image.put_pixel(right as u32, y as u32, color);
      }
    }

    let Some(font) = self.font.as_ref() else {
      return;
    };

    let text_width = (label.len() as f32 * self.label_char_width) as i32;
    let label_x = x_min;
    let label_y = (y_min - self.label_text_height).max(0);
    let label_width = text_width.min(w - label_x).max(0) as u32;
    let label_height = self.label_text_height as u32;

    if label_width > 0 && label_height > 0 {
      let rect = imageproc::rect::Rect::at(label_x, label_y).of_size(label_width, label_height);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb([0u8, 0u8, 0u8]),
        label_x,
        label_y + self.label_text_vertical_padding,
        PxScale::from(self.font_size),
        font,
        label,
      );
    }
  }

  /// 在图像上绘制已确认轨迹的框与 `Worker <id>` 标签
  pub fn draw_tracks_on_image(&self, image: &mut RgbImage, tracks: &[Track]) {
    for track in tracks {
      self.draw_bbox_with_label(
        image,
        track.bbox.to_corners(),
        &format!("Worker {}", track.id),
      );
    }
  }

  pub fn draw_tracks(&self, image: &RgbImage, tracks: &[Track]) -> RgbImage {
    let mut image = image.clone();
    self.draw_tracks_on_image(&mut image, tracks);
    image
  }
}
