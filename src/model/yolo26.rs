// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolo26.rs - RKNPU YOLO26 检测器
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

use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, RgbNhwcFrame},
  model::{DetectItem, DetectResult, Model},
};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_CLASS_NUM: usize = 80;
const YOLO26_INPUT_W: u32 = 640;
const YOLO26_INPUT_H: u32 = 640;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
// 低于会话过滤阈值的候选在这里就丢弃，减少后处理开销
const YOLO26_OBJECT_THRESH: f32 = 0.25;

#[derive(Error, Debug)]
pub enum Yolo26Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

pub struct Yolo26Builder {
  model_path: String,
  flags: InitFlags,
}

impl FromUrlWithScheme for Yolo26Builder {
  const SCHEME: &'static str = "yolo26";
}

impl FromUrl for Yolo26Builder {
  type Error = Yolo26Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo26Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(Yolo26Builder {
      model_path: url.path().to_string(),
      flags: InitFlags::default(),
    })
  }
}

impl Yolo26Builder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<Yolo26, Yolo26Error> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let context = Context::new(&model_data, self.flags)?;

    let num_inputs = context.num_inputs()?;
    let num_outputs = context.num_outputs()?;
    if num_inputs != YOLO26_NUM_INPUTS || num_outputs != YOLO26_NUM_OUTPUTS {
      let message = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", message);
      return Err(Yolo26Error::ModelInvalid(message));
    }

    info!("模型加载完成");
    Ok(Yolo26 { context })
  }
}

pub struct Yolo26 {
  context: Context,
}

/// 根据张量大小区分回归与分类输出
fn match_reg_cls_tensors<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  reg_expected: usize,
  cls_expected: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  if tensor1.len() == reg_expected && tensor2.len() == cls_expected {
    Some((tensor1, tensor2))
  } else if tensor1.len() == cls_expected && tensor2.len() == reg_expected {
    Some((tensor2, tensor1))
  } else {
    None
  }
}

impl Yolo26 {
  /// 解码三个检测头，输出归一化的角点坐标
  fn postprocess(output: &rknpu::Output) -> Vec<DetectItem> {
    let mut items = Vec::new();
    let (input_w, input_h) = (YOLO26_INPUT_W as f32, YOLO26_INPUT_H as f32);

    for (head_idx, (&(map_h, map_w), stride)) in
      YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate()
    {
      let spatial = map_h * map_w;
      let (tensor1, tensor2) = match (
        output.get_f32(head_idx * 2),
        output.get_f32(head_idx * 2 + 1),
      ) {
        (Ok(t1), Ok(t2)) => (t1, t2),
        _ => {
          error!("获取检测头 {} 的输出失败", head_idx);
          continue;
        }
      };

      let Some((reg, cls)) =
        match_reg_cls_tensors(tensor1, tensor2, 4 * spatial, YOLO26_CLASS_NUM * spatial)
      else {
        error!(
          "检测头 {}: 输出大小不匹配 ({}, {})",
          head_idx,
          tensor1.len(),
          tensor2.len()
        );
        continue;
      };

      for h in 0..map_h {
        for w in 0..map_w {
          let idx = h * map_w + w;

          let (class_id, max_logit) = (0..YOLO26_CLASS_NUM)
            .map(|c| (c as u32, cls[c * spatial + idx]))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
          let score = sigmoid(max_logit);
          if score <= YOLO26_OBJECT_THRESH {
            continue;
          }

          let grid_x = (w as f32) + 0.5;
          let grid_y = (h as f32) + 0.5;
          let x_min = ((grid_x - reg[idx]) * stride).clamp(0.0, input_w);
          let y_min = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, input_h);
          let x_max = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, input_w);
          let y_max = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, input_h);

          items.push(DetectItem {
            class_id,
            score,
            bbox: [
              x_min / input_w,
              y_min / input_h,
              x_max / input_w,
              y_max / input_h,
            ],
          });
        }
      }
    }

    items
  }
}

impl Model for Yolo26 {
  type Input = Frame;
  type Output = DetectResult;
  type Error = Yolo26Error;

  fn infer(&self, input: &Frame) -> Result<DetectResult, Yolo26Error> {
    let tensor = RgbNhwcFrame::<YOLO26_INPUT_W, YOLO26_INPUT_H>::from(input);

    debug!("设置模型输入");
    self.context.set_input(
      0,
      tensor.as_nhwc(),
      rknpu::TensorFormat::NHWC,
      TensorType::UInt8,
    )?;

    debug!("执行模型推理");
    self.context.run()?;
    let output = self.context.get_outputs()?;

    // 模型输入为直接缩放后的画面，归一化坐标乘以原始分辨率即可还原
    let (frame_w, frame_h) = (input.width() as f32, input.height() as f32);
    let items: Vec<DetectItem> = Self::postprocess(&output)
      .into_iter()
      .map(|mut item| {
        item.bbox = [
          item.bbox[0] * frame_w,
          item.bbox[1] * frame_h,
          item.bbox[2] * frame_w,
          item.bbox[3] * frame_h,
        ];
        item
      })
      .collect();

    debug!("第 {} 帧检测到 {} 个物体", input.index, items.len());
    Ok(DetectResult::from(items))
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
