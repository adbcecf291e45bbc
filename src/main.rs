// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::{thread, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use shanan_dwell::{
  session::{SessionController, SessionState},
  track::IouTrackerBuilder,
};

#[cfg(feature = "preview")]
fn with_preview(session: SessionController, args: &args::Args) -> SessionController {
  match args.preview_dir.clone() {
    Some(directory) => session.with_preview(directory, args.preview_font.clone()),
    None => session,
  }
}

#[cfg(not(feature = "preview"))]
fn with_preview(session: SessionController, args: &args::Args) -> SessionController {
  if args.preview_dir.is_some() || args.preview_font.is_some() {
    warn!("未启用 preview 特性，忽略预览参数");
  }
  session
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let config = args.session_config();

  match args.input.as_ref() {
    Some(input) => info!("输入来源: {}", input),
    None => warn!("未指定输入来源"),
  }
  info!("检测模型: {}", args.model);
  info!("报告输出: {}", args.report.display());
  info!("热力图输出: {}", args.heatmap.display());
  info!("会话配置: {:?}", config);

  let mut session = with_preview(SessionController::new(config), &args);

  let cancel = session.cancel_handle();
  ctrlc::set_handler(move || {
    info!("收到中断信号，结束会话并导出已有结果...");
    cancel.cancel();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("无法设置 Ctrl-C 处理函数")?;

  session.start(args.input.clone(), args.model.clone(), IouTrackerBuilder)?;

  if session.wait() != SessionState::Completed {
    match session.error() {
      Some(e) => anyhow::bail!("会话失败: {}", e),
      None => anyhow::bail!("会话未完成"),
    }
  }

  session.export_report(&args.report)?;
  session.export_heatmap(&args.heatmap)?;

  info!("处理完成");
  Ok(())
}
