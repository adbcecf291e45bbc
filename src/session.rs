// 该文件是 Shanan （山南西风） 项目的一部分。
// src/session.rs - 分析会话控制
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

use std::{
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, SyncSender, TryRecvError},
  },
  thread::{self, JoinHandle},
};

#[cfg(feature = "preview")]
use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  BoxError,
  config::SessionConfig,
  finalize::FinalizedResult,
  input::{FrameSource, InputError, OpenSource, validate_fps},
  model::OpenModel,
  output::{self, OutputError},
  task::{DwellTask, Task},
  track::{OpenTracker, Tracker},
};

/// 事件通道容量；通道满时进度事件被丢弃，其余事件等待观察端取走
pub(crate) const EVENT_CAPACITY: usize = 64;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
  #[default]
  Idle,
  Loading,
  Running,
  Completed,
  Error,
}

impl SessionState {
  fn is_active(self) -> bool {
    matches!(self, SessionState::Loading | SessionState::Running)
  }

  fn is_terminal(self) -> bool {
    matches!(self, SessionState::Completed | SessionState::Error)
  }
}

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("未选择输入源")]
  NoSourceSelected,
  #[error("已有会话正在运行")]
  SessionBusy,
  #[error("输入源不可用: {0}")]
  SourceUnavailable(InputError),
  #[error("解码失败: {0}")]
  Decode(InputError),
  #[error("检测器错误: {0}")]
  Detector(BoxError),
  #[error("跟踪器错误: {0}")]
  Tracker(BoxError),
  #[error("结果尚未生成")]
  ExportNotReady,
  #[error("导出失败: {0}")]
  Export(#[from] OutputError),
  #[error("工作线程意外退出")]
  WorkerExited,
}

/// 工作线程发往观察端的事件
#[derive(Debug)]
pub enum SessionEvent {
  Loading,
  Running { width: u32, height: u32, fps: f64 },
  Progress { sampled: u64, index: u64 },
  Completed(Arc<FinalizedResult>),
  Failed(SessionError),
}

/// 可跨线程克隆的取消信号
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  fn reset(&self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

/// 最近一次进度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
  /// 已处理的采样帧数
  pub sampled: u64,
  /// 最近处理的帧序号
  pub index: u64,
}

#[cfg(feature = "preview")]
#[derive(Debug, Clone)]
struct PreviewConfig {
  directory: PathBuf,
  font: Option<PathBuf>,
}

/// 会话控制器
///
/// 持有会话生命周期状态，在后台线程中运行分析任务，并通过事件通道得知进度与结果。
/// 状态只在 `poll` / `wait` 处理事件时推进。
pub struct SessionController {
  config: SessionConfig,
  #[cfg(feature = "preview")]
  preview: Option<PreviewConfig>,
  state: SessionState,
  result: Option<Arc<FinalizedResult>>,
  error: Option<SessionError>,
  progress: Progress,
  frame_info: Option<(u32, u32, f64)>,
  cancel: CancelHandle,
  events: Option<Receiver<SessionEvent>>,
  worker: Option<JoinHandle<()>>,
}

impl SessionController {
  pub fn new(config: SessionConfig) -> Self {
    Self {
      config,
      #[cfg(feature = "preview")]
      preview: None,
      state: SessionState::Idle,
      result: None,
      error: None,
      progress: Progress::default(),
      frame_info: None,
      cancel: CancelHandle::default(),
      events: None,
      worker: None,
    }
  }

  /// 将每个采样帧的标注预览保存到目录，字体缺失时只画框
  #[cfg(feature = "preview")]
  pub fn with_preview(mut self, directory: impl Into<PathBuf>, font: Option<PathBuf>) -> Self {
    self.preview = Some(PreviewConfig {
      directory: directory.into(),
      font,
    });
    self
  }

  pub fn config(&self) -> &SessionConfig {
    &self.config
  }

  pub fn state(&self) -> SessionState {
    self.state
  }

  /// 只有会话完成时才返回结果
  pub fn result(&self) -> Option<Arc<FinalizedResult>> {
    match self.state {
      SessionState::Completed => self.result.clone(),
      _ => None,
    }
  }

  /// 会话失败的原因
  pub fn error(&self) -> Option<&SessionError> {
    self.error.as_ref()
  }

  pub fn progress(&self) -> Progress {
    self.progress
  }

  /// 帧源报告的 (宽, 高, 帧率)
  pub fn frame_info(&self) -> Option<(u32, u32, f64)> {
    self.frame_info
  }

  pub fn cancel_handle(&self) -> CancelHandle {
    self.cancel.clone()
  }

  /// 请求取消当前会话，可重复调用
  pub fn cancel(&self) {
    if self.state.is_active() {
      info!("请求取消会话");
    }
    self.cancel.cancel();
  }

  /// 启动新会话，跟踪器按会话配置中的 `tracker` 创建
  pub fn start<O, M, T>(
    &mut self,
    source: Option<O>,
    model: M,
    tracker: T,
  ) -> Result<(), SessionError>
  where
    O: OpenSource,
    M: OpenModel,
    <M::Model as crate::model::Model>::Error: Into<BoxError>,
    T: OpenTracker,
    <T::Tracker as Tracker>::Error: Into<BoxError>,
  {
    let Some(source) = source else {
      warn!("未选择输入源，忽略启动请求");
      return Err(SessionError::NoSourceSelected);
    };

    self.poll();
    if self.state.is_active() {
      warn!("已有会话正在运行，忽略启动请求");
      return Err(SessionError::SessionBusy);
    }

    if let Some(worker) = self.worker.take() {
      let _ = worker.join();
    }
    self.result = None;
    self.error = None;
    self.progress = Progress::default();
    self.frame_info = None;
    self.cancel.reset();
    self.state = SessionState::Loading;

    let (tx, rx) = mpsc::sync_channel(EVENT_CAPACITY);
    self.events = Some(rx);

    let config = self.config.clone();
    let tracker_config = config.tracker;
    let cancel = self.cancel.clone();
    #[cfg(feature = "preview")]
    let preview = self.preview.clone();

    info!("启动会话");
    self.worker = Some(thread::spawn(move || {
      let task = DwellTask::new(config, cancel, tx.clone());
      #[cfg(feature = "preview")]
      let task = task.with_preview(preview.and_then(open_preview));

      let tracker = tracker.open(&tracker_config);
      let event = match run_worker(task, &tx, source, model, tracker) {
        Ok(result) => SessionEvent::Completed(Arc::new(result)),
        Err(e) => {
          error!("会话失败: {}", e);
          SessionEvent::Failed(e)
        }
      };
      let _ = tx.send(event);
    }));

    Ok(())
  }

  fn apply(&mut self, event: SessionEvent) {
    match event {
      SessionEvent::Loading => self.state = SessionState::Loading,
      SessionEvent::Running { width, height, fps } => {
        info!("会话运行中: {}x{} @ {:.2} fps", width, height, fps);
        self.frame_info = Some((width, height, fps));
        self.state = SessionState::Running;
      }
      SessionEvent::Progress { sampled, index } => {
        self.progress = Progress { sampled, index };
      }
      SessionEvent::Completed(result) => {
        info!(
          "会话完成: {} 个采样帧, {} 个身份{}",
          result.sampled_frames(),
          result.dwell_times().len(),
          if result.cancelled() { " (已取消)" } else { "" }
        );
        self.result = Some(result);
        self.state = SessionState::Completed;
        self.events = None;
      }
      SessionEvent::Failed(e) => {
        self.error = Some(e);
        self.state = SessionState::Error;
        self.events = None;
      }
    }
  }

  fn worker_lost(&mut self) {
    error!("工作线程未报告结果即退出");
    self.error = Some(SessionError::WorkerExited);
    self.state = SessionState::Error;
    self.events = None;
  }

  /// 处理所有已到达的事件，不阻塞
  pub fn poll(&mut self) -> SessionState {
    while let Some(events) = self.events.as_ref() {
      match events.try_recv() {
        Ok(event) => self.apply(event),
        Err(TryRecvError::Empty) => break,
        Err(TryRecvError::Disconnected) => self.worker_lost(),
      }
    }
    self.state
  }

  /// 阻塞直到会话进入 `Completed` 或 `Error`
  pub fn wait(&mut self) -> SessionState {
    while !self.state.is_terminal() {
      let Some(events) = self.events.as_ref() else {
        break;
      };
      match events.recv() {
        Ok(event) => self.apply(event),
        Err(_) => self.worker_lost(),
      }
    }
    self.state
  }

  fn completed(&self) -> Result<&FinalizedResult, SessionError> {
    match (self.state, self.result.as_deref()) {
      (SessionState::Completed, Some(result)) => Ok(result),
      _ => Err(SessionError::ExportNotReady),
    }
  }

  pub fn export_report(&self, path: &Path) -> Result<(), SessionError> {
    Ok(output::export_report(self.completed()?, path)?)
  }

  pub fn export_heatmap(&self, path: &Path) -> Result<(), SessionError> {
    Ok(output::export_heatmap(self.completed()?, path)?)
  }
}

impl Drop for SessionController {
  fn drop(&mut self) {
    self.cancel.cancel();
    // 先关闭接收端，避免工作线程阻塞在满的通道上
    self.events = None;
    if let Some(worker) = self.worker.take() {
      let _ = worker.join();
    }
  }
}

fn run_worker<O, M, T>(
  task: DwellTask,
  events: &SyncSender<SessionEvent>,
  source: O,
  model: M,
  tracker: T,
) -> Result<FinalizedResult, SessionError>
where
  O: OpenSource,
  M: OpenModel,
  <M::Model as crate::model::Model>::Error: Into<BoxError>,
  T: Tracker,
  T::Error: Into<BoxError>,
{
  let _ = events.send(SessionEvent::Loading);

  let source = source.open().map_err(SessionError::SourceUnavailable)?;
  let fps = validate_fps(source.fps()).map_err(SessionError::SourceUnavailable)?;
  let model = model.open().map_err(SessionError::Detector)?;

  let _ = events.send(SessionEvent::Running {
    width: source.width(),
    height: source.height(),
    fps,
  });

  task.run_task(source, model, tracker)
}

#[cfg(feature = "preview")]
fn open_preview(preview: PreviewConfig) -> Option<output::DirectoryRecordOutput> {
  let draw = output::draw::Draw::new(output::draw::load_font(preview.font.as_deref()));
  match output::DirectoryRecordOutput::new(&preview.directory, draw) {
    Ok(output) => Some(output),
    Err(e) => {
      warn!("无法创建预览目录 {}: {}，不保存预览", preview.directory.display(), e);
      None
    }
  }
}
