use crate::core::{FrameSink, PlaybackState, PlayerError, Result};
use crate::player::audio_output::AudioControl;
use crate::player::playback_thread::{run_playback, SharedFrameSink};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

/// 控制线程与工作线程共享的标量状态
///
/// 只有这里的字段会被两个线程同时读写；其余资源（解码器、缓冲区、设备）
/// 在播放/暂停期间归工作线程独占，join 之后归控制线程独占。
/// position/duration 以 f64 位存储，读端允许落后至多一个解码迭代
pub(crate) struct SharedState {
    state: AtomicU8,
    quit: AtomicBool,
    running: AtomicBool,
    position_bits: AtomicU64,
    duration_bits: AtomicU64,
    volume: Mutex<f32>,
    audio_control: Mutex<Option<AudioControl>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PlaybackState::Stopped.as_u8()),
            quit: AtomicBool::new(false),
            running: AtomicBool::new(false),
            position_bits: AtomicU64::new(0f64.to_bits()),
            duration_bits: AtomicU64::new(0f64.to_bits()),
            volume: Mutex::new(1.0),
            audio_control: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: PlaybackState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    pub fn clear_quit(&self) {
        self.quit.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn position(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Relaxed))
    }

    /// 写入播放位置；时长已知时不允许越过时长
    pub fn store_position(&self, position: f64) {
        let duration = self.duration();
        let clamped = if duration > 0.0 {
            position.min(duration)
        } else {
            position
        };
        self.position_bits
            .store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn duration(&self) -> f64 {
        f64::from_bits(self.duration_bits.load(Ordering::Relaxed))
    }

    pub fn set_duration(&self, duration: f64) {
        self.duration_bits
            .store(duration.to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    pub fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }

    /// 工作线程打开设备后登记控制句柄
    pub fn register_audio_control(&self, control: AudioControl) {
        *self.audio_control.lock() = Some(control);
    }

    pub fn audio_control(&self) -> Option<AudioControl> {
        self.audio_control.lock().clone()
    }

    pub fn take_audio_control(&self) -> Option<AudioControl> {
        self.audio_control.lock().take()
    }
}

/// 播放管理器 - 生命周期、传输控制与位置/时长查询
///
/// 每次从停止态开始播放会启动一个工作线程（见 playback_thread），
/// 传输命令通过共享标志异步通知工作线程，在每次循环迭代边界生效。
/// 不支持并发传输命令（&mut self 已由构造保证串行）
pub struct PlaybackManager {
    source: Option<String>,
    shared: Arc<SharedState>,
    sink: SharedFrameSink,
    worker: Option<thread::JoinHandle<()>>,
}

impl PlaybackManager {
    pub fn new() -> Self {
        info!("🎮 创建播放管理器");
        Self {
            source: None,
            shared: Arc::new(SharedState::new()),
            sink: Arc::new(Mutex::new(None)),
            worker: None,
        }
    }

    /// 设置媒体源定位串（URL 或本地路径）
    ///
    /// 任何状态下都可调用：停止态下次 play() 生效，播放中则等停止后重新播放才生效
    pub fn set_source(&mut self, url: impl Into<String>) {
        let url = url.into();
        debug!("设置媒体源: {}", url);
        self.source = Some(url);
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// 注册视频帧接收器（播放前注册一次）
    ///
    /// 只会在工作线程上被调用；帧数据仅在回调期间有效
    pub fn set_frame_sink(&mut self, sink: Box<dyn FrameSink>) {
        *self.sink.lock() = Some(sink);
    }

    /// 开始/恢复播放
    ///
    /// 停止态：启动工作线程后立即返回成功，打开/解码失败不同步上报，
    /// 只能通过状态回落到 Stopped 间接观察。暂停态：恢复音频输出，不重启解码
    pub fn play(&mut self) -> Result<()> {
        match self.shared.state() {
            PlaybackState::Playing => {}
            PlaybackState::Stopped => {
                // 上一个会话自行结束时线程句柄还在，先回收
                if let Some(handle) = self.worker.take() {
                    let _ = handle.join();
                }

                let url = self.source.clone().ok_or_else(|| {
                    PlayerError::InvalidArgument("未设置媒体源，无法播放".to_string())
                })?;

                info!("🎬 开始播放: {}", url);
                self.shared.clear_quit();
                self.shared.set_running(true);
                // 先进入播放态再启动线程：快速失败的会话写入 Stopped 后不应再被覆盖
                self.shared.set_state(PlaybackState::Playing);

                let shared = self.shared.clone();
                let sink = self.sink.clone();
                self.worker = Some(thread::spawn(move || run_playback(url, shared, sink)));
            }
            PlaybackState::Paused => {
                info!("🎬 恢复播放");
                if let Some(ctrl) = self.shared.audio_control() {
                    ctrl.resume();
                }
                self.shared.set_state(PlaybackState::Playing);
            }
            PlaybackState::Buffering => {
                self.shared.set_state(PlaybackState::Playing);
            }
        }
        Ok(())
    }

    /// 暂停播放 - 仅在播放态有效，其余状态为空操作
    pub fn pause(&self) {
        if self.shared.state() == PlaybackState::Playing {
            info!("⏸️  暂停播放");
            self.shared.set_state(PlaybackState::Paused);
            if let Some(ctrl) = self.shared.audio_control() {
                ctrl.pause();
            }
        }
    }

    /// 停止播放 - 幂等，阻塞直到工作线程完全退出
    ///
    /// 停止后 position 保留最后的值，不重置为 0
    pub fn stop(&mut self) {
        info!("⏹️  停止播放");
        self.shared.request_quit();

        if let Some(ctrl) = self.shared.audio_control() {
            ctrl.clear();
            ctrl.pause();
        }

        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
            info!("✅ 播放线程已结束");
        }

        self.shared.set_running(false);
        self.shared.set_state(PlaybackState::Stopped);
    }

    /// 设置音量 (0.0 - 1.0)，对当前与后续会话生效
    pub fn set_volume(&self, volume: f32) {
        self.shared.set_volume(volume);
        if let Some(ctrl) = self.shared.audio_control() {
            ctrl.set_volume(volume);
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    /// 当前播放位置（秒）
    pub fn position(&self) -> f64 {
        self.shared.position()
    }

    /// 媒体总时长（秒），未知为 0
    pub fn duration(&self) -> f64 {
        self.shared.duration()
    }

    /// 工作线程是否仍在运行
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }
}

impl Default for PlaybackManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        // stop() 的 join 保证销毁不会与解码收尾并发
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FrameRef;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    struct CountingSink {
        frames: Arc<AtomicUsize>,
    }

    impl FrameSink for CountingSink {
        fn on_frame(&mut self, _frame: FrameRef<'_>) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn wait_for_stopped(manager: &PlaybackManager, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if manager.state() == PlaybackState::Stopped && !manager.is_running() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_new_manager_is_stopped() {
        let manager = PlaybackManager::new();
        assert_eq!(manager.state(), PlaybackState::Stopped);
        assert_eq!(manager.position(), 0.0);
        assert_eq!(manager.duration(), 0.0);
        assert!(!manager.is_running());
    }

    #[test]
    fn test_play_without_source_is_invalid_argument() {
        let mut manager = PlaybackManager::new();
        let result = manager.play();
        assert!(matches!(result, Err(PlayerError::InvalidArgument(_))));
        assert_eq!(manager.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_pause_from_stopped_is_noop() {
        let manager = PlaybackManager::new();
        manager.pause();
        assert_eq!(manager.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_stop_from_stopped_is_idempotent() {
        let mut manager = PlaybackManager::new();
        manager.stop();
        manager.stop();
        assert_eq!(manager.state(), PlaybackState::Stopped);
        assert!(!manager.is_running());
    }

    #[test]
    fn test_set_source_is_retained_and_replaceable() {
        let mut manager = PlaybackManager::new();
        assert_eq!(manager.source(), None);

        manager.set_source("/data/a.mp4");
        assert_eq!(manager.source(), Some("/data/a.mp4"));

        manager.set_source("https://example.com/live.m3u8");
        assert_eq!(manager.source(), Some("https://example.com/live.m3u8"));
    }

    #[test]
    fn test_unusable_source_settles_to_stopped_without_frames() {
        init_logger();
        let frames = Arc::new(AtomicUsize::new(0));
        let mut manager = PlaybackManager::new();
        manager.set_frame_sink(Box::new(CountingSink {
            frames: frames.clone(),
        }));
        manager.set_source("/nonexistent/__no_such_stream__.mp4");

        // 异步启动：即使源不可用也立即返回成功
        manager.play().unwrap();

        // 管道打开失败发生在循环入口之前，状态应很快回落到 Stopped
        assert!(wait_for_stopped(&manager, Duration::from_secs(10)));
        assert_eq!(frames.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_joins_worker_and_silences_sink() {
        init_logger();
        let frames = Arc::new(AtomicUsize::new(0));
        let mut manager = PlaybackManager::new();
        manager.set_frame_sink(Box::new(CountingSink {
            frames: frames.clone(),
        }));
        manager.set_source("/nonexistent/__no_such_stream__.mp4");

        manager.play().unwrap();
        manager.stop();

        assert_eq!(manager.state(), PlaybackState::Stopped);
        assert!(!manager.is_running());

        // stop() 返回后不再有任何回调活动
        let count = frames.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(frames.load(Ordering::SeqCst), count);
    }

    #[test]
    fn test_play_after_stopped_session_restarts_worker() {
        init_logger();
        let mut manager = PlaybackManager::new();
        manager.set_source("/nonexistent/__no_such_stream__.mp4");

        manager.play().unwrap();
        assert!(wait_for_stopped(&manager, Duration::from_secs(10)));

        // 会话自行结束后可以再次播放（旧线程句柄被回收）
        manager.play().unwrap();
        assert!(wait_for_stopped(&manager, Duration::from_secs(10)));
        manager.stop();
    }

    #[test]
    fn test_drop_joins_worker() {
        init_logger();
        let mut manager = PlaybackManager::new();
        manager.set_source("/nonexistent/__no_such_stream__.mp4");
        manager.play().unwrap();
        // drop 等价于 stop + 释放，必须不悬挂也不泄漏线程
        drop(manager);
    }

    #[test]
    fn test_position_clamped_to_duration() {
        let shared = SharedState::new();
        shared.set_duration(10.0);
        shared.store_position(42.0);
        assert_eq!(shared.position(), 10.0);

        shared.store_position(3.5);
        assert_eq!(shared.position(), 3.5);

        // 时长未知（0）时不截断
        let unknown = SharedState::new();
        unknown.store_position(42.0);
        assert_eq!(unknown.position(), 42.0);
    }

    #[test]
    fn test_volume_is_retained_in_shared_state() {
        let manager = PlaybackManager::new();
        manager.set_volume(0.4);
        assert_eq!(manager.shared.volume(), 0.4);

        manager.set_volume(7.0);
        assert_eq!(manager.shared.volume(), 1.0);
    }
}
