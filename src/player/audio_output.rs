use crate::core::{PlayerError, Result, SampleBatch};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam::queue::SegQueue;
use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 音频输出控制句柄 - 可跨线程暂停/恢复/清空队列
///
/// cpal::Stream 不是 Send，留在创建它的工作线程里；
/// 控制线程只通过本句柄操作共享队列与标志
#[derive(Clone)]
pub struct AudioControl {
    queue: Arc<SegQueue<i16>>,
    playing: Arc<AtomicBool>,
    volume: Arc<Mutex<f32>>,
}

impl AudioControl {
    fn new() -> Self {
        Self {
            queue: Arc::new(SegQueue::new()),
            playing: Arc::new(AtomicBool::new(false)),
            volume: Arc::new(Mutex::new(1.0)),
        }
    }

    /// 入队一批样本（所有权转移给输出队列）
    pub fn enqueue(&self, batch: SampleBatch) {
        for sample in batch.data {
            self.queue.push(sample);
        }
    }

    /// 暂停输出（回调改为输出静音）
    pub fn pause(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    /// 恢复输出
    pub fn resume(&self) {
        self.playing.store(true, Ordering::SeqCst);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// 清空尚未播放的样本
    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }

    /// 队列中的样本数
    pub fn queued_samples(&self) -> usize {
        self.queue.len()
    }

    /// 设置音量 (0.0 - 1.0)
    pub fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }
}

/// 音频输出 - 使用 cpal 播放 S16 队列中的样本
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    control: AudioControl,
}

impl AudioOutput {
    /// 按解码器推导的采样率/声道数打开默认输出设备
    ///
    /// 设备不支持该配置时直接失败，本次会话以无声模式继续（不回退、不重试）
    pub fn open(sample_rate: u32, channels: u16) -> Result<Self> {
        info!("初始化音频输出: {} Hz, {} 声道", sample_rate, channels);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::DeviceUnavailable("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let mut supported_configs = device.supported_output_configs().map_err(|e| {
            PlayerError::DeviceUnavailable(format!("无法获取支持的音频配置: {}", e))
        })?;

        if !supported_configs.any(|supported| Self::is_config_compatible(&config, &supported)) {
            return Err(PlayerError::DeviceUnavailable(format!(
                "音频设备不支持 {} Hz, {} 声道配置",
                sample_rate, channels
            )));
        }

        Ok(Self {
            device,
            config,
            stream: None,
            control: AudioControl::new(),
        })
    }

    /// 检查配置是否兼容
    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;

        let channels_match = config.channels == supported.channels();

        rate_in_range && channels_match
    }

    /// 创建并启动输出流
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let queue = self.control.queue.clone();
        let playing = self.control.playing.clone();
        let volume = self.control.volume.clone();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !playing.load(Ordering::SeqCst) {
                        data.fill(0.0);
                        return;
                    }
                    let vol = *volume.lock();
                    for sample in data.iter_mut() {
                        *sample = match queue.pop() {
                            Some(value) => f32::from(value) / 32768.0 * vol,
                            None => 0.0,
                        };
                    }
                },
                move |err| {
                    error!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::DeviceUnavailable(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::DeviceUnavailable(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("音频输出已启动");

        Ok(())
    }

    /// 获取控制句柄
    pub fn control(&self) -> AudioControl {
        self.control.clone()
    }

    /// 停止输出流
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("音频输出已停止");
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(samples: Vec<i16>, channels: u16) -> SampleBatch {
        let count = samples.len() / channels as usize;
        SampleBatch {
            data: samples,
            channels,
            samples: count,
        }
    }

    #[test]
    fn test_control_enqueue_and_clear() {
        let control = AudioControl::new();
        assert_eq!(control.queued_samples(), 0);

        control.enqueue(batch(vec![1, -1, 2, -2], 2));
        assert_eq!(control.queued_samples(), 4);

        control.clear();
        assert_eq!(control.queued_samples(), 0);
    }

    #[test]
    fn test_control_pause_resume() {
        let control = AudioControl::new();
        // 新建的句柄处于暂停态，由播放会话显式恢复
        assert!(!control.is_playing());

        control.resume();
        assert!(control.is_playing());

        control.pause();
        assert!(!control.is_playing());
    }

    #[test]
    fn test_control_volume_clamped() {
        let control = AudioControl::new();
        assert_eq!(control.volume(), 1.0);

        control.set_volume(2.5);
        assert_eq!(control.volume(), 1.0);

        control.set_volume(-0.5);
        assert_eq!(control.volume(), 0.0);

        control.set_volume(0.3);
        assert_eq!(control.volume(), 0.3);
    }
}
