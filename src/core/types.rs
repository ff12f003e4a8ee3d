use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 媒体源类型
#[derive(Debug, Clone)]
pub enum MediaSource {
    /// 本地文件路径
    LocalFile(PathBuf),

    /// 网络流 URL
    NetworkStream {
        url: String,
        protocol: StreamProtocol,
    },
}

impl MediaSource {
    /// 从 URL 字符串解析媒体源
    pub fn from_url(url: &str) -> anyhow::Result<Self> {
        match StreamProtocol::detect(url) {
            Some(protocol) => Ok(MediaSource::NetworkStream {
                url: url.to_string(),
                protocol,
            }),
            // 默认当作本地文件
            None => Ok(MediaSource::LocalFile(PathBuf::from(url))),
        }
    }

    /// 判断是否为网络流
    pub fn is_network_stream(&self) -> bool {
        matches!(self, MediaSource::NetworkStream { .. })
    }

    /// 原始定位字符串（传给 FFmpeg）
    pub fn locator(&self) -> String {
        match self {
            MediaSource::LocalFile(path) => path.to_string_lossy().to_string(),
            MediaSource::NetworkStream { url, .. } => url.clone(),
        }
    }
}

/// 流媒体协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProtocol {
    /// RTSP - 实时流协议（监控摄像头）
    RTSP,
    /// RTMP - 实时消息协议（直播流）
    RTMP,
    /// HLS - HTTP Live Streaming
    HLS,
    /// HTTP - 普通 HTTP 流
    HTTP,
}

impl StreamProtocol {
    /// 从 URL 识别协议，本地路径返回 None
    pub fn detect(url: &str) -> Option<Self> {
        if url.starts_with("rtsp://") {
            Some(StreamProtocol::RTSP)
        } else if url.starts_with("rtmp://") {
            Some(StreamProtocol::RTMP)
        } else if url.ends_with(".m3u8") || url.contains("/hls/") {
            Some(StreamProtocol::HLS)
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Some(StreamProtocol::HTTP)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProtocol::RTSP => "RTSP",
            StreamProtocol::RTMP => "RTMP",
            StreamProtocol::HLS => "HLS",
            StreamProtocol::HTTP => "HTTP",
        }
    }
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    /// 预留：缓冲状态（当前状态机不会进入，供上层扩展）
    Buffering,
}

impl PlaybackState {
    /// 转为 u8（用于原子存储）
    pub fn as_u8(self) -> u8 {
        match self {
            PlaybackState::Stopped => 0,
            PlaybackState::Playing => 1,
            PlaybackState::Paused => 2,
            PlaybackState::Buffering => 3,
        }
    }

    /// 从 u8 还原，非法值按 Stopped 处理
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            3 => PlaybackState::Buffering,
            _ => PlaybackState::Stopped,
        }
    }
}

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    RGBA,
}

/// 视频帧引用 - 借用解码线程的复用缓冲区
///
/// 仅在 `FrameSink::on_frame` 调用期间有效，需要保留数据的消费者必须同步复制
#[derive(Debug)]
pub struct FrameRef<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// 显示时间戳（秒）
    pub pts: f64,
}

/// 视频帧接收器 - 解码线程每产出一帧同步调用一次
///
/// 只会在工作线程上被调用，且不会与自身并发
pub trait FrameSink: Send {
    fn on_frame(&mut self, frame: FrameRef<'_>);
}

/// 音频样本批 - 重采样后的 S16 交织 PCM
#[derive(Debug, Clone)]
pub struct SampleBatch {
    pub data: Vec<i16>,
    pub channels: u16,
    /// 每声道样本数
    pub samples: usize,
}

/// 流探测结果 - 各类型只取枚举顺序中的第一条流
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelection {
    NoUsableStream,
    VideoOnly(usize),
    AudioOnly(usize),
    Both { video: usize, audio: usize },
}

impl StreamSelection {
    pub fn classify(video: Option<usize>, audio: Option<usize>) -> Self {
        match (video, audio) {
            (Some(v), Some(a)) => StreamSelection::Both { video: v, audio: a },
            (Some(v), None) => StreamSelection::VideoOnly(v),
            (None, Some(a)) => StreamSelection::AudioOnly(a),
            (None, None) => StreamSelection::NoUsableStream,
        }
    }

    pub fn video_index(&self) -> Option<usize> {
        match self {
            StreamSelection::VideoOnly(v) => Some(*v),
            StreamSelection::Both { video, .. } => Some(*video),
            _ => None,
        }
    }

    pub fn audio_index(&self) -> Option<usize> {
        match self {
            StreamSelection::AudioOnly(a) => Some(*a),
            StreamSelection::Both { audio, .. } => Some(*audio),
            _ => None,
        }
    }

    pub fn is_usable(&self) -> bool {
        !matches!(self, StreamSelection::NoUsableStream)
    }
}

/// 媒体信息
#[derive(Debug, Clone)]
pub struct MediaInfo {
    /// 总时长（秒），未知为 0
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_codec: String,
    pub audio_codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            duration: 0.0,
            width: 0,
            height: 0,
            fps: 0.0,
            video_codec: String::new(),
            audio_codec: String::new(),
            sample_rate: 0,
            channels: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_protocol() {
        assert_eq!(StreamProtocol::detect("rtsp://cam/1"), Some(StreamProtocol::RTSP));
        assert_eq!(StreamProtocol::detect("rtmp://live/ch"), Some(StreamProtocol::RTMP));
        assert_eq!(
            StreamProtocol::detect("https://example.com/live/index.m3u8"),
            Some(StreamProtocol::HLS)
        );
        assert_eq!(
            StreamProtocol::detect("http://example.com/movie.mp4"),
            Some(StreamProtocol::HTTP)
        );
        assert_eq!(StreamProtocol::detect("/data/movie.mp4"), None);
    }

    #[test]
    fn test_media_source_from_url() {
        let source = MediaSource::from_url("https://example.com/live.m3u8").unwrap();
        assert!(source.is_network_stream());
        assert_eq!(source.locator(), "https://example.com/live.m3u8");

        let source = MediaSource::from_url("C:/videos/demo.mkv").unwrap();
        assert!(!source.is_network_stream());
    }

    #[test]
    fn test_playback_state_roundtrip() {
        for state in [
            PlaybackState::Stopped,
            PlaybackState::Playing,
            PlaybackState::Paused,
            PlaybackState::Buffering,
        ] {
            assert_eq!(PlaybackState::from_u8(state.as_u8()), state);
        }
        // 非法值回落到 Stopped
        assert_eq!(PlaybackState::from_u8(200), PlaybackState::Stopped);
    }

    #[test]
    fn test_stream_selection_classify() {
        assert_eq!(
            StreamSelection::classify(Some(0), Some(1)),
            StreamSelection::Both { video: 0, audio: 1 }
        );
        assert_eq!(StreamSelection::classify(Some(2), None), StreamSelection::VideoOnly(2));
        assert_eq!(StreamSelection::classify(None, Some(0)), StreamSelection::AudioOnly(0));
        assert_eq!(StreamSelection::classify(None, None), StreamSelection::NoUsableStream);
        assert!(!StreamSelection::classify(None, None).is_usable());
        assert_eq!(StreamSelection::Both { video: 0, audio: 1 }.video_index(), Some(0));
        assert_eq!(StreamSelection::VideoOnly(2).audio_index(), None);
    }
}
