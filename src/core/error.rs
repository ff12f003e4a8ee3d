use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    #[error("媒体源不可用: {0}")]
    SourceUnusable(String),

    #[error("解码器不可用: {0}")]
    DecoderUnavailable(String),

    #[error("音频设备不可用: {0}")]
    DeviceUnavailable(String),

    #[error("解码错误（已跳过）: {0}")]
    TransientDecode(String),

    #[error("流已结束")]
    StreamEnded,

    #[error("Anyhow 错误: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
