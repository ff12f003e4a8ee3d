// 流媒体播放引擎
//
// 面向上层（GUI/视图模型）的边界是 PlaybackManager 的传输控制
// 与 FrameSink 帧回调；音频通路完全内部（重采样 → 设备队列）

pub mod core;
pub mod player;

pub use crate::core::{
    FrameRef, FrameSink, MediaInfo, MediaSource, PixelFormat, PlaybackState, PlayerError, Result,
    SampleBatch, StreamProtocol, StreamSelection,
};
pub use crate::player::PlaybackManager;
