// 核心类型模块

pub mod error;
pub mod types;

pub use error::{PlayerError, Result};
pub use types::{
    FrameRef, FrameSink, MediaInfo, MediaSource, PixelFormat, PlaybackState, SampleBatch,
    StreamProtocol, StreamSelection,
};
