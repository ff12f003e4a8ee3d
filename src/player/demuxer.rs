use crate::core::{MediaInfo, MediaSource, PlayerError, Result, StreamSelection};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info, warn};

/// 数据包类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Video,
    Audio,
}

/// 解封装器 - 打开媒体源并分离音视频流
///
/// 各类型只提交枚举顺序中的第一条流，其余流的包在读取时丢弃
pub struct Demuxer {
    input_ctx: format::context::Input,
    selection: StreamSelection,
    media_info: MediaInfo,
}

impl Demuxer {
    /// 打开媒体源（本地文件或网络流）
    pub fn open(url: &str) -> Result<Self> {
        ffmpeg::init()?;

        let source = MediaSource::from_url(url)?;
        info!("正在打开媒体源: {}", url);

        let input_ctx = if let MediaSource::NetworkStream { ref protocol, .. } = source {
            info!("🌐 检测到网络流 ({})，应用网络选项", protocol.as_str());

            let mut options = ffmpeg::Dictionary::new();

            // discardcorrupt: 丢弃损坏的帧
            // genpts: 生成 PTS（防止时间戳问题）
            options.set("fflags", "+discardcorrupt+genpts");

            // 控制探测时间，加快启动
            options.set("analyzeduration", "5000000");
            options.set("probesize", "10000000");

            // 网络超时设置
            options.set("timeout", "15000000");
            options.set("rw_timeout", "8000000");

            // FFmpeg 内部重连
            options.set("reconnect", "1");
            options.set("reconnect_streamed", "1");
            options.set("reconnect_delay_max", "4");

            // HLS 特定选项
            if url.contains(".m3u8") {
                info!("🎬 HLS 流检测，应用 HLS 优化");
                options.set("live_start_index", "-1");
                options.set("max_reload", "10");
                options.set("http_persistent", "1");
            }

            format::input_with_dictionary(&url, options)
                .map_err(|e| PlayerError::SourceUnusable(format!("无法打开网络流: {}", e)))?
        } else {
            format::input(&url)
                .map_err(|e| PlayerError::SourceUnusable(format!("无法打开文件: {}", e)))?
        };

        // 查找音视频流：各取枚举顺序中的第一条
        let mut video_stream_index = None;
        let mut audio_stream_index = None;
        for stream in input_ctx.streams() {
            match stream.parameters().medium() {
                media::Type::Video if video_stream_index.is_none() => {
                    video_stream_index = Some(stream.index());
                }
                media::Type::Audio if audio_stream_index.is_none() => {
                    audio_stream_index = Some(stream.index());
                }
                _ => {}
            }
        }

        let selection = StreamSelection::classify(video_stream_index, audio_stream_index);
        if !selection.is_usable() {
            return Err(PlayerError::SourceUnusable(
                "未找到任何视频或音频流".to_string(),
            ));
        }

        debug!("视频流索引: {:?}", video_stream_index);
        debug!("音频流索引: {:?}", audio_stream_index);

        let mut demuxer = Self {
            input_ctx,
            selection,
            media_info: MediaInfo::default(),
        };
        demuxer.media_info = demuxer.extract_media_info();

        Ok(demuxer)
    }

    /// 提取媒体信息（尽力而为，失败只影响日志展示）
    fn extract_media_info(&self) -> MediaInfo {
        let mut info = MediaInfo {
            duration: self.duration(),
            ..MediaInfo::default()
        };

        if let Some(stream) = self.video_stream() {
            let params = stream.parameters();
            info.video_codec = params.id().name().to_string();

            let fps = stream.avg_frame_rate();
            if fps.denominator() != 0 {
                info.fps = fps.numerator() as f64 / fps.denominator() as f64;
            }

            match ffmpeg::codec::context::Context::from_parameters(params)
                .and_then(|ctx| ctx.decoder().video())
            {
                Ok(decoder) => {
                    info.width = decoder.width();
                    info.height = decoder.height();
                }
                Err(e) => warn!("读取视频参数失败: {}", e),
            }
        } else {
            info.video_codec = "none".to_string();
        }

        if let Some(stream) = self.audio_stream() {
            let params = stream.parameters();
            info.audio_codec = params.id().name().to_string();

            match ffmpeg::codec::context::Context::from_parameters(params)
                .and_then(|ctx| ctx.decoder().audio())
            {
                Ok(decoder) => {
                    info.sample_rate = decoder.rate();
                    info.channels = decoder.channels();
                }
                Err(e) => warn!("读取音频参数失败: {}", e),
            }
        } else {
            info.audio_codec = "none".to_string();
        }

        info
    }

    /// 流探测结果
    pub fn selection(&self) -> StreamSelection {
        self.selection
    }

    /// 获取视频流
    pub fn video_stream(&self) -> Option<format::stream::Stream> {
        self.selection
            .video_index()
            .and_then(|idx| self.input_ctx.stream(idx))
    }

    /// 获取音频流
    pub fn audio_stream(&self) -> Option<format::stream::Stream> {
        self.selection
            .audio_index()
            .and_then(|idx| self.input_ctx.stream(idx))
    }

    /// 容器总时长（秒），未知返回 0
    pub fn duration(&self) -> f64 {
        let raw = self.input_ctx.duration();
        if raw > 0 {
            raw as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
        } else {
            0.0
        }
    }

    /// 获取媒体信息
    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    /// 读取下一个已选流的数据包
    ///
    /// 未选中流的包直接跳过；EOF 或读取错误返回 None（两者对调用方等价）
    pub fn read_packet(&mut self) -> Option<(ffmpeg::Packet, PacketKind)> {
        loop {
            match self.input_ctx.packets().next() {
                Some((stream, packet)) => {
                    let index = stream.index();
                    if Some(index) == self.selection.video_index() {
                        return Some((packet, PacketKind::Video));
                    } else if Some(index) == self.selection.audio_index() {
                        return Some((packet, PacketKind::Audio));
                    }
                    // 其他流（字幕/数据）跳过
                }
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_is_source_unusable() {
        let result = Demuxer::open("/nonexistent/__missing_media__.mp4");
        assert!(matches!(result, Err(PlayerError::SourceUnusable(_))));
    }
}
