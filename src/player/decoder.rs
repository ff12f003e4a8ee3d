use crate::core::{FrameRef, PixelFormat, PlayerError, Result, SampleBatch};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, software, util};
use log::{debug, warn};

/// 视频解码器 - 解码并转换为固定 RGBA 布局
///
/// scaler 在打开流时配置一次（源格式/尺寸 → RGBA 同尺寸），
/// RGBA 帧与紧凑像素缓冲区跨帧复用，回调只借用不持有
pub struct VideoDecoder {
    decoder: codec::decoder::Video,
    scaler: software::scaling::Context,
    rgba_frame: util::frame::Video,
    scratch: Vec<u8>,
    width: u32,
    height: u32,
    time_base: f64,
}

impl VideoDecoder {
    /// 从视频流创建解码器
    pub fn from_stream(stream: format::stream::Stream) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| PlayerError::DecoderUnavailable(format!("打开视频解码器失败: {}", e)))?;

        let time_base = stream.time_base();
        let time_base = time_base.numerator() as f64 / time_base.denominator() as f64;

        let width = decoder.width();
        let height = decoder.height();

        debug!(
            "视频解码器: {}x{}, 格式: {:?}",
            width,
            height,
            decoder.format()
        );

        // 像素格式未知或尺寸非法时 scaler 创建失败，本次会话跳过视频
        let scaler = software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            util::format::Pixel::RGBA,
            width,
            height,
            software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| PlayerError::DecoderUnavailable(format!("创建视频转换器失败: {}", e)))?;

        let rgba_frame = util::frame::Video::new(util::format::Pixel::RGBA, width, height);
        let scratch = vec![0u8; (width * height * 4) as usize];

        Ok(Self {
            decoder,
            scaler,
            rgba_frame,
            scratch,
            width,
            height,
            time_base,
        })
    }

    /// 解码数据包并逐帧回调
    ///
    /// 提交失败返回 Err，由调用方丢弃该包继续；单帧转换失败只跳过该帧
    pub fn decode(
        &mut self,
        packet: &ffmpeg::Packet,
        on_frame: &mut dyn FnMut(FrameRef<'_>),
    ) -> Result<()> {
        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                debug!("视频解码器收到 EOF（send_packet），忽略本次包");
                return Ok(());
            }
            Err(e) => return Err(PlayerError::TransientDecode(format!("视频包提交失败: {}", e))),
        }

        loop {
            let mut decoded_frame = util::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded_frame) {
                Ok(_) => {
                    if let Err(e) = self.dispatch_frame(&decoded_frame, on_frame) {
                        warn!("视频帧转换失败（已跳过）: {}", e);
                    }
                }
                Err(ffmpeg::Error::Other { errno: 11 }) => break, // EAGAIN
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    // 对于网络流，某些解码错误是可以容忍的
                    warn!("视频解码错误（已跳过）: {}", e);
                    break;
                }
            }
        }

        Ok(())
    }

    /// 转换单帧为紧凑 RGBA 并回调
    fn dispatch_frame(
        &mut self,
        decoded: &util::frame::Video,
        on_frame: &mut dyn FnMut(FrameRef<'_>),
    ) -> Result<()> {
        self.scaler.run(decoded, &mut self.rgba_frame)?;

        // 去除行对齐填充，拷贝到复用的紧凑缓冲区
        let stride = self.rgba_frame.stride(0);
        let row_size = self.width as usize * 4;
        let frame_data = self.rgba_frame.data(0);
        for y in 0..self.height as usize {
            let src_offset = y * stride;
            let dst_offset = y * row_size;
            self.scratch[dst_offset..dst_offset + row_size]
                .copy_from_slice(&frame_data[src_offset..src_offset + row_size]);
        }

        let pts = decoded
            .timestamp()
            .map(|ts| ts as f64 * self.time_base)
            .unwrap_or(0.0);

        on_frame(FrameRef {
            pixels: &self.scratch,
            width: self.width,
            height: self.height,
            format: PixelFormat::RGBA,
            pts,
        });

        Ok(())
    }
}

/// 音频解码器 - 解码并归一化为 S16 交织 PCM
///
/// 重采样器只做格式/声道布局归一化，采样率保持源值不变
pub struct AudioDecoder {
    decoder: codec::decoder::Audio,
    resampler: software::resampling::Context,
    time_base: f64,
    channels: u16,
    sample_rate: u32,
}

impl AudioDecoder {
    /// 从音频流创建解码器
    pub fn from_stream(stream: format::stream::Stream) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context
            .decoder()
            .audio()
            .map_err(|e| PlayerError::DecoderUnavailable(format!("打开音频解码器失败: {}", e)))?;

        let time_base = stream.time_base();
        let time_base = time_base.numerator() as f64 / time_base.denominator() as f64;

        let sample_rate = decoder.rate();
        // 解码器未上报声道数时默认立体声
        let channels = if decoder.channels() == 0 {
            2
        } else {
            decoder.channels()
        };
        let layout = if decoder.channel_layout().is_empty() {
            util::channel_layout::ChannelLayout::default(i32::from(channels))
        } else {
            decoder.channel_layout()
        };

        debug!(
            "音频解码器: {} Hz, {} 声道, 格式: {:?}",
            sample_rate,
            channels,
            decoder.format()
        );

        let resampler = software::resampling::Context::get(
            decoder.format(),
            layout,
            sample_rate,
            util::format::Sample::I16(util::format::sample::Type::Packed),
            layout,
            sample_rate,
        )
        .map_err(|e| PlayerError::DecoderUnavailable(format!("创建音频重采样器失败: {}", e)))?;

        Ok(Self {
            decoder,
            resampler,
            time_base,
            channels,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// 解码数据包并逐批回调重采样后的样本
    ///
    /// 提交失败返回 Err，由调用方丢弃该包继续；空批次直接丢弃
    pub fn decode(
        &mut self,
        packet: &ffmpeg::Packet,
        on_batch: &mut dyn FnMut(SampleBatch, f64),
    ) -> Result<()> {
        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                debug!("音频解码器收到 EOF（send_packet），忽略本次包");
                return Ok(());
            }
            Err(e) => return Err(PlayerError::TransientDecode(format!("音频包提交失败: {}", e))),
        }

        loop {
            let mut decoded_frame = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut decoded_frame) {
                Ok(_) => match self.convert_frame(&decoded_frame) {
                    Ok(Some((batch, pts))) => on_batch(batch, pts),
                    Ok(None) => {}
                    Err(e) => warn!("音频帧转换失败（已跳过）: {}", e),
                },
                Err(ffmpeg::Error::Other { errno: 11 }) => break, // EAGAIN
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    warn!("音频解码错误（已跳过）: {}", e);
                    break;
                }
            }
        }

        Ok(())
    }

    /// 重采样单帧为 S16 交织样本批
    fn convert_frame(&mut self, frame: &util::frame::Audio) -> Result<Option<(SampleBatch, f64)>> {
        let mut resampled = util::frame::Audio::empty();
        self.resampler.run(frame, &mut resampled)?;

        let samples = resampled.samples();
        if samples == 0 {
            return Ok(None);
        }

        let count = samples * self.channels as usize;
        let mut data = vec![0i16; count];
        let frame_data = resampled.data(0);
        // packed S16：data(0) 即交织样本，可能带行尾填充
        let sample_slice =
            unsafe { std::slice::from_raw_parts(frame_data.as_ptr() as *const i16, count) };
        data.copy_from_slice(sample_slice);

        let pts = frame
            .timestamp()
            .map(|ts| ts as f64 * self.time_base)
            .unwrap_or(0.0);

        Ok(Some((
            SampleBatch {
                data,
                channels: self.channels,
                samples,
            },
            pts,
        )))
    }
}
