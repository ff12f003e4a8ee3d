use crate::core::{FrameSink, PlaybackState, Result};
use crate::player::audio_output::AudioOutput;
use crate::player::decoder::{AudioDecoder, VideoDecoder};
use crate::player::demuxer::{Demuxer, PacketKind};
use crate::player::manager::SharedState;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 暂停时的轮询间隔
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 每派发一帧视频后的固定延时 - 近似帧率节奏
///
/// 不是真实时钟，也不做音视频钟对齐，变帧率源会有偏差
const FRAME_PACING_INTERVAL: Duration = Duration::from_millis(30);

pub(crate) type SharedFrameSink = Arc<Mutex<Option<Box<dyn FrameSink>>>>;

/// 播放会话入口 - 每次 play() 从停止态启动一个工作线程运行本函数
///
/// 无论会话如何退出（显式停止、流结束、打开失败），都走同一收尾路径：
/// 清空并暂停音频、清理 running 标志、状态置为 Stopped
pub(crate) fn run_playback(url: String, shared: Arc<SharedState>, sink: SharedFrameSink) {
    info!("{} 🎬 播放线程启动: {}", log_ctx(), url);

    if let Err(e) = playback_session(&url, &shared, &sink) {
        error!("{} ❌ 播放会话终止: {}", log_ctx(), e);
    }

    if let Some(ctrl) = shared.take_audio_control() {
        ctrl.clear();
        ctrl.pause();
    }
    shared.set_running(false);
    shared.set_state(PlaybackState::Stopped);

    info!("{} ⏹️  播放线程退出", log_ctx());
}

/// 打开媒体源并驱动读包→解码循环
///
/// 解码/转换/重采样资源都是作用域所有权，任何提前返回都会完整释放
fn playback_session(url: &str, shared: &Arc<SharedState>, sink: &SharedFrameSink) -> Result<()> {
    let mut demuxer = Demuxer::open(url)?;
    info!("{} 流探测结果: {:?}", log_ctx(), demuxer.selection());
    info!("{} 媒体信息: {:?}", log_ctx(), demuxer.media_info());

    shared.set_duration(demuxer.duration());

    // 视频解码器：尽力而为，失败则本次会话跳过视频（音频继续）
    let mut video_decoder = demuxer
        .video_stream()
        .and_then(|stream| match VideoDecoder::from_stream(stream) {
            Ok(decoder) => Some(decoder),
            Err(e) => {
                warn!("{} 创建视频解码器失败: {}，本次会话跳过视频", log_ctx(), e);
                None
            }
        });

    // 音频解码器：同样尽力而为
    let mut audio_decoder = demuxer
        .audio_stream()
        .and_then(|stream| match AudioDecoder::from_stream(stream) {
            Ok(decoder) => Some(decoder),
            Err(e) => {
                warn!("{} 创建音频解码器失败: {}，本次会话跳过音频", log_ctx(), e);
                None
            }
        });

    // 音频输出：设备打开失败只禁用音频，不中止会话
    let mut audio_output = None;
    if let Some(ref decoder) = audio_decoder {
        match AudioOutput::open(decoder.sample_rate(), decoder.channels()) {
            Ok(mut output) => match output.start() {
                Ok(()) => {
                    let ctrl = output.control();
                    ctrl.set_volume(shared.volume());
                    // 设备初始暂停状态跟随当前播放状态
                    if shared.state() == PlaybackState::Paused {
                        ctrl.pause();
                    } else {
                        ctrl.resume();
                    }
                    shared.register_audio_control(ctrl);
                    audio_output = Some(output);
                }
                Err(e) => warn!("{} 启动音频流失败: {}，以无声模式继续", log_ctx(), e),
            },
            Err(e) => warn!("{} 打开音频设备失败: {}，以无声模式继续", log_ctx(), e),
        }
    }

    // 无输出设备时仍继续解码音频：纯音频源要靠音频时间戳推进位置
    let audio_ctrl = audio_output.as_ref().map(|output| output.control());
    let has_video = video_decoder.is_some();

    loop {
        if shared.quit_requested() {
            info!("{} 收到退出请求", log_ctx());
            break;
        }

        // 暂停：不读包、不推进位置，定期重查状态
        if shared.state() == PlaybackState::Paused {
            thread::sleep(PAUSE_POLL_INTERVAL);
            continue;
        }

        let (packet, kind) = match demuxer.read_packet() {
            Some(entry) => entry,
            None => {
                // 流结束与读取错误同样处理：结束本次会话
                info!("{} 📄 流结束，结束播放", log_ctx());
                break;
            }
        };

        match kind {
            PacketKind::Video => {
                if let Some(ref mut decoder) = video_decoder {
                    let result = decoder.decode(&packet, &mut |frame| {
                        let pts = frame.pts;
                        if let Some(consumer) = sink.lock().as_mut() {
                            consumer.on_frame(frame);
                        }
                        shared.store_position(pts);
                        thread::sleep(FRAME_PACING_INTERVAL);
                    });
                    if let Err(e) = result {
                        debug!("{} 视频包已丢弃: {}", log_ctx(), e);
                    }
                }
            }
            PacketKind::Audio => {
                if let Some(ref mut decoder) = audio_decoder {
                    let result = decoder.decode(&packet, &mut |batch, pts| {
                        if let Some(ref ctrl) = audio_ctrl {
                            ctrl.enqueue(batch);
                        }
                        // 纯音频源用音频时间戳推进位置
                        if !has_video {
                            shared.store_position(pts);
                        }
                    });
                    if let Err(e) = result {
                        debug!("{} 音频包已丢弃: {}", log_ctx(), e);
                    }
                }
            }
        }
    }

    Ok(())
}
