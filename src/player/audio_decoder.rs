use crate::core::{pts_to_us, BoundedQueue, Result, StreamData, TimeBase};
use crate::player::audio_stream::AudioRing;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, software, util};
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 音频解码阶段
///
/// 从包队列取编码包，解码后重采样到统一格式（交织 f32，目标采样率/声道），
/// 阻塞写入环形缓冲。首个带时间戳的帧把环形缓冲的时钟对齐到自己的 pts。
pub struct AudioStage {
    decoder: codec::decoder::Audio,
    resampler: Option<software::resampling::Context>,
    time_base: TimeBase,
    target_rate: u32,
    target_channels: u16,
    ring: Arc<AudioRing>,
    packets: Arc<BoundedQueue<StreamData>>,
    running: Arc<AtomicBool>,
    time_set: bool,
}

// SwrContext 不是 Send，但每个解码阶段实例只会在自己的解码线程中使用
unsafe impl Send for AudioStage {}

impl AudioStage {
    /// 从音频流创建解码阶段（目标格式取自音频输出的实际配置）
    pub fn new(
        stream: format::stream::Stream,
        target_rate: u32,
        target_channels: u16,
        ring: Arc<AudioRing>,
        packets: Arc<BoundedQueue<StreamData>>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().audio()?;

        let tb = stream.time_base();
        let time_base = TimeBase::new(tb.numerator(), tb.denominator());

        debug!(
            "音频解码器: {} Hz, {} 声道 → 目标: {} Hz, {} 声道",
            decoder.rate(),
            decoder.channels(),
            target_rate,
            target_channels
        );

        Ok(Self {
            decoder,
            resampler: None,
            time_base,
            target_rate,
            target_channels,
            ring,
            packets,
            running,
            time_set: false,
        })
    }

    /// 解码线程主体
    pub fn run(mut self) {
        info!("🔊 音频解码线程启动");
        self.running.store(true, Ordering::SeqCst);

        'outer: loop {
            let msg = match self.packets.get() {
                Ok(msg) => msg,
                Err(_) => break, // 队列关闭
            };

            match msg {
                StreamData::Flush => {
                    debug!("🔄 冲刷音频解码器");
                    self.decoder.flush();
                    // 下一个有效帧重新对齐时钟
                    self.time_set = false;
                }
                StreamData::Packet(packet) => {
                    let mut held = Some(packet);
                    while let Some(packet) = held.take() {
                        match self.decoder.send_packet(&packet) {
                            Ok(()) => {}
                            Err(ffmpeg::Error::Other { errno: 11 }) => {
                                // EAGAIN: 先排空帧再重试同一个包
                                held = Some(packet);
                            }
                            Err(ffmpeg::Error::Eof) => {
                                debug!("音频解码器收到 EOF，忽略本包");
                            }
                            Err(e) => {
                                error!("❌ 音频解码失败: {}", e);
                                break 'outer;
                            }
                        }
                        if !self.drain_frames() {
                            break 'outer;
                        }
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("✅ 音频解码线程结束");
    }

    /// 排空解码器中已就绪的帧并写入环形缓冲。返回 false 表示应当退出。
    fn drain_frames(&mut self) -> bool {
        loop {
            let mut decoded = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    if !self.deliver(&decoded) {
                        return false;
                    }
                }
                Err(ffmpeg::Error::Other { errno: 11 }) => return true, // EAGAIN
                Err(ffmpeg::Error::Eof) => return true,
                Err(e) => {
                    error!("音频解码错误: {}", e);
                    return true;
                }
            }
        }
    }

    /// 重采样并写入环形缓冲。返回 false 表示环形缓冲已关闭。
    fn deliver(&mut self, decoded: &util::frame::Audio) -> bool {
        if self.resampler.is_none() {
            let target_layout = match self.target_channels {
                1 => util::channel_layout::ChannelLayout::MONO,
                2 => util::channel_layout::ChannelLayout::STEREO,
                6 => util::channel_layout::ChannelLayout::_5POINT1,
                _ => util::channel_layout::ChannelLayout::STEREO,
            };

            debug!(
                "🔧 初始化音频重采样器: {}Hz/{}ch → {}Hz/{}ch",
                decoded.rate(),
                decoded.channels(),
                self.target_rate,
                self.target_channels
            );

            match software::resampling::Context::get(
                decoded.format(),
                decoded.channel_layout(),
                decoded.rate(),
                util::format::Sample::F32(util::format::sample::Type::Packed),
                target_layout,
                self.target_rate,
            ) {
                Ok(ctx) => self.resampler = Some(ctx),
                Err(e) => {
                    error!("创建重采样器失败: {}", e);
                    return false;
                }
            }
        }

        let mut resampled = util::frame::Audio::empty();
        if let Err(e) = self.resampler.as_mut().unwrap().run(decoded, &mut resampled) {
            error!("重采样失败: {}", e);
            return true; // 跳过本帧
        }

        // 首个带时间戳的帧把时钟对齐到自己的 pts
        // （流不一定从 0 开始）
        if !self.time_set {
            if let Some(ts) = decoded.timestamp() {
                let us = pts_to_us(ts, self.time_base);
                self.ring.set_clock_us(us);
                debug!("首个音频帧 pts: {} us", us);
                self.time_set = true;
            }
        }

        let sample_count = resampled.samples() * self.target_channels as usize;
        if sample_count == 0 {
            return true;
        }
        let data = resampled.data(0);
        let samples = unsafe {
            std::slice::from_raw_parts(data.as_ptr() as *const f32, sample_count)
        };

        self.ring.write(samples).is_ok()
    }
}
