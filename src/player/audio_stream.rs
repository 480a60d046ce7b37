use crate::core::{PlayerError, QueueError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use log::{debug, info, warn};
use std::sync::{Arc, Condvar, Mutex};

/// 音频环形缓冲 + 播放时钟
///
/// 解码线程阻塞写入，cpal 回调非阻塞读取。回调实际消费了多少采样，
/// 时钟就推进多少：缓冲耗尽（欠载）或暂停时时钟自然停住，
/// 视频以它为主时钟就不会跑到声音前面去。
///
/// 时钟读数单调不减，只有 set_clock_us（Seek/首帧对齐）会重置。
pub struct AudioRing {
    inner: Mutex<RingInner>,
    not_full: Condvar,
    sample_rate: u32,
    channels: u16,
}

struct RingInner {
    buf: Vec<f32>,
    read: usize,
    len: usize,
    /// 时钟基准（微秒），set_clock_us 时设置
    clock_base_us: i64,
    /// 基准之后消费掉的采样数（含声道）
    consumed: u64,
    paused: bool,
    closed: bool,
}

impl AudioRing {
    pub fn new(capacity_samples: usize, sample_rate: u32, channels: u16) -> Self {
        Self {
            inner: Mutex::new(RingInner {
                buf: vec![0.0; capacity_samples.max(1)],
                read: 0,
                len: 0,
                clock_base_us: 0,
                consumed: 0,
                paused: false,
                closed: false,
            }),
            not_full: Condvar::new(),
            sample_rate,
            channels,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// 写入交织采样，缓冲满时阻塞；关闭后返回 Closed
    pub fn write(&self, samples: &[f32]) -> std::result::Result<(), QueueError> {
        let mut offset = 0;
        while offset < samples.len() {
            let mut inner = self.inner.lock().unwrap();
            while inner.len >= inner.buf.len() && !inner.closed {
                inner = self.not_full.wait(inner).unwrap();
            }
            if inner.closed {
                return Err(QueueError::Closed);
            }
            let cap = inner.buf.len();
            while offset < samples.len() && inner.len < cap {
                let write_pos = (inner.read + inner.len) % cap;
                inner.buf[write_pos] = samples[offset];
                inner.len += 1;
                offset += 1;
            }
        }
        Ok(())
    }

    /// 非阻塞读取（实时回调侧）：能读多少读多少，不足的补零
    /// 返回实际消费的采样数；暂停时不消费，输出静音
    pub fn read_into(&self, out: &mut [f32]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        if inner.paused {
            out.fill(0.0);
            return 0;
        }
        let take = out.len().min(inner.len);
        let cap = inner.buf.len();
        for slot in out.iter_mut().take(take) {
            *slot = inner.buf[inner.read];
            inner.read = (inner.read + 1) % cap;
        }
        inner.len -= take;
        inner.consumed += take as u64;
        out[take..].fill(0.0);
        drop(inner);
        if take > 0 {
            self.not_full.notify_all();
        }
        take
    }

    /// 当前播放时钟（微秒）= 基准 + 已消费采样折算的时长
    pub fn time_us(&self) -> i64 {
        let inner = self.inner.lock().unwrap();
        let frames = inner.consumed / self.channels.max(1) as u64;
        inner.clock_base_us + (frames * 1_000_000 / self.sample_rate.max(1) as u64) as i64
    }

    /// 重置时钟基准（Seek 或首个带时间戳的帧）
    pub fn set_clock_us(&self, us: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.clock_base_us = us;
        inner.consumed = 0;
    }

    pub fn pause(&self) {
        self.inner.lock().unwrap().paused = true;
    }

    pub fn resume(&self) {
        self.inner.lock().unwrap().paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().unwrap().paused
    }

    /// 丢弃全部缓冲采样（Seek 时），唤醒被阻塞的写入方
    pub fn drop_buffered(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.len = 0;
        drop(inner);
        self.not_full.notify_all();
    }

    /// 缓冲中的采样数
    pub fn buffered(&self) -> usize {
        self.inner.lock().unwrap().len
    }

    /// 关闭：写入方永久解除阻塞（会话收尾用）
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        drop(inner);
        self.not_full.notify_all();
    }
}

/// 音频输出 - 用 cpal 把环形缓冲送到设备
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

// cpal::Stream 本身不是 Send，但输出对象只在创建它的会话流程中使用，
// 不会真正跨线程并发访问，这里按单线程使用约定标记
unsafe impl Send for AudioOutput {}

impl AudioOutput {
    /// 创建音频输出（请求配置不受支持时自动回退到标准配置）
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        info!("初始化音频输出: {} Hz, {} 声道", sample_rate, channels);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        let mut config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let supported_configs = device
            .supported_output_configs()
            .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?;

        let mut is_supported = false;
        for supported in supported_configs {
            if Self::is_config_compatible(&config, &supported) {
                is_supported = true;
                break;
            }
        }

        if !is_supported {
            warn!("⚠️  音频设备不支持 {} Hz, {} 声道，回退到标准配置", sample_rate, channels);

            let fallback_configs = [(48000, 2), (44100, 2), (48000, 1), (44100, 1)];
            let mut found = false;
            for (fb_rate, fb_channels) in fallback_configs {
                let fb_config = StreamConfig {
                    channels: fb_channels,
                    sample_rate: cpal::SampleRate(fb_rate),
                    buffer_size: cpal::BufferSize::Default,
                };
                let supported_configs = device
                    .supported_output_configs()
                    .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?;
                for supported in supported_configs {
                    if Self::is_config_compatible(&fb_config, &supported) {
                        info!("✅ 使用回退配置: {} Hz, {} 声道", fb_rate, fb_channels);
                        config = fb_config;
                        found = true;
                        break;
                    }
                }
                if found {
                    break;
                }
            }

            if !found {
                return Err(PlayerError::AudioError(format!(
                    "音频设备不支持任何标准配置 (原请求: {} Hz, {} 声道)",
                    sample_rate, channels
                )));
            }
        }

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;
        let channels_match = config.channels == supported.channels();
        rate_in_range && channels_match
    }

    /// 启动输出流，回调从环形缓冲拉采样
    pub fn start(&mut self, ring: Arc<AudioRing>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    ring.read_into(data);
                },
                move |err| {
                    log::error!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("🔊 音频输出已启动");

        Ok(())
    }

    /// 停止输出流
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("音频输出已停止");
        }
    }

    /// 实际使用的设备配置（解码目标格式以此为准）
    pub fn get_config(&self) -> (u32, u16) {
        (self.config.sample_rate.0, self.config.channels)
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
    use std::thread;
    use std::time::Duration;

    fn ring() -> AudioRing {
        // 2 声道 1kHz，方便心算：1000 帧 = 1 秒
        AudioRing::new(64, 1000, 2)
    }

    #[test]
    fn test_write_then_read() {
        let r = ring();
        r.write(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut out = [0.0f32; 4];
        assert_eq!(r.read_into(&mut out), 4);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_underrun_fills_silence_and_stalls_clock() {
        let r = ring();
        r.set_clock_us(0);
        r.write(&[1.0, 1.0]).unwrap();
        let mut out = [9.0f32; 6];
        // 只有 2 个采样可读，其余补零
        assert_eq!(r.read_into(&mut out), 2);
        assert_eq!(out, [1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        let t = r.time_us();
        // 消费 1 帧（2 采样）@1kHz = 1ms
        assert_eq!(t, 1_000);
        // 欠载后继续读：不消费，时钟不动
        assert_eq!(r.read_into(&mut out), 0);
        assert_eq!(r.time_us(), t);
    }

    #[test]
    fn test_pause_outputs_silence_and_freezes_clock() {
        let r = ring();
        r.write(&[1.0; 8]).unwrap();
        r.pause();
        let mut out = [9.0f32; 4];
        assert_eq!(r.read_into(&mut out), 0);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(r.time_us(), 0);
        assert_eq!(r.buffered(), 8);

        r.resume();
        assert_eq!(r.read_into(&mut out), 4);
        assert_eq!(r.time_us(), 2_000); // 2 帧 @1kHz
    }

    #[test]
    fn test_set_clock_resets_base() {
        let r = ring();
        r.write(&[0.5; 4]).unwrap();
        let mut out = [0.0f32; 4];
        r.read_into(&mut out);
        assert_eq!(r.time_us(), 2_000);
        r.set_clock_us(60_000_000);
        assert_eq!(r.time_us(), 60_000_000);
        // 重置后从新基准继续推进
        r.write(&[0.5; 2]).unwrap();
        let mut out2 = [0.0f32; 2];
        r.read_into(&mut out2);
        assert_eq!(r.time_us(), 60_001_000);
    }

    #[test]
    fn test_full_ring_blocks_writer_until_drop() {
        let r = Arc::new(AudioRing::new(4, 1000, 2));
        r.write(&[1.0; 4]).unwrap();

        let r2 = r.clone();
        let writer = thread::spawn(move || r2.write(&[2.0; 4]));
        thread::sleep(Duration::from_millis(30));
        assert!(!writer.is_finished());

        r.drop_buffered();
        writer.join().unwrap().unwrap();
        assert_eq!(r.buffered(), 4);
        let mut out = [0.0f32; 4];
        r.read_into(&mut out);
        assert_eq!(out, [2.0; 4]);
    }

    #[test]
    fn test_close_releases_writer() {
        let r = Arc::new(AudioRing::new(2, 1000, 2));
        r.write(&[1.0; 2]).unwrap();
        let r2 = r.clone();
        let writer = thread::spawn(move || r2.write(&[3.0; 2]));
        thread::sleep(Duration::from_millis(30));
        r.close();
        assert_eq!(writer.join().unwrap(), Err(QueueError::Closed));
    }

    #[test]
    fn test_wraparound() {
        let r = AudioRing::new(4, 1000, 2);
        let mut out = [0.0f32; 2];
        for pass in 0..10 {
            r.write(&[pass as f32, pass as f32]).unwrap();
            assert_eq!(r.read_into(&mut out), 2);
            assert_eq!(out, [pass as f32, pass as f32]);
        }
        // 10 帧 @1kHz = 10ms
        assert_eq!(r.time_us(), 10_000);
    }
}
