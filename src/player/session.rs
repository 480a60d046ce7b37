use crate::core::{BoundedQueue, Flag, FrameMessage, StartGate, SystemClock};
use crate::player::audio_stream::AudioRing;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// 主时钟 - 有音频流时以音频环形缓冲为准，否则用系统参考时钟
///
/// 所有视频帧的节拍都对照这一个时间源
#[derive(Clone)]
pub enum MasterClock {
    Audio(Arc<AudioRing>),
    System(SystemClock),
}

impl MasterClock {
    /// 当前主时钟读数（微秒）
    pub fn now_us(&self) -> i64 {
        match self {
            MasterClock::Audio(ring) => ring.time_us(),
            MasterClock::System(clock) => clock.now_us(),
        }
    }
}

/// 一次播放会话内视频管线的共享状态
///
/// 解码线程、渲染线程和解析线程各拿一份 Arc，通过这里的
/// 标志和队列协调冲刷、跳帧与退出。
pub struct VideoSession {
    /// 解码完成帧队列（容量 = 预解码帧数 N）
    pub frames: BoundedQueue<FrameMessage>,
    /// 渲染画布尺寸
    pub width: u32,
    pub height: u32,
    /// 解码器冲刷完成信号，解析线程在 Seek 协议里等它
    pub flush_ack: Flag,
    /// 渲染侧冲刷进行中；渲染线程清空队列到冲刷标记后清除
    pub flush_render: Flag,
    /// 渲染落后时置位，解码器切换到跳过非参考帧模式
    pub skip_mode: AtomicBool,
    pub renderer_quit: AtomicBool,
    pub renderer_running: AtomicBool,
    pub renderer_gate: StartGate,
    pub renderer_thread: Mutex<Option<JoinHandle<()>>>,
    pub decoder_running: AtomicBool,
}

impl VideoSession {
    pub fn new(frame_capacity: usize, width: u32, height: u32) -> Self {
        Self {
            frames: BoundedQueue::new(frame_capacity),
            width,
            height,
            flush_ack: Flag::new(false),
            flush_render: Flag::new(false),
            skip_mode: AtomicBool::new(false),
            renderer_quit: AtomicBool::new(false),
            renderer_running: AtomicBool::new(false),
            renderer_gate: StartGate::new(),
            renderer_thread: Mutex::new(None),
            decoder_running: AtomicBool::new(false),
        }
    }
}

/// 最后渲染的一帧，控制线程曝光重绘时复制使用
pub struct LastFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}
