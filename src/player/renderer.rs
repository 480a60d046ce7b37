use crate::core::{BoundedQueue, FrameMessage, FrameSlot, PlayerConfig, StreamData};
use crate::player::audio_stream::AudioRing;
use crate::player::session::{LastFrame, MasterClock, VideoSession};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex as PlMutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// 渲染表面 - 窗口/合成层的边界抽象
///
/// 所有调用都必须发生在表面的属主线程上，渲染线程只能通过
/// SurfaceDelegate 提交任务并等待完成。
pub trait RenderSurface: Send {
    fn canvas_size(&self) -> (u32, u32);
    fn blit(&mut self, buf: &[u8], width: u32, height: u32, x: i32, y: i32);
    fn present(&mut self);
}

/// 提交到表面属主线程的任务
pub enum SurfaceTask {
    QuerySize(Sender<(u32, u32)>),
    /// 呈现缓冲池槽位（读锁内 blit）
    Present {
        buffer: FrameSlot,
        width: u32,
        height: u32,
        done: Sender<()>,
    },
    /// 呈现一份独立的像素数据（曝光重绘路径）
    PresentBytes {
        data: Vec<u8>,
        width: u32,
        height: u32,
        done: Sender<()>,
    },
    /// 清屏（会话结束时呈现一帧空白）
    Clear {
        width: u32,
        height: u32,
        done: Sender<()>,
    },
}

/// 表面委托 - "提交任务并等待完成"原语的提交端
#[derive(Clone)]
pub struct SurfaceDelegate {
    tx: Sender<SurfaceTask>,
}

impl SurfaceDelegate {
    /// 查询画布尺寸；属主线程已退出时返回 None
    pub fn canvas_size(&self) -> Option<(u32, u32)> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx.send(SurfaceTask::QuerySize(reply_tx)).ok()?;
        reply_rx.recv().ok()
    }

    /// 呈现一个缓冲池槽位并等待完成；返回 false 表示属主线程已退出
    pub fn present_slot(&self, buffer: FrameSlot, width: u32, height: u32) -> bool {
        let (done_tx, done_rx) = bounded(1);
        if self
            .tx
            .send(SurfaceTask::Present { buffer, width, height, done: done_tx })
            .is_err()
        {
            return false;
        }
        done_rx.recv().is_ok()
    }

    /// 呈现独立像素数据并等待完成
    pub fn present_bytes(&self, data: Vec<u8>, width: u32, height: u32) -> bool {
        let (done_tx, done_rx) = bounded(1);
        if self
            .tx
            .send(SurfaceTask::PresentBytes { data, width, height, done: done_tx })
            .is_err()
        {
            return false;
        }
        done_rx.recv().is_ok()
    }

    /// 清屏并等待完成
    pub fn clear(&self, width: u32, height: u32) -> bool {
        let (done_tx, done_rx) = bounded(1);
        if self
            .tx
            .send(SurfaceTask::Clear { width, height, done: done_tx })
            .is_err()
        {
            return false;
        }
        done_rx.recv().is_ok()
    }
}

/// 表面属主侧：在属主线程上循环执行提交的任务
pub struct SurfaceHost {
    rx: Receiver<SurfaceTask>,
    surface: Box<dyn RenderSurface>,
}

impl SurfaceHost {
    pub fn new(surface: Box<dyn RenderSurface>) -> (SurfaceDelegate, SurfaceHost) {
        let (tx, rx) = unbounded();
        (SurfaceDelegate { tx }, SurfaceHost { rx, surface })
    }

    /// 任务循环：所有提交端都释放后退出
    pub fn run(mut self) {
        while let Ok(task) = self.rx.recv() {
            match task {
                SurfaceTask::QuerySize(reply) => {
                    let _ = reply.send(self.surface.canvas_size());
                }
                SurfaceTask::Present { buffer, width, height, done } => {
                    {
                        let buf = buffer.read();
                        self.surface.blit(&buf, width, height, 0, 0);
                    }
                    self.surface.present();
                    let _ = done.send(());
                }
                SurfaceTask::PresentBytes { data, width, height, done } => {
                    self.surface.blit(&data, width, height, 0, 0);
                    self.surface.present();
                    let _ = done.send(());
                }
                SurfaceTask::Clear { width, height, done } => {
                    let blank = vec![0u8; (width * height * 4) as usize];
                    self.surface.blit(&blank, width, height, 0, 0);
                    self.surface.present();
                    let _ = done.send(());
                }
            }
        }
    }
}

/// 无窗口环境下的渲染表面：只统计帧数
pub struct HeadlessSurface {
    width: u32,
    height: u32,
    frames_presented: u64,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, frames_presented: 0 }
    }
}

impl RenderSurface for HeadlessSurface {
    fn canvas_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn blit(&mut self, _buf: &[u8], _width: u32, _height: u32, _x: i32, _y: i32) {}

    fn present(&mut self) {
        self.frames_presented += 1;
        if self.frames_presented % 250 == 0 {
            debug!("已呈现 {} 帧", self.frames_presented);
        }
    }
}

/// 单帧节拍决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pacing {
    /// 立即渲染
    RenderNow,
    /// 落后太多，丢弃滞后帧追赶
    CatchUp,
    /// 还没到点，睡这么多微秒后重新评估
    Sleep(i64),
}

/// 根据主时钟与帧时间计算节拍
///
/// 延迟向下量化（清掉低位微秒）：太短的睡眠光上下文切换就亏了；
/// 睡眠上限封顶，保证暂停/停止/Seek 能在一个上限周期内被观察到。
pub(crate) fn plan_frame(elapsed_us: i64, frame_time_us: i64, config: &PlayerConfig) -> Pacing {
    if elapsed_us > frame_time_us {
        if elapsed_us - frame_time_us > config.catchup_lag_us {
            Pacing::CatchUp
        } else {
            Pacing::RenderNow
        }
    } else {
        let mut delay = frame_time_us - elapsed_us;
        delay &= !config.delay_quantum_mask;
        if delay > config.max_frame_delay_us {
            delay = config.max_frame_delay_us;
        }
        if delay > 0 {
            Pacing::Sleep(delay)
        } else {
            Pacing::RenderNow
        }
    }
}

/// 渲染线程需要的音频侧句柄（死锁恢复启发式用）
pub struct RendererAudio {
    pub ring: Arc<AudioRing>,
    pub packets: Arc<BoundedQueue<StreamData>>,
}

/// 渲染 / 音画同步循环
pub struct Renderer {
    pub session: Arc<VideoSession>,
    pub master: MasterClock,
    pub audio: Option<RendererAudio>,
    pub surface: SurfaceDelegate,
    pub last_frame: Arc<PlMutex<Option<LastFrame>>>,
    pub config: PlayerConfig,
    pub width: u32,
    pub height: u32,
}

impl Renderer {
    /// 渲染线程主体
    pub fn run(self) {
        info!("🖼️  渲染线程启动");
        self.session.renderer_running.store(true, Ordering::SeqCst);

        let mut last_frame_time = 0i64;

        // 无音频时以首个排队帧对齐系统时钟参考
        if self.audio.is_none() {
            if let Some(FrameMessage::Frame(frame)) = self.session.frames.try_peek() {
                if let MasterClock::System(clock) = &self.master {
                    clock.set_us(frame.time_us());
                }
            }
        }

        self.session.renderer_gate.signal(true);

        loop {
            if self.session.renderer_quit.load(Ordering::SeqCst) {
                break;
            }

            // Seek 冲刷：清空帧队列到冲刷标记为止
            if self.session.flush_render.is_set() {
                self.drain_for_flush();
                continue;
            }

            // 队列耗尽：重新缓冲（音频暂停让时钟停住，避免越拉越远）
            if self.session.frames.is_empty() {
                if self.session.frames.is_closed() {
                    break;
                }
                match &self.audio {
                    Some(audio) => {
                        // 限时等待：音频链路可能因背压停摆，到点就恢复
                        // 流水线流动，下一轮再试
                        audio.ring.pause();
                        self.session.frames.wait_fill_timeout(
                            self.config.video_buffer_frames,
                            Duration::from_millis(self.config.rebuffer_wait_ms),
                            |_| {},
                        );
                        audio.ring.resume();
                    }
                    None => {
                        if !self.wait_refill() {
                            break;
                        }
                        if let MasterClock::System(clock) = &self.master {
                            clock.set_us(last_frame_time);
                        }
                    }
                }
                continue;
            }

            // 只看不取：决定渲染之前这帧仍然留在队列里
            let frame = match self.session.frames.peek() {
                Ok(FrameMessage::Frame(frame)) => frame,
                Ok(FrameMessage::Flush) => {
                    // 孤立的冲刷标记（清空模式已结束），消费掉
                    let _ = self.session.frames.try_get();
                    continue;
                }
                Err(_) => break, // 队列关闭
            };

            let frame_time = frame.time_us();
            let elapsed = self.master.now_us();

            match plan_frame(elapsed, frame_time, &self.config) {
                Pacing::CatchUp => {
                    // 丢掉已落后的帧并让解码器跳非参考帧，然后重新评估
                    if self.dump_until(elapsed) {
                        continue;
                    }
                    // 一帧都没丢掉：直接跳过当前这帧
                    let _ = self.session.frames.try_get();
                    continue;
                }
                Pacing::Sleep(delay) => {
                    // 音频停摆死锁恢复：音频包和缓冲都已干涸、时钟不再推进，
                    // 而视频还在等未来的帧时间，就强制清掉积压让画面跟上
                    // （经验性保护，不是协议保证）
                    if let Some(audio) = &self.audio {
                        if self.config.deadlock_recovery
                            && delay >= self.config.max_frame_delay_us
                            && audio.packets.is_empty()
                            && audio.ring.buffered() == 0
                        {
                            self.dump_until(elapsed);
                            warn!("⚠️  检测到音频停摆死锁，已强制恢复");
                            continue;
                        }
                    }

                    thread::sleep(Duration::from_micros(delay as u64));
                    // 睡醒后重查状态：时钟可能已被暂停或重置
                    continue;
                }
                Pacing::RenderNow => {}
            }

            last_frame_time = frame_time;

            // 留一份给控制线程的曝光重绘路径（单锁，只做复制）
            {
                let buf = frame.buffer.read();
                let mut last = self.last_frame.lock();
                *last = Some(LastFrame {
                    data: buf.clone(),
                    width: self.width,
                    height: self.height,
                });
            }

            // 提交到表面属主线程并等待完成
            if !self.surface.present_slot(frame.buffer.clone(), self.width, self.height) {
                warn!("渲染表面已不可用，渲染线程退出");
                break;
            }

            // 呈现完成后才出队，下一帧出队前槽位不会被解码器复用
            if self.session.frames.get().is_err() {
                break;
            }
        }

        // 收尾：清掉剩余帧，呈现一帧空白清屏
        let _ = self.session.frames.drain();
        let _ = self.surface.clear(self.width, self.height);
        *self.last_frame.lock() = None;

        // 若冲刷还挂着，解除解码线程的等待
        self.session.flush_render.clear();

        self.session.renderer_running.store(false, Ordering::SeqCst);
        info!("✅ 渲染线程结束");
    }

    /// 等帧队列重新填到目标深度；冲刷或关闭会提前返回
    /// 返回 false 表示队列已关闭
    fn wait_refill(&self) -> bool {
        if self.session.frames.peek().is_err() {
            return false;
        }
        self.session.frames.wait_fill_cancel(
            self.config.video_buffer_frames,
            |_| {},
            || self.session.flush_render.is_set() || self.session.renderer_quit.load(Ordering::SeqCst),
        );
        !self.session.frames.is_closed()
    }

    /// 丢弃显示时间已落后于 until 的帧，期间让解码器跳非参考帧。
    /// 返回是否丢掉了至少一帧。
    fn dump_until(&self, until_us: i64) -> bool {
        debug!("⏭️  跳帧追赶到 {} us", until_us);
        self.session.skip_mode.store(true, Ordering::SeqCst);

        let mut dropped = 0usize;
        loop {
            let msg = match self.session.frames.try_peek() {
                Some(msg) => msg,
                None => break,
            };
            match msg {
                FrameMessage::Flush => break, // 冲刷标记留给主循环处理
                FrameMessage::Frame(frame) => {
                    if frame.time_us() >= until_us - self.config.catchup_slack_us {
                        break;
                    }
                    let _ = self.session.frames.try_get();
                    dropped += 1;
                }
            }
        }

        self.session.skip_mode.store(false, Ordering::SeqCst);
        if dropped > 0 {
            debug!("🗑️  丢弃了 {} 个滞后帧", dropped);
        }
        dropped > 0
    }

    /// 清空帧队列直到冲刷标记，然后清除冲刷标志
    fn drain_for_flush(&self) {
        debug!("🧹 渲染侧冲刷帧队列");
        loop {
            match self.session.frames.get() {
                Ok(FrameMessage::Flush) => break,
                Ok(FrameMessage::Frame(_)) => continue, // 丢弃
                Err(_) => break,                        // 队列关闭
            }
        }
        self.session.flush_render.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SystemClock, TimeBase, VideoFrame};
    use parking_lot::RwLock;
    use std::sync::Mutex as StdMutex;
    use std::time::Instant;

    fn test_config() -> PlayerConfig {
        PlayerConfig {
            video_buffer_frames: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_frame_quantizes_downward() {
        let cfg = PlayerConfig::default();
        // 1000us 的延迟被清掉低 8 位 → 768
        assert_eq!(plan_frame(0, 1000, &cfg), Pacing::Sleep(1000 & !0xFF));
        // 低于量化粒度的延迟直接渲染
        assert_eq!(plan_frame(0, 200, &cfg), Pacing::RenderNow);
    }

    #[test]
    fn test_plan_frame_clamps_to_ceiling() {
        let cfg = PlayerConfig::default();
        // 再大的延迟也不超过上限
        assert_eq!(plan_frame(0, 10_000_000, &cfg), Pacing::Sleep(cfg.max_frame_delay_us));
        assert_eq!(plan_frame(0, i64::MAX / 2, &cfg), Pacing::Sleep(cfg.max_frame_delay_us));
    }

    #[test]
    fn test_plan_frame_late_thresholds() {
        let cfg = PlayerConfig::default();
        // 略迟：立即渲染
        assert_eq!(plan_frame(1_050_000, 1_000_000, &cfg), Pacing::RenderNow);
        // 落后超过阈值：追赶
        assert_eq!(plan_frame(1_200_000, 1_000_000, &cfg), Pacing::CatchUp);
        // 正点
        assert_eq!(plan_frame(1_000_000, 1_000_000, &cfg), Pacing::RenderNow);
    }

    /// 记录呈现序列的测试表面
    struct RecordingSurface {
        record: Arc<StdMutex<Vec<&'static str>>>,
    }

    impl RenderSurface for RecordingSurface {
        fn canvas_size(&self) -> (u32, u32) {
            (4, 4)
        }
        fn blit(&mut self, buf: &[u8], _w: u32, _h: u32, _x: i32, _y: i32) {
            let kind = if buf.iter().all(|&b| b == 0) { "blank" } else { "frame" };
            self.record.lock().unwrap().push(kind);
        }
        fn present(&mut self) {}
    }

    fn make_frame(pts_us: i64, fill: u8) -> FrameMessage {
        FrameMessage::Frame(VideoFrame {
            buffer: Arc::new(RwLock::new(vec![fill; 64])),
            pts: pts_us,
            time_base: TimeBase::MICROSECONDS,
        })
    }

    fn spawn_renderer(
        session: Arc<VideoSession>,
        clock: SystemClock,
        record: Arc<StdMutex<Vec<&'static str>>>,
    ) -> (thread::JoinHandle<()>, thread::JoinHandle<()>) {
        let (delegate, host) = SurfaceHost::new(Box::new(RecordingSurface { record }));
        let host_thread = thread::spawn(move || host.run());
        let renderer = Renderer {
            session,
            master: MasterClock::System(clock),
            audio: None,
            surface: delegate,
            last_frame: Arc::new(PlMutex::new(None)),
            config: test_config(),
            width: 4,
            height: 4,
        };
        let render_thread = thread::spawn(move || renderer.run());
        (render_thread, host_thread)
    }

    #[test]
    fn test_renders_frames_in_order_then_blank_on_close() {
        let session = Arc::new(VideoSession::new(3, 4, 4));
        // 三帧，间隔 20ms，
        // 这里让时钟刚好赶上每帧）
        session.frames.put(make_frame(0, 1)).map_err(|_| ()).unwrap();
        session.frames.put(make_frame(20_000, 2)).map_err(|_| ()).unwrap();
        session.frames.put(make_frame(40_000, 3)).map_err(|_| ()).unwrap();
        session.frames.close();

        let clock = SystemClock::new();
        clock.set_us(0);

        let record = Arc::new(StdMutex::new(Vec::new()));
        let (render_thread, host_thread) = spawn_renderer(session.clone(), clock, record.clone());

        render_thread.join().unwrap();
        let presented = record.lock().unwrap().clone();
        // 三帧顺序呈现，随后一帧空白清屏
        assert_eq!(presented, vec!["frame", "frame", "frame", "blank"]);
        assert!(!session.renderer_running.load(Ordering::SeqCst));
        assert!(session.frames.is_empty());
        host_thread.join().unwrap();
    }

    #[test]
    fn test_late_frames_are_dumped_not_rendered() {
        let session = Arc::new(VideoSession::new(4, 4, 4));
        // 时钟已经在 10 秒处，前三帧严重滞后，最后一帧正点
        session.frames.put(make_frame(0, 1)).map_err(|_| ()).unwrap();
        session.frames.put(make_frame(1_000_000, 2)).map_err(|_| ()).unwrap();
        session.frames.put(make_frame(2_000_000, 3)).map_err(|_| ()).unwrap();
        session.frames.put(make_frame(10_000_000, 4)).map_err(|_| ()).unwrap();
        session.frames.close();

        let clock = SystemClock::new();
        let record = Arc::new(StdMutex::new(Vec::new()));

        // 无音频启动路径会把时钟对齐到首帧 (0)，这里手动拨回 10 秒
        let (render_thread, host_thread) = {
            let session = session.clone();
            let record = record.clone();
            let (delegate, host) = SurfaceHost::new(Box::new(RecordingSurface { record }));
            let host_thread = thread::spawn(move || host.run());
            let renderer = Renderer {
                session: session.clone(),
                master: MasterClock::System(clock.clone()),
                audio: None,
                surface: delegate,
                last_frame: Arc::new(PlMutex::new(None)),
                config: test_config(),
                width: 4,
                height: 4,
            };
            let render_thread = thread::spawn(move || {
                renderer.run();
            });
            // 等渲染线程完成首帧对齐后再把时钟拨到 10 秒
            session.renderer_gate.wait();
            clock.set_us(10_000_000);
            (render_thread, host_thread)
        };

        render_thread.join().unwrap();
        host_thread.join().unwrap();

        let presented = record.lock().unwrap().clone();
        // 滞后帧被丢弃；只有末帧（可能加上追赶判定前已渲染的首帧）上屏
        let frames = presented.iter().filter(|&&k| k == "frame").count();
        assert!(frames <= 2, "滞后帧应当被丢弃，实际呈现 {} 帧", frames);
        assert_eq!(*presented.last().unwrap(), "blank");
    }

    #[test]
    fn test_stop_latency_bounded_by_sleep_ceiling() {
        let session = Arc::new(VideoSession::new(3, 4, 4));
        // 一帧远在未来：渲染线程会按上限分段睡眠
        session.frames.put(make_frame(3_600_000_000, 1)).map_err(|_| ()).unwrap();

        let clock = SystemClock::new();
        clock.set_us(0);
        let record = Arc::new(StdMutex::new(Vec::new()));
        let (render_thread, host_thread) = spawn_renderer(session.clone(), clock, record);

        session.renderer_gate.wait();
        thread::sleep(Duration::from_millis(50));

        // 注入停止：退出延迟应当以睡眠上限为界，而不是帧延迟
        let t0 = Instant::now();
        session.renderer_quit.store(true, Ordering::SeqCst);
        session.frames.close();
        render_thread.join().unwrap();
        let latency = t0.elapsed();
        assert!(
            latency < Duration::from_millis(500),
            "停止延迟 {:?} 超过睡眠上限允许的范围",
            latency
        );
        host_thread.join().unwrap();
    }
}
