use crate::core::{
    BoundedQueue, FrameMessage, FrameSlot, PlayerConfig, Result, StreamData, SystemClock, TimeBase,
    VideoFrame,
};
use crate::player::session::VideoSession;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, software, util, Discard};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// 视频解码阶段
///
/// 从包队列取编码包，解码后缩放、居中填充到固定尺寸的 RGBA 缓冲，
/// 写入旋转缓冲池的下一个槽位并入帧队列。缓冲池共 N+1 块：
/// 帧队列最多压着 N 帧，渲染线程手里最多再占一帧，写入的槽位
/// 一定不在使用中。
pub struct VideoStage {
    decoder: codec::decoder::Video,
    scaler: Option<software::scaling::Context>,
    time_base: TimeBase,
    /// 渲染画布尺寸，所有输出帧都是这个大小
    width: u32,
    height: u32,
    /// N+1 块旋转缓冲池
    pool: Vec<FrameSlot>,
    pool_index: usize,
    /// 上一次缩放输出的几何（变化时重新清底）
    last_rect: Option<(u32, u32)>,
    session: Arc<VideoSession>,
    packets: Arc<BoundedQueue<StreamData>>,
    sys_clock: SystemClock,
    /// 首个带时间戳的帧已建立时钟参考
    time_set: bool,
    skip_active: bool,
}

// SwsContext 不是 Send，但每个解码阶段实例只会在自己的解码线程中使用
unsafe impl Send for VideoStage {}

impl VideoStage {
    /// 从视频流创建解码阶段；编解码器在这里打开，失败即启动失败
    pub fn new(
        stream: format::stream::Stream,
        canvas_width: u32,
        canvas_height: u32,
        session: Arc<VideoSession>,
        packets: Arc<BoundedQueue<StreamData>>,
        sys_clock: SystemClock,
        config: &PlayerConfig,
    ) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().video()?;

        let tb = stream.time_base();
        let time_base = TimeBase::new(tb.numerator(), tb.denominator());

        debug!(
            "视频解码器: {}x{} → 画布 {}x{}",
            decoder.width(),
            decoder.height(),
            canvas_width,
            canvas_height
        );

        // 分配 N+1 块帧缓冲
        let frame_bytes = (canvas_width * canvas_height * 4) as usize;
        let pool = (0..config.video_buffer_frames + 1)
            .map(|_| Arc::new(RwLock::new(vec![0u8; frame_bytes])))
            .collect();

        Ok(Self {
            decoder,
            scaler: None,
            time_base,
            width: canvas_width,
            height: canvas_height,
            pool,
            pool_index: 0,
            last_rect: None,
            session,
            packets,
            sys_clock,
            time_set: false,
            skip_active: false,
        })
    }

    /// 解码线程主体，包队列关闭后收尾退出
    pub fn run(mut self) {
        info!("🎬 视频解码线程启动");
        self.session.decoder_running.store(true, Ordering::SeqCst);

        'outer: loop {
            let msg = match self.packets.get() {
                Ok(msg) => msg,
                Err(_) => break, // 队列关闭：正常的流结束/停止信号
            };

            match msg {
                StreamData::Flush => self.do_flush(),
                StreamData::Packet(packet) => {
                    self.apply_skip_mode();

                    // send_packet 返回"需要先取帧"时不丢弃包，
                    // 排空解码器后用同一个包重试
                    let mut held = Some(packet);
                    while let Some(packet) = held.take() {
                        match self.decoder.send_packet(&packet) {
                            Ok(()) => {}
                            Err(ffmpeg::Error::Other { errno: 11 }) => {
                                // EAGAIN: 解码器缓冲已满
                                held = Some(packet);
                            }
                            Err(ffmpeg::Error::Eof) => {
                                debug!("视频解码器收到 EOF，忽略本包");
                            }
                            Err(e) => {
                                error!("❌ 视频解码失败: {}", e);
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

        self.shutdown();
    }

    /// 根据渲染线程的要求切换跳帧模式
    fn apply_skip_mode(&mut self) {
        let want = self.session.skip_mode.load(Ordering::SeqCst);
        if want != self.skip_active {
            self.decoder.skip_frame(if want {
                Discard::NonReference
            } else {
                Discard::Default
            });
            self.skip_active = want;
        }
    }

    /// 取出解码器里所有已就绪的帧。返回 false 表示应当退出。
    fn drain_frames(&mut self) -> bool {
        loop {
            let mut decoded = util::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let frame = match self.convert_frame(&decoded) {
                        Ok(frame) => frame,
                        Err(e) => {
                            // 个别帧转换失败可以容忍，跳过
                            warn!("帧转换失败（已跳过）: {}", e);
                            continue;
                        }
                    };

                    // 首个带时间戳的帧建立时钟参考
                    // （流不一定从 0 开始，无音频时视频节拍靠这个对齐）
                    if !self.time_set {
                        let us = frame.time_us();
                        self.sys_clock.set_us(us);
                        debug!("首个视频帧 pts: {} us", us);
                        self.time_set = true;
                    }

                    if self.session.frames.put(FrameMessage::Frame(frame)).is_err() {
                        return false; // 帧队列关闭
                    }
                }
                Err(ffmpeg::Error::Other { errno: 11 }) => return true, // EAGAIN
                Err(ffmpeg::Error::Eof) => return true,
                Err(e) => {
                    warn!("视频解码错误（已跳过）: {}", e);
                    return true;
                }
            }
        }
    }

    /// 缩放并居中填充到缓冲池下一个槽位
    fn convert_frame(&mut self, decoded: &util::frame::Video) -> Result<VideoFrame> {
        let src_w = decoded.width();
        let src_h = decoded.height();

        // 等比缩放到画布内
        let (scaled_w, scaled_h) = fit_rect(src_w, src_h, self.width, self.height);

        if self.scaler.is_none() {
            self.scaler = Some(software::scaling::Context::get(
                decoded.format(),
                src_w,
                src_h,
                util::format::Pixel::RGBA,
                scaled_w,
                scaled_h,
                software::scaling::Flags::BILINEAR,
            )?);
        }

        let mut rgba = util::frame::Video::empty();
        self.scaler.as_mut().unwrap().run(decoded, &mut rgba)?;

        // 以缩放器实际输出为准（源几何中途变化时 fit_rect 的结果会过时）
        let out_w = rgba.width().min(self.width);
        let out_h = rgba.height().min(self.height);

        let pts = decoded.timestamp().unwrap_or(0);

        // 取缓冲池下一个槽位（模 N+1 旋转）
        self.pool_index = (self.pool_index + 1) % self.pool.len();
        let slot = self.pool[self.pool_index].clone();

        {
            let mut buf = slot.write();

            // 输出几何变化时重新清底，避免残留上一段画面的黑边区域
            if self.last_rect != Some((out_w, out_h)) {
                for b in self.pool.iter() {
                    if !Arc::ptr_eq(b, &slot) {
                        b.write().fill(0);
                    }
                }
                buf.fill(0);
                self.last_rect = Some((out_w, out_h));
            }

            // 逐行复制到画布中央
            let x_off = ((self.width - out_w) / 2) as usize;
            let y_off = ((self.height - out_h) / 2) as usize;
            let src_stride = rgba.stride(0);
            let src_data = rgba.data(0);
            let dst_pitch = (self.width * 4) as usize;
            let row_bytes = (out_w * 4) as usize;

            for y in 0..out_h as usize {
                let src_offset = y * src_stride;
                let dst_offset = (y_off + y) * dst_pitch + x_off * 4;
                buf[dst_offset..dst_offset + row_bytes]
                    .copy_from_slice(&src_data[src_offset..src_offset + row_bytes]);
            }
        }

        Ok(VideoFrame {
            buffer: slot,
            pts,
            time_base: self.time_base,
        })
    }

    /// Seek 冲刷：丢弃解码器内部状态，并让渲染线程清空帧队列
    fn do_flush(&mut self) {
        debug!("🔄 冲刷视频解码器");
        self.decoder.flush();

        if self.session.renderer_running.load(Ordering::SeqCst) {
            // 先置位标志，再把冲刷标记排进帧队列：标志让渲染线程
            // 进入清空模式，标记既是清空边界也能唤醒阻塞中的渲染线程
            self.session.flush_render.set();
            if self.session.frames.put(FrameMessage::Flush).is_err() {
                self.session.flush_render.clear();
            } else {
                self.session.flush_render.wait_clear();
            }
        } else {
            // 渲染线程不在，自己清
            let _ = self.session.frames.drain();
        }

        self.time_set = false;
        debug!("视频解码器冲刷完成");
        self.session.flush_ack.set();
    }

    /// 收尾：关闭帧队列、带走渲染线程、释放资源
    fn shutdown(&mut self) {
        debug!("视频解码线程收尾");

        self.session.frames.close();

        if self.session.renderer_running.load(Ordering::SeqCst) {
            self.session.renderer_quit.store(true, Ordering::SeqCst);
            let handle = self.session.renderer_thread.lock().unwrap().take();
            if let Some(handle) = handle {
                let _ = handle.join();
                debug!("渲染线程已结束");
            }
        }

        // 释放滞留的帧引用
        let _ = self.session.frames.drain();

        // 若解析线程还挂在冲刷等待上，解除它
        self.session.flush_ack.set();

        self.session.decoder_running.store(false, Ordering::SeqCst);
        info!("✅ 视频解码线程结束");
    }
}

/// 等比缩放：把 src 缩放到恰好放进 dst，至少 1x1
pub(crate) fn fit_rect(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (u32, u32) {
    if src_w == 0 || src_h == 0 {
        return (dst_w.max(1), dst_h.max(1));
    }
    // 先按宽缩，放不下再按高缩
    let by_width_h = (src_h as u64 * dst_w as u64 / src_w as u64) as u32;
    if by_width_h <= dst_h {
        (dst_w.max(1), by_width_h.max(1))
    } else {
        let by_height_w = (src_w as u64 * dst_h as u64 / src_h as u64) as u32;
        (by_height_w.max(1), dst_h.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_rect_wide_source() {
        // 21:9 源放进 16:9 画布：贴宽，上下留黑
        let (w, h) = fit_rect(2560, 1080, 1280, 720);
        assert_eq!(w, 1280);
        assert_eq!(h, 540);
    }

    #[test]
    fn test_fit_rect_tall_source() {
        // 竖屏源：贴高，左右留黑
        let (w, h) = fit_rect(1080, 1920, 1280, 720);
        assert_eq!(h, 720);
        assert_eq!(w, 405);
    }

    #[test]
    fn test_fit_rect_exact() {
        assert_eq!(fit_rect(1920, 1080, 1280, 720), (1280, 720));
    }

    #[test]
    fn test_fit_rect_degenerate() {
        assert_eq!(fit_rect(0, 0, 1280, 720), (1280, 720));
        let (w, h) = fit_rect(10000, 1, 1280, 720);
        assert!(w >= 1 && h >= 1);
    }
}
