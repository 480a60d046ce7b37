use crate::core::{BoundedQueue, PlayerStatus, StartGate, StreamData};
use crate::player::audio_decoder::AudioStage;
use crate::player::audio_stream::{AudioOutput, AudioRing};
use crate::player::demuxer::{Demuxer, StreamKind};
use crate::player::manager::Shared;
use crate::player::session::{MasterClock, VideoSession};
use crate::player::video_decoder::VideoStage;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// 流解析线程主体
///
/// 打开媒体源、选流、拉起解码阶段并与之会合，然后进入读包-路由
/// 主循环；每轮循环处理一次待决的 Seek。会话结束（流末尾、致命
/// 错误或显式停止）时统一收尾，并在非显式停止时推进播放列表。
pub(crate) fn run(shared: Arc<Shared>, path: String) {
    info!("🧵 流解析线程启动: {}", path);
    let cfg = shared.config.clone();

    // ========== 打开媒体源 ==========
    let mut demuxer = match Demuxer::open(&path, cfg.open_timeout_us) {
        Ok(demuxer) => demuxer,
        Err(e) => {
            error!("❌ 打开媒体源失败: {}", e);
            shared.quit.store(true, Ordering::SeqCst);
            shared.set_status(PlayerStatus::Ready);
            shared.session_gate.signal(false);
            return;
        }
    };

    let media = demuxer.media_info().clone();
    info!(
        "媒体信息: 时长 {} ms, 视频 {}, 音频 {}, 章节 {}",
        media.duration_us / 1000,
        media.has_video,
        media.has_audio,
        media.chapters.len()
    );
    *shared.media.lock().unwrap() = Some(media.clone());

    // 渲染画布尺寸决定帧缓冲池的几何
    let (width, height) = shared.surface.canvas_size().unwrap_or((1280, 720));

    // ========== 包队列 ==========
    let video_packets = Arc::new(BoundedQueue::new(cfg.video_packet_capacity));
    let audio_packets = Arc::new(BoundedQueue::new(cfg.audio_packet_capacity));
    *shared.video_packets.lock().unwrap() = Some(video_packets.clone());
    *shared.audio_packets.lock().unwrap() = Some(audio_packets.clone());

    let mut audio_thread: Option<JoinHandle<()>> = None;
    let mut video_thread: Option<JoinHandle<()>> = None;
    let mut ring: Option<Arc<AudioRing>> = None;
    let audio_running = Arc::new(AtomicBool::new(false));

    // ========== 音频解码阶段 ==========
    if let Some(stream) = demuxer.audio_stream() {
        match AudioOutput::new(cfg.target_sample_rate, cfg.target_channels) {
            Ok(output) => {
                // 重采样目标取设备实际配置
                let (rate, channels) = output.get_config();
                let ring_samples = {
                    let secs = if cfg.audio_ring_seconds.is_finite() && cfg.audio_ring_seconds > 0.0
                    {
                        cfg.audio_ring_seconds
                    } else {
                        2.0
                    };
                    ((rate as f32 * secs).ceil() as usize).saturating_mul(channels as usize)
                };
                let the_ring = Arc::new(AudioRing::new(ring_samples, rate, channels));

                match AudioStage::new(
                    stream,
                    rate,
                    channels,
                    the_ring.clone(),
                    audio_packets.clone(),
                    audio_running.clone(),
                ) {
                    Ok(stage) => {
                        let gate = Arc::new(StartGate::new());
                        let stage_gate = gate.clone();
                        match thread::Builder::new()
                            .name("audio_decoder".to_string())
                            .spawn(move || {
                                stage_gate.signal(true);
                                stage.run();
                            }) {
                            Ok(handle) => {
                                gate.wait();
                                audio_thread = Some(handle);
                                *shared.audio_ring.lock().unwrap() = Some(the_ring.clone());
                                *shared.audio_output.lock().unwrap() = Some(output);
                                ring = Some(the_ring);
                            }
                            Err(e) => {
                                error!("❌ 无法创建音频解码线程: {}", e);
                                fail_session(&shared, demuxer, video_packets, audio_packets, None, None, None);
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        // 音频解码器打不开是会话级致命错误
                        error!("❌ 打开音频解码器失败: {}", e);
                        fail_session(&shared, demuxer, video_packets, audio_packets, None, None, None);
                        return;
                    }
                }
            }
            Err(e) => {
                // 没有可用声卡时退化为无声播放，不影响视频
                warn!("⚠️  音频输出不可用，继续无声播放: {}", e);
            }
        }
    }

    // ========== 主时钟：有音频用音频时钟，否则用系统参考时钟 ==========
    let master = match &ring {
        Some(ring) => MasterClock::Audio(ring.clone()),
        None => {
            shared.sys_clock.set_us(0);
            shared.sys_clock.resume();
            MasterClock::System(shared.sys_clock.clone())
        }
    };
    *shared.master.lock().unwrap() = Some(master.clone());

    // ========== 视频解码阶段 ==========
    let mut video_session: Option<Arc<VideoSession>> = None;
    if let Some(stream) = demuxer.video_stream() {
        let session = Arc::new(VideoSession::new(cfg.video_buffer_frames, width, height));
        match VideoStage::new(
            stream,
            width,
            height,
            session.clone(),
            video_packets.clone(),
            shared.sys_clock.clone(),
            &cfg,
        ) {
            Ok(stage) => {
                let gate = Arc::new(StartGate::new());
                let stage_gate = gate.clone();
                match thread::Builder::new()
                    .name("video_decoder".to_string())
                    .spawn(move || {
                        stage_gate.signal(true);
                        stage.run();
                    }) {
                    Ok(handle) => {
                        gate.wait();
                        video_thread = Some(handle);
                        *shared.video.lock().unwrap() = Some(session.clone());
                        video_session = Some(session);
                    }
                    Err(e) => {
                        error!("❌ 无法创建视频解码线程: {}", e);
                        fail_session(&shared, demuxer, video_packets, audio_packets, audio_thread, ring, None);
                        return;
                    }
                }
            }
            Err(e) => {
                error!("❌ 打开视频解码器失败: {}", e);
                fail_session(&shared, demuxer, video_packets, audio_packets, audio_thread, ring, None);
                return;
            }
        }
    }

    let have_audio = ring.is_some();
    let have_video = video_session.is_some();
    if !have_audio && !have_video {
        error!("❌ 没有任何可解码的流");
        fail_session(&shared, demuxer, video_packets, audio_packets, audio_thread, ring, video_thread);
        return;
    }

    // 与控制线程会合：会话启动成功
    shared.session_gate.signal(true);

    // ========== 主循环：读包 → 路由 → 处理 Seek ==========
    let mut packet_count: u64 = 0;
    loop {
        if shared.quit.load(Ordering::SeqCst) {
            debug!("收到退出标志");
            break;
        }

        match demuxer.read_packet() {
            Ok(Some((packet, kind))) => {
                packet_count += 1;
                // 阻塞入队形成背压；队列被关闭说明会话在收尾
                let routed = match kind {
                    StreamKind::Video if have_video => {
                        video_packets.put(StreamData::Packet(packet)).is_ok()
                    }
                    StreamKind::Audio if have_audio => {
                        audio_packets.put(StreamData::Packet(packet)).is_ok()
                    }
                    _ => true, // 对应解码阶段不存在，丢弃
                };
                if !routed {
                    debug!("包队列已关闭，结束读包循环");
                    break;
                }
            }
            Ok(None) => {
                info!("📄 读到流末尾，共 {} 个包", packet_count);
                break;
            }
            Err(e) => {
                error!("❌ 读包失败: {} (已处理 {} 个包)", e, packet_count);
                break;
            }
        }

        // 每轮循环检查一次待决的 Seek
        let pending = shared.seek.lock().unwrap().pending;
        if let Some(target_us) = pending {
            execute_seek(
                &shared,
                &mut demuxer,
                target_us,
                &master,
                &video_packets,
                &audio_packets,
                video_session.as_deref(),
                ring.as_ref(),
            );
        }
    }

    teardown(
        &shared,
        demuxer,
        video_packets,
        audio_packets,
        video_thread,
        audio_thread,
        ring,
        true,
    );
}

/// Seek 协议（每轮主循环最多执行一次）
///
/// 完成后不变式：三个队列（视频包、音频包、视频帧）全空，
/// 主时钟读数为目标位置。
#[allow(clippy::too_many_arguments)]
fn execute_seek(
    shared: &Arc<Shared>,
    demuxer: &mut Demuxer,
    target_us: i64,
    master: &MasterClock,
    video_packets: &Arc<BoundedQueue<StreamData>>,
    audio_packets: &Arc<BoundedQueue<StreamData>>,
    video: Option<&VideoSession>,
    ring: Option<&Arc<AudioRing>>,
) {
    // 1. 方向：目标在当前主时钟之前则向后找关键帧
    let from_us = master.now_us();
    let backward = target_us < from_us;
    info!(
        "🎯 Seek {} → {} us ({})",
        from_us,
        target_us,
        if backward { "后退" } else { "前进" }
    );

    // 2. 底层 Seek；失败只中止本次 Seek，播放继续
    if let Err(e) = demuxer.seek(target_us, backward) {
        error!("❌ Seek 失败: {}", e);
        shared.resolve_seek(target_us, Err(e.to_string()));
        return;
    }

    // 3. 原子清空两个包队列，旧包不会再被路由
    let dropped_video = video_packets.drain().len();
    let dropped_audio = audio_packets.drain().len();
    debug!("清空包队列: 视频 {} 音频 {}", dropped_video, dropped_audio);

    // 4. 视频解码阶段冲刷：丢半路帧、重置编解码器、清空帧队列
    if let Some(video) = video {
        video.flush_ack.clear();
        if video_packets.put(StreamData::Flush).is_ok() {
            video.flush_ack.wait_set();
        }
        debug!("视频冲刷完成 (帧队列: {})", video.frames.len());
    }

    // 5. 音频：暂停输出、丢缓冲采样、时钟对齐到目标、恢复
    if let Some(ring) = ring {
        ring.pause();
        ring.drop_buffered();
        let _ = audio_packets.put(StreamData::Flush);
        ring.set_clock_us(target_us);
        ring.resume();
    }

    // 6. 系统参考时钟重置（无音频时它就是主时钟）
    shared.sys_clock.set_us(target_us);

    // 7. 解决请求、清除待决目标
    shared.resolve_seek(target_us, Ok(()));
    info!("✅ Seek 完成: {} us (时钟 {})", target_us, master.now_us());
}

/// 启动中途失败的收尾：复用正常收尾，但不做播放列表推进
#[allow(clippy::too_many_arguments)]
fn fail_session(
    shared: &Arc<Shared>,
    demuxer: Demuxer,
    video_packets: Arc<BoundedQueue<StreamData>>,
    audio_packets: Arc<BoundedQueue<StreamData>>,
    audio_thread: Option<JoinHandle<()>>,
    ring: Option<Arc<AudioRing>>,
    video_thread: Option<JoinHandle<()>>,
) {
    shared.quit.store(true, Ordering::SeqCst);
    teardown(
        shared,
        demuxer,
        video_packets,
        audio_packets,
        video_thread,
        audio_thread,
        ring,
        false,
    );
    shared.session_gate.signal(false);
}

/// 会话收尾
///
/// 关闭包队列（各阶段的退出信号）→ 汇合解码线程（视频解码线程
/// 退出时带走渲染线程）→ 释放媒体源 → 状态回 READY →
/// 非显式停止时推进播放列表。
#[allow(clippy::too_many_arguments)]
fn teardown(
    shared: &Arc<Shared>,
    demuxer: Demuxer,
    video_packets: Arc<BoundedQueue<StreamData>>,
    audio_packets: Arc<BoundedQueue<StreamData>>,
    video_thread: Option<JoinHandle<()>>,
    audio_thread: Option<JoinHandle<()>>,
    ring: Option<Arc<AudioRing>>,
    advance_playlist: bool,
) {
    debug!("会话收尾开始");

    // 关闭是收尾信号，不是错误
    video_packets.close();
    audio_packets.close();
    if let Some(ring) = &ring {
        // 防止音频解码线程阻塞在已满的环形缓冲上
        ring.close();
    }

    if let Some(handle) = audio_thread {
        let _ = handle.join();
        debug!("音频解码线程已汇合");
    }
    if let Some(handle) = video_thread {
        let _ = handle.join();
        debug!("视频解码线程已汇合");
    }

    // 解除可能悬挂的 Seek 等待
    shared.resolve_pending_seek_err("播放会话已结束");

    // 停止音频输出设备
    if let Some(mut output) = shared.audio_output.lock().unwrap().take() {
        output.stop();
    }

    // 释放媒体源
    drop(demuxer);

    // 清空会话级共享状态
    *shared.video_packets.lock().unwrap() = None;
    *shared.audio_packets.lock().unwrap() = None;
    *shared.video.lock().unwrap() = None;
    *shared.audio_ring.lock().unwrap() = None;
    *shared.master.lock().unwrap() = None;
    *shared.media.lock().unwrap() = None;

    shared.set_status(PlayerStatus::Ready);
    info!("✅ 播放会话已结束");

    // 显式停止时不推进播放列表
    let was_stopping = shared.stopping.swap(false, Ordering::SeqCst);
    if advance_playlist && !was_stopping {
        let next = shared.playlist.lock().unwrap().advance(1);
        if let Some(next_path) = next {
            info!("⏭️  播放列表推进到: {}", next_path);
            if let Err(e) = shared.play_impl(Some(&next_path)) {
                error!("播放下一项失败: {}", e);
            }
        }
    }
}
