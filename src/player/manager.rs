use crate::core::{
    BoundedQueue, MediaInfo, PlayerConfig, PlayerError, PlayerStatus, PlaylistItem, Result,
    StartGate, StatusChange, StreamData, SystemClock,
};
use crate::player::audio_stream::{AudioOutput, AudioRing};
use crate::player::renderer::{Renderer, RendererAudio, SurfaceDelegate};
use crate::player::runtime::ensure_ffmpeg;
use crate::player::session::{LastFrame, MasterClock, VideoSession};
use crate::player::timers::{TimerId, TimerService};
use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use parking_lot::Mutex as PlMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// 状态 + 缓冲进度，同一把锁下维护
pub(crate) struct StatusState {
    pub status: PlayerStatus,
    pub percent: u32,
}

/// 待处理的 Seek 请求与结果槽
/// 一个会话内最多一个未决请求，解析完成后清空
pub(crate) struct SeekState {
    pub pending: Option<i64>,
    pub result: Option<std::result::Result<(), String>>,
}

/// 播放列表：持有条目的有序数组 + 当前下标
pub(crate) struct Playlist {
    pub items: Vec<PlaylistItem>,
    pub current: Option<usize>,
}

impl Playlist {
    pub fn new() -> Self {
        Self { items: Vec::new(), current: None }
    }

    /// 沿列表走 incr 项（到边界为止），走动了就返回新条目路径
    pub fn advance(&mut self, incr: i64) -> Option<String> {
        let cur = self.current?;
        let step: i64 = if incr > 0 { 1 } else { -1 };
        let mut remaining = incr.abs();
        let mut idx = cur as i64;
        while remaining > 0 {
            let next = idx + step;
            if next < 0 || next as usize >= self.items.len() {
                break;
            }
            idx = next;
            remaining -= 1;
        }
        if idx as usize == cur {
            None
        } else {
            self.current = Some(idx as usize);
            Some(self.items[idx as usize].path.clone())
        }
    }
}

/// 播放器内部共享状态
///
/// 控制线程、流解析线程、解码线程、渲染线程各自持有 Arc，
/// 会话级资源（队列、时钟、环形缓冲）在会话建立时装入、收尾时清空。
pub(crate) struct Shared {
    pub config: PlayerConfig,
    pub status: Mutex<StatusState>,
    pub status_cv: Condvar,
    pub notify: Mutex<Option<Sender<StatusChange>>>,
    /// 会话退出标志（流结束 / 停止 / 致命错误）
    pub quit: AtomicBool,
    /// 显式停止：收尾时不做播放列表推进
    pub stopping: AtomicBool,
    pub media: Mutex<Option<MediaInfo>>,
    /// 最近一次请求播放的路径（会话结束后仍保留）
    pub media_file: Mutex<Option<String>>,
    pub video_packets: Mutex<Option<Arc<BoundedQueue<StreamData>>>>,
    pub audio_packets: Mutex<Option<Arc<BoundedQueue<StreamData>>>>,
    pub video: Mutex<Option<Arc<VideoSession>>>,
    pub audio_ring: Mutex<Option<Arc<AudioRing>>>,
    pub audio_output: Mutex<Option<AudioOutput>>,
    pub sys_clock: SystemClock,
    pub master: Mutex<Option<MasterClock>>,
    pub seek: Mutex<SeekState>,
    pub seek_cv: Condvar,
    pub playlist: Mutex<Playlist>,
    pub overlay: Mutex<Option<String>>,
    pub overlay_timer: Mutex<Option<TimerId>>,
    pub timers: TimerService,
    pub surface: SurfaceDelegate,
    pub last_frame: Arc<PlMutex<Option<LastFrame>>>,
    /// 解析线程的启动会合点
    pub session_gate: StartGate,
    pub video_paused: AtomicBool,
}

impl Shared {
    /// 更新状态并发出 (旧, 新) 通知
    pub(crate) fn set_status(&self, new: PlayerStatus) {
        let old = {
            let mut state = self.status.lock().unwrap();
            let old = state.status;
            state.status = new;
            if new != PlayerStatus::Buffering {
                state.percent = 0;
            }
            old
        };
        self.status_cv.notify_all();
        debug!("状态迁移: {:?} → {:?}", old, new);
        self.publish(StatusChange { old, new });
    }

    /// 缓冲进度更新：进度变化时重发一次 BUFFERING 通知
    pub(crate) fn set_buffer_percent(&self, percent: u32) {
        let changed = {
            let mut state = self.status.lock().unwrap();
            if state.status == PlayerStatus::Buffering && state.percent != percent {
                state.percent = percent;
                true
            } else {
                false
            }
        };
        if changed {
            self.publish(StatusChange {
                old: PlayerStatus::Buffering,
                new: PlayerStatus::Buffering,
            });
        }
    }

    fn publish(&self, change: StatusChange) {
        if let Some(tx) = self.notify.lock().unwrap().as_ref() {
            // 订阅方掉线不影响播放
            let _ = tx.send(change);
        }
    }

    /// BUFFERING → PLAYING 的受保护迁移
    ///
    /// 超短文件可能在缓冲完成前就走完了整个会话（解析线程已回 READY），
    /// 这时不能再往 PLAYING 迁移。返回 false 表示会话已自行结束。
    fn try_begin_playing(&self) -> bool {
        {
            let mut state = self.status.lock().unwrap();
            if state.status != PlayerStatus::Buffering {
                return false;
            }
            state.status = PlayerStatus::Playing;
            state.percent = 0;
        }
        self.status_cv.notify_all();
        debug!("状态迁移: Buffering → Playing");
        self.publish(StatusChange {
            old: PlayerStatus::Buffering,
            new: PlayerStatus::Playing,
        });
        true
    }

    pub(crate) fn current_status(&self) -> PlayerStatus {
        self.status.lock().unwrap().status
    }

    /// 解析线程完成（或放弃）一次 Seek 时调用
    pub(crate) fn resolve_seek(&self, target_us: i64, result: std::result::Result<(), String>) {
        let mut seek = self.seek.lock().unwrap();
        // 执行期间又来了新目标就保留它，下一轮循环继续处理
        if seek.pending == Some(target_us) {
            seek.pending = None;
        }
        seek.result = Some(result);
        drop(seek);
        self.seek_cv.notify_all();
    }

    /// 会话收尾时解除可能悬挂的 Seek 等待
    pub(crate) fn resolve_pending_seek_err(&self, reason: &str) {
        let mut seek = self.seek.lock().unwrap();
        if seek.pending.take().is_some() {
            seek.result = Some(Err(reason.to_string()));
            drop(seek);
            self.seek_cv.notify_all();
        }
    }

    /// 提交 Seek 请求并阻塞到被解析线程处理完
    fn request_seek(&self, target_us: i64) -> Result<()> {
        let mut seek = self.seek.lock().unwrap();
        seek.pending = Some(target_us);
        seek.result = None;
        while seek.pending.is_some() {
            // 会话可能恰好在请求提交前收尾完毕，没人会再来解析请求
            if self.current_status() == PlayerStatus::Ready {
                seek.pending = None;
                return Err(PlayerError::SeekError("播放会话已结束".to_string()));
            }
            let (next, _) = self
                .seek_cv
                .wait_timeout(seek, Duration::from_millis(200))
                .unwrap();
            seek = next;
        }
        match seek.result.take() {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(PlayerError::SeekError(e)),
            None => Err(PlayerError::SeekError("结果丢失".to_string())),
        }
    }

    /// 启动或恢复播放
    ///
    /// path 为 None 时从暂停恢复；给出路径则开启新的播放会话
    /// （必要时先停掉当前会话），阻塞到缓冲完成、渲染线程就绪。
    pub(crate) fn play_impl(self: &Arc<Self>, path: Option<&str>) -> Result<()> {
        let path = match path {
            None => {
                // ========== 从暂停恢复 ==========
                if self.current_status() != PlayerStatus::Paused {
                    return Err(PlayerError::InvalidState("没有处于暂停状态".to_string()));
                }
                info!("▶️  恢复播放");
                let ring = self.audio_ring.lock().unwrap().clone();
                match ring {
                    Some(ring) => ring.resume(),
                    None => {
                        self.sys_clock.resume();
                        self.video_paused.store(false, Ordering::SeqCst);
                    }
                }
                self.set_status(PlayerStatus::Playing);
                return Ok(());
            }
            Some(path) => path.to_string(),
        };

        ensure_ffmpeg();
        info!("🎬 播放: {}", path);

        // 音频还挂在暂停上就先恢复，避免收尾流程卡住
        if let Some(ring) = self.audio_ring.lock().unwrap().clone() {
            if ring.is_paused() {
                ring.resume();
            }
        }

        // ========== 停掉当前会话 ==========
        if self.current_status() != PlayerStatus::Ready {
            self.stop_impl()?;
        }

        *self.media_file.lock().unwrap() = Some(path.clone());
        self.stopping.store(false, Ordering::SeqCst);
        self.quit.store(false, Ordering::SeqCst);
        self.video_paused.store(false, Ordering::SeqCst);

        self.set_status(PlayerStatus::Buffering);

        // ========== 启动流解析线程并会合 ==========
        self.session_gate.reset();
        {
            let shared = self.clone();
            let session_path = path.clone();
            thread::Builder::new()
                .name("stream_parser".to_string())
                .spawn(move || crate::player::stream::run(shared, session_path))
                .map_err(|e| {
                    self.set_status(PlayerStatus::Ready);
                    PlayerError::Other(format!("无法创建解析线程: {}", e))
                })?;
        }

        if !self.session_gate.wait() {
            error!("❌ 播放启动失败: {}", path);
            return Err(PlayerError::OpenError(path));
        }

        // ========== 等待帧队列填满（缓冲阶段） ==========
        let video = self.video.lock().unwrap().clone();
        if let Some(video) = &video {
            let target = self.config.video_buffer_frames;
            video.frames.wait_fill(target, |n| {
                let percent = (n * 100 / target.max(1)) as u32;
                self.set_buffer_percent(percent.min(100));
            });
            if self.quit.load(Ordering::SeqCst) {
                // 缓冲期间被停止，状态由解析线程收尾
                return Err(PlayerError::Other("播放启动被中止".to_string()));
            }
        }

        if !self.try_begin_playing() {
            // 会话在缓冲完成前就自行结束了（超短文件或中途出错）
            warn!("会话在缓冲完成前结束: {}", path);
            return Ok(());
        }

        // 标题浮层（定时消隐）
        if let Some(media) = self.media.lock().unwrap().clone() {
            self.show_overlay(media.display_title());
        }

        // ========== 启动音频输出 ==========
        let ring = self.audio_ring.lock().unwrap().clone();
        if let Some(ring) = &ring {
            let mut output = self.audio_output.lock().unwrap();
            if let Some(output) = output.as_mut() {
                if let Err(e) = output.start(ring.clone()) {
                    warn!("⚠️  音频输出启动失败，继续无声播放: {}", e);
                }
            }
        }

        // ========== 启动渲染线程 ==========
        if let Some(video) = video {
            let master = self
                .master
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(MasterClock::System(self.sys_clock.clone()));
            let audio = match (&ring, self.audio_packets.lock().unwrap().clone()) {
                (Some(ring), Some(packets)) => Some(RendererAudio {
                    ring: ring.clone(),
                    packets,
                }),
                _ => None,
            };
            let renderer = Renderer {
                session: video.clone(),
                master,
                audio,
                surface: self.surface.clone(),
                last_frame: self.last_frame.clone(),
                config: self.config.clone(),
                width: video.width,
                height: video.height,
            };
            let handle = match thread::Builder::new()
                .name("video_renderer".to_string())
                .spawn(move || renderer.run())
            {
                Ok(handle) => handle,
                Err(e) => {
                    error!("❌ 无法创建渲染线程: {}", e);
                    let _ = self.stop_impl();
                    return Err(PlayerError::Other(format!("无法创建渲染线程: {}", e)));
                }
            };
            *video.renderer_thread.lock().unwrap() = Some(handle);
            video.renderer_gate.wait();
        }

        Ok(())
    }

    /// 停止播放：关队列级联收尾，阻塞到状态回 READY
    pub(crate) fn stop_impl(&self) -> Result<()> {
        // 暂停中先恢复（与恢复播放共用一条路径）
        if self.current_status() == PlayerStatus::Paused {
            debug!("停止前先解除暂停");
            let ring = self.audio_ring.lock().unwrap().clone();
            match ring {
                Some(ring) => ring.resume(),
                None => {
                    self.sys_clock.resume();
                    self.video_paused.store(false, Ordering::SeqCst);
                }
            }
            self.set_status(PlayerStatus::Playing);
        }

        if self.current_status() == PlayerStatus::Ready {
            return Ok(());
        }

        info!("⏹️  停止播放");
        self.stopping.store(true, Ordering::SeqCst);
        self.quit.store(true, Ordering::SeqCst);

        // 关闭包队列：各阶段以此为退出信号，不强行打断线程
        if let Some(q) = self.video_packets.lock().unwrap().clone() {
            q.close();
        }
        if let Some(q) = self.audio_packets.lock().unwrap().clone() {
            q.close();
        }

        // 阻塞等状态回 READY（解析线程收尾时迁移）
        let mut state = self.status.lock().unwrap();
        while state.status != PlayerStatus::Ready {
            state = self.status_cv.wait(state).unwrap();
        }
        info!("✅ 停止完成");
        Ok(())
    }

    /// 显示浮层文字，到期由定时器消隐
    pub(crate) fn show_overlay(self: &Arc<Self>, text: String) {
        let mut timer_guard = self.overlay_timer.lock().unwrap();
        if let Some(id) = timer_guard.take() {
            self.timers.cancel(id);
        }
        *self.overlay.lock().unwrap() = Some(text);

        let weak = Arc::downgrade(self);
        let id = self.timers.register(
            Duration::from_secs(self.config.title_overlay_secs),
            move || {
                if let Some(shared) = weak.upgrade() {
                    *shared.overlay.lock().unwrap() = None;
                    *shared.overlay_timer.lock().unwrap() = None;
                }
            },
        );
        *timer_guard = Some(id);
    }
}

/// 媒体播放器
///
/// 持有播放列表与状态机，管理一次播放会话的全部工作线程：
/// 流解析、视频解码、音频解码、渲染。所有命令从控制线程发出。
pub struct Player {
    shared: Arc<Shared>,
}

impl Player {
    /// 创建播放器实例；surface 是渲染表面属主线程的提交端
    pub fn new(config: PlayerConfig, surface: SurfaceDelegate) -> Self {
        info!("🎮 创建播放器");
        let shared = Arc::new(Shared {
            config,
            status: Mutex::new(StatusState {
                status: PlayerStatus::Ready,
                percent: 0,
            }),
            status_cv: Condvar::new(),
            notify: Mutex::new(None),
            quit: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            media: Mutex::new(None),
            media_file: Mutex::new(None),
            video_packets: Mutex::new(None),
            audio_packets: Mutex::new(None),
            video: Mutex::new(None),
            audio_ring: Mutex::new(None),
            audio_output: Mutex::new(None),
            sys_clock: SystemClock::new(),
            master: Mutex::new(None),
            seek: Mutex::new(SeekState {
                pending: None,
                result: None,
            }),
            seek_cv: Condvar::new(),
            playlist: Mutex::new(Playlist::new()),
            overlay: Mutex::new(None),
            overlay_timer: Mutex::new(None),
            timers: TimerService::new(),
            surface,
            last_frame: Arc::new(PlMutex::new(None)),
            session_gate: StartGate::new(),
            video_paused: AtomicBool::new(false),
        });
        Self { shared }
    }

    /// 注册状态变更订阅者（单播）
    pub fn subscribe(&self, tx: Sender<StatusChange>) {
        *self.shared.notify.lock().unwrap() = Some(tx);
    }

    /// path 为 None 时从暂停恢复，否则开始播放指定媒体
    pub fn play(&self, path: Option<&str>) -> Result<()> {
        self.shared.play_impl(path)
    }

    /// 提交播放列表并从指定条目开始播放
    pub fn play_playlist(&self, paths: &[String], start: usize) -> Result<()> {
        if paths.is_empty() {
            return Err(PlayerError::InvalidState("播放列表为空".to_string()));
        }
        let first = {
            let mut playlist = self.shared.playlist.lock().unwrap();
            playlist.items = paths
                .iter()
                .map(|p| PlaylistItem { path: p.clone() })
                .collect();
            let start = start.min(paths.len() - 1);
            playlist.current = Some(start);
            playlist.items[start].path.clone()
        };
        self.shared.play_impl(Some(&first))
    }

    /// 暂停：只在 PLAYING 状态下有效
    pub fn pause(&self) -> Result<()> {
        if self.shared.current_status() != PlayerStatus::Playing {
            return Err(PlayerError::InvalidState("当前不在播放中".to_string()));
        }
        info!("⏸️  暂停");
        self.shared.set_status(PlayerStatus::Paused);
        let ring = self.shared.audio_ring.lock().unwrap().clone();
        match ring {
            Some(ring) => ring.pause(),
            None => {
                self.shared.sys_clock.pause();
                self.shared.video_paused.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    /// 停止播放并等待全部工作线程结束
    pub fn stop(&self) -> Result<()> {
        self.shared.stop_impl()
    }

    /// 按章节跳转：±N 章；越过当前条目的章节范围则切换播放列表条目
    pub fn seek_chapter(&self, incr: i64) -> Result<()> {
        let status = self.shared.current_status();
        if status != PlayerStatus::Playing && status != PlayerStatus::Paused {
            return Err(PlayerError::InvalidState("当前没有播放会话".to_string()));
        }
        if incr == 0 {
            return Ok(());
        }

        let media = self
            .shared
            .media
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PlayerError::InvalidState("没有媒体信息".to_string()))?;
        let master = self
            .shared
            .master
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PlayerError::InvalidState("没有主时钟".to_string()))?;

        let pos = master.now_us();
        let chapter_count = media.chapters.len();
        let current = media.chapter_index_at(pos);

        debug!(
            "章节跳转: incr={}, pos={} us, 当前章节 {:?}/{}",
            incr, pos, current, chapter_count
        );

        // ========== 越界：沿播放列表走 ==========
        let past_last = incr > 0
            && (chapter_count == 0 || current == Some(chapter_count - 1));
        let before_first = incr < 0
            && (chapter_count == 0 || current == Some(0) || current.is_none());

        if past_last || before_first {
            let next = self.shared.playlist.lock().unwrap().advance(incr);
            return match next {
                Some(next_path) => {
                    info!("⏭️  章节越界，切换播放列表条目: {}", next_path);
                    self.shared.play_impl(Some(&next_path))
                }
                None => Err(PlayerError::SeekError("已到播放列表边界".to_string())),
            };
        }

        // ========== 本条目内章节跳转 ==========
        let target = current.unwrap_or(0) as i64 + incr;
        if target < 0 || target as usize >= chapter_count {
            return Err(PlayerError::SeekError("章节越界".to_string()));
        }
        let target_us = media.chapters[target as usize].start_us;

        info!("📖 跳转到章节 {} ({} us)", target, target_us);

        // 暂停中先恢复，否则时钟不动、Seek 结果无从观察
        if self.shared.current_status() == PlayerStatus::Paused {
            self.shared.play_impl(None)?;
        }

        self.shared.request_seek(target_us)
    }

    pub fn status(&self) -> PlayerStatus {
        self.shared.current_status()
    }

    /// 缓冲进度（0-100）
    pub fn buffer_percent(&self) -> u32 {
        self.shared.status.lock().unwrap().percent
    }

    /// 当前媒体标题（无会话时为 None）
    pub fn title(&self) -> Option<String> {
        self.shared
            .media
            .lock()
            .unwrap()
            .as_ref()
            .map(|m| m.display_title())
    }

    /// 最近一次请求播放的路径
    pub fn media_file(&self) -> Option<String> {
        self.shared.media_file.lock().unwrap().clone()
    }

    /// 媒体总时长（微秒）
    pub fn duration_us(&self) -> i64 {
        self.shared
            .media
            .lock()
            .unwrap()
            .as_ref()
            .map(|m| m.duration_us)
            .unwrap_or(0)
    }

    /// 当前播放位置（微秒）
    pub fn position_us(&self) -> i64 {
        self.shared
            .master
            .lock()
            .unwrap()
            .as_ref()
            .map(|m| m.now_us())
            .unwrap_or(0)
    }

    /// 当前浮层文字
    pub fn overlay_text(&self) -> Option<String> {
        self.shared.overlay.lock().unwrap().clone()
    }

    /// 曝光重绘：把最后渲染的一帧重新提交到表面
    pub fn refresh(&self) {
        let copy = {
            let last = self.shared.last_frame.lock();
            last.as_ref()
                .map(|f| (f.data.clone(), f.width, f.height))
        };
        if let Some((data, width, height)) = copy {
            self.shared.surface.present_bytes(data, width, height);
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        let _ = self.shared.stop_impl();
        self.shared.timers.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::renderer::{HeadlessSurface, SurfaceHost};
    use crossbeam_channel::unbounded;

    fn make_playlist(paths: &[&str], current: usize) -> Playlist {
        Playlist {
            items: paths
                .iter()
                .map(|p| PlaylistItem { path: p.to_string() })
                .collect(),
            current: Some(current),
        }
    }

    #[test]
    fn test_playlist_advance_forward() {
        let mut pl = make_playlist(&["a", "b", "c"], 1);
        assert_eq!(pl.advance(1), Some("c".to_string()));
        assert_eq!(pl.current, Some(2));
        // 已到末尾，走不动
        assert_eq!(pl.advance(1), None);
        assert_eq!(pl.current, Some(2));
    }

    #[test]
    fn test_playlist_advance_backward_and_clamp() {
        let mut pl = make_playlist(&["a", "b", "c"], 2);
        // 往回走 5 项，只能走到头
        assert_eq!(pl.advance(-5), Some("a".to_string()));
        assert_eq!(pl.current, Some(0));
        assert_eq!(pl.advance(-1), None);
    }

    #[test]
    fn test_playlist_empty() {
        let mut pl = Playlist::new();
        assert_eq!(pl.advance(1), None);
    }

    fn make_player() -> (Player, std::thread::JoinHandle<()>) {
        let (delegate, host) = SurfaceHost::new(Box::new(HeadlessSurface::new(64, 36)));
        let host_thread = std::thread::spawn(move || host.run());
        (Player::new(PlayerConfig::default(), delegate), host_thread)
    }

    #[test]
    fn test_commands_require_session() {
        let (player, host) = make_player();
        assert!(matches!(player.pause(), Err(PlayerError::InvalidState(_))));
        assert!(matches!(
            player.seek_chapter(1),
            Err(PlayerError::InvalidState(_))
        ));
        assert!(matches!(player.play(None), Err(PlayerError::InvalidState(_))));
        // READY 状态下停止是无操作
        assert!(player.stop().is_ok());
        assert_eq!(player.status(), PlayerStatus::Ready);
        drop(player);
        host.join().unwrap();
    }

    #[test]
    fn test_failed_open_walks_ready_buffering_ready() {
        let (player, host) = make_player();
        let (tx, rx) = unbounded();
        player.subscribe(tx);

        let result = player.play(Some("/肯定不存在的文件.mp4"));
        assert!(result.is_err());
        assert_eq!(player.status(), PlayerStatus::Ready);

        let events: Vec<StatusChange> = rx.try_iter().collect();
        assert!(events.contains(&StatusChange {
            old: PlayerStatus::Ready,
            new: PlayerStatus::Buffering,
        }));
        assert!(events.contains(&StatusChange {
            old: PlayerStatus::Buffering,
            new: PlayerStatus::Ready,
        }));
        drop(player);
        host.join().unwrap();
    }

    #[test]
    fn test_play_playlist_rejects_empty() {
        let (player, host) = make_player();
        assert!(player.play_playlist(&[], 0).is_err());
        drop(player);
        host.join().unwrap();
    }

    #[test]
    fn test_media_file_persists_after_failed_session() {
        let (player, host) = make_player();
        let _ = player.play(Some("/不存在/a.mkv"));
        assert_eq!(player.media_file(), Some("/不存在/a.mkv".to_string()));
        assert_eq!(player.title(), None); // 会话级媒体信息已清空
        drop(player);
        host.join().unwrap();
    }
}
