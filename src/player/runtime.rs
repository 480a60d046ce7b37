use std::sync::Once;

static FFMPEG_INIT: Once = Once::new();

/// 进程内一次性初始化 FFmpeg
///
/// 惰性构造、只执行一次、线程安全。所有会触碰 FFmpeg 的入口
/// （播放会话、单元测试）统一经过这里。
pub fn ensure_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg_next::init() {
            // 初始化失败时后续 open 会再次报错，这里只记录
            log::error!("❌ FFmpeg 初始化失败: {}", e);
        } else {
            log::debug!("FFmpeg 初始化完成");
        }
    });
}
