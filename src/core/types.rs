use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    /// 空闲，可以开始新的播放会话
    Ready,
    /// 正在缓冲（会话启动或填充帧队列）
    Buffering,
    Playing,
    Paused,
}

/// 状态变更通知（旧状态 + 新状态）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub old: PlayerStatus,
    pub new: PlayerStatus,
}

/// 流时间基 - 把 PTS 换算成真实时间的比例因子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const MICROSECONDS: TimeBase = TimeBase { num: 1, den: 1_000_000 };

    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }
}

/// 把某个时间基下的 PTS 换算成微秒
/// 中间用 i128 计算，避免大 PTS 乘以 1_000_000 溢出
pub fn pts_to_us(pts: i64, tb: TimeBase) -> i64 {
    if tb.den == 0 {
        return 0;
    }
    ((pts as i128 * tb.num as i128 * 1_000_000) / tb.den as i128) as i64
}

/// 帧缓冲池中的一个槽位
/// 解码线程写入（写锁），渲染/主线程读取（读锁）
pub type FrameSlot = Arc<RwLock<Vec<u8>>>;

/// 解码完成的视频帧 - 只持有缓冲池槽位的引用
#[derive(Clone)]
pub struct VideoFrame {
    pub buffer: FrameSlot,
    pub pts: i64,
    pub time_base: TimeBase,
}

impl VideoFrame {
    /// 帧显示时间（微秒）
    pub fn time_us(&self) -> i64 {
        pts_to_us(self.pts, self.time_base)
    }
}

/// 帧队列消息：普通帧或冲刷标记
/// 冲刷标记随队列传递，保证渲染线程在消费完旧帧后才响应冲刷
#[derive(Clone)]
pub enum FrameMessage {
    Frame(VideoFrame),
    Flush,
}

/// 包队列消息：编码数据包或冲刷命令
pub enum StreamData {
    Packet(ffmpeg_next::Packet),
    Flush,
}

/// 章节信息（时间范围换算成微秒后持有）
#[derive(Debug, Clone)]
pub struct ChapterInfo {
    pub start_us: i64,
    pub end_us: i64,
    pub title: Option<String>,
}

/// 当前媒体的描述信息，打开媒体源时一次性提取
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    pub path: String,
    pub title: Option<String>,
    /// 总时长（微秒），未知时为 0
    pub duration_us: i64,
    pub chapters: Vec<ChapterInfo>,
    pub has_video: bool,
    pub has_audio: bool,
}

impl MediaInfo {
    /// 标题优先取容器元数据，否则退回路径
    pub fn display_title(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.path.clone())
    }

    /// 返回包含 pos_us 的章节下标（最后一个 start <= pos 的章节）
    pub fn chapter_index_at(&self, pos_us: i64) -> Option<usize> {
        let mut found = None;
        for (i, ch) in self.chapters.iter().enumerate() {
            if ch.start_us <= pos_us {
                found = Some(i);
            } else {
                break;
            }
        }
        found
    }
}

/// 播放列表条目
#[derive(Debug, Clone)]
pub struct PlaylistItem {
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pts_to_us() {
        // 90kHz 时间基（MPEG-TS 常见）
        let tb = TimeBase::new(1, 90000);
        assert_eq!(pts_to_us(90000, tb), 1_000_000);
        assert_eq!(pts_to_us(45000, tb), 500_000);
        // 大 PTS 不溢出
        let big = 90_000i64 * 3600 * 24 * 365;
        assert_eq!(pts_to_us(big, tb), 1_000_000i64 * 3600 * 24 * 365);
        // 微秒时间基恒等
        assert_eq!(pts_to_us(123_456, TimeBase::MICROSECONDS), 123_456);
    }

    #[test]
    fn test_chapter_index_at() {
        let info = MediaInfo {
            chapters: vec![
                ChapterInfo { start_us: 0, end_us: 60_000_000, title: None },
                ChapterInfo { start_us: 60_000_000, end_us: 120_000_000, title: None },
                ChapterInfo { start_us: 120_000_000, end_us: 180_000_000, title: None },
            ],
            ..Default::default()
        };
        assert_eq!(info.chapter_index_at(0), Some(0));
        assert_eq!(info.chapter_index_at(59_999_999), Some(0));
        assert_eq!(info.chapter_index_at(60_000_000), Some(1));
        assert_eq!(info.chapter_index_at(999_000_000), Some(2));

        let empty = MediaInfo::default();
        assert_eq!(empty.chapter_index_at(0), None);
    }
}
