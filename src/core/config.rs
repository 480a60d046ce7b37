use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 播放器可调参数
///
/// 同步与恢复相关的阈值都是经验值，按实际设备调优，不要当成协议常量。
/// 全部字段带默认值，配置文件可以只写想覆盖的项。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 预解码的视频帧数 N（帧队列容量为 N，缓冲池为 N+1 块）
    pub video_buffer_frames: usize,
    /// 视频包队列容量
    pub video_packet_capacity: usize,
    /// 音频包队列容量
    pub audio_packet_capacity: usize,
    /// 音频环形缓冲时长（秒），按采样率×声道换算容量
    pub audio_ring_seconds: f32,
    /// 视频落后超过该值（微秒）时触发跳帧追赶
    pub catchup_lag_us: i64,
    /// 跳帧追赶时保留的提前量（微秒）
    pub catchup_slack_us: i64,
    /// 渲染睡眠上限（微秒），保证暂停/停止/Seek 能及时被观察到
    pub max_frame_delay_us: i64,
    /// 播放中帧队列耗尽时，单次再缓冲等待的上限（毫秒）。
    /// 音频在等待期间被暂停，超时就恢复流水线重试，避免上游背压卡死
    pub rebuffer_wait_ms: u64,
    /// 延迟量化掩码：清掉低位微秒，太短的睡眠只浪费上下文切换
    pub delay_quantum_mask: i64,
    /// 打开媒体源的连接超时（微秒）
    pub open_timeout_us: i64,
    /// 是否启用音频停摆死锁恢复（经验性保护，非协议保证）
    pub deadlock_recovery: bool,
    /// 标题浮层显示时长（秒）
    pub title_overlay_secs: u64,
    /// 音频重采样目标采样率
    pub target_sample_rate: u32,
    /// 音频重采样目标声道数
    pub target_channels: u16,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            video_buffer_frames: 10,
            video_packet_capacity: 1,
            audio_packet_capacity: 1,
            audio_ring_seconds: 2.0,
            catchup_lag_us: 100_000,
            catchup_slack_us: 10_000,
            max_frame_delay_us: 100_000,
            rebuffer_wait_ms: 500,
            delay_quantum_mask: 0xFF,
            open_timeout_us: 30_000_000,
            deadlock_recovery: true,
            title_overlay_secs: 15,
            target_sample_rate: 48_000,
            target_channels: 2,
        }
    }
}

impl PlayerConfig {
    /// 从 JSON 文件加载，缺失的字段用默认值补齐
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| crate::core::PlayerError::Other(format!("配置解析失败: {}", e)))
    }

    /// 音频环形缓冲容量（采样数，已含声道）
    pub fn audio_ring_samples(&self) -> usize {
        let secs = if self.audio_ring_seconds.is_finite() && self.audio_ring_seconds > 0.0 {
            self.audio_ring_seconds
        } else {
            2.0
        };
        let frames = (self.target_sample_rate as f32 * secs).ceil() as usize;
        frames.saturating_mul(self.target_channels as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = PlayerConfig::default();
        assert_eq!(cfg.video_buffer_frames, 10);
        assert_eq!(cfg.max_frame_delay_us, 100_000);
        assert_eq!(cfg.delay_quantum_mask, 0xFF);
        assert_eq!(cfg.audio_ring_samples(), 48_000 * 2 * 2);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let cfg: PlayerConfig = serde_json::from_str(r#"{"video_buffer_frames": 4}"#).unwrap();
        assert_eq!(cfg.video_buffer_frames, 4);
        assert_eq!(cfg.target_sample_rate, 48_000);
        assert!(cfg.deadlock_recovery);
    }

    #[test]
    fn test_bad_ring_seconds_falls_back() {
        let cfg = PlayerConfig {
            audio_ring_seconds: -1.0,
            ..Default::default()
        };
        assert_eq!(cfg.audio_ring_samples(), 48_000 * 2 * 2);
    }
}
