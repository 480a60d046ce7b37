use crate::core::{pts_to_us, ChapterInfo, MediaInfo, PlayerError, Result, TimeBase};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info};

/// 数据包所属的流类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

/// 解封装器 - 打开媒体源并分离音视频流
///
/// 一次播放会话内由解析线程独占持有，会话结束随线程一起销毁。
pub struct Demuxer {
    input_ctx: format::context::Input,
    video_stream_index: Option<usize>,
    audio_stream_index: Option<usize>,
    media_info: MediaInfo,
}

impl Demuxer {
    /// 打开媒体源（本地路径或 URL），带连接超时
    pub fn open(path: &str, open_timeout_us: i64) -> Result<Self> {
        info!("正在打开媒体源: {}", path);

        let mut options = ffmpeg::Dictionary::new();
        options.set("timeout", &open_timeout_us.to_string());

        let input_ctx = format::input_with_dictionary(&path, options)
            .map_err(|e| PlayerError::OpenError(format!("{}: {}", path, e)))?;

        // 选出最合适的音视频流；其余流的包之后直接丢弃
        let video_stream_index = input_ctx
            .streams()
            .best(media::Type::Video)
            .map(|s| s.index());

        let audio_stream_index = input_ctx
            .streams()
            .best(media::Type::Audio)
            .map(|s| s.index());

        // 两类流都没有才算启动失败，单流媒体可以正常播放
        if video_stream_index.is_none() && audio_stream_index.is_none() {
            return Err(PlayerError::NoStreams);
        }

        debug!("视频流索引: {:?}", video_stream_index);
        debug!("音频流索引: {:?}", audio_stream_index);

        let mut demuxer = Self {
            input_ctx,
            video_stream_index,
            audio_stream_index,
            media_info: MediaInfo::default(),
        };
        demuxer.media_info = demuxer.extract_media_info(path);

        Ok(demuxer)
    }

    /// 提取媒体描述（标题、时长、章节），打开时一次性完成
    fn extract_media_info(&self, path: &str) -> MediaInfo {
        let title = self
            .input_ctx
            .metadata()
            .get("title")
            .map(|t| t.to_string());

        // input duration 本身就是微秒
        let duration_us = self.input_ctx.duration().max(0);

        let chapters: Vec<ChapterInfo> = self
            .input_ctx
            .chapters()
            .map(|ch| {
                let tb = ch.time_base();
                let tb = TimeBase::new(tb.numerator(), tb.denominator());
                ChapterInfo {
                    start_us: pts_to_us(ch.start(), tb),
                    end_us: pts_to_us(ch.end(), tb),
                    title: ch.metadata().get("title").map(|t| t.to_string()),
                }
            })
            .collect();

        if !chapters.is_empty() {
            info!("📖 共 {} 个章节", chapters.len());
        }

        MediaInfo {
            path: path.to_string(),
            title,
            duration_us,
            chapters,
            has_video: self.video_stream_index.is_some(),
            has_audio: self.audio_stream_index.is_some(),
        }
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    /// 获取视频流（用于打开解码器）
    pub fn video_stream(&self) -> Option<format::stream::Stream> {
        self.video_stream_index
            .and_then(|idx| self.input_ctx.stream(idx))
    }

    /// 获取音频流
    pub fn audio_stream(&self) -> Option<format::stream::Stream> {
        self.audio_stream_index
            .and_then(|idx| self.input_ctx.stream(idx))
    }

    /// 读取下一个数据包，按流类别打标；未选中的流直接跳过
    /// 返回 None 表示读到流末尾
    pub fn read_packet(&mut self) -> Result<Option<(ffmpeg::Packet, StreamKind)>> {
        loop {
            match self.input_ctx.packets().next() {
                Some((stream, packet)) => {
                    let index = stream.index();
                    if Some(index) == self.video_stream_index {
                        return Ok(Some((packet, StreamKind::Video)));
                    } else if Some(index) == self.audio_stream_index {
                        return Ok(Some((packet, StreamKind::Audio)));
                    }
                    // 其他流的包丢弃，继续读
                }
                None => return Ok(None),
            }
        }
    }

    /// Seek 到指定位置（微秒）
    /// backward 表示目标在当前位置之前，提示底层往前找关键帧
    pub fn seek(&mut self, target_us: i64, backward: bool) -> Result<()> {
        if backward {
            self.input_ctx.seek(target_us, ..target_us)?;
        } else {
            self.input_ctx.seek(target_us, target_us..)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::runtime::ensure_ffmpeg;

    #[test]
    fn test_open_missing_file_fails() {
        ensure_ffmpeg();
        let result = Demuxer::open("/definitely/not/a/file.mp4", 1_000_000);
        assert!(matches!(result, Err(PlayerError::OpenError(_))));
    }
}
