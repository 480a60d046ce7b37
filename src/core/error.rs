use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("无法打开媒体源: {0}")]
    OpenError(String),

    #[error("媒体源中没有可解码的音视频流")]
    NoStreams,

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("Seek 失败: {0}")]
    SeekError(String),

    #[error("状态不允许该操作: {0}")]
    InvalidState(String),

    #[error("其他错误: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
