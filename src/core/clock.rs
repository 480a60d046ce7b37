use std::sync::{Arc, Mutex};
use std::time::Instant;

/// 系统参考时钟 - 无音频流时作为主时钟使用
///
/// 以单调时钟为基准，记录一个偏移量；暂停时冻结读数。
/// 读数在一次播放会话内单调不减，Seek/重置时例外。
#[derive(Clone)]
pub struct SystemClock {
    inner: Arc<Mutex<ClockInner>>,
}

struct ClockInner {
    base_us: i64,          // 基准位置（微秒）
    base_instant: Instant, // 基准时刻
    paused: bool,
    paused_at: i64, // 暂停时冻结的读数
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                base_us: 0,
                base_instant: Instant::now(),
                paused: false,
                paused_at: 0,
            })),
        }
    }

    /// 当前播放时间（微秒）
    pub fn now_us(&self) -> i64 {
        let inner = self.inner.lock().unwrap();
        Self::now_unlocked(&inner)
    }

    /// 重置参考点到指定位置（Seek / 首帧对齐时使用）
    pub fn set_us(&self, us: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.base_us = us;
        inner.base_instant = Instant::now();
        inner.paused_at = us;
    }

    /// 暂停：冻结读数
    pub fn pause(&self) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.paused {
            inner.paused_at = Self::now_unlocked(&inner);
            inner.paused = true;
        }
    }

    /// 恢复：从冻结值继续推进
    pub fn resume(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.paused {
            inner.base_us = inner.paused_at;
            inner.base_instant = Instant::now();
            inner.paused = false;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().unwrap().paused
    }

    fn now_unlocked(inner: &ClockInner) -> i64 {
        if inner.paused {
            inner.paused_at
        } else {
            inner.base_us + inner.base_instant.elapsed().as_micros() as i64
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_set_and_advance() {
        let clock = SystemClock::new();
        clock.set_us(5_000_000);
        let t0 = clock.now_us();
        assert!(t0 >= 5_000_000);
        thread::sleep(Duration::from_millis(30));
        let t1 = clock.now_us();
        assert!(t1 > t0);
        assert!(t1 - 5_000_000 >= 30_000);
    }

    #[test]
    fn test_pause_freezes_clock() {
        let clock = SystemClock::new();
        clock.set_us(0);
        thread::sleep(Duration::from_millis(20));
        clock.pause();
        let frozen = clock.now_us();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(clock.now_us(), frozen);

        // 恢复后时钟只推进恢复之后的时间，不包含暂停间隔
        clock.resume();
        thread::sleep(Duration::from_millis(20));
        let resumed = clock.now_us();
        assert!(resumed >= frozen + 20_000);
        assert!(resumed < frozen + 50_000 + 20_000);
    }

    #[test]
    fn test_monotonic_while_running() {
        let clock = SystemClock::new();
        let mut last = clock.now_us();
        for _ in 0..100 {
            let now = clock.now_us();
            assert!(now >= last);
            last = now;
        }
    }
}
