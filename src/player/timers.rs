use log::debug;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub type TimerId = u64;

type TimerCallback = Box<dyn FnOnce() + Send>;

struct TimerEntry {
    id: TimerId,
    deadline: Instant,
    callback: TimerCallback,
}

struct TimerState {
    entries: Vec<TimerEntry>,
    next_id: TimerId,
    quit: bool,
}

/// 一次性定时器服务
///
/// 单个工作线程按最早到期时间等待，到点取出回调在锁外执行。
/// 浮层文字的定时消隐用它，不占用播放管线的任何线程。
pub struct TimerService {
    inner: Arc<TimerInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct TimerInner {
    state: Mutex<TimerState>,
    cv: Condvar,
}

impl TimerService {
    pub fn new() -> Self {
        let inner = Arc::new(TimerInner {
            state: Mutex::new(TimerState {
                entries: Vec::new(),
                next_id: 1,
                quit: false,
            }),
            cv: Condvar::new(),
        });

        let worker_inner = inner.clone();
        let worker = thread::Builder::new()
            .name("timers".to_string())
            .spawn(move || Self::worker_loop(worker_inner))
            .expect("无法创建定时器线程");

        Self {
            inner,
            worker: Mutex::new(Some(worker)),
        }
    }

    fn worker_loop(inner: Arc<TimerInner>) {
        let mut state = inner.state.lock().unwrap();
        loop {
            if state.quit {
                break;
            }

            let now = Instant::now();

            // 取出全部已到期的条目，在锁外执行回调
            let mut due = Vec::new();
            let mut i = 0;
            while i < state.entries.len() {
                if state.entries[i].deadline <= now {
                    due.push(state.entries.swap_remove(i));
                } else {
                    i += 1;
                }
            }
            if !due.is_empty() {
                drop(state);
                for entry in due {
                    debug!("⏰ 定时器 {} 到期", entry.id);
                    (entry.callback)();
                }
                state = inner.state.lock().unwrap();
                continue;
            }

            // 等到最早的截止时间，没有条目就一直等
            match state.entries.iter().map(|e| e.deadline).min() {
                Some(earliest) => {
                    let timeout = earliest.saturating_duration_since(now);
                    let (next, _) = inner.cv.wait_timeout(state, timeout).unwrap();
                    state = next;
                }
                None => {
                    state = inner.cv.wait(state).unwrap();
                }
            }
        }
    }

    /// 注册一次性定时器，返回可用于取消的 id
    pub fn register<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.entries.push(TimerEntry {
            id,
            deadline: Instant::now() + delay,
            callback: Box::new(callback),
        });
        drop(state);
        self.inner.cv.notify_all();
        id
    }

    /// 取消定时器；已触发或不存在时返回 false
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        let before = state.entries.len();
        state.entries.retain(|e| e.id != id);
        let removed = state.entries.len() != before;
        drop(state);
        if removed {
            self.inner.cv.notify_all();
        }
        removed
    }

    /// 停止工作线程（未触发的定时器丢弃）
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.quit = true;
            state.entries.clear();
        }
        self.inner.cv.notify_all();
        if let Some(worker) = self.worker.lock().unwrap().take() {
            let _ = worker.join();
        }
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_oneshot_fires() {
        let timers = TimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        timers.register(Duration::from_millis(20), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(120));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let timers = TimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let id = timers.register(Duration::from_millis(50), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timers.cancel(id));
        thread::sleep(Duration::from_millis(120));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        // 再取消一次返回 false
        assert!(!timers.cancel(id));
    }

    #[test]
    fn test_ordering_of_two_timers() {
        let timers = TimerService::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        timers.register(Duration::from_millis(60), move || {
            o1.lock().unwrap().push("late");
        });
        timers.register(Duration::from_millis(20), move || {
            o2.lock().unwrap().push("early");
        });
        thread::sleep(Duration::from_millis(150));
        assert_eq!(*order.lock().unwrap(), vec!["early", "late"]);
    }
}
