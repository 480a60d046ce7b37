use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// 队列操作结果：Closed 是正常的收尾信号，不是故障
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// 队列已关闭（流结束 / 停止播放）
    Closed,
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// 有界阻塞队列 - 流水线各阶段之间的交接通道
///
/// 契约：
/// - `put` 在队列满时阻塞；关闭后返回 `Closed`（物品随 Err 退还调用方释放）
/// - `get` 取出最旧一项，空时阻塞；空且已关闭时返回 `Closed`
/// - `peek` 返回最旧一项的克隆但不移除：渲染线程需要先看时间戳再决定是否消费
/// - `close` 幂等，唤醒所有阻塞的生产者和消费者
/// - `drain` 在一次加锁内取空队列，Seek 时用来原子清空
///
/// 单把锁保护内部状态，`not_empty` / `not_full` 两个条件变量分别对应
/// 两类等待者。设计上每个队列只有一个生产者和一个消费者，但类型本身
/// 对任意线程数都是安全的。
pub struct BoundedQueue<T> {
    inner: Mutex<QueueInner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

struct QueueInner<T> {
    items: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    /// 创建容量为 capacity 的队列（容量至少为 1）
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity.max(1)),
                capacity: capacity.max(1),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// 入队，队列满时阻塞。关闭后返回 `Err((Closed, item))`，物品退还调用方。
    pub fn put(&self, item: T) -> std::result::Result<(), (QueueError, T)> {
        let mut inner = self.inner.lock().unwrap();
        while inner.items.len() >= inner.capacity && !inner.closed {
            inner = self.not_full.wait(inner).unwrap();
        }
        if inner.closed {
            return Err((QueueError::Closed, item));
        }
        inner.items.push_back(item);
        drop(inner);
        self.not_empty.notify_all();
        Ok(())
    }

    /// 出队最旧一项，空时阻塞；空且关闭时返回 `Closed`
    pub fn get(&self) -> QueueResult<T> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(item) = inner.items.pop_front() {
                drop(inner);
                self.not_full.notify_all();
                return Ok(item);
            }
            if inner.closed {
                return Err(QueueError::Closed);
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// 非阻塞出队
    pub fn try_get(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        let item = inner.items.pop_front();
        if item.is_some() {
            drop(inner);
            self.not_full.notify_all();
        }
        item
    }

    /// 查看最旧一项但不移除，空时阻塞；空且关闭时返回 `Closed`
    pub fn peek(&self) -> QueueResult<T>
    where
        T: Clone,
    {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(item) = inner.items.front() {
                return Ok(item.clone());
            }
            if inner.closed {
                return Err(QueueError::Closed);
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// 非阻塞 peek
    pub fn try_peek(&self) -> Option<T>
    where
        T: Clone,
    {
        let inner = self.inner.lock().unwrap();
        inner.items.front().cloned()
    }

    /// 一次加锁内取空整个队列（Seek 时原子清空用）
    pub fn drain(&self) -> Vec<T> {
        let mut inner = self.inner.lock().unwrap();
        let items: Vec<T> = inner.items.drain(..).collect();
        drop(inner);
        self.not_full.notify_all();
        items
    }

    /// 关闭队列：幂等，唤醒所有等待者。是正常的流结束/停止信号。
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 等待队列填充到 target 项（或关闭）。
    /// 占用数每次变化时在锁外回调 progress(len)，供缓冲进度上报。
    /// 填满返回 true；先关闭则返回 false。
    pub fn wait_fill<F>(&self, target: usize, progress: F) -> bool
    where
        F: FnMut(usize),
    {
        self.wait_fill_cancel(target, progress, || false)
    }

    /// 同 wait_fill，但带截止时间：到点未填满返回 false。
    /// 音频暂停期间的再缓冲等待用它，避免上游被背压卡死时僵住。
    pub fn wait_fill_timeout<F>(&self, target: usize, timeout: std::time::Duration, mut progress: F) -> bool
    where
        F: FnMut(usize),
    {
        let deadline = std::time::Instant::now() + timeout;
        let mut last_len = usize::MAX;
        let mut inner = self.inner.lock().unwrap();
        loop {
            let len = inner.items.len();
            if len != last_len {
                drop(inner);
                last_len = len;
                progress(len);
                inner = self.inner.lock().unwrap();
                continue;
            }
            if len >= target {
                return true;
            }
            if inner.closed {
                return false;
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self
                .not_empty
                .wait_timeout(inner, deadline - now)
                .unwrap();
            inner = next;
        }
    }

    /// 同 wait_fill，另带取消谓词：入队唤醒时若谓词为真则提前返回。
    /// 渲染线程的再缓冲等待用它响应冲刷/退出信号。
    pub fn wait_fill_cancel<F, C>(&self, target: usize, mut progress: F, cancel: C) -> bool
    where
        F: FnMut(usize),
        C: Fn() -> bool,
    {
        let mut last_len = usize::MAX;
        loop {
            let mut inner = self.inner.lock().unwrap();
            loop {
                let len = inner.items.len();
                if len != last_len {
                    // 在锁外回调，避免上报路径反过来拿锁
                    drop(inner);
                    last_len = len;
                    progress(len);
                    inner = self.inner.lock().unwrap();
                    continue;
                }
                if len >= target {
                    return true;
                }
                if inner.closed {
                    return false;
                }
                drop(inner);
                if cancel() {
                    return false;
                }
                inner = self.inner.lock().unwrap();
                if inner.items.len() != last_len || inner.closed {
                    break; // 状态已变化，重新评估
                }
                inner = self.not_empty.wait(inner).unwrap();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let q = BoundedQueue::new(4);
        q.put(1).unwrap();
        q.put(2).unwrap();
        q.put(3).unwrap();
        assert_eq!(q.get(), Ok(1));
        assert_eq!(q.get(), Ok(2));
        assert_eq!(q.get(), Ok(3));
    }

    #[test]
    fn test_capacity_never_exceeded() {
        for capacity in 1..=4usize {
            let q = Arc::new(BoundedQueue::new(capacity));
            let producer = {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        if q.put(i).is_err() {
                            break;
                        }
                    }
                })
            };
            let consumer = {
                let q = q.clone();
                thread::spawn(move || {
                    let mut last = -1;
                    while let Ok(v) = q.get() {
                        assert!(v > last); // 顺序保持
                        last = v;
                        assert!(q.len() <= capacity); // 占用数不超过容量
                    }
                    last
                })
            };
            producer.join().unwrap();
            q.close();
            assert_eq!(consumer.join().unwrap(), 99);
        }
    }

    #[test]
    fn test_put_blocks_until_get() {
        let q = Arc::new(BoundedQueue::new(1));
        q.put(1).unwrap();

        let q2 = q.clone();
        let producer = thread::spawn(move || {
            // 队列已满，这里会阻塞直到消费者取走一项
            q2.put(2).unwrap();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());
        assert_eq!(q.get(), Ok(1));
        producer.join().unwrap();
        assert_eq!(q.get(), Ok(2));
    }

    #[test]
    fn test_close_releases_blocked_consumer() {
        let q: Arc<BoundedQueue<i32>> = Arc::new(BoundedQueue::new(4));
        let q2 = q.clone();
        let consumer = thread::spawn(move || q2.get());

        thread::sleep(Duration::from_millis(30));
        q.close();
        assert_eq!(consumer.join().unwrap(), Err(QueueError::Closed));

        // 关闭后 put 一律失败，物品退还
        match q.put(7) {
            Err((QueueError::Closed, item)) => assert_eq!(item, 7),
            _ => panic!("关闭后 put 应当失败"),
        }
    }

    #[test]
    fn test_close_releases_blocked_producer() {
        let q = Arc::new(BoundedQueue::new(1));
        q.put(1).unwrap();
        let q2 = q.clone();
        let producer = thread::spawn(move || q2.put(2));
        thread::sleep(Duration::from_millis(30));
        q.close();
        assert!(producer.join().unwrap().is_err());
    }

    #[test]
    fn test_get_drains_before_closed() {
        // 关闭后已有的数据仍能取完，之后才返回 Closed
        let q = BoundedQueue::new(4);
        q.put(1).unwrap();
        q.put(2).unwrap();
        q.close();
        assert_eq!(q.get(), Ok(1));
        assert_eq!(q.get(), Ok(2));
        assert_eq!(q.get(), Err(QueueError::Closed));
    }

    #[test]
    fn test_peek_does_not_remove() {
        let q = BoundedQueue::new(2);
        q.put(42).unwrap();
        assert_eq!(q.peek(), Ok(42));
        assert_eq!(q.len(), 1);
        assert_eq!(q.get(), Ok(42));
    }

    #[test]
    fn test_drain_empties_atomically() {
        let q = BoundedQueue::new(8);
        for i in 0..5 {
            q.put(i).unwrap();
        }
        let drained = q.drain();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(q.is_empty());
        assert!(!q.is_closed()); // drain 不关闭队列
    }

    #[test]
    fn test_wait_fill() {
        let q = Arc::new(BoundedQueue::new(8));
        let q2 = q.clone();
        let producer = thread::spawn(move || {
            for i in 0..5 {
                thread::sleep(Duration::from_millis(5));
                q2.put(i).unwrap();
            }
        });

        let mut seen = Vec::new();
        let filled = q.wait_fill(5, |n| seen.push(n));
        assert!(filled);
        assert_eq!(q.len(), 5);
        assert_eq!(*seen.last().unwrap(), 5);
        producer.join().unwrap();

        // 关闭后 wait_fill 返回 false
        let q3: BoundedQueue<i32> = BoundedQueue::new(8);
        q3.close();
        assert!(!q3.wait_fill(1, |_| {}));
    }
}
