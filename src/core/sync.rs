use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// 条件变量同步的布尔标志
///
/// 用于替代"定时睡眠轮询某个标志"的等待方式：冲刷完成、线程就绪、
/// 状态迁移等都各自等在自己的标志上，置位/清零时精确唤醒。
pub struct Flag {
    state: Mutex<bool>,
    cv: Condvar,
}

impl Flag {
    pub fn new(initial: bool) -> Self {
        Self {
            state: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }

    pub fn set(&self) {
        let mut state = self.state.lock().unwrap();
        *state = true;
        drop(state);
        self.cv.notify_all();
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        *state = false;
        drop(state);
        self.cv.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.state.lock().unwrap()
    }

    /// 阻塞等待标志被置位
    pub fn wait_set(&self) {
        let mut state = self.state.lock().unwrap();
        while !*state {
            state = self.cv.wait(state).unwrap();
        }
    }

    /// 阻塞等待标志被清零
    pub fn wait_clear(&self) {
        let mut state = self.state.lock().unwrap();
        while *state {
            state = self.cv.wait(state).unwrap();
        }
    }

    /// 带超时等待置位，超时返回 false
    pub fn wait_set_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        while !*state {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self.cv.wait_timeout(state, deadline - now).unwrap();
            state = next;
        }
        true
    }
}

/// 启动屏障 - 解析线程与各阶段线程的会合点
///
/// 每个被拉起的线程恰好 signal 一次（带成功/失败结果），
/// 启动方阻塞等待该结果。保证编解码器就绪之前不会路由任何数据包。
pub struct StartGate {
    state: Mutex<Option<bool>>,
    cv: Condvar,
}

impl StartGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    /// 阶段线程上报就绪结果（true = 就绪，false = 启动失败）
    pub fn signal(&self, ok: bool) {
        let mut state = self.state.lock().unwrap();
        *state = Some(ok);
        drop(state);
        self.cv.notify_all();
    }

    /// 启动方等待阶段上报，返回其结果
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(ok) = *state {
                return ok;
            }
            state = self.cv.wait(state).unwrap();
        }
    }

    /// 复用前重置
    pub fn reset(&self) {
        *self.state.lock().unwrap() = None;
    }
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_flag_set_wakes_waiter() {
        let flag = Arc::new(Flag::new(false));
        let f2 = flag.clone();
        let waiter = thread::spawn(move || f2.wait_set());
        thread::sleep(Duration::from_millis(20));
        flag.set();
        waiter.join().unwrap();
        assert!(flag.is_set());
    }

    #[test]
    fn test_flag_clear_wakes_waiter() {
        let flag = Arc::new(Flag::new(true));
        let f2 = flag.clone();
        let waiter = thread::spawn(move || f2.wait_clear());
        thread::sleep(Duration::from_millis(20));
        flag.clear();
        waiter.join().unwrap();
    }

    #[test]
    fn test_flag_wait_timeout() {
        let flag = Flag::new(false);
        assert!(!flag.wait_set_timeout(Duration::from_millis(30)));
        flag.set();
        assert!(flag.wait_set_timeout(Duration::from_millis(30)));
    }

    #[test]
    fn test_start_gate() {
        let gate = Arc::new(StartGate::new());
        let g2 = gate.clone();
        let stage = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            g2.signal(true);
        });
        assert!(gate.wait());
        stage.join().unwrap();

        gate.reset();
        let g3 = gate.clone();
        let failed_stage = thread::spawn(move || g3.signal(false));
        assert!(!gate.wait());
        failed_stage.join().unwrap();
    }
}
