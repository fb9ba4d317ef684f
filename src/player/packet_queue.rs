use crate::core::Packet;
use log::debug;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// pop 的结果
#[derive(Debug, PartialEq, Eq)]
pub enum PopResult {
    /// 取到队首数据包（所有权交给调用方）
    Packet(Packet),
    /// 非阻塞模式下队列为空，稍后再试
    Empty,
    /// 队列已中止
    Aborted,
}

impl PopResult {
    pub fn into_packet(self) -> Option<Packet> {
        match self {
            PopResult::Packet(packet) => Some(packet),
            _ => None,
        }
    }
}

struct QueueInner {
    packets: VecDeque<Packet>,
    bytes: usize,
    abort: bool,
}

/// 线程安全的数据包 FIFO 队列
///
/// demuxer 线程 push，视频解码（前台线程）和音频解码（设备回调线程）pop。
/// 计数和字节数始终等于队列中所有数据包之和。
pub struct PacketQueue {
    name: &'static str,
    capacity: usize,
    inner: Mutex<QueueInner>,
    cond: Condvar,
}

impl PacketQueue {
    /// `capacity` 只作为背压阈值使用，push 本身从不阻塞
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            inner: Mutex::new(QueueInner {
                packets: VecDeque::new(),
                bytes: 0,
                abort: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// 入队并唤醒一个等待者
    pub fn push(&self, packet: Packet) {
        let mut inner = self.inner.lock();
        inner.bytes += packet.size();
        inner.packets.push_back(packet);
        self.cond.notify_one();
    }

    /// 出队
    ///
    /// - 中止后总是返回 `Aborted`
    /// - 非阻塞且为空时返回 `Empty`
    /// - 阻塞且为空时挂起，直到有数据或被中止
    pub fn pop(&self, block: bool) -> PopResult {
        let mut inner = self.inner.lock();
        loop {
            if inner.abort {
                return PopResult::Aborted;
            }
            if let Some(packet) = inner.packets.pop_front() {
                inner.bytes -= packet.size();
                return PopResult::Packet(packet);
            }
            if !block {
                return PopResult::Empty;
            }
            self.cond.wait(&mut inner);
        }
    }

    /// 丢弃全部数据包（seek / 切换轨道时使用）
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.packets.len();
        inner.packets.clear();
        inner.bytes = 0;
        if dropped > 0 {
            debug!("🧹 [{}] 清空 {} 个数据包", self.name, dropped);
        }
    }

    /// 设置中止标志并唤醒所有等待者（幂等）
    pub fn signal_abort(&self) {
        let mut inner = self.inner.lock();
        inner.abort = true;
        self.cond.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.lock().abort
    }

    pub fn len(&self) -> usize {
        self.inner.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 队列中数据包负载的总字节数
    pub fn byte_size(&self) -> usize {
        self.inner.lock().bytes
    }

    /// 是否已超过背压阈值
    pub fn is_over_capacity(&self) -> bool {
        self.len() > self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for PacketQueue {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn packet(pts: i64, len: usize) -> Packet {
        Packet::new(0, Some(pts), vec![0u8; len])
    }

    #[test]
    fn fifo_order_and_counters() {
        let queue = PacketQueue::new("test", 8);
        queue.push(packet(1, 10));
        queue.push(packet(2, 20));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.byte_size(), 30);

        let first = queue.pop(false).into_packet().unwrap();
        assert_eq!(first.pts, Some(1));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.byte_size(), 20);

        queue.push(packet(3, 5));
        assert_eq!(queue.pop(false).into_packet().unwrap().pts, Some(2));
        assert_eq!(queue.pop(false).into_packet().unwrap().pts, Some(3));
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.byte_size(), 0);
        assert_eq!(queue.pop(false), PopResult::Empty);
    }

    #[test]
    fn flush_resets_everything() {
        let queue = PacketQueue::new("test", 8);
        for i in 0..5 {
            queue.push(packet(i, 100));
        }
        queue.flush();
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.byte_size(), 0);
        assert_eq!(queue.pop(false), PopResult::Empty);
    }

    #[test]
    fn abort_wins_over_queued_packets() {
        let queue = PacketQueue::new("test", 8);
        queue.push(packet(1, 1));
        queue.signal_abort();
        queue.signal_abort();
        assert_eq!(queue.pop(false), PopResult::Aborted);
        assert_eq!(queue.pop(true), PopResult::Aborted);
        assert!(queue.is_aborted());
    }

    #[test]
    fn abort_unblocks_waiting_pop() {
        let queue = Arc::new(PacketQueue::new("test", 8));
        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let result = queue.pop(true);
                (result, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        queue.signal_abort();

        let (result, waited) = waiter.join().unwrap();
        assert_eq!(result, PopResult::Aborted);
        assert!(waited < Duration::from_secs(2));
    }

    #[test]
    fn blocking_pop_receives_later_push() {
        let queue = Arc::new(PacketQueue::new("test", 8));
        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop(true))
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(packet(42, 3));

        let got = waiter.join().unwrap().into_packet().unwrap();
        assert_eq!(got.pts, Some(42));
        assert!(queue.is_empty());
    }

    #[test]
    fn capacity_is_a_threshold() {
        let queue = PacketQueue::new("test", 2);
        queue.push(packet(0, 1));
        queue.push(packet(1, 1));
        assert!(!queue.is_over_capacity());
        queue.push(packet(2, 1));
        assert!(queue.is_over_capacity());
    }

    #[test]
    fn concurrent_producer_consumer_keeps_order() {
        let queue = Arc::new(PacketQueue::new("test", 1024));
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    queue.push(packet(i, (i % 7) as usize + 1));
                }
            })
        };

        let mut received = Vec::new();
        while received.len() < 500 {
            if let PopResult::Packet(p) = queue.pop(true) {
                received.push(p.pts.unwrap());
            }
        }
        producer.join().unwrap();

        let expected: Vec<i64> = (0..500).collect();
        assert_eq!(received, expected);
        assert_eq!(queue.byte_size(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(usize),
        Pop,
        Flush,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0usize..64).prop_map(Op::Push),
            2 => Just(Op::Pop),
            1 => Just(Op::Flush),
        ]
    }

    proptest! {
        /// 任意 push / pop / flush 序列下，队列与 VecDeque 模型保持一致
        #[test]
        fn matches_vecdeque_model(ops in proptest::collection::vec(op(), 1..200)) {
            let queue = PacketQueue::new("model", 16);
            let mut model: VecDeque<(i64, usize)> = VecDeque::new();
            let mut next_pts = 0;

            for op in ops {
                match op {
                    Op::Push(len) => {
                        queue.push(packet(next_pts, len));
                        model.push_back((next_pts, len));
                        next_pts += 1;
                    }
                    Op::Pop => {
                        let popped = queue.pop(false).into_packet().map(|p| (p.pts.unwrap(), p.size()));
                        prop_assert_eq!(popped, model.pop_front());
                    }
                    Op::Flush => {
                        queue.flush();
                        model.clear();
                    }
                }
                prop_assert_eq!(queue.len(), model.len());
                prop_assert_eq!(queue.byte_size(), model.iter().map(|(_, len)| len).sum::<usize>());
                prop_assert_eq!(queue.is_over_capacity(), model.len() > 16);
            }
        }
    }
}
