//! Exchange tests - concurrent writers, readers and pollers on one device
//!
//! Usage:
//!   cargo test --release --test exchange_test -- --nocapture

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use scd::relay::copy_to_channel;
use scd::{
    AccessMode, ControlOp, Device, DeviceConfig, Interest, OpenFlags, PollEntry, Poller,
    ScdError, Session, DEFAULT_CAPACITY,
};

const READ_CHUNK: usize = 1000;

fn device() -> Device {
    Device::new(DeviceConfig::default()).unwrap()
}

/// Deterministic payload so a misplaced byte shows up as a mismatch
fn pattern(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (state >> 56) as u8
        })
        .collect()
}

fn read_exactly(session: &Session, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut buf = [0u8; READ_CHUNK];
    while out.len() < len {
        let want = (len - out.len()).min(READ_CHUNK);
        let n = session.read(&mut buf[..want]).unwrap();
        assert!(n >= 1);
        out.extend_from_slice(&buf[..n]);
    }
    out
}

/// Transfer counters shared between threads
struct ExchangeStats {
    reads: AtomicU64,
    bytes: AtomicU64,
}

impl ExchangeStats {
    fn new() -> Self {
        Self {
            reads: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    fn record_read(&self, n: usize) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(n as u64, Ordering::Relaxed);
    }
}

#[test]
fn test_read_write() {
    let dev = device();
    let session = dev
        .open(0, AccessMode::ReadWrite, OpenFlags::empty())
        .unwrap();
    let text = b"Test";

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            assert_eq!(session.write(text).unwrap(), text.len());
        });

        let mut buf = [0u8; 100];
        let n = session.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], text);
    });
}

#[test]
fn test_concurrent_exchange_sizes() {
    for &len in &[1usize, 100, 16384, 16385, 32768, 32769, 65536, 65537] {
        let dev = device();
        let reader = dev
            .open(0, AccessMode::ReadOnly, OpenFlags::empty())
            .unwrap();
        let writer = dev
            .open(0, AccessMode::WriteOnly, OpenFlags::empty())
            .unwrap();
        let data = pattern(len, len as u64);
        let stats = ExchangeStats::new();

        let received = thread::scope(|s| {
            let consumer = s.spawn(|| {
                let mut out = Vec::with_capacity(len);
                let mut buf = [0u8; READ_CHUNK];
                while out.len() < len {
                    let n = reader.read(&mut buf).unwrap();
                    stats.record_read(n);
                    out.extend_from_slice(&buf[..n]);
                }
                out
            });

            let sent = copy_to_channel(&data[..], &writer).unwrap();
            assert_eq!(sent, len as u64);
            consumer.join().unwrap()
        });

        assert_eq!(received.len(), len, "length mismatch for {}", len);
        assert!(received == data, "content mismatch for {}", len);
        assert_eq!(stats.bytes.load(Ordering::Relaxed), len as u64);
        assert!(stats.reads.load(Ordering::Relaxed) >= (len / READ_CHUNK) as u64);
    }
}

#[test]
fn test_fifo_order_across_writes() {
    let dev = device();
    let session = dev
        .open(0, AccessMode::ReadWrite, OpenFlags::NONBLOCK)
        .unwrap();

    let mut expected = Vec::new();
    for i in 0..50u64 {
        let part = pattern(97, i);
        assert_eq!(session.write(&part).unwrap(), part.len());
        expected.extend_from_slice(&part);
    }

    assert_eq!(read_exactly(&session, expected.len()), expected);
    assert!(matches!(
        session.read(&mut [0u8; 8]),
        Err(ScdError::WouldBlock)
    ));
}

#[test]
fn test_round_trip_under_wrap() {
    let dev = device();
    let session = dev
        .open(0, AccessMode::ReadWrite, OpenFlags::NONBLOCK)
        .unwrap();
    let full = DEFAULT_CAPACITY - 1;
    let data = pattern(full, 7);

    assert_eq!(session.write(&data).unwrap(), full);
    assert_eq!(session.readiness(), Interest::READABLE);

    let half = full / 2;
    let mut out = read_exactly(&session, half);
    assert_eq!(session.write(&data[..half]).unwrap(), half);
    out.extend(read_exactly(&session, full));

    let mut expected = data.clone();
    expected.extend_from_slice(&data[..half]);
    assert_eq!(out, expected);
}

#[test]
fn test_nonblocking_full_and_empty() {
    let dev = device();
    let session = dev
        .open(0, AccessMode::ReadWrite, OpenFlags::NONBLOCK)
        .unwrap();
    let mut buf = [0u8; 16];

    let start = Instant::now();
    assert!(matches!(session.read(&mut buf), Err(ScdError::WouldBlock)));

    let data = pattern(DEFAULT_CAPACITY + 10, 3);
    assert_eq!(session.write(&data).unwrap(), DEFAULT_CAPACITY - 1);
    assert!(matches!(session.write(&data), Err(ScdError::WouldBlock)));
    assert!(start.elapsed() < Duration::from_secs(1));

    // nothing was lost or added by the refused calls
    assert_eq!(
        read_exactly(&session, DEFAULT_CAPACITY - 1),
        data[..DEFAULT_CAPACITY - 1]
    );
}

#[test]
fn test_switch_blocking_mode_after_open() {
    let dev = device();
    let session = dev
        .open(0, AccessMode::ReadWrite, OpenFlags::empty())
        .unwrap();
    assert!(!session.is_nonblocking());
    let mut buf = [0u8; 16];

    session.set_nonblocking(true);
    assert!(session.is_nonblocking());
    let start = Instant::now();
    assert!(matches!(session.read(&mut buf), Err(ScdError::WouldBlock)));
    assert!(start.elapsed() < Duration::from_secs(1));

    session.set_nonblocking(false);
    let done = AtomicBool::new(false);
    thread::scope(|s| {
        let reader = s.spawn(|| {
            let n = session.read(&mut buf).unwrap();
            done.store(true, Ordering::Release);
            buf[..n].to_vec()
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::Acquire), "reader did not block");

        assert_eq!(session.write(b"late").unwrap(), 4);
        assert_eq!(reader.join().unwrap(), b"late");
    });
}

#[test]
fn test_blocked_writer_wakes_after_read() {
    let dev = device();
    let session = dev
        .open(0, AccessMode::ReadWrite, OpenFlags::empty())
        .unwrap();
    let data = pattern(DEFAULT_CAPACITY - 1, 11);
    assert_eq!(session.write(&data).unwrap(), data.len());

    let done = AtomicBool::new(false);
    thread::scope(|s| {
        let writer = s.spawn(|| {
            let n = session.write(b"more").unwrap();
            done.store(true, Ordering::Release);
            n
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::Acquire), "writer did not block");

        let mut buf = [0u8; 8];
        assert_eq!(session.read(&mut buf).unwrap(), 8);
        assert_eq!(writer.join().unwrap(), 4);
    });
}

#[test]
fn test_interrupt_blocked_writer() {
    let dev = device();
    let session = dev
        .open(0, AccessMode::ReadWrite, OpenFlags::empty())
        .unwrap();
    let data = pattern(DEFAULT_CAPACITY - 1, 5);
    session.write(&data).unwrap();
    let interrupter = session.interrupter();

    thread::scope(|s| {
        let writer = s.spawn(|| session.write(b"blocked"));
        thread::sleep(Duration::from_millis(30));
        interrupter.interrupt();
        assert!(matches!(writer.join().unwrap(), Err(ScdError::Interrupted)));
    });

    assert_eq!(dev.stats(0).unwrap().bytes_written, data.len() as u64);
}

#[test]
fn test_poll_read() {
    let dev = device();
    let session = dev
        .open(0, AccessMode::ReadWrite, OpenFlags::empty())
        .unwrap();
    let keep_writing = AtomicBool::new(true);
    let text = b"Test";

    thread::scope(|s| {
        s.spawn(|| {
            while keep_writing.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(50));
                if keep_writing.load(Ordering::Acquire) {
                    session.write(text).unwrap();
                }
            }
        });

        let ready = session
            .poll(Interest::READABLE, Some(Duration::from_secs(10)))
            .unwrap();
        keep_writing.store(false, Ordering::Release);

        assert!(ready.contains(Interest::READABLE));
        let mut buf = [0u8; 100];
        let n = session.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], text);
    });
}

#[test]
fn test_poll_write() {
    let dev = device();
    let session = dev
        .open(0, AccessMode::ReadWrite, OpenFlags::empty())
        .unwrap();
    let text = b"Test";

    thread::scope(|s| {
        s.spawn(|| {
            let ready = session
                .poll(Interest::WRITABLE, Some(Duration::from_secs(10)))
                .unwrap();
            assert!(ready.contains(Interest::WRITABLE));
            assert_eq!(session.write(text).unwrap(), text.len());
        });

        let mut buf = [0u8; 100];
        let n = session.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], text);
    });
}

#[test]
fn test_poll_many_sessions() {
    let dev = Device::new(DeviceConfig {
        channel_count: 4,
        default_capacity: 8,
        ..DeviceConfig::default()
    })
    .unwrap();
    let readers: Vec<Session> = (0..4)
        .map(|i| dev.open(i, AccessMode::ReadOnly, OpenFlags::empty()).unwrap())
        .collect();
    let writer = Arc::new(
        dev.open_path("scd3", AccessMode::WriteOnly, OpenFlags::empty())
            .unwrap(),
    );

    let remote = Arc::clone(&writer);
    let t = thread::spawn(move || {
        thread::sleep(Duration::from_millis(40));
        remote.write(b"x").unwrap();
    });

    let poller = Poller::new();
    let mut entries: Vec<PollEntry<'_>> = readers
        .iter()
        .map(|r| PollEntry::new(r, Interest::READABLE))
        .collect();
    let ready = poller
        .poll(&mut entries, Some(Duration::from_secs(10)))
        .unwrap();
    t.join().unwrap();

    assert_eq!(ready, 1);
    let ready_minors: Vec<usize> = entries
        .iter()
        .zip(&readers)
        .filter(|(e, _)| e.is_ready())
        .map(|(_, r)| r.minor())
        .collect();
    assert_eq!(ready_minors, vec![3]);
}

#[test]
fn test_capacity_control_cycle() {
    let dev = device();
    let session = dev
        .open(0, AccessMode::ReadOnly, OpenFlags::empty())
        .unwrap();

    assert_eq!(session.control(ControlOp::GetCapacity).unwrap(), DEFAULT_CAPACITY);
    session.control(ControlOp::SetCapacity(0x4000)).unwrap();
    assert_eq!(session.control(ControlOp::GetCapacity).unwrap(), 0x4000);
    assert_eq!(session.buffer_capacity(), DEFAULT_CAPACITY);

    // a second open sees the new setting but shares the old buffer
    let second = dev
        .open(0, AccessMode::ReadOnly, OpenFlags::empty())
        .unwrap();
    assert_eq!(second.control(ControlOp::GetCapacity).unwrap(), 0x4000);
    assert_eq!(second.buffer_capacity(), DEFAULT_CAPACITY);
    drop(second);
    drop(session);

    let session = dev
        .open(0, AccessMode::ReadWrite, OpenFlags::NONBLOCK)
        .unwrap();
    assert_eq!(session.control(ControlOp::GetCapacity).unwrap(), 0x4000);
    assert_eq!(session.buffer_capacity(), 0x4000);
    assert_eq!(session.write(&pattern(0x8000, 1)).unwrap(), 0x4000 - 1);

    session.control(ControlOp::ResetCapacity).unwrap();
    assert_eq!(session.control(ControlOp::GetCapacity).unwrap(), DEFAULT_CAPACITY);
    assert_eq!(session.buffer_capacity(), 0x4000);
    drop(session);
    let session = dev
        .open(0, AccessMode::ReadOnly, OpenFlags::empty())
        .unwrap();
    assert_eq!(session.control(ControlOp::GetCapacity).unwrap(), DEFAULT_CAPACITY);
}

#[test]
fn test_io_traits() {
    use std::io::{Read, Write};

    let dev = device();
    let mut session = dev
        .open(0, AccessMode::ReadWrite, OpenFlags::NONBLOCK)
        .unwrap();

    Write::write_all(&mut session, b"through std::io").unwrap();
    let mut buf = [0u8; 15];
    Read::read_exact(&mut session, &mut buf).unwrap();
    assert_eq!(&buf, b"through std::io");

    let err = Read::read(&mut session, &mut buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
}
