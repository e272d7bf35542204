mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;

use ceserver_dma::EngineConfig;
use common::*;

#[test]
fn write_returns_length_and_is_visible() -> Result<()> {
    let backend = Arc::new(CountingBackend::new(sample_target()));
    let engine = engine_over(backend.clone(), EngineConfig::default());
    engine.start()?;

    assert_eq!(engine.write(CHROME_PID, 0x40_0008, &[1, 2, 3])?, 3);
    let out = engine.read(CHROME_PID, 0x40_0006, 6);
    assert_eq!(out.data, vec![0x42, 0x42, 1, 2, 3, 0x42]);

    assert!(engine.write(CHROME_PID, 0x50_0000, &[0]).is_err());
    assert!(engine.write(999, 0x40_0000, &[0]).is_err());
    assert_eq!(backend.writes.load(Ordering::SeqCst), 3);
    engine.shutdown();
    Ok(())
}

#[test]
fn writes_never_overlap_read_batches() -> Result<()> {
    let backend = Arc::new(CountingBackend::new(sample_target()).with_delay(Duration::from_millis(2)));
    let engine = engine_over(
        backend.clone(),
        EngineConfig {
            dispatch_build_time: Duration::from_micros(200),
            backoff_extend: Duration::from_micros(100),
            ..EngineConfig::default()
        },
    );
    engine.start()?;

    let mut threads = Vec::new();
    for t in 0..4u64 {
        let e = engine.clone();
        threads.push(thread::spawn(move || {
            for i in 0..10u64 {
                let addr = HEAP_BASE + (t * 10 + i) * 16;
                let out = e.read(EXPLORER_PID, addr, 16);
                assert_eq!(out.bytes_read, 16);
            }
        }));
    }
    for w in 0..2u8 {
        let e = engine.clone();
        threads.push(thread::spawn(move || {
            for i in 0..10u8 {
                let n = e.write(CHROME_PID, 0x40_0000 + w as u64 * 8, &[w, i]).unwrap();
                assert_eq!(n, 2);
            }
        }));
    }
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(backend.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(backend.writes.load(Ordering::SeqCst), 20);
    engine.shutdown();
    Ok(())
}
