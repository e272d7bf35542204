mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;

use ceserver_dma::memory::{choose_strategy, Strategy};
use ceserver_dma::EngineConfig;
use common::*;

const WAIT: Duration = Duration::from_secs(5);

fn cfg() -> EngineConfig {
    EngineConfig::default()
}

#[test]
fn small_batches_read_sequentially() -> Result<()> {
    let backend = Arc::new(CountingBackend::new(sample_target()));
    let engine = engine_over(
        backend.clone(),
        EngineConfig {
            scatter_threshold: 8,
            ..cfg()
        },
    );

    let readers: Vec<_> = (0..4u64)
        .map(|i| {
            let e = engine.clone();
            thread::spawn(move || e.read(EXPLORER_PID, HEAP_BASE + i * 64, 16))
        })
        .collect();
    assert!(wait_until(WAIT, || engine.backlog_len() == 4));
    engine.start()?;
    for r in readers {
        assert_eq!(r.join().unwrap().bytes_read, 16);
    }

    assert_eq!(choose_strategy(4, 8), Strategy::Sequential);
    assert_eq!(backend.reads.load(Ordering::SeqCst), 4);
    assert_eq!(backend.scatters.load(Ordering::SeqCst), 0);
    assert_eq!(engine.stats().sequential_batches, 1);
    engine.shutdown();
    Ok(())
}

#[test]
fn random_reads_respect_item_limit() -> Result<()> {
    let backend = Arc::new(CountingBackend::new(sample_target()));
    let engine = engine_over(
        backend.clone(),
        EngineConfig {
            max_dispatch_size: 8,
            ..cfg()
        },
    );

    let mut rng = oorandom::Rand32::new(0x5eed);
    let n = 50u64;
    let readers: Vec<_> = (0..n)
        .map(|i| {
            let addr = HEAP_BASE + i * 32 + rng.rand_range(0..16) as u64;
            let size = rng.rand_range(1..17) as usize;
            let e = engine.clone();
            thread::spawn(move || (addr, size, e.read(EXPLORER_PID, addr, size)))
        })
        .collect();
    assert!(wait_until(WAIT, || engine.stats().requests == n));

    engine.start()?;
    for r in readers {
        let (addr, size, out) = r.join().unwrap();
        assert_eq!(out.bytes_read, size);
        for (k, b) in out.data.iter().enumerate() {
            assert_eq!(*b, heap_byte(addr + k as u64), "addr={:#x} k={}", addr, k);
        }
    }

    let s = engine.stats();
    assert!(s.max_batch_items <= 8, "max batch {}", s.max_batch_items);
    assert!(s.batches >= 7, "batches {}", s.batches);
    assert_eq!(s.items_served, n);
    engine.shutdown();
    Ok(())
}

#[test]
fn byte_budget_splits_batches() -> Result<()> {
    let backend = Arc::new(CountingBackend::new(sample_target()));
    let engine = engine_over(
        backend.clone(),
        EngineConfig {
            max_dispatch_bytes: 64,
            ..cfg()
        },
    );

    let readers: Vec<_> = (0..8u64)
        .map(|i| {
            let e = engine.clone();
            thread::spawn(move || e.read(EXPLORER_PID, HEAP_BASE + i * 0x40, 32))
        })
        .collect();
    assert!(wait_until(WAIT, || engine.backlog_len() == 8));

    // больше бюджета целиком: отказ без обращения к backend'у
    let big = engine.read(EXPLORER_PID, HEAP_BASE, 100);
    assert_eq!(big.bytes_read, 0);
    assert_eq!(engine.stats().rejected, 1);

    engine.start()?;
    for r in readers {
        assert_eq!(r.join().unwrap().bytes_read, 32);
    }
    let s = engine.stats();
    assert!(s.max_batch_items <= 2, "max batch {}", s.max_batch_items);
    assert!(s.batches >= 4);
    engine.shutdown();
    Ok(())
}
