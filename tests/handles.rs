use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use anyhow::Result;

use ceserver_dma::model::{MemoryRegion, ProcessInfo, VadEntry};
use ceserver_dma::HandleTable;

fn procs() -> Vec<ProcessInfo> {
    vec![
        ProcessInfo::new("explorer.exe", 123),
        ProcessInfo::new("chrome.exe", 124),
    ]
}

fn regions() -> Vec<MemoryRegion> {
    vec![
        MemoryRegion::from(&VadEntry::new(0x1000, 0x1fff).with_text("a.dll")),
        MemoryRegion::from(&VadEntry::new(0x3000, 0x3fff).with_text("b.dll")),
    ]
}

#[test]
fn handles_unique_under_contention() -> Result<()> {
    let table = Arc::new(HandleTable::new());
    let threads: Vec<_> = (0..8)
        .map(|_| {
            let t = table.clone();
            thread::spawn(move || {
                let mut got = Vec::with_capacity(500);
                for i in 0..500 {
                    let h = match i % 3 {
                        0 => t.generate_handle(),
                        1 => t.store_open_process(7),
                        _ => t.store_process_snapshot(Vec::new()),
                    };
                    got.push(h);
                }
                got
            })
        })
        .collect();

    let mut all = HashSet::new();
    for th in threads {
        let got = th.join().unwrap();
        // внутри одного потока хэндлы строго растут
        assert!(got.windows(2).all(|w| w[0] < w[1]));
        for h in got {
            assert!(all.insert(h), "duplicate handle {}", h);
        }
    }
    assert_eq!(all.len(), 8 * 500);
    assert_eq!(*all.iter().min().unwrap(), 1);
    Ok(())
}

#[test]
fn process_iteration_end_is_sticky_until_reset() -> Result<()> {
    let t = HandleTable::new();
    let h = t.store_process_snapshot(procs());

    assert_eq!(t.next_process_entry(h).map(|p| p.pid), Some(123));
    assert_eq!(t.next_process_entry(h).map(|p| p.pid), Some(124));
    assert_eq!(t.next_process_entry(h), None);
    assert_eq!(t.next_process_entry(h), None);

    t.reset_process_cursor(h);
    assert_eq!(t.next_process_entry(h).map(|p| p.name), Some("explorer.exe".to_string()));

    // неизвестный хэндл: просто None
    assert_eq!(t.next_process_entry(h + 100), None);
    t.reset_process_cursor(h + 100);
    Ok(())
}

#[test]
fn close_removes_every_kind() -> Result<()> {
    let t = HandleTable::new();
    let h = t.store_module_snapshot(regions());
    t.store_process_snapshot_at(h, procs());
    assert!(t.has_module_snapshot(h));
    assert!(t.has_process_snapshot(h));

    assert_eq!(t.next_memory_region(h).map(|r| r.name), Some("a.dll".to_string()));
    t.close_handle(h);
    assert!(!t.has_module_snapshot(h));
    assert!(!t.has_process_snapshot(h));
    assert_eq!(t.next_memory_region(h), None);
    assert_eq!(t.counts(), (0, 0, 0));

    // повторное закрытие — no-op
    t.close_handle(h);
    Ok(())
}

#[test]
fn snapshot_at_replaces_and_rewinds() -> Result<()> {
    let t = HandleTable::new();
    let h = t.store_process_snapshot(procs());
    t.next_process_entry(h);
    t.store_process_snapshot_at(h, vec![ProcessInfo::new("notepad.exe", 900)]);
    assert_eq!(t.next_process_entry(h).map(|p| p.pid), Some(900));
    assert_eq!(t.next_process_entry(h), None);
    Ok(())
}

#[test]
fn open_process_lookup_and_legacy_fallback() -> Result<()> {
    let t = HandleTable::new();
    assert_eq!(t.legacy_fallback_handle(), None);

    let a = t.store_open_process(123);
    let _snap = t.store_process_snapshot(procs());
    let b = t.store_open_process(124);
    assert_eq!(t.get_pid(a), Some(123));
    assert_eq!(t.get_pid(b), Some(124));
    assert_eq!(t.get_pid(-1), None);

    assert_eq!(t.legacy_fallback_handle(), Some(b));
    assert_eq!(t.legacy_fallback_pid(), Some(124));

    t.close_handle(b);
    assert_eq!(t.legacy_fallback_handle(), Some(a));
    assert!(t.has_open_process(a));
    Ok(())
}
