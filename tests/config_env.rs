use std::time::Duration;

use anyhow::Result;

use ceserver_dma::{ServerBuilder, ServerConfig};

// Единственный тест в бинарнике, который трогает окружение.
#[test]
fn env_then_builder_overrides() -> Result<()> {
    std::env::set_var("CES_PORT", "40000");
    std::env::set_var("CES_BIND", "127.0.0.1");
    std::env::set_var("CES_MAX_DISPATCH", "64");
    std::env::set_var("CES_MAX_DISPATCH_BYTES", "0");
    std::env::set_var("CES_SCATTER_THRESHOLD", "3");
    std::env::set_var("CES_DISPATCH_BUILD_US", "750");
    std::env::set_var("CES_LEGACY_PROBE_MS", "20");
    std::env::set_var("CES_METRICS_ADDR", " 127.0.0.1:9900 ");
    std::env::set_var("CES_BACKOFF_EXTEND_US", "not-a-number");

    let cfg = ServerConfig::from_env();
    assert_eq!(cfg.listen_addr(), "127.0.0.1:40000");
    assert_eq!(cfg.max_dispatch_size, 64);
    // 0 игнорируется, остаётся дефолт
    assert_eq!(cfg.max_dispatch_bytes, 1_000_000_000);
    assert_eq!(cfg.backoff_extend_us, 500);
    assert_eq!(cfg.metrics_addr.as_deref(), Some("127.0.0.1:9900"));

    let e = cfg.engine_config();
    assert_eq!(e.scatter_threshold, 3);
    assert_eq!(e.dispatch_build_time, Duration::from_micros(750));
    assert_eq!(cfg.session_config().legacy_probe, Duration::from_millis(20));

    let built = ServerBuilder::new().port(1234).metrics_addr(None::<String>).build();
    assert_eq!(built.listen_addr(), "127.0.0.1:1234");
    assert_eq!(built.max_dispatch_size, 64);
    assert!(built.metrics_addr.is_none());
    assert!(built.to_string().contains("listen: 127.0.0.1:1234"));

    for k in [
        "CES_PORT",
        "CES_BIND",
        "CES_MAX_DISPATCH",
        "CES_MAX_DISPATCH_BYTES",
        "CES_SCATTER_THRESHOLD",
        "CES_DISPATCH_BUILD_US",
        "CES_LEGACY_PROBE_MS",
        "CES_METRICS_ADDR",
        "CES_BACKOFF_EXTEND_US",
    ] {
        std::env::remove_var(k);
    }
    assert_eq!(ServerConfig::from_env().port, 52736);
    Ok(())
}
