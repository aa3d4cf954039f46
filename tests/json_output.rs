// tests/json_output.rs
//
// JSON-отчёты (stats/check/reorganize) и счётчики metrics.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use QuiverIndex::{metrics_snapshot, Store, StoreConfig};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_path(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("qixtest-json-{prefix}-{pid}-{t}-{id}.qix"))
}

#[test]
fn reports_serialize_to_json() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = unique_path("reports");
    let mut st = Store::create(&path, StoreConfig::default())?;
    for i in 0..100u32 {
        st.insert(format!("j{i}").as_bytes(), format!("payload {i}").as_bytes())?;
    }
    st.sync()?;

    let stats: serde_json::Value = serde_json::from_str(&st.stats()?.to_json())?;
    assert_eq!(stats["rows"], 100);
    assert_eq!(stats["page_size"], 4096);
    assert_eq!(stats["clean"], true);
    assert!(stats["data_pages"].as_u64().unwrap_or(0) >= 1);
    assert!(stats["fill_ratio"].as_f64().unwrap_or(0.0) > 0.0);

    let scan: serde_json::Value = serde_json::from_str(&st.check()?.to_json())?;
    assert_eq!(scan["rows"], 100);
    assert_eq!(scan["dir_root_pages"], 1);
    assert_eq!(scan["path"], path.display().to_string());

    let reorg: serde_json::Value = serde_json::from_str(&st.reorganize()?.to_json())?;
    assert!(reorg.get("rows_moved").is_some());
    assert!(reorg["passes"].as_u64().unwrap_or(0) >= 1);

    drop(st);
    Store::destroy(&path)?;
    Ok(())
}

#[test]
fn metrics_count_engine_activity() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = unique_path("metrics");

    // Счётчики общие для процесса: сравниваем приращения снизу.
    let before = metrics_snapshot();
    let mut st = Store::create(&path, StoreConfig::default())?;
    st.insert(b"a", b"1")?;
    st.insert(b"b", b"2")?;
    st.delete(b"a")?;
    st.reorganize()?;
    st.close()?;
    let after = metrics_snapshot();

    assert!(after.rows_inserted >= before.rows_inserted + 2);
    assert!(after.rows_deleted >= before.rows_deleted + 1);
    assert!(after.pages_written > before.pages_written);
    assert!(after.pages_allocated > before.pages_allocated);
    assert!(after.sync_calls >= before.sync_calls + 2);
    assert!(after.reorganize_runs > before.reorganize_runs);

    let json = serde_json::to_string(&after)?;
    assert!(json.contains("\"torn_writes_injected\""));

    Store::destroy(&path)?;
    Ok(())
}
