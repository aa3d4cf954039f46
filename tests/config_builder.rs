// tests/config_builder.rs
//
// StoreConfig: ENV-слой (QIX_*), builder, page size нового store и то, что
// у существующего файла page size берётся из заголовка, а не из конфига.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use QuiverIndex::{Store, StoreBuilder, StoreConfig, StoreError, CODEC_NONE, CODEC_ZSTD};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_path(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("qixtest-builder-{prefix}-{pid}-{t}-{id}.qix"))
}

// Единственный тест этого бинаря, трогающий ENV.
#[test]
fn env_layer_and_builder_overrides() -> Result<()> {
    std::env::set_var("QIX_PAGE_SIZE", "8192");
    std::env::set_var("QIX_CODEC", "none");
    std::env::set_var("QIX_BUCKETS", "16");
    std::env::set_var("QIX_ALLOW_UNCLEAN_OPEN", "yes");
    std::env::set_var("QIX_REORG_FILL_PERCENT", "not-a-number");

    let cfg = StoreConfig::from_env();
    assert_eq!(cfg.page_size, 8192);
    assert_eq!(cfg.codec, CODEC_NONE);
    assert_eq!(cfg.buckets, 16);
    assert!(cfg.allow_unclean_open);
    // Непарсируемое значение игнорируется.
    assert_eq!(cfg.reorg_fill_percent, 50);

    // Builder стартует с ENV, явные вызовы перекрывают его.
    let built = Store::builder().codec(CODEC_ZSTD).buckets(32).build();
    assert_eq!(built.page_size, 8192);
    assert_eq!(built.codec, CODEC_ZSTD);
    assert_eq!(built.buckets, 32);

    // from_default() ENV не читает.
    let plain = StoreBuilder::from_default().build();
    assert_eq!(plain.page_size, 4096);

    for k in [
        "QIX_PAGE_SIZE",
        "QIX_CODEC",
        "QIX_BUCKETS",
        "QIX_ALLOW_UNCLEAN_OPEN",
        "QIX_REORG_FILL_PERCENT",
    ] {
        std::env::remove_var(k);
    }
    Ok(())
}

#[test]
fn page_size_comes_from_header_on_open() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = unique_path("ps");
    let big = StoreBuilder::from_default().page_size(16 * 1024).build();
    {
        let mut st = Store::create(&path, big)?;
        st.insert(b"k", &vec![1u8; 5000])?;
        st.close()?;
    }

    // Конфиг говорит 4096, файл — 16 KiB.
    let st = Store::open(&path, StoreConfig::default())?;
    assert_eq!(st.page_store().page_size(), 16 * 1024);
    assert_eq!(st.lookup(b"k")?, Some(vec![1u8; 5000]));
    drop(st);

    Store::destroy(&path)?;
    Ok(())
}

#[test]
fn invalid_config_is_rejected_before_touching_disk() -> Result<()> {
    let path = unique_path("invalid");
    let bad = StoreBuilder::from_default().page_size(3000).build();
    assert!(matches!(
        Store::create(&path, bad),
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(!path.exists());

    let bad = StoreBuilder::from_default().buckets(0).build();
    assert!(Store::create(&path, bad).is_err());
    assert!(!path.exists());
    Ok(())
}

#[test]
fn open_applies_the_same_config_rules_as_create() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = unique_path("open-validate");
    Store::create(&path, StoreConfig::default())?.close()?;

    for bad in [
        StoreBuilder::from_default().zstd_level(0).build(),
        StoreBuilder::from_default().codec(7).build(),
        StoreBuilder::from_default().reorg_fill_percent(0).build(),
    ] {
        assert!(
            matches!(Store::open(&path, bad.clone()), Err(StoreError::InvalidArgument(_))),
            "accepted {:?}",
            bad
        );
    }

    // Отказ не оставил файл открытым или грязным.
    let st = Store::open(&path, StoreConfig::default())?;
    assert!(st.stats()?.clean);
    drop(st);

    Store::destroy(&path)?;
    Ok(())
}
