// tests/free_list.rs
//
// Free-лист: переживает close/reopen (trunk-страницы), освобождённые страницы
// переиспользуются раньше расширения файла, PageStore отказывается освобождать
// страницы с живыми элементами и overflow-страницы живых строк.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use QuiverIndex::page::common::{page_type_of, PageType};
use QuiverIndex::page::data::{data_init, data_insert};
use QuiverIndex::page::free::free_trunk_capacity;
use QuiverIndex::recovery::scan_store;
use QuiverIndex::{PageStore, RowIndex, Store, StoreConfig, StoreError, CODEC_NONE};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_path(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("qixtest-free-{prefix}-{pid}-{t}-{id}.qix"))
}

#[test]
fn freed_pages_persist_and_are_reused() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = unique_path("reuse");
    let cfg = StoreConfig::default().with_codec(CODEC_NONE);

    let (pages, free) = {
        let mut st = Store::create(&path, cfg.clone())?;
        for i in 0..500u32 {
            st.insert(format!("f{i}").as_bytes(), &[7u8; 300])?;
        }
        for i in 0..500u32 {
            st.delete(format!("f{i}").as_bytes())?;
        }
        let s = st.stats()?;
        assert_eq!(s.data_pages, 0);
        assert!(s.free_pages >= 30, "stats: {:?}", s);
        st.close()?;
        (s.page_count, s.free_pages)
    };

    let mut st = Store::open(&path, cfg)?;
    let s = st.stats()?;
    assert_eq!(s.free_pages, free);
    assert_eq!(s.page_count, pages);
    assert_eq!(st.check()?.free_pages, free);

    // Повторная загрузка тем же объёмом не расширяет файл.
    for i in 0..500u32 {
        st.insert(format!("g{i}").as_bytes(), &[9u8; 300])?;
    }
    assert_eq!(st.stats()?.page_count, pages);
    st.sync()?;
    st.check()?;
    drop(st);

    Store::destroy(&path)?;
    Ok(())
}

#[test]
fn free_list_larger_than_one_trunk() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = unique_path("trunks");
    let cfg = StoreConfig::default();

    let n = free_trunk_capacity(cfg.page_size as usize) as u64 + 50;
    {
        let mut ps = PageStore::create(&path, &cfg, None)?;
        let mut ids = Vec::new();
        for _ in 0..n {
            ids.push(ps.allocate()?);
        }
        for id in ids {
            ps.free(id)?;
        }
        assert_eq!(ps.free_count(), n);
        ps.close()?;
    }

    let mut ps = PageStore::open(&path, &cfg, None)?;
    ps.load_free_list()?;
    assert_eq!(ps.free_count(), n);
    // Наименьший номер выдаётся первым.
    assert_eq!(ps.allocate()?, 1);
    drop(ps);

    Store::destroy(&path)?;
    Ok(())
}

#[test]
fn page_store_guards() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = unique_path("guards");
    let cfg = StoreConfig::default();
    let mut ps = PageStore::create(&path, &cfg, None)?;
    let size = ps.page_size();

    let pid = ps.allocate()?;
    let mut page = vec![0u8; size];
    data_init(&mut page, pid);
    assert!(data_insert(&mut page, b"some row bytes").is_some());
    ps.write(pid, &mut page)?;

    match ps.free(pid) {
        Err(StoreError::PageStillReferenced { page, items }) => {
            assert_eq!(page, pid);
            assert_eq!(items, 1);
        }
        other => panic!("expected PageStillReferenced, got {:?}", other),
    }
    assert!(matches!(ps.free(0), Err(StoreError::InvalidArgument(_))));
    assert!(matches!(
        ps.read(ps.page_count()),
        Err(StoreError::PageOutOfRange { .. })
    ));
    // Образ страницы с чужим номером не пишется.
    assert!(matches!(
        ps.write(pid + 1, &mut page),
        Err(StoreError::InvalidArgument(_)) | Err(StoreError::PageOutOfRange { .. })
    ));

    let empty = ps.allocate()?;
    ps.free(empty)?;
    assert!(matches!(ps.free(empty), Err(StoreError::InvalidArgument(_))));

    ps.close()?;
    assert!(matches!(ps.read(pid), Err(StoreError::FileNotFound { .. })));
    drop(ps);

    Store::destroy(&path)?;
    Ok(())
}

#[test]
fn overflow_pages_of_live_rows_cannot_be_freed() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = unique_path("ovf");
    let cfg = StoreConfig::default().with_codec(CODEC_NONE);
    let store = PageStore::create(&path, &cfg, None)?;
    let mut idx = RowIndex::create(store, &cfg)?;

    let value = vec![5u8; 5000];
    idx.insert(b"big", &value)?;

    let mut chain = Vec::new();
    for pid in 1..idx.store().page_count() {
        let page = idx.store().read(pid)?;
        if page_type_of(&page) == Some(PageType::Overflow) {
            chain.push(pid);
        }
    }
    assert!(chain.len() >= 2, "5000 raw bytes need a chain of pages");

    for &pid in &chain {
        match idx.store_mut().free(pid) {
            Err(StoreError::PageStillReferenced { page, .. }) => assert_eq!(page, pid),
            other => panic!("free({pid}) of a referenced overflow page: {:?}", other),
        }
    }
    // Отказ ничего не испортил.
    assert_eq!(idx.lookup(b"big")?, Some(value));
    scan_store(idx.store())?;

    // Удаление строки освобождает цепочку штатно.
    let free_before = idx.store().free_count();
    idx.delete(b"big")?;
    assert!(idx.store().free_count() >= free_before + chain.len() as u64);
    for &pid in &chain {
        assert_eq!(page_type_of(&idx.store().read(pid)?), Some(PageType::Free));
    }
    scan_store(idx.store())?;
    drop(idx);

    Store::destroy(&path)?;
    Ok(())
}
