// tests/corruption.rs
//
// Fail-closed поведение:
// - версия формата проверяется до разбора страниц (FileVersionError);
// - один испорченный байт в странице — open() падает с FileCorrupted{page};
// - порча data-страницы под открытым store — lookup ключей этой страницы даёт
//   FileCorrupted, ключи других страниц читаются как прежде.

use anyhow::Result;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use QuiverIndex::{RecoveryManager, RecoveryState, Store, StoreConfig, StoreError, CODEC_NONE};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_path(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("qixtest-corrupt-{prefix}-{pid}-{t}-{id}.qix"))
}

fn xor_byte(path: &Path, off: u64) -> Result<()> {
    let mut f = OpenOptions::new().read(true).write(true).open(path)?;
    let mut b = [0u8; 1];
    f.seek(SeekFrom::Start(off))?;
    f.read_exact(&mut b)?;
    b[0] ^= 0x5A;
    f.seek(SeekFrom::Start(off))?;
    f.write_all(&b)?;
    f.sync_all()?;
    Ok(())
}

fn patch(path: &Path, off: u64, bytes: &[u8]) -> Result<()> {
    let mut f = OpenOptions::new().write(true).open(path)?;
    f.seek(SeekFrom::Start(off))?;
    f.write_all(bytes)?;
    f.sync_all()?;
    Ok(())
}

/// Store с `n` ключами "k{i}", закрытый чисто.
fn build(path: &Path, n: u32) -> Result<()> {
    let mut st = Store::create(path, StoreConfig::default())?;
    for i in 0..n {
        st.insert(format!("k{i}").as_bytes(), format!("value-{i:08}").as_bytes())?;
    }
    st.close()?;
    Ok(())
}

#[test]
fn unsupported_version_is_reported_before_pages() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = unique_path("version");
    build(&path, 10)?;

    // Версия — u32 LE сразу за 8-байтовым magic. CRC заголовка при этом тоже
    // перестаёт сходиться, но версия проверяется раньше.
    patch(&path, 8, &99u32.to_le_bytes())?;

    match Store::open(&path, StoreConfig::default()) {
        Err(StoreError::FileVersionError { found, supported }) => {
            assert_eq!(found, 99);
            assert_eq!(supported, QuiverIndex::SUPPORTED_VERSIONS);
        }
        other => panic!("expected FileVersionError, got {:?}", other),
    }
    let err = Store::open(&path, StoreConfig::default()).unwrap_err();
    assert!(err.is_rebuild_required());

    Store::destroy(&path)?;
    Ok(())
}

#[test]
fn bad_file_magic_is_corruption_of_page_zero() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = unique_path("magic");
    build(&path, 3)?;
    xor_byte(&path, 0)?;

    let mut rm = RecoveryManager::new(&path, StoreConfig::default());
    match rm.run(None) {
        Err(StoreError::FileCorrupted { page, .. }) => assert_eq!(page, Some(0)),
        other => panic!("expected FileCorrupted, got {:?}", other),
    }
    assert_eq!(rm.state(), RecoveryState::Failed);
    assert!(matches!(rm.run(None), Err(StoreError::InvalidState(_))));

    Store::destroy(&path)?;
    Ok(())
}

#[test]
fn flipped_page_magic_fails_open() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = unique_path("page-magic");
    build(&path, 50)?;

    let loc = {
        let st = Store::open(&path, StoreConfig::default())?;
        st.location(b"k7")?.expect("k7 present")
    };
    let ps = StoreConfig::default().page_size as u64;
    xor_byte(&path, loc.page * ps + 1)?;

    match Store::open(&path, StoreConfig::default()) {
        Err(StoreError::FileCorrupted { page, .. }) => assert_eq!(page, Some(loc.page)),
        other => panic!("expected FileCorrupted, got {:?}", other),
    }

    Store::destroy(&path)?;
    Ok(())
}

#[test]
fn flipped_trailer_byte_fails_open() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = unique_path("trailer");
    build(&path, 5)?;

    // Страница 1 — корень directory; последний байт трейлера должен быть нулём.
    let ps = StoreConfig::default().page_size as u64;
    xor_byte(&path, 2 * ps - 1)?;

    match Store::open(&path, StoreConfig::default()) {
        Err(StoreError::FileCorrupted { page, .. }) => assert_eq!(page, Some(1)),
        other => panic!("expected FileCorrupted, got {:?}", other),
    }

    Store::destroy(&path)?;
    Ok(())
}

#[test]
fn corruption_under_open_store_is_contained_to_its_page() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = unique_path("live");
    let cfg = StoreConfig::default().with_codec(CODEC_NONE);
    let mut st = Store::create(&path, cfg)?;

    // Значения по ~300 байт: строки расходятся по нескольким data-страницам.
    for i in 0..200u32 {
        let v = format!("{i:0300}");
        st.insert(format!("k{i}").as_bytes(), v.as_bytes())?;
    }
    st.sync()?;

    let victim = st.location(b"k0")?.expect("k0 present");
    let mut other_key = None;
    for i in 1..200u32 {
        let k = format!("k{i}");
        if let Some(loc) = st.location(k.as_bytes())? {
            if loc.page != victim.page {
                other_key = Some((k, i));
                break;
            }
        }
    }
    let (other_key, other_i) = other_key.expect("rows span several pages");

    let ps = st.config().page_size as u64;
    xor_byte(&path, victim.page * ps + ps / 2)?;

    match st.lookup(b"k0") {
        Err(StoreError::FileCorrupted { page, .. }) => assert_eq!(page, Some(victim.page)),
        other => panic!("expected FileCorrupted, got {:?}", other),
    }
    assert_eq!(
        st.lookup(other_key.as_bytes())?,
        Some(format!("{other_i:0300}").into_bytes())
    );
    assert!(st.check().unwrap_err().is_corrupted());

    drop(st);
    Store::destroy(&path)?;
    Ok(())
}

#[test]
fn truncated_file_is_corruption() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = unique_path("short");
    build(&path, 20)?;

    let len = std::fs::metadata(&path)?.len();
    let f = OpenOptions::new().write(true).open(&path)?;
    f.set_len(len - 100)?;
    drop(f);

    assert!(matches!(
        Store::open(&path, StoreConfig::default()),
        Err(StoreError::FileCorrupted { .. })
    ));

    Store::destroy(&path)?;
    Ok(())
}
