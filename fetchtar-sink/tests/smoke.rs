// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! Smoke tests for fetchtar-sink.
//!
//! Both backends run through the same scenarios; durable sinks live in a
//! temporary scratch directory.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use fetchtar_sink::durable::{generate_store_name, store_path};
use fetchtar_sink::{
    AnySink, ChunkSink, DEFAULT_STORE_TTL, DurableSink, Error, SinkConfig, SinkKind, StoreRegistry,
    VolatileSink, open_sink,
};
use rstest::rstest;
use tempfile::TempDir;

enum Backend {
    Volatile,
    Durable,
}

fn make_sink(backend: Backend) -> (AnySink, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let sink = match backend {
        Backend::Volatile => VolatileSink::new().into(),
        Backend::Durable => DurableSink::new(dir.path()).into(),
    };
    (sink, dir)
}

/// Verify ordering, positions and backpatching.
#[rstest]
#[case::volatile(Backend::Volatile)]
#[case::durable(Backend::Durable)]
#[tokio::test]
async fn test_append_overwrite_materialize(#[case] backend: Backend) {
    let (mut sink, _dir) = make_sink(backend);

    let placeholder = sink.append(Bytes::from(vec![0u8; 4])).await.unwrap();
    assert_eq!(placeholder, 0);
    assert_eq!(sink.append(Bytes::from_static(b"body")).await.unwrap(), 1);
    assert_eq!(sink.append(Bytes::from_static(b"..")).await.unwrap(), 2);
    assert_eq!(sink.cursor(), 3);

    sink.overwrite(placeholder, Bytes::from_static(b"HEAD"))
        .await
        .unwrap();
    assert_eq!(sink.cursor(), 3);

    let blocks = sink.read_all().await.unwrap();
    assert_eq!(
        blocks,
        vec![
            Bytes::from_static(b"HEAD"),
            Bytes::from_static(b"body"),
            Bytes::from_static(b".."),
        ]
    );
    // reading does not consume anything
    assert_eq!(
        sink.materialize().await.unwrap(),
        Bytes::from_static(b"HEADbody..")
    );
    assert_eq!(sink.read_all().await.unwrap().len(), 3);

    sink.dispose().await.unwrap();
}

/// Verify that out-of-range overwrites fail without changing the sink.
#[rstest]
#[case::volatile(Backend::Volatile)]
#[case::durable(Backend::Durable)]
#[tokio::test]
async fn test_overwrite_out_of_range(#[case] backend: Backend) {
    let (mut sink, _dir) = make_sink(backend);
    sink.append(Bytes::from_static(b"a")).await.unwrap();

    let err = sink.overwrite(5, Bytes::from_static(b"b")).await.unwrap_err();
    assert!(matches!(
        err,
        Error::PositionOutOfRange {
            position: 5,
            len: 1
        }
    ));
    assert_eq!(sink.cursor(), 1);
    assert_eq!(sink.materialize().await.unwrap(), Bytes::from_static(b"a"));
}

/// Verify that dispose is idempotent, also before anything was stored.
#[rstest]
#[case::volatile(Backend::Volatile)]
#[case::durable(Backend::Durable)]
#[tokio::test]
async fn test_dispose_twice(#[case] backend: Backend) {
    let (mut fresh, _dir) = make_sink(backend);
    fresh.dispose().await.unwrap();
    fresh.dispose().await.unwrap();
    assert!(matches!(fresh.read_all().await, Err(Error::Disposed)));
}

/// Verify that copy_to pages through more rows than one query returns.
#[tokio::test]
async fn test_durable_copy_to_pages() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = DurableSink::new(dir.path());

    let mut expected = Vec::new();
    for i in 0..600u32 {
        let block = Bytes::from(i.to_be_bytes().to_vec());
        expected.extend_from_slice(&block);
        sink.append(block).await.unwrap();
    }

    let mut out = Vec::new();
    let written = sink.copy_to(&mut out).await.unwrap();
    assert_eq!(written, 2400);
    assert_eq!(out, expected);

    sink.dispose().await.unwrap();
}

/// Verify that dispose removes the database file and the registry row.
#[test_log::test(tokio::test)]
async fn test_durable_dispose_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(StoreRegistry::open_in(dir.path()).unwrap());
    let mut sink = DurableSink::new(dir.path()).with_registry(registry.clone());

    sink.append(Bytes::from_static(b"x")).await.unwrap();
    assert!(sink.path().exists());
    assert_eq!(registry.names().unwrap(), vec![sink.name().to_string()]);

    sink.dispose().await.unwrap();
    sink.dispose().await.unwrap();
    assert!(!sink.path().exists());
    assert!(registry.names().unwrap().is_empty());
}

/// Verify that opening a store expires abandoned ones past the TTL.
#[test_log::test(tokio::test)]
async fn test_abandoned_stores_expire() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(StoreRegistry::open_in(dir.path()).unwrap());

    let abandoned = generate_store_name();
    let recent = generate_store_name();
    for name in [&abandoned, &recent] {
        std::fs::write(store_path(dir.path(), name), b"left behind").unwrap();
    }
    let now = SystemTime::now();
    registry.touch(&abandoned, UNIX_EPOCH).unwrap();
    registry.touch(&recent, now - Duration::from_secs(60)).unwrap();

    let mut sink = DurableSink::new(dir.path())
        .with_registry(registry.clone())
        .with_store_ttl(DEFAULT_STORE_TTL);
    sink.append(Bytes::from_static(b"x")).await.unwrap();

    assert!(!store_path(dir.path(), &abandoned).exists());
    assert!(store_path(dir.path(), &recent).exists());
    let mut expected = vec![recent.clone(), sink.name().to_string()];
    expected.sort();
    assert_eq!(registry.names().unwrap(), expected);

    sink.dispose().await.unwrap();
}

/// A store written for longer than the TTL stays registered as live, so a
/// sink opening next to it leaves it alone.
#[test_log::test(tokio::test)]
async fn test_long_run_outlives_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(StoreRegistry::open_in(dir.path()).unwrap());
    let ttl = Duration::from_millis(400);

    let mut long_run = DurableSink::new(dir.path())
        .with_registry(registry.clone())
        .with_store_ttl(ttl);
    for _ in 0..12 {
        long_run.append(Bytes::from_static(b"x")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let mut other = DurableSink::new(dir.path())
        .with_registry(registry.clone())
        .with_store_ttl(ttl);
    other.append(Bytes::from_static(b"y")).await.unwrap();

    assert!(long_run.path().exists());
    long_run.append(Bytes::from_static(b"z")).await.unwrap();
    long_run.overwrite(0, Bytes::from_static(b"w")).await.unwrap();
    assert_eq!(long_run.read_all().await.unwrap().len(), 13);

    let mut expected = vec![long_run.name().to_string(), other.name().to_string()];
    expected.sort();
    assert_eq!(registry.names().unwrap(), expected);

    long_run.dispose().await.unwrap();
    other.dispose().await.unwrap();
}

/// Verify that the factory honours the requested backend.
#[tokio::test]
async fn test_factory_durable_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let config = SinkConfig {
        kind: SinkKind::Durable,
        scratch_dir: Some(dir.path().to_owned()),
        store_ttl: Duration::from_secs(60),
    };
    let mut sink = open_sink(&config).unwrap();
    assert!(sink.is_durable());

    sink.append(Bytes::from_static(b"abc")).await.unwrap();
    assert_eq!(sink.materialize().await.unwrap(), Bytes::from_static(b"abc"));
    sink.dispose().await.unwrap();

    let registry = StoreRegistry::open_in(dir.path()).unwrap();
    assert!(registry.names().unwrap().is_empty());
}
