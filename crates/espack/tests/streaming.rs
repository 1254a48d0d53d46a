//! The two-phase parse: metadata first, bodies as they arrive, take
//! semantics, and waiter behavior when the stream dies early.

mod common;

use std::time::Duration;

use espack::{Archive, Checksum, ModuleKind, ParseError};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use common::{layout, parse_fully};

fn sample_bytes() -> Vec<u8> {
    let mut archive = Archive::new();
    archive.add_module(
        "file:///a.ts",
        ModuleKind::JavaScript,
        b"export const a = 1;\n".to_vec(),
        b"{\"version\":3,\"mappings\":\"AAAA\"}".to_vec(),
    );
    archive.set_checksum(Checksum::Sha256);
    archive.into_bytes()
}

#[tokio::test]
async fn metadata_is_available_before_bodies_arrive() {
    let bytes = sample_bytes();
    let split = layout(&bytes, Checksum::Sha256, 1).sources_start;

    let (mut tx, rx) = tokio::io::duplex(bytes.len() + 64);
    tx.write_all(&bytes[..split]).await.unwrap();

    let (archive, load) = Archive::parse(rx).await.unwrap();
    let load = tokio::spawn(load);

    // The index is served from the header alone.
    let module = archive.lookup("file:///a.ts").expect("index should be ready");

    // The body cannot resolve yet: its region has not been written.
    let pending = timeout(Duration::from_millis(50), module.source()).await;
    assert!(pending.is_err(), "body resolved before its bytes arrived");

    tx.write_all(&bytes[split..]).await.unwrap();
    drop(tx);
    load.await.unwrap().unwrap();

    assert_eq!(
        &*module.source().await.unwrap().unwrap(),
        b"export const a = 1;\n"
    );
}

#[tokio::test]
async fn stream_ending_early_unblocks_waiters_with_io_cause() {
    let bytes = sample_bytes();
    let split = layout(&bytes, Checksum::Sha256, 1).sources_start + 6;

    let (mut tx, rx) = tokio::io::duplex(bytes.len() + 64);
    tx.write_all(&bytes[..split]).await.unwrap();

    let (archive, load) = Archive::parse(rx).await.unwrap();
    let module = archive.lookup("file:///a.ts").unwrap();
    let waiter = tokio::spawn(async move { module.source().await });

    // Close the stream mid-body.
    drop(tx);
    let err = load.await.unwrap_err();
    assert!(matches!(err, ParseError::Io(_)));
    assert!(matches!(waiter.await.unwrap(), Err(ParseError::Io(_))));
}

#[tokio::test]
async fn dropping_the_load_future_fails_pending_bodies() {
    let bytes = sample_bytes();
    let split = layout(&bytes, Checksum::Sha256, 1).sources_start;

    let (mut tx, rx) = tokio::io::duplex(bytes.len() + 64);
    tx.write_all(&bytes[..split]).await.unwrap();

    let (archive, load) = Archive::parse(rx).await.unwrap();
    let module = archive.lookup("file:///a.ts").unwrap();
    drop(load);

    assert!(matches!(module.source().await, Err(ParseError::Io(_))));
}

#[tokio::test]
async fn take_source_leaves_the_source_map_behind() {
    let parsed = parse_fully(&sample_bytes()).await;
    let module = parsed.lookup("file:///a.ts").unwrap();

    let taken = module.take_source().await.unwrap().unwrap();
    assert_eq!(&*taken, b"export const a = 1;\n");

    // The source is gone, the entry and its map are not.
    assert!(module.source().await.unwrap().is_none());
    assert!(module.take_source().await.unwrap().is_none());
    let map = module.source_map().await.unwrap().unwrap();
    assert_eq!(&*map, b"{\"version\":3,\"mappings\":\"AAAA\"}");

    // A fresh lookup still finds the entry.
    assert!(parsed.lookup("file:///a.ts").is_some());
}

#[tokio::test]
async fn bodies_resolve_in_disk_order_while_streaming() {
    let mut archive = Archive::new();
    archive.add_module(
        "file:///a.ts",
        ModuleKind::JavaScript,
        b"aaaa".to_vec(),
        Vec::new(),
    );
    archive.add_module(
        "file:///b.ts",
        ModuleKind::JavaScript,
        b"bbbb".to_vec(),
        Vec::new(),
    );
    archive.set_checksum(Checksum::Xxh3);
    let bytes = archive.into_bytes();

    // Feed everything up to and including the first body (and digest),
    // but not the second.
    let layout = layout(&bytes, Checksum::Xxh3, 2);
    let first_body_end = layout.sources_start + 4 + 4 + 8;

    let (mut tx, rx) = tokio::io::duplex(bytes.len() + 64);
    tx.write_all(&bytes[..first_body_end]).await.unwrap();

    let (parsed, load) = Archive::parse(rx).await.unwrap();
    let load = tokio::spawn(load);

    let first = parsed.lookup("file:///a.ts").unwrap();
    assert_eq!(&*first.source().await.unwrap().unwrap(), b"aaaa");

    let second = parsed.lookup("file:///b.ts").unwrap();
    let pending = timeout(Duration::from_millis(50), second.source()).await;
    assert!(pending.is_err(), "second body resolved before its bytes arrived");

    tx.write_all(&bytes[first_body_end..]).await.unwrap();
    drop(tx);
    load.await.unwrap().unwrap();
    assert_eq!(&*second.source().await.unwrap().unwrap(), b"bbbb");
}
