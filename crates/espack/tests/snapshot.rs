//! Package snapshot embedding: determinism, round trips, and root
//! request ordering.

mod common;

use std::collections::BTreeMap;

use espack::{Archive, Checksum, ModuleKind, NpmPackage, NpmPackageId, NpmSnapshot};

use common::parse_fully;

fn id(name: &str, version: &str) -> NpmPackageId {
    NpmPackageId {
        name: name.to_string(),
        version: version.to_string(),
    }
}

fn snapshot(reversed: bool) -> NpmSnapshot {
    let chalk = id("chalk", "5.3.0");
    let ansi = id("ansi-styles", "6.2.1");
    let scoped = id("@std/path", "1.0.2");
    let mut packages = vec![
        NpmPackage {
            id: chalk.clone(),
            deps: BTreeMap::from([("ansi-styles@^6".to_string(), ansi.clone())]),
        },
        NpmPackage {
            id: ansi.clone(),
            deps: BTreeMap::new(),
        },
        NpmPackage {
            id: scoped.clone(),
            deps: BTreeMap::new(),
        },
    ];
    if reversed {
        packages.reverse();
    }
    NpmSnapshot {
        packages,
        root_packages: BTreeMap::from([
            ("chalk@^5".to_string(), chalk),
            ("@std/path@^1".to_string(), scoped),
        ]),
    }
}

fn archive_with(snapshot: NpmSnapshot) -> Archive {
    let mut archive = Archive::new();
    archive.add_module(
        "file:///main.ts",
        ModuleKind::JavaScript,
        b"import chalk from 'npm:chalk@^5';\n".to_vec(),
        Vec::new(),
    );
    archive.set_npm_snapshot(snapshot).unwrap();
    archive.set_checksum(Checksum::Sha256);
    archive
}

#[tokio::test]
async fn snapshot_round_trips_with_ids_rewritten() {
    let bytes = archive_with(snapshot(false)).into_bytes();
    let mut parsed = parse_fully(&bytes).await;
    let restored = parsed.take_npm_snapshot().expect("snapshot should survive");

    // The table comes back in its serialized (sorted) order.
    let ids: Vec<String> = restored
        .packages
        .iter()
        .map(|package| package.id.as_serialized())
        .collect();
    assert_eq!(
        ids,
        ["@std/path@1.0.2", "ansi-styles@6.2.1", "chalk@5.3.0"]
    );

    let chalk = restored
        .packages
        .iter()
        .find(|package| package.id.name == "chalk")
        .unwrap();
    assert_eq!(
        chalk.deps.get("ansi-styles@^6"),
        Some(&id("ansi-styles", "6.2.1"))
    );
    assert_eq!(restored.root_packages, snapshot(false).root_packages);
}

#[tokio::test]
async fn equal_snapshots_serialize_identically() {
    let a = archive_with(snapshot(false)).into_bytes();
    let b = archive_with(snapshot(true)).into_bytes();
    assert_eq!(a, b);
}

#[tokio::test]
async fn root_requests_follow_sorted_order_in_the_header() {
    let archive = archive_with(snapshot(false));
    assert_eq!(
        archive.specifiers(),
        ["file:///main.ts", "@std/path@^1", "chalk@^5"]
    );

    let parsed = parse_fully(&archive.into_bytes()).await;
    assert_eq!(
        parsed.specifiers(),
        ["file:///main.ts", "@std/path@^1", "chalk@^5"]
    );
}

#[tokio::test]
async fn taking_the_snapshot_drops_root_entries_from_reserialization() {
    let mut archive = archive_with(snapshot(false));
    assert!(archive.take_npm_snapshot().is_some());

    let parsed = parse_fully(&archive.into_bytes()).await;
    assert_eq!(parsed.specifiers(), ["file:///main.ts"]);
}

#[tokio::test]
async fn replacing_a_snapshot_replaces_its_root_entries() {
    let mut archive = archive_with(snapshot(false));
    let lodash = id("lodash", "4.17.21");
    archive
        .set_npm_snapshot(NpmSnapshot {
            packages: vec![NpmPackage {
                id: lodash.clone(),
                deps: BTreeMap::new(),
            }],
            root_packages: BTreeMap::from([("lodash@^4".to_string(), lodash)]),
        })
        .unwrap();
    assert_eq!(archive.specifiers(), ["file:///main.ts", "lodash@^4"]);
}
