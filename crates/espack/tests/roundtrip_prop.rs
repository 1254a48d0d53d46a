//! Property test: any graph the facade can express survives a
//! serialize/parse round trip byte-exact and in order.

use std::collections::BTreeMap;

use espack::{Archive, Checksum, ModuleKind};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct GeneratedModule {
    kind: ModuleKind,
    source: Vec<u8>,
    source_map: Vec<u8>,
}

fn kind_strategy() -> impl Strategy<Value = ModuleKind> {
    prop_oneof![
        Just(ModuleKind::JavaScript),
        Just(ModuleKind::Json),
        Just(ModuleKind::Jsonc),
        Just(ModuleKind::OpaqueData),
        Just(ModuleKind::Wasm),
    ]
}

fn module_strategy() -> impl Strategy<Value = GeneratedModule> {
    (
        kind_strategy(),
        prop::collection::vec(any::<u8>(), 0..64),
        prop::collection::vec(any::<u8>(), 0..32),
    )
        .prop_map(|(kind, source, source_map)| GeneratedModule {
            kind,
            source,
            source_map,
        })
}

fn graph_strategy() -> impl Strategy<Value = BTreeMap<String, GeneratedModule>> {
    prop::collection::btree_map(
        "[a-z][a-z0-9]{0,12}".prop_map(|name| format!("file:///{name}.ts")),
        module_strategy(),
        0..8,
    )
}

fn checksum_strategy() -> impl Strategy<Value = Checksum> {
    prop_oneof![
        Just(Checksum::None),
        Just(Checksum::Sha256),
        Just(Checksum::Xxh3),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn round_trip_preserves_order_bodies_and_kinds(
        graph in graph_strategy(),
        checksum in checksum_strategy(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        runtime.block_on(async {
            let mut archive = Archive::new();
            for (specifier, module) in &graph {
                archive.add_module(
                    specifier.clone(),
                    module.kind,
                    module.source.clone(),
                    module.source_map.clone(),
                );
            }
            archive.set_checksum(checksum);

            let bytes = archive.into_bytes();
            let (parsed, load) = Archive::parse(bytes.as_slice())
                .await
                .expect("generated archive should parse");
            load.await.expect("bodies should load");

            let expected: Vec<&str> = graph.keys().map(String::as_str).collect();
            prop_assert_eq!(parsed.specifiers(), expected);

            for (specifier, module) in &graph {
                let stored = parsed
                    .lookup_import_map(specifier)
                    .expect("stored module should resolve");
                prop_assert_eq!(stored.kind(), module.kind);
                let source = stored.source().await.unwrap().unwrap();
                prop_assert_eq!(&*source, &module.source[..]);
                let map = stored.source_map().await.unwrap().unwrap();
                prop_assert_eq!(&*map, &module.source_map[..]);
            }
            Ok(())
        })?;
    }

    #[test]
    fn serialization_is_deterministic(
        graph in graph_strategy(),
        checksum in checksum_strategy(),
    ) {
        let build = || {
            let mut archive = Archive::new();
            for (specifier, module) in &graph {
                archive.add_module(
                    specifier.clone(),
                    module.kind,
                    module.source.clone(),
                    module.source_map.clone(),
                );
            }
            archive.set_checksum(checksum);
            archive.into_bytes()
        };
        prop_assert_eq!(build(), build());
    }
}
