// tests/property_test.rs

//! Property-based tests for the registry indices, the discovery key codec,
//! and the propagation context codec.

use garrison::core::cluster::registry::ServerRegistry;
use garrison::core::cluster::server::ServerInfo;
use garrison::core::cluster::{parse_server_key, server_key};
use garrison::core::context::{PropagateCtx, PropagationValue};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum RegistryOp {
    Insert { id: u8, server_type: u8 },
    Remove { id: u8 },
}

fn registry_ops() -> impl Strategy<Value = Vec<RegistryOp>> {
    let op = prop_oneof![
        (0u8..16, 0u8..4).prop_map(|(id, server_type)| RegistryOp::Insert { id, server_type }),
        (0u8..16).prop_map(|id| RegistryOp::Remove { id }),
    ];
    proptest::collection::vec(op, 0..64)
}

fn propagation_value() -> impl Strategy<Value = PropagationValue> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(PropagationValue::Int),
        any::<bool>().prop_map(PropagationValue::Bool),
        (-1e12f64..1e12f64).prop_map(PropagationValue::Float),
        "[a-zA-Z0-9 _.-]{0,16}".prop_map(PropagationValue::Str),
        proptest::collection::vec(any::<u8>(), 0..24).prop_map(PropagationValue::Bytes),
    ];
    leaf.prop_recursive(2, 16, 4, |inner| {
        proptest::collection::hash_map("[a-z]{1,8}", inner, 0..4).prop_map(PropagationValue::Map)
    })
}

proptest! {
    /// After any sequence of inserts and removes, the primary index equals
    /// the union of the secondary index.
    #[test]
    fn prop_registry_indices_agree(ops in registry_ops()) {
        let registry = ServerRegistry::new();
        for op in ops {
            match op {
                RegistryOp::Insert { id, server_type } => {
                    registry.insert(Arc::new(ServerInfo::new(
                        format!("s{id}"),
                        format!("t{server_type}"),
                        false,
                        HashMap::new(),
                    )));
                }
                RegistryOp::Remove { id } => {
                    registry.remove(&format!("s{id}"));
                }
            }
        }

        let primary = registry.all();
        let mut union = HashMap::new();
        for server_type in (0u8..4).map(|t| format!("t{t}")) {
            for (id, server) in registry.get_by_type(&server_type) {
                prop_assert_eq!(&server.server_type, &server_type);
                prop_assert!(union.insert(id, server).is_none());
            }
        }
        prop_assert_eq!(primary.len(), union.len());
        for (id, server) in &primary {
            prop_assert_eq!(union.get(id), Some(server));
        }
    }

    /// Formatting then parsing a discovery key is the identity for any
    /// slash-free type and id.
    #[test]
    fn prop_server_key_roundtrip(
        server_type in "[a-zA-Z0-9_.-]{1,16}",
        server_id in "[a-zA-Z0-9_.-]{1,32}",
    ) {
        let key = server_key(&server_type, &server_id);
        let (parsed_type, parsed_id) = parse_server_key(&key).unwrap();
        prop_assert_eq!(parsed_type, server_type);
        prop_assert_eq!(parsed_id, server_id);
    }

    /// Encoding then decoding any propagation map of supported values is the
    /// identity.
    #[test]
    fn prop_propagation_roundtrip(
        map in proptest::collection::hash_map("[a-z.]{1,12}", propagation_value(), 0..8)
    ) {
        let ctx = PropagateCtx::from_map(map.clone());
        let encoded = ctx.encode().unwrap();
        prop_assert_eq!(map.is_empty(), encoded.is_empty());

        let decoded = PropagateCtx::decode(&encoded).unwrap();
        prop_assert_eq!(decoded.to_map(), map);
    }
}
