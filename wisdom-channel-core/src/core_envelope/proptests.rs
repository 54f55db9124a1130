use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

use super::{decode_and_verify, encode, EnvelopeError, Operation};

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,16}",
        "\\PC{0,12}",
        // quotes, backslashes and control characters all need escaping
        r#"["\\\x00-\x1Fé✓ ]{0,6}"#,
    ]
}

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        ((i64::MAX as u64 + 1)..=u64::MAX).prop_map(Value::from),
        any::<f64>()
            .prop_filter("JSON has no NaN or infinity", |f| f.is_finite())
            .prop_map(Value::from),
        (0u32..100_000).prop_map(|i| Value::from(i as f64 / 997.0)),
        arb_text().prop_map(Value::from),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_scalar().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(arb_text(), inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>())),
        ]
    })
}

fn arb_body() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(arb_text(), arb_value(), 0..6)
        .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>()))
}

fn arb_op() -> impl Strategy<Value = Operation> {
    prop::sample::select(Operation::KNOWN.to_vec())
}

fn arb_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 32)
}

proptest! {
    #[test]
    fn untouched_envelopes_verify(op in arb_op(), body in arb_body(), key in arb_key()) {
        let env = encode(op.clone(), body.clone(), &key).unwrap();
        let decoded = decode_and_verify(&env.to_wire().unwrap(), &key).unwrap();
        prop_assert_eq!(decoded.op(), &op);
        prop_assert_eq!(decoded.body(), &body);
    }

    #[test]
    fn any_flipped_wire_byte_is_rejected(
        op in arb_op(),
        body in arb_body(),
        key in arb_key(),
        bit in 0u8..8,
    ) {
        let wire = encode(op, body, &key).unwrap().to_wire().unwrap();
        for i in 0..wire.len() {
            let mut flipped = wire.clone();
            flipped[i] ^= 1 << bit;
            prop_assert!(
                decode_and_verify(&flipped, &key).is_err(),
                "flip of bit {} at byte {} was accepted",
                bit,
                i
            );
        }
    }

    #[test]
    fn any_flipped_tag_byte_is_rejected(
        body in arb_body(),
        key in arb_key(),
        bit in 0u8..8,
    ) {
        let env = encode(Operation::Speak, body, &key).unwrap();
        let tag = STANDARD.decode(env.hmac()).unwrap();
        let original: Value = serde_json::from_slice(&env.to_wire().unwrap()).unwrap();

        for i in 0..tag.len() {
            let mut flipped = tag.clone();
            flipped[i] ^= 1 << bit;
            let mut wire = original.clone();
            wire["hmac"] = json!(STANDARD.encode(&flipped));
            let bytes = serde_json::to_vec(&wire).unwrap();
            prop_assert!(matches!(decode_and_verify(&bytes, &key), Err(EnvelopeError::Integrity)));
        }
    }

    #[test]
    fn body_tampering_is_detected(
        op in arb_op(),
        body in arb_body(),
        key in arb_key(),
        extra in arb_value(),
    ) {
        prop_assume!(body.get("_tampered") != Some(&extra));
        let env = encode(op, body, &key).unwrap();
        let mut wire: Value = serde_json::from_slice(&env.to_wire().unwrap()).unwrap();
        wire["body"]["_tampered"] = extra;
        let bytes = serde_json::to_vec(&wire).unwrap();
        prop_assert!(matches!(decode_and_verify(&bytes, &key), Err(EnvelopeError::Integrity)));
    }

    #[test]
    fn header_tampering_is_detected(
        op in arb_op(),
        other in arb_op(),
        body in arb_body(),
        key in arb_key(),
    ) {
        prop_assume!(op != other);
        let env = encode(op, body, &key).unwrap();
        let original: Value = serde_json::from_slice(&env.to_wire().unwrap()).unwrap();

        let mut swapped_op = original.clone();
        swapped_op["op"] = json!(other.as_str());
        let bytes = serde_json::to_vec(&swapped_op).unwrap();
        prop_assert!(matches!(decode_and_verify(&bytes, &key), Err(EnvelopeError::Integrity)));

        let mut swapped_id = original;
        swapped_id["id"] = json!(uuid::Uuid::new_v4().to_string());
        let bytes = serde_json::to_vec(&swapped_id).unwrap();
        prop_assert!(matches!(decode_and_verify(&bytes, &key), Err(EnvelopeError::Integrity)));
    }

    #[test]
    fn foreign_keys_are_rejected(body in arb_body(), key in arb_key(), other in arb_key()) {
        prop_assume!(key != other);
        let env = encode(Operation::Observe, body, &key).unwrap();
        prop_assert!(matches!(
            decode_and_verify(&env.to_wire().unwrap(), &other),
            Err(EnvelopeError::Integrity)
        ));
    }
}
