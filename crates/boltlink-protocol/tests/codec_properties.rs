//! Property tests for the text wire format.
//!
//! 1. Any message built within the encoder's rules reads back unchanged.
//! 2. Anything the decoder accepts can be encoded again, which is what a
//!    host relaying a client's message relies on.

use boltlink_protocol::{Codec, Field, Fields, Group, Message, TextCodec, Value};
use proptest::prelude::*;

fn name() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,6}"
}

/// Keys inside a group may hold dots anywhere but at the end.
fn subkey() -> impl Strategy<Value = String> {
    "[a-z.]{0,4}[a-z0-9]"
}

/// Text the decoder will not mistake for a boolean or a finite number.
fn text() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z ,:=.]{0,10}"
        .prop_filter("reads back as bool", |s| s != "true" && s != "false")
        .prop_filter("reads back as number", |s| {
            !s.trim().parse::<f64>().is_ok_and(f64::is_finite)
        })
}

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<f64>()
            .prop_filter("finite", |n| n.is_finite())
            .prop_map(Value::Number),
        (-1000i32..1000).prop_map(Value::from),
        text().prop_map(Value::Text),
    ]
}

fn group() -> impl Strategy<Value = Group> {
    prop::collection::vec((subkey(), value()), 1..4).prop_map(|entries| {
        entries
            .into_iter()
            .fold(Group::new(), |group, (key, value)| group.with(key, value))
    })
}

fn message() -> impl Strategy<Value = Message> {
    let field = prop_oneof![
        (name(), value()).prop_map(|(key, value)| (key, Field::Scalar(value))),
        (name(), group()).prop_map(|(key, group)| (key, Field::Group(group))),
    ];
    ("[a-z_]{1,12}", prop::collection::vec(field, 0..6)).prop_map(|(kind, entries)| {
        let mut fields = Fields::new();
        for (key, field) in entries {
            match field {
                Field::Scalar(value) => fields.insert(key, value),
                Field::Group(group) => fields.insert_group(key, group),
            }
        }
        Message::with_fields(kind, fields)
    })
}

proptest! {
    #[test]
    fn test_text_codec_valid_message_round_trips(msg in message()) {
        let bytes = TextCodec.encode(&msg).expect("message within the rules");
        let decoded = TextCodec.decode(&bytes).expect("encoded bytes decode");
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn test_text_codec_decoded_input_encodes_again(raw in "[a-c0-9x .|=]{0,24}") {
        if let Ok(msg) = TextCodec.decode_str(&raw) {
            let relayed = TextCodec.encode_to_string(&msg);
            prop_assert!(relayed.is_ok(), "{raw:?} decoded to {msg:?} but {relayed:?}");
            let again = TextCodec.decode_str(&relayed.unwrap_or_default());
            prop_assert_eq!(again.ok(), Some(msg));
        }
    }
}
