//! Codec trait and implementations for turning [`Message`]s into bytes.
//!
//! The session layer does not care how messages are written, only that
//! something implements [`Codec`]. [`TextCodec`] speaks the pipe-delimited
//! format every peer in a session understands; [`JsonCodec`] is a typed
//! alternative for setups where both ends are ours.

use crate::types::{Field, Fields, Message, Value};
use crate::ProtocolError;

/// Converts messages to and from wire bytes.
///
/// `Send + Sync + 'static` so a codec can live inside a long-lived session
/// object that may move between threads.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a message.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if the message cannot be
    /// represented faithfully in this format.
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError>;

    /// Parses bytes received from a peer.
    ///
    /// # Errors
    /// Returns an error if the bytes do not form a message.
    fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError>;
}

// ---------------------------------------------------------------------------
// TextCodec
// ---------------------------------------------------------------------------

const SEP: char = '|';
const ASSIGN: char = '=';
const NEST: char = '.';

/// The pipe-delimited text format.
///
/// ```text
/// pos|x=3.5|y=-1|alive=true
/// state|player.x=5|player.alive=false
/// ```
///
/// The first token is the message type; each further token is `key=value`
/// or `group.key=value`, split at the first `=` and then at the first `.`.
/// Nothing is escaped, so field and group names may not contain `|`, `=` or
/// `.`, a key inside a group may contain `.` but not `|` or `=` and may not
/// end with `.`, groups may not be empty, and text values may not contain
/// `|`. [`encode`] rejects messages that break those rules instead of
/// writing something that would read back differently.
///
/// Decoding is lenient: empty tokens, tokens without `=`, tokens with an
/// empty value, an empty key, an empty group name or a key ending in `.`
/// are skipped. Whatever decodes therefore encodes again.
///
/// Values are coerced in order: `true`, `false`, a finite number, and
/// otherwise text. Numbers may carry surrounding ASCII whitespace and may be
/// hexadecimal integers (`0x1F`), the same strings a Lua `tonumber` peer
/// accepts; hexadecimal floats are not recognised and stay text. That means
/// a text field holding `"true"`, `"42"` or `" 0x10"` comes back as a
/// boolean or a number; use [`JsonCodec`] when that matters.
///
/// [`encode`]: Codec::encode
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl TextCodec {
    /// Writes a message as a `String`.
    pub fn encode_to_string(&self, message: &Message) -> Result<String, ProtocolError> {
        check_kind(&message.kind)?;
        let mut out = message.kind.clone();
        for (key, field) in message.fields.iter() {
            check_key(key)?;
            match field {
                Field::Scalar(value) => push_token(&mut out, key, None, value)?,
                Field::Group(group) => {
                    // Nothing would be written, so the group would vanish.
                    if group.is_empty() {
                        return Err(invalid(format!("group {key:?} is empty")));
                    }
                    for (sub, value) in group.iter() {
                        check_subkey(key, sub)?;
                        push_token(&mut out, key, Some(sub), value)?;
                    }
                }
            }
        }
        Ok(out)
    }

    /// Parses a message from text.
    pub fn decode_str(&self, text: &str) -> Result<Message, ProtocolError> {
        let mut tokens = text.split(SEP).filter(|t| !t.is_empty());
        let kind = tokens.next().ok_or(ProtocolError::Empty)?;

        let mut fields = Fields::new();
        for token in tokens {
            let Some((key, raw)) = token.split_once(ASSIGN) else {
                tracing::trace!(token, "skipping token without '='");
                continue;
            };
            if raw.is_empty() {
                continue;
            }
            if key.is_empty() || key.ends_with(NEST) {
                tracing::trace!(token, "skipping token with unusable key");
                continue;
            }
            let value = coerce(raw);
            match key.split_once(NEST) {
                Some(("", _)) => {
                    tracing::trace!(token, "skipping token with empty group name");
                }
                Some((group, sub)) => fields.insert_grouped(group, sub, value),
                None => fields.insert(key, value),
            }
        }
        Ok(Message::with_fields(kind, fields))
    }
}

impl Codec for TextCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        self.encode_to_string(message).map(String::into_bytes)
    }

    fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError> {
        let text = std::str::from_utf8(data)?;
        self.decode_str(text)
    }
}

fn push_token(
    out: &mut String,
    key: &str,
    sub: Option<&str>,
    value: &Value,
) -> Result<(), ProtocolError> {
    check_value(key, value)?;
    out.push(SEP);
    out.push_str(key);
    if let Some(sub) = sub {
        out.push(NEST);
        out.push_str(sub);
    }
    out.push(ASSIGN);
    out.push_str(&value.to_string());
    Ok(())
}

fn check_kind(kind: &str) -> Result<(), ProtocolError> {
    if kind.is_empty() {
        return Err(invalid("empty message type".into()));
    }
    if kind.contains(SEP) {
        return Err(invalid(format!("message type {kind:?} contains '|'")));
    }
    Ok(())
}

fn check_key(key: &str) -> Result<(), ProtocolError> {
    if key.is_empty() {
        return Err(invalid("empty field key".into()));
    }
    if key.contains([SEP, ASSIGN, NEST]) {
        return Err(invalid(format!("field key {key:?} contains '|', '=' or '.'")));
    }
    Ok(())
}

fn check_subkey(group: &str, sub: &str) -> Result<(), ProtocolError> {
    if sub.is_empty() {
        return Err(invalid(format!("empty key in group {group:?}")));
    }
    if sub.contains([SEP, ASSIGN]) {
        return Err(invalid(format!("key {sub:?} in group {group:?} contains '|' or '='")));
    }
    if sub.ends_with(NEST) {
        return Err(invalid(format!("key {sub:?} in group {group:?} ends with '.'")));
    }
    Ok(())
}

fn check_value(key: &str, value: &Value) -> Result<(), ProtocolError> {
    match value {
        Value::Bool(_) => Ok(()),
        Value::Number(n) if n.is_finite() => Ok(()),
        Value::Number(n) => Err(invalid(format!("field {key:?} is not finite: {n}"))),
        // An empty value is skipped on decode, so it cannot round-trip.
        Value::Text(s) if s.is_empty() => Err(invalid(format!("field {key:?} is empty text"))),
        Value::Text(s) if s.contains(SEP) => {
            Err(invalid(format!("field {key:?} text contains '|'")))
        }
        Value::Text(_) => Ok(()),
    }
}

fn coerce(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match number(raw) {
            Some(n) => Value::Number(n),
            None => Value::Text(raw.to_owned()),
        },
    }
}

/// Parses a finite decimal or hexadecimal-integer number, ignoring
/// surrounding ASCII whitespace.
fn number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_matches(|c: char| c.is_ascii_whitespace());
    if let Ok(n) = trimmed.parse::<f64>() {
        return n.is_finite().then_some(n);
    }
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let n = u64::from_str_radix(digits, 16).ok()? as f64;
    Some(if negative { -n } else { n })
}

fn invalid(reason: String) -> ProtocolError {
    ProtocolError::InvalidMessage(reason)
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that writes messages as JSON objects:
/// `{"type": "pos", "data": {"x": 3.5, "alive": true}}`.
///
/// Values keep their JSON types, so there is no coercion ambiguity and no
/// reserved characters. Both peers must use it; it does not interoperate
/// with [`TextCodec`].
///
/// ```rust
/// use boltlink_protocol::{Codec, JsonCodec, Message};
///
/// let codec = JsonCodec;
/// let msg = Message::new("chat").with("text", "a|b=c.d");
///
/// let bytes = codec.encode(&msg).unwrap();
/// assert_eq!(codec.decode(&bytes).unwrap(), msg);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        // serde_json would silently write NaN and infinities as `null`.
        let non_finite = message.fields.iter().find_map(|(key, field)| match field {
            Field::Scalar(Value::Number(n)) if !n.is_finite() => Some(key),
            Field::Group(g) => g
                .iter()
                .any(|(_, v)| matches!(v, Value::Number(n) if !n.is_finite()))
                .then_some(key),
            _ => None,
        });
        if let Some(key) = non_finite {
            return Err(invalid(format!("field {key:?} is not finite")));
        }
        serde_json::to_vec(message).map_err(ProtocolError::Encode)
    }

    fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

// =========================================================================
// Tests
// =========================================================================
