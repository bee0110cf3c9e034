//! State that can be flattened into message fields.

use crate::types::{Fields, Message};

/// A piece of state that can travel as the fields of one message.
///
/// Implementations must stay inside what the wire can carry: scalar
/// values and one level of groups, with keys free of `|`, `=` and `.`.
pub trait Snapshot: Sized {
    fn to_fields(&self) -> Fields;

    /// Rebuilds the state. Returns `None` if required fields are missing
    /// or have the wrong kind.
    fn from_fields(fields: &Fields) -> Option<Self>;

    /// Wraps the snapshot in a message of type `kind`.
    fn to_message(&self, kind: impl Into<String>) -> Message {
        Message::with_fields(kind, self.to_fields())
    }
}

impl Message {
    /// Reads this message's fields as a snapshot.
    pub fn to_snapshot<S: Snapshot>(&self) -> Option<S> {
        S::from_fields(&self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Codec, TextCodec};

    #[derive(Debug, PartialEq)]
    struct Score {
        red: u32,
        blue: u32,
    }

    impl Snapshot for Score {
        fn to_fields(&self) -> Fields {
            Fields::new().with("red", self.red).with("blue", self.blue)
        }

        fn from_fields(fields: &Fields) -> Option<Self> {
            Some(Self {
                red: fields.number("red")? as u32,
                blue: fields.number("blue")? as u32,
            })
        }
    }

    #[test]
    fn test_to_snapshot_reads_back_through_text_codec() {
        let score = Score { red: 3, blue: 1 };
        let bytes = TextCodec.encode(&score.to_message("score")).unwrap();

        let msg = TextCodec.decode(&bytes).unwrap();

        assert_eq!(msg.kind, "score");
        assert_eq!(msg.to_snapshot::<Score>(), Some(score));
    }

    #[test]
    fn test_to_snapshot_missing_field_returns_none() {
        let msg = Message::new("score").with("red", 3);
        assert_eq!(msg.to_snapshot::<Score>(), None);
    }
}
