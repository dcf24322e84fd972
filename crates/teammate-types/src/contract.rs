use serde::{Deserialize, Serialize};

/// `message_type` value meaning "no reply intended".
pub const SKIP_MESSAGE_TYPE: &str = "skip";

/// The JSON object the AI is asked to answer with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReply {
    /// Reply text, possibly empty.
    pub message: String,

    /// Free-form kind; [`SKIP_MESSAGE_TYPE`] suppresses the reply.
    pub message_type: String,

    /// 0..=100: how strongly the context calls for a direct, threaded reply.
    #[serde(default)]
    pub message_direct_refer: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_note: Option<OneOrMany<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_note: Option<OneOrMany<NoteRef>>,
}

impl StructuredReply {
    pub fn is_skip(&self) -> bool {
        self.message_type.trim().eq_ignore_ascii_case(SKIP_MESSAGE_TYPE)
    }
}

/// Models answer with either a scalar or a list for the note fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// A note id as sent by the model: a number, or a number in a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoteRef {
    Id(i64),
    Text(String),
}

impl NoteRef {
    pub fn as_id(&self) -> Option<i64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Text(text) => text.trim().trim_start_matches('#').parse().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_fields_accept_scalar_or_list() {
        let reply: StructuredReply = serde_json::from_str(
            r##"{"message":"","message_type":"skip","add_note":"X","remove_note":[3,"#4","nope"]}"##,
        )
        .unwrap();

        assert!(reply.is_skip());
        assert_eq!(reply.message_direct_refer, 0.0);
        assert_eq!(reply.add_note.unwrap().into_vec(), vec!["X".to_string()]);

        let ids: Vec<Option<i64>> = reply
            .remove_note
            .unwrap()
            .into_vec()
            .iter()
            .map(NoteRef::as_id)
            .collect();
        assert_eq!(ids, vec![Some(3), Some(4), None]);
    }

    #[test]
    fn missing_message_type_is_rejected() {
        let result = serde_json::from_str::<StructuredReply>(r#"{"message":"hi"}"#);
        assert!(result.is_err());
    }
}
