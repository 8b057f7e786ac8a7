use crate::model::SessionId;

/// A single entry of the KV store together with its raft indexes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    pub flags: u64,
    pub create_index: u64,
    /// Index of the last write; the value to pass as `cas` to overwrite this
    /// exact revision.
    pub modify_index: u64,
    /// Number of times the key has been acquired as a lock.
    pub lock_index: u64,
    /// Session currently holding the key as a lock, if any.
    pub session: Option<SessionId>,
}

impl KeyValue {
    /// The value as UTF-8, if it is valid UTF-8.
    pub fn value_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.value).ok()
    }

    /// Whether the entry carries no payload.
    pub fn is_empty(&self) -> bool {
        self.value.iter().all(u8::is_ascii_whitespace)
    }

    /// Parses the value as a decimal `u64`, tolerating surrounding whitespace
    /// and JSON string quoting (`"7"`) left behind by other clients.
    pub fn as_u64(&self) -> Option<u64> {
        let raw = self.value_str()?.trim();
        let raw = raw
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(raw);
        raw.parse().ok()
    }

    /// Whether `session` currently holds this key as a lock.
    pub fn is_held_by(&self, session: &SessionId) -> bool {
        self.session.as_ref() == Some(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(value: &str) -> KeyValue {
        KeyValue {
            key: "k".into(),
            value: value.as_bytes().to_vec(),
            ..KeyValue::default()
        }
    }

    #[test]
    fn parses_plain_and_quoted_integers() {
        assert_eq!(entry("42").as_u64(), Some(42));
        assert_eq!(entry(" 7\n").as_u64(), Some(7));
        assert_eq!(entry("\"9\"").as_u64(), Some(9));
        assert_eq!(entry("-1").as_u64(), None);
        assert_eq!(entry("cat").as_u64(), None);
        assert_eq!(entry("").as_u64(), None);
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert!(entry("").is_empty());
        assert!(entry("  \n").is_empty());
        assert!(!entry("0").is_empty());
    }

    #[test]
    fn invalid_utf8_is_not_a_number() {
        let kv = KeyValue {
            value: vec![0xff, 0xfe],
            ..KeyValue::default()
        };
        assert_eq!(kv.value_str(), None);
        assert_eq!(kv.as_u64(), None);
    }
}
