use bytes::Bytes;

/// Fixed per-item bookkeeping charged against a dictionary's quota.
pub const ITEM_OVERHEAD: u64 = 24;

/// Longest accepted key, in bytes.
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Longest accepted text value, in bytes.
pub const MAX_VALUE_LEN: usize = u16::MAX as usize;

/// A value stored in a shared dictionary.
///
/// Integers live inside the item header; text is charged by length.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Integer(i64),
    Text(Bytes),
}

impl Value {
    /// Bytes this value adds on top of [`ITEM_OVERHEAD`].
    pub fn payload_len(&self) -> usize {
        match self {
            Value::Integer(_) => 0,
            Value::Text(text) => text.len(),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&[u8]> {
        match self {
            Value::Integer(_) => None,
            Value::Text(text) => Some(text),
        }
    }
}

/// Quota cost of storing `value` under `key`.
pub fn item_size(key: &[u8], value: &Value) -> u64 {
    key.len() as u64 + value.payload_len() as u64 + ITEM_OVERHEAD
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<Bytes> for Value {
    fn from(text: Bytes) -> Self {
        Value::Text(text)
    }
}

impl From<Vec<u8>> for Value {
    fn from(text: Vec<u8>) -> Self {
        Value::Text(Bytes::from(text))
    }
}

impl From<&[u8]> for Value {
    fn from(text: &[u8]) -> Self {
        Value::Text(Bytes::copy_from_slice(text))
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(Bytes::from(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_is_charged_header_only() {
        assert_eq!(item_size(b"hits", &Value::Integer(i64::MAX)), 4 + ITEM_OVERHEAD);
    }

    #[test]
    fn text_is_charged_by_length() {
        let value = Value::from("hello");
        assert_eq!(value.payload_len(), 5);
        assert_eq!(item_size(b"k", &value), 1 + 5 + ITEM_OVERHEAD);
        assert_eq!(value.as_text(), Some(&b"hello"[..]));
        assert_eq!(value.as_integer(), None);
    }

    #[test]
    fn conversions_pick_variant() {
        assert_eq!(Value::from(7i64).as_integer(), Some(7));
        assert!(matches!(Value::from(vec![1u8, 2]), Value::Text(_)));
        assert!(matches!(Value::from(String::from("x")), Value::Text(_)));
    }
}
