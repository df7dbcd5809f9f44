use std::collections::btree_map::BTreeMap;

use bytes::{Buf, BufMut};
use prost::encoding::{DecodeContext, WireType};
use prost::{DecodeError, Message};

/// An options message built from annotations, keyed by field number.
///
/// Encoding iterates the map in key order, so two descriptors carrying the
/// same options always serialize to the same bytes.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct OptionSet {
    fields: BTreeMap<u32, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Bool(bool),
    String(String),
    Message(OptionSet),
}

impl OptionSet {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set(&mut self, tag: u32, value: Value) {
        self.fields.insert(tag, value);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Folds another set into this one. Entries in `other` win on conflict.
    pub fn merge(&mut self, other: OptionSet) {
        self.fields.extend(other.fields);
    }

    #[cfg(test)]
    pub fn get(&self, tag: u32) -> Option<&Value> {
        self.fields.get(&tag)
    }
}

impl Message for OptionSet {
    fn encode_raw<B>(&self, buf: &mut B)
    where
        B: BufMut,
        Self: Sized,
    {
        for (&tag, field) in &self.fields {
            match field {
                Value::Bool(value) => prost::encoding::bool::encode(tag, value, buf),
                Value::String(value) => prost::encoding::string::encode(tag, value, buf),
                Value::Message(value) => prost::encoding::message::encode(tag, value, buf),
            }
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        for (&tag, field) in &self.fields {
            match field {
                Value::Bool(value) => len += prost::encoding::bool::encoded_len(tag, value),
                Value::String(value) => len += prost::encoding::string::encoded_len(tag, value),
                Value::Message(value) => len += prost::encoding::message::encoded_len(tag, value),
            }
        }
        len
    }

    fn clear(&mut self) {
        self.fields.clear();
    }

    fn merge_field<B>(
        &mut self,
        _: u32,
        _: WireType,
        _: &mut B,
        _: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        B: Buf,
        Self: Sized,
    {
        unimplemented!("options are write-only")
    }
}

#[cfg(test)]
mod tests {
    use super::{OptionSet, Value};
    use prost::Message;

    #[test]
    fn encodes_in_field_number_order() {
        let mut a = OptionSet::new();
        a.set(23, Value::Bool(true));
        a.set(1, Value::String("com.example".to_owned()));

        let mut b = OptionSet::new();
        b.set(1, Value::String("com.example".to_owned()));
        b.set(23, Value::Bool(true));

        assert_eq!(a.encode_to_vec(), b.encode_to_vec());
        // field 1, wire type 2 comes first
        assert_eq!(a.encode_to_vec()[0], 0x0a);
    }

    #[test]
    fn nested_message_length() {
        let mut rule = OptionSet::new();
        rule.set(2, Value::String("/v1/echo".to_owned()));

        let mut options = OptionSet::new();
        options.set(72295728, Value::Message(rule));

        let buf = options.encode_to_vec();
        assert_eq!(buf.len(), options.encoded_len());
    }
}
