//! Encoding side of the wire format.
//!
//! The string table precedes the body on the wire but is only complete once
//! the body has been produced, so body tokens are buffered and the message
//! is assembled by [`StreamWriter::finish`].

use std::hash::Hash;

use crate::grammar::{escape, Flags, SEPARATOR, SERIALIZATION_STREAM_VERSION};
use crate::table::{back_reference, ObjectTable, StringTable};

/// Outcome of [`StreamWriter::write_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteObject {
    /// First encounter: a type string was written and the caller must now
    /// write the instance body.
    WriteBody(usize),
    /// Seen before: only a back-reference was written.
    BackRef(usize),
}

/// Stateful writer for one message.
#[derive(Debug)]
pub struct StreamWriter<K> {
    flags: Flags,
    strings: StringTable,
    objects: ObjectTable<K>,
    body: Vec<String>,
}

impl<K: Copy + Eq + Hash> StreamWriter<K> {
    pub fn new(flags: Flags) -> Self {
        StreamWriter {
            flags,
            strings: StringTable::new(),
            objects: ObjectTable::new(),
            body: Vec::new(),
        }
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    fn push(&mut self, token: String) {
        self.body.push(token);
    }

    // ── Primitives ────────────────────────────────────────────────────

    pub fn write_bool(&mut self, v: bool) {
        self.push(if v { "1" } else { "0" }.to_string());
    }

    pub fn write_byte(&mut self, v: i8) {
        self.push(v.to_string());
    }

    pub fn write_short(&mut self, v: i16) {
        self.push(v.to_string());
    }

    pub fn write_int(&mut self, v: i32) {
        self.push(v.to_string());
    }

    pub fn write_long(&mut self, v: i64) {
        self.push(v.to_string());
    }

    /// Rust's `Display` for floats is shortest-round-trip and spells the
    /// non-finite values `NaN`, `inf` and `-inf`, all of which `FromStr`
    /// accepts back.
    pub fn write_float(&mut self, v: f32) {
        self.push(v.to_string());
    }

    pub fn write_double(&mut self, v: f64) {
        self.push(v.to_string());
    }

    pub fn write_char(&mut self, v: char) {
        self.push((v as u32).to_string());
    }

    // ── Strings and objects ───────────────────────────────────────────

    /// Write a string-table index, interning `s` on first use. `None` is 0.
    pub fn write_string(&mut self, s: Option<&str>) {
        let index = match s {
            Some(s) => self.strings.intern(s),
            None => 0,
        };
        self.push(index.to_string());
    }

    pub fn write_null(&mut self) {
        self.push("0".to_string());
    }

    /// Write a reference to a heap object identified by `key`.
    ///
    /// On first encounter the next slot is assigned before anything else is
    /// written, so a cycle back to this object from inside its own body
    /// becomes a back-reference.
    pub fn write_object(&mut self, key: K, type_string: &str) -> WriteObject {
        if let Some(slot) = self.objects.slot_of(key) {
            self.push(back_reference(slot).to_string());
            return WriteObject::BackRef(slot);
        }
        let slot = self.objects.push(key);
        self.write_string(Some(type_string));
        WriteObject::WriteBody(slot)
    }

    /// Write the type string of an immutable value (string or boxed
    /// primitive). Values take no object slot.
    pub fn write_value_type(&mut self, type_string: &str) {
        self.write_string(Some(type_string));
    }

    /// Assemble header, string table and body into the final message.
    pub fn finish(self) -> String {
        let mut out = String::with_capacity(64 + self.body.iter().map(|t| t.len() + 1).sum::<usize>());
        push_token(&mut out, &SERIALIZATION_STREAM_VERSION.to_string());
        push_token(&mut out, &self.flags.bits().to_string());
        push_token(&mut out, &self.strings.len().to_string());
        for entry in self.strings.entries() {
            push_token(&mut out, &escape(entry));
        }
        for t in &self.body {
            push_token(&mut out, t);
        }
        tracing::trace!(
            strings = self.strings.len(),
            objects = self.objects.len(),
            body_tokens = self.body.len(),
            "finished wire stream"
        );
        out
    }
}

fn push_token(out: &mut String, token: &str) {
    out.push_str(token);
    out.push(SEPARATOR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{prepare_to_read, ObjectToken};

    #[test]
    fn strings_are_deduplicated_in_the_table() {
        let mut w: StreamWriter<u32> = StreamWriter::new(Flags::NONE);
        w.write_string(Some("a"));
        w.write_string(Some("b"));
        w.write_string(Some("a"));
        w.write_string(None);
        let wire = w.finish();
        insta::assert_snapshot!(
            wire.replace(SEPARATOR, "|"),
            @"7|0|2|a|b|1|2|1|0|"
        );
    }

    #[test]
    fn objects_get_slots_and_back_references() {
        let mut w: StreamWriter<u32> = StreamWriter::new(Flags::NONE);
        assert_eq!(w.write_object(10, "Node/x"), WriteObject::WriteBody(0));
        assert_eq!(w.write_object(11, "Node/x"), WriteObject::WriteBody(1));
        assert_eq!(w.write_object(10, "Node/x"), WriteObject::BackRef(0));
        w.write_null();
        let wire = w.finish();

        let mut r = prepare_to_read::<u32>(&wire).unwrap();
        assert_eq!(
            r.read_object_token().unwrap(),
            ObjectToken::New("Node/x".to_string())
        );
        r.remember(100);
        assert_eq!(
            r.read_object_token().unwrap(),
            ObjectToken::New("Node/x".to_string())
        );
        r.remember(101);
        assert_eq!(r.read_object_token().unwrap(), ObjectToken::BackRef(100));
        assert_eq!(r.read_object_token().unwrap(), ObjectToken::Null);
        r.expect_end().unwrap();
    }

    #[test]
    fn primitives_round_trip_through_reader() {
        let mut w: StreamWriter<u32> = StreamWriter::new(Flags::NONE.with_elided_type_names(true));
        w.write_byte(-128);
        w.write_short(i16::MAX);
        w.write_int(i32::MIN);
        w.write_long(i64::MAX);
        w.write_float(0.1);
        w.write_double(f64::NEG_INFINITY);
        w.write_double(f64::NAN);
        w.write_char('\u{1F600}');
        w.write_bool(false);
        w.write_string(Some("Raw backslash \\"));
        w.write_string(Some(&format!("sep{SEPARATOR}arated")));
        let wire = w.finish();

        let mut r = prepare_to_read::<u32>(&wire).unwrap();
        assert!(r.flags().elide_type_names());
        assert_eq!(r.read_byte().unwrap(), -128);
        assert_eq!(r.read_short().unwrap(), i16::MAX);
        assert_eq!(r.read_int().unwrap(), i32::MIN);
        assert_eq!(r.read_long().unwrap(), i64::MAX);
        assert_eq!(r.read_float().unwrap(), 0.1);
        assert_eq!(r.read_double().unwrap(), f64::NEG_INFINITY);
        assert!(r.read_double().unwrap().is_nan());
        assert_eq!(r.read_char().unwrap(), '\u{1F600}');
        assert!(!r.read_bool().unwrap());
        assert_eq!(r.read_string().unwrap().unwrap(), "Raw backslash \\");
        assert_eq!(
            r.read_string().unwrap().unwrap(),
            format!("sep{SEPARATOR}arated")
        );
        r.expect_end().unwrap();
    }
}
