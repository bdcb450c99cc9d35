//! Runtime values and the request-scoped object heap.
//!
//! Primitives, strings and boxed values are plain `Value`s. Everything with
//! identity (field-layout instances, collections, maps, arrays) lives in a
//! `Heap` and is referred to by `ObjId`, so sharing and cycles decoded from
//! the wire are observable as equal ids.

use std::fmt::Write as _;

use rustc_hash::FxHashMap;

use crate::ty::Prim;

/// Identity of a heap object within one `Heap`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Ref(ObjId),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The primitive this value holds, if it is one.
    pub fn prim(&self) -> Option<Prim> {
        Some(match self {
            Value::Bool(_) => Prim::Bool,
            Value::Byte(_) => Prim::Byte,
            Value::Char(_) => Prim::Char,
            Value::Short(_) => Prim::Short,
            Value::Int(_) => Prim::Int,
            Value::Long(_) => Prim::Long,
            Value::Float(_) => Prim::Float,
            Value::Double(_) => Prim::Double,
            Value::Null | Value::String(_) | Value::Ref(_) => return None,
        })
    }

    pub fn as_ref_id(&self) -> Option<ObjId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

/// The contents of a heap object.
#[derive(Clone, Debug, PartialEq)]
pub enum InstanceData {
    /// Field values in wire order.
    Fields(Vec<Value>),
    /// Sequence or array elements.
    Elements(Vec<Value>),
    Entries(Vec<(Value, Value)>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    /// Runtime class name; arrays are `Component[]`.
    pub class: String,
    pub data: InstanceData,
}

/// Arena of heap objects for one request or response.
#[derive(Clone, Debug, Default)]
pub struct Heap {
    objects: Vec<Instance>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, instance: Instance) -> ObjId {
        let id = ObjId(self.objects.len() as u32);
        self.objects.push(instance);
        id
    }

    pub fn get(&self, id: ObjId) -> Option<&Instance> {
        self.objects.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: ObjId) -> Option<&mut Instance> {
        self.objects.get_mut(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Allocate a sequence-layout instance (`ArrayList`, `HashSet`, ...).
    pub fn sequence(&mut self, class: &str, elements: Vec<Value>) -> Value {
        Value::Ref(self.alloc(Instance {
            class: class.to_string(),
            data: InstanceData::Elements(elements),
        }))
    }

    /// Allocate an array. `component` is the component class, `int`,
    /// `String`, `List[]`, ...
    pub fn array(&mut self, component: &str, elements: Vec<Value>) -> Value {
        Value::Ref(self.alloc(Instance {
            class: format!("{component}[]"),
            data: InstanceData::Elements(elements),
        }))
    }

    pub fn map(&mut self, class: &str, entries: Vec<(Value, Value)>) -> Value {
        Value::Ref(self.alloc(Instance {
            class: class.to_string(),
            data: InstanceData::Entries(entries),
        }))
    }

    pub fn object(&mut self, class: &str, fields: Vec<Value>) -> Value {
        Value::Ref(self.alloc(Instance {
            class: class.to_string(),
            data: InstanceData::Fields(fields),
        }))
    }

    /// Append an element to a sequence or array. Used to build cycles.
    pub fn push_element(&mut self, id: ObjId, value: Value) -> bool {
        match self.get_mut(id).map(|i| &mut i.data) {
            Some(InstanceData::Elements(elements)) => {
                elements.push(value);
                true
            }
            _ => false,
        }
    }

    /// Overwrite a field by index. Used to build cycles.
    pub fn set_field(&mut self, id: ObjId, index: usize, value: Value) -> bool {
        match self.get_mut(id).map(|i| &mut i.data) {
            Some(InstanceData::Fields(fields)) if index < fields.len() => {
                fields[index] = value;
                true
            }
            _ => false,
        }
    }

    /// Runtime class of a non-null reference-position value.
    pub fn class_of<'h>(&'h self, value: &'h Value) -> Option<&'h str> {
        match value {
            Value::Null => None,
            Value::String(_) => Some("String"),
            Value::Ref(id) => self.get(*id).map(|i| i.class.as_str()),
            other => other.prim().and_then(Prim::boxed_class),
        }
    }

    /// Debug rendering. A shared object is tagged `#n` where it first
    /// appears and written `@n` afterwards, so cycles terminate.
    pub fn render(&self, value: &Value) -> String {
        let mut shared = FxHashMap::default();
        let mut seen = FxHashMap::default();
        self.count_refs(value, &mut seen);
        for (id, count) in seen {
            if count > 1 {
                shared.insert(id, false);
            }
        }
        let mut out = String::new();
        self.render_into(value, &mut shared, &mut out);
        out
    }

    fn count_refs(&self, value: &Value, seen: &mut FxHashMap<ObjId, usize>) {
        let Value::Ref(id) = value else { return };
        let count = seen.entry(*id).or_insert(0);
        *count += 1;
        if *count > 1 {
            return;
        }
        let Some(instance) = self.get(*id) else { return };
        match &instance.data {
            InstanceData::Fields(vs) | InstanceData::Elements(vs) => {
                for v in vs {
                    self.count_refs(v, seen);
                }
            }
            InstanceData::Entries(entries) => {
                for (k, v) in entries {
                    self.count_refs(k, seen);
                    self.count_refs(v, seen);
                }
            }
        }
    }

    fn render_into(&self, value: &Value, shared: &mut FxHashMap<ObjId, bool>, out: &mut String) {
        let _ = match value {
            Value::Null => write!(out, "null"),
            Value::Bool(b) => write!(out, "{b}"),
            Value::Byte(v) => write!(out, "{v}b"),
            Value::Char(c) => write!(out, "{c:?}"),
            Value::Short(v) => write!(out, "{v}s"),
            Value::Int(v) => write!(out, "{v}"),
            Value::Long(v) => write!(out, "{v}L"),
            Value::Float(v) => write!(out, "{v}f"),
            Value::Double(v) => write!(out, "{v}d"),
            Value::String(s) => write!(out, "{s:?}"),
            Value::Ref(id) => {
                match shared.get_mut(id) {
                    Some(true) => {
                        let _ = write!(out, "@{}", id.0);
                        return;
                    }
                    Some(done) => {
                        *done = true;
                        let _ = write!(out, "#{}=", id.0);
                    }
                    None => {}
                }
                let Some(instance) = self.get(*id) else {
                    let _ = write!(out, "<dangling {}>", id.0);
                    return;
                };
                out.push_str(&instance.class);
                match &instance.data {
                    InstanceData::Fields(vs) => self.render_list(vs, "{", "}", shared, out),
                    InstanceData::Elements(vs) => self.render_list(vs, "[", "]", shared, out),
                    InstanceData::Entries(entries) => {
                        out.push('{');
                        for (i, (k, v)) in entries.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            self.render_into(k, shared, out);
                            out.push_str(": ");
                            self.render_into(v, shared, out);
                        }
                        out.push('}');
                    }
                }
                Ok(())
            }
        };
    }

    fn render_list(
        &self,
        values: &[Value],
        open: &str,
        close: &str,
        shared: &mut FxHashMap<ObjId, bool>,
        out: &mut String,
    ) {
        out.push_str(open);
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.render_into(v, shared, out);
        }
        out.push_str(close);
    }
}

/// Structural equality of two object graphs, up to a consistent renaming
/// of object ids. Sharing and cycles must correspond exactly.
pub fn graph_eq(left_heap: &Heap, left: &Value, right_heap: &Heap, right: &Value) -> bool {
    let mut pairs: FxHashMap<ObjId, ObjId> = FxHashMap::default();
    let mut reverse: FxHashMap<ObjId, ObjId> = FxHashMap::default();
    graph_eq_at(left_heap, left, right_heap, right, &mut pairs, &mut reverse)
}

fn graph_eq_at(
    lh: &Heap,
    l: &Value,
    rh: &Heap,
    r: &Value,
    pairs: &mut FxHashMap<ObjId, ObjId>,
    reverse: &mut FxHashMap<ObjId, ObjId>,
) -> bool {
    let (Value::Ref(a), Value::Ref(b)) = (l, r) else {
        return match (l, r) {
            (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
            (Value::Double(x), Value::Double(y)) => x.to_bits() == y.to_bits(),
            _ => l == r,
        };
    };
    match (pairs.get(a), reverse.get(b)) {
        (Some(mapped), _) => return mapped == b,
        (None, Some(_)) => return false,
        (None, None) => {}
    }
    pairs.insert(*a, *b);
    reverse.insert(*b, *a);
    let (Some(li), Some(ri)) = (lh.get(*a), rh.get(*b)) else {
        return false;
    };
    if li.class != ri.class {
        return false;
    }
    match (&li.data, &ri.data) {
        (InstanceData::Fields(x), InstanceData::Fields(y))
        | (InstanceData::Elements(x), InstanceData::Elements(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|(p, q)| graph_eq_at(lh, p, rh, q, pairs, reverse))
        }
        (InstanceData::Entries(x), InstanceData::Entries(y)) => {
            x.len() == y.len()
                && x.iter().zip(y).all(|((pk, pv), (qk, qv))| {
                    graph_eq_at(lh, pk, rh, qk, pairs, reverse)
                        && graph_eq_at(lh, pv, rh, qv, pairs, reverse)
                })
        }
        _ => false,
    }
}
