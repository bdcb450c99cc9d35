//! Object-graph codec on top of the token stream.
//!
//! The body is not self-describing: the decoder knows from the declared
//! type whether the next token is a primitive or an object reference, and
//! from the registry's layout how many slots an instance has. Decoding only
//! establishes the erased structure; generic element types are checked
//! afterwards by the verifier.

use mesh_wire::{prepare_to_read, Flags, ObjectToken, StreamReader, StreamWriter, WriteObject};

use crate::context::RpcContext;
use crate::error::RpcError;
use crate::registry::Shape;
use crate::ty::{Prim, TypeExpr};
use crate::value::{Heap, Instance, InstanceData, ObjId, Value};

/// Object nesting deeper than this is rejected as malformed. The verifier
/// shares the limit, and both recurse once per level, so it is kept small
/// enough for a default 2 MiB thread stack in unoptimized builds.
pub const MAX_DEPTH: usize = 128;

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

pub struct Decoder<'c, 'w> {
    ctx: &'c RpcContext,
    reader: StreamReader<'w, ObjId>,
    heap: Heap,
    depth: usize,
}

impl<'c, 'w> Decoder<'c, 'w> {
    /// Validate the stream header and position at the first body token.
    pub fn new(ctx: &'c RpcContext, wire: &'w str) -> Result<Self, RpcError> {
        Ok(Decoder {
            ctx,
            reader: prepare_to_read(wire)?,
            heap: Heap::new(),
            depth: 0,
        })
    }

    pub fn flags(&self) -> Flags {
        self.reader.flags()
    }

    pub fn reader(&mut self) -> &mut StreamReader<'w, ObjId> {
        &mut self.reader
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Fail on trailing tokens and hand over the decoded objects.
    pub fn finish(self) -> Result<Heap, RpcError> {
        self.reader.expect_end()?;
        Ok(self.heap)
    }

    /// Read a value in a position declared as `declared`.
    pub fn read_value(&mut self, declared: &TypeExpr) -> Result<Value, RpcError> {
        match declared {
            TypeExpr::Prim(p) => self.read_prim(*p),
            _ => self.read_object(),
        }
    }

    pub fn read_prim(&mut self, p: Prim) -> Result<Value, RpcError> {
        let r = &mut self.reader;
        Ok(match p {
            Prim::Void => Value::Null,
            Prim::Bool => Value::Bool(r.read_bool()?),
            Prim::Byte => Value::Byte(r.read_byte()?),
            Prim::Char => Value::Char(r.read_char()?),
            Prim::Short => Value::Short(r.read_short()?),
            Prim::Int => Value::Int(r.read_int()?),
            Prim::Long => Value::Long(r.read_long()?),
            Prim::Float => Value::Float(r.read_float()?),
            Prim::Double => Value::Double(r.read_double()?),
        })
    }

    /// Read an object reference: null, a back-reference, or a new instance.
    pub fn read_object(&mut self) -> Result<Value, RpcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(RpcError::malformed(format!(
                "object graph nested deeper than {MAX_DEPTH}"
            )));
        }
        let value = match self.reader.read_object_token()? {
            ObjectToken::Null => Value::Null,
            ObjectToken::BackRef(id) => Value::Ref(id),
            ObjectToken::New(type_string) => {
                let flags = self.reader.flags();
                let class = self.ctx.resolve_type_string(&type_string, flags, true)?;
                self.read_instance(&class)?
            }
        };
        self.depth -= 1;
        Ok(value)
    }

    fn read_count(&mut self, per_item: usize) -> Result<usize, RpcError> {
        let pos = self.reader.position();
        let n = self.reader.read_int()?;
        let n = usize::try_from(n)
            .map_err(|_| RpcError::malformed(format!("negative count {n} at token {pos}")))?;
        if n.saturating_mul(per_item) > self.reader.remaining() {
            return Err(RpcError::malformed(format!(
                "count {n} at token {pos} exceeds the remaining stream"
            )));
        }
        Ok(n)
    }

    /// Allocate an instance and give it the next object slot before its
    /// contents are read, so references to it from inside resolve.
    fn alloc(&mut self, class: &str, data: InstanceData) -> ObjId {
        let id = self.heap.alloc(Instance {
            class: class.to_string(),
            data,
        });
        self.reader.remember(id);
        id
    }

    fn fill(&mut self, id: ObjId, data: InstanceData) {
        if let Some(instance) = self.heap.get_mut(id) {
            instance.data = data;
        }
    }

    fn read_instance(&mut self, class: &str) -> Result<Value, RpcError> {
        let ctx = self.ctx;
        let registry = ctx.registry();
        let shape = registry
            .instance_shape(class)
            .map_err(|e| RpcError::malformed(e.to_string()))?;
        match shape {
            Shape::String => Ok(Value::String(self.reader.read_required_string("string value")?)),
            Shape::Boxed(p) => self.read_prim(p),
            Shape::Fields(fields) => {
                let id = self.alloc(class, InstanceData::Fields(Vec::new()));
                let mut values = Vec::with_capacity(fields.len());
                for (_, field) in &fields {
                    values.push(self.read_value(&field.ty)?);
                }
                self.fill(id, InstanceData::Fields(values));
                Ok(Value::Ref(id))
            }
            Shape::Sequence { element, .. } => {
                let id = self.alloc(class, InstanceData::Elements(Vec::new()));
                let n = self.read_count(1)?;
                let mut elements = Vec::with_capacity(n);
                for _ in 0..n {
                    elements.push(self.read_value(element)?);
                }
                self.fill(id, InstanceData::Elements(elements));
                Ok(Value::Ref(id))
            }
            Shape::Map { key, value, .. } => {
                let id = self.alloc(class, InstanceData::Entries(Vec::new()));
                let n = self.read_count(2)?;
                let mut entries = Vec::with_capacity(n);
                for _ in 0..n {
                    let k = self.read_value(key)?;
                    let v = self.read_value(value)?;
                    entries.push((k, v));
                }
                self.fill(id, InstanceData::Entries(entries));
                Ok(Value::Ref(id))
            }
            Shape::Array(component) => {
                let id = self.alloc(class, InstanceData::Elements(Vec::new()));
                let n = self.read_count(1)?;
                let mut elements = Vec::with_capacity(n);
                for _ in 0..n {
                    elements.push(self.read_value(&component)?);
                }
                self.fill(id, InstanceData::Elements(elements));
                Ok(Value::Ref(id))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

pub struct Encoder<'c> {
    ctx: &'c RpcContext,
    writer: StreamWriter<ObjId>,
    depth: usize,
}

impl<'c> Encoder<'c> {
    pub fn new(ctx: &'c RpcContext) -> Self {
        Encoder {
            ctx,
            writer: StreamWriter::new(ctx.flags()),
            depth: 0,
        }
    }

    pub fn writer(&mut self) -> &mut StreamWriter<ObjId> {
        &mut self.writer
    }

    pub fn finish(self) -> String {
        self.writer.finish()
    }

    pub fn write_value(&mut self, heap: &Heap, declared: &TypeExpr, value: &Value) -> Result<(), RpcError> {
        match declared {
            TypeExpr::Prim(p) => self.write_prim(*p, value),
            _ => self.write_object(heap, value),
        }
    }

    fn write_prim(&mut self, p: Prim, value: &Value) -> Result<(), RpcError> {
        let w = &mut self.writer;
        match (p, value) {
            (Prim::Void, Value::Null) => {}
            (Prim::Bool, Value::Bool(v)) => w.write_bool(*v),
            (Prim::Byte, Value::Byte(v)) => w.write_byte(*v),
            (Prim::Char, Value::Char(v)) => w.write_char(*v),
            (Prim::Short, Value::Short(v)) => w.write_short(*v),
            (Prim::Int, Value::Int(v)) => w.write_int(*v),
            (Prim::Long, Value::Long(v)) => w.write_long(*v),
            (Prim::Float, Value::Float(v)) => w.write_float(*v),
            (Prim::Double, Value::Double(v)) => w.write_double(*v),
            _ => {
                return Err(RpcError::malformed(format!(
                    "cannot write {value:?} as {}",
                    p.name()
                )))
            }
        }
        Ok(())
    }

    /// Write a value in a reference position.
    pub fn write_object(&mut self, heap: &Heap, value: &Value) -> Result<(), RpcError> {
        let flags = self.writer.flags();
        match value {
            Value::Null => {
                self.writer.write_null();
                Ok(())
            }
            Value::String(s) => {
                let ts = self.ctx.type_string("String", flags)?;
                self.writer.write_value_type(&ts);
                self.writer.write_string(Some(s));
                Ok(())
            }
            Value::Ref(id) => self.write_instance(heap, *id),
            boxed => {
                let Some(p) = boxed.prim() else {
                    return Err(RpcError::malformed(format!("cannot write {boxed:?}")));
                };
                let class = p.boxed_class().unwrap_or("Object");
                let ts = self.ctx.type_string(class, flags)?;
                self.writer.write_value_type(&ts);
                self.write_prim(p, boxed)
            }
        }
    }

    fn write_instance(&mut self, heap: &Heap, id: ObjId) -> Result<(), RpcError> {
        let instance = heap
            .get(id)
            .ok_or_else(|| RpcError::malformed(format!("dangling object reference {}", id.0)))?;
        let class = instance.class.as_str();
        self.ctx.policy().check_serialize(class)?;
        let ts = self.ctx.type_string(class, self.writer.flags())?;
        if let WriteObject::BackRef(_) = self.writer.write_object(id, &ts) {
            return Ok(());
        }

        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(RpcError::malformed(format!(
                "object graph nested deeper than {MAX_DEPTH}"
            )));
        }
        let ctx = self.ctx;
        let shape = ctx
            .registry()
            .instance_shape(class)
            .map_err(|e| RpcError::malformed(e.to_string()))?;
        let mismatch = || RpcError::malformed(format!("contents of `{class}` do not match its layout"));
        match (shape, &instance.data) {
            (Shape::Fields(fields), InstanceData::Fields(values)) => {
                if fields.len() != values.len() {
                    return Err(mismatch());
                }
                for ((_, field), v) in fields.iter().zip(values) {
                    self.write_value(heap, &field.ty, v)?;
                }
            }
            (Shape::Sequence { element, .. }, InstanceData::Elements(values)) => {
                self.write_len(values.len())?;
                for v in values {
                    self.write_value(heap, element, v)?;
                }
            }
            (Shape::Array(component), InstanceData::Elements(values)) => {
                self.write_len(values.len())?;
                for v in values {
                    self.write_value(heap, &component, v)?;
                }
            }
            (Shape::Map { key, value, .. }, InstanceData::Entries(entries)) => {
                self.write_len(entries.len())?;
                for (k, v) in entries {
                    self.write_value(heap, key, k)?;
                    self.write_value(heap, value, v)?;
                }
            }
            _ => return Err(mismatch()),
        }
        self.depth -= 1;
        Ok(())
    }

    fn write_len(&mut self, len: usize) -> Result<(), RpcError> {
        let len = i32::try_from(len)
            .map_err(|_| RpcError::malformed(format!("collection of {len} elements is too large")))?;
        self.writer.write_int(len);
        Ok(())
    }
}
