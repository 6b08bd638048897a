//! Runtime harness for woven modules.
//!
//! A small stack evaluator over [`weftir`] bodies so the test suites can
//! exercise woven output end to end — write a source property, observe the
//! bound targets — instead of only asserting on instruction shapes. The
//! call-depth ceiling turns a bidirectional echo into an error rather than
//! a hung test.
use std::collections::BTreeMap;

use strum::EnumIs;
use thiserror::Error;
use weftir::{
    instr::{Dispatch, Instr},
    module::{FieldKey, MethodKey, Module, PropertyKey, TypeKey},
};

/// Ceiling on nested calls.
pub const MAX_CALL_DEPTH: usize = 64;

/// Identifier of a heap object.
pub type ObjId = usize;

/// A dynamically typed runtime value.
#[derive(Clone, Debug, PartialEq, EnumIs)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Obj(ObjId),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "\"{value}\""),
            Value::Obj(obj) => write!(f, "obj#{obj}"),
        }
    }
}

#[derive(Debug, PartialEq, Error)]
pub enum SandboxError {
    #[error("null reference while {context}")]
    NullReference { context: String },

    #[error(
        "call depth exceeded the sandbox ceiling; propagation appears to echo between bound setters"
    )]
    CallDepthExceeded,

    #[error("no concrete implementation of `{method}` for runtime type `{ty}`")]
    NoConcreteMethod { method: String, ty: String },

    #[error("evaluation stack underflow in `{method}`")]
    StackUnderflow { method: String },

    #[error("expected an object reference, found `{found}` while {context}")]
    NotAnObject { found: String, context: String },

    #[error("method `{method}` expects {expected} argument(s), got {got}")]
    ArgumentCount {
        method: String,
        expected: usize,
        got: usize,
    },

    #[error("method `{method}` has no argument at index {index}")]
    MissingArgument { method: String, index: u16 },

    #[error("property `{property}` lacks the accessor the harness needs")]
    MissingAccessor { property: String },
}

/// One heap object: a runtime type and its field values.
pub struct Instance {
    pub ty: TypeKey,
    pub fields: BTreeMap<FieldKey, Value>,
}

/// Evaluator state: the module under test plus an object heap.
pub struct Sandbox<'m> {
    module: &'m Module,
    heap: Vec<Instance>,
}

impl<'m> Sandbox<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self {
            module,
            heap: Vec::new(),
        }
    }

    /// Allocate an instance with all fields unset.
    pub fn instantiate(&mut self, ty: TypeKey) -> ObjId {
        self.heap.push(Instance {
            ty,
            fields: BTreeMap::new(),
        });
        self.heap.len() - 1
    }

    pub fn instance(&self, obj: ObjId) -> &Instance {
        &self.heap[obj]
    }

    pub fn set_field(&mut self, obj: ObjId, field: FieldKey, value: Value) {
        self.heap[obj].fields.insert(field, value);
    }

    /// Current field value; unset fields read as null.
    pub fn field(&self, obj: ObjId, field: FieldKey) -> Value {
        self.heap[obj]
            .fields
            .get(&field)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Invoke a method the way reflection would: virtually when it is
    /// polymorphic, exactly otherwise.
    pub fn call(
        &mut self,
        obj: ObjId,
        method: MethodKey,
        args: Vec<Value>,
    ) -> Result<Option<Value>, SandboxError> {
        let dispatch = if self.module.methods[method].is_polymorphic() {
            Dispatch::Virtual
        } else {
            Dispatch::Static
        };
        self.invoke(obj, method, args, dispatch, 0)
    }

    /// Write a property through its setter.
    pub fn set_property(
        &mut self,
        obj: ObjId,
        property: PropertyKey,
        value: Value,
    ) -> Result<(), SandboxError> {
        let setter = self.module.properties[property].setter.ok_or_else(|| {
            SandboxError::MissingAccessor {
                property: self.module.properties[property].name.clone(),
            }
        })?;
        self.call(obj, setter, vec![value]).map(|_| ())
    }

    /// Read a property through its getter.
    pub fn property(&mut self, obj: ObjId, property: PropertyKey) -> Result<Value, SandboxError> {
        let getter = self.module.properties[property].getter.ok_or_else(|| {
            SandboxError::MissingAccessor {
                property: self.module.properties[property].name.clone(),
            }
        })?;
        Ok(self.call(obj, getter, Vec::new())?.unwrap_or(Value::Null))
    }

    /// Most derived concrete method with the callee's name, walking the
    /// runtime type towards the root.
    fn resolve_virtual(
        &self,
        runtime: TypeKey,
        method: MethodKey,
    ) -> Result<MethodKey, SandboxError> {
        let name = &self.module.methods[method].name;
        self.module
            .methods_in_base_hierarchy(runtime)
            .find(|&candidate| {
                self.module.methods[candidate].name == *name
                    && !self.module.methods[candidate].is_abstract()
            })
            .ok_or_else(|| SandboxError::NoConcreteMethod {
                method: name.clone(),
                ty: self.module.types[runtime].name.clone(),
            })
    }

    fn invoke(
        &mut self,
        obj: ObjId,
        method: MethodKey,
        args: Vec<Value>,
        dispatch: Dispatch,
        depth: usize,
    ) -> Result<Option<Value>, SandboxError> {
        if depth >= MAX_CALL_DEPTH {
            return Err(SandboxError::CallDepthExceeded);
        }

        let module: &'m Module = self.module;
        let target = match dispatch {
            Dispatch::Virtual => self.resolve_virtual(self.heap[obj].ty, method)?,
            Dispatch::Static => method,
        };
        let def = &module.methods[target];
        if def.is_abstract() {
            return Err(SandboxError::NoConcreteMethod {
                method: def.name.clone(),
                ty: module.types[self.heap[obj].ty].name.clone(),
            });
        }
        if args.len() != def.params.len() {
            return Err(SandboxError::ArgumentCount {
                method: def.name.clone(),
                expected: def.params.len(),
                got: args.len(),
            });
        }

        let mut stack: Vec<Value> = Vec::new();
        self.exec(&def.body, obj, &args, &mut stack, depth, &def.name)?;
        Ok(if def.return_type.is_some() {
            stack.pop()
        } else {
            None
        })
    }

    fn exec(
        &mut self,
        instrs: &[Instr],
        this: ObjId,
        args: &[Value],
        stack: &mut Vec<Value>,
        depth: usize,
        method_name: &str,
    ) -> Result<(), SandboxError> {
        for instr in instrs {
            match instr {
                Instr::LoadSelf => stack.push(Value::Obj(this)),
                Instr::LoadParam(index) => {
                    let value = args.get(*index as usize).cloned().ok_or_else(|| {
                        SandboxError::MissingArgument {
                            method: method_name.to_owned(),
                            index: *index,
                        }
                    })?;
                    stack.push(value);
                }
                Instr::LoadField(field) => {
                    let obj = self.pop_object(stack, method_name, "reading a field")?;
                    stack.push(self.field(obj, *field));
                }
                Instr::StoreField(field) => {
                    let value = self.pop(stack, method_name)?;
                    let obj = self.pop_object(stack, method_name, "writing a field")?;
                    self.heap[obj].fields.insert(*field, value);
                }
                Instr::Call(call) => {
                    let argc = self.module.methods[call.method].params.len();
                    if stack.len() < argc + 1 {
                        return Err(SandboxError::StackUnderflow {
                            method: method_name.to_owned(),
                        });
                    }
                    let call_args = stack.split_off(stack.len() - argc);
                    let receiver = self.pop_object(stack, method_name, "calling a method")?;
                    let result =
                        self.invoke(receiver, call.method, call_args, call.dispatch, depth + 1)?;
                    if let Some(value) = result {
                        stack.push(value);
                    }
                }
                Instr::FieldOrNew(init) => {
                    let obj = self.pop_object(
                        stack,
                        method_name,
                        "loading a lazily constructed field",
                    )?;
                    let current = self.field(obj, init.field);
                    let value = if current.is_null() {
                        let ty = self.module.methods[init.ctor].declaring;
                        let created = self.instantiate(ty);
                        self.invoke(created, init.ctor, Vec::new(), Dispatch::Static, depth + 1)?;
                        let value = Value::Obj(created);
                        self.heap[obj].fields.insert(init.field, value.clone());
                        value
                    } else {
                        current
                    };
                    stack.push(value);
                }
                Instr::IfNotNull(region) => {
                    let value = self.pop(stack, method_name)?;
                    if !value.is_null() {
                        stack.push(value);
                        self.exec(region, this, args, stack, depth, method_name)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn pop(&self, stack: &mut Vec<Value>, method_name: &str) -> Result<Value, SandboxError> {
        stack.pop().ok_or_else(|| SandboxError::StackUnderflow {
            method: method_name.to_owned(),
        })
    }

    fn pop_object(
        &self,
        stack: &mut Vec<Value>,
        method_name: &str,
        context: &str,
    ) -> Result<ObjId, SandboxError> {
        match self.pop(stack, method_name)? {
            Value::Obj(obj) => Ok(obj),
            Value::Null => Err(SandboxError::NullReference {
                context: context.to_owned(),
            }),
            other => Err(SandboxError::NotAnObject {
                found: other.to_string(),
                context: context.to_owned(),
            }),
        }
    }
}
