//! Capability libraries: named bundles of host functions importable by guests.
//!
//! Each library declares its functions once, in [`Library::register`]. A
//! [`LibraryCell`] pairs the library with its export table and the live
//! instance it is bound to, and exposes the object-safe [`Capability`] surface
//! the import resolver works with.

pub mod datetime;
pub mod math;
pub mod os;
pub mod random;
pub mod stdlib;
pub mod time;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tracing::trace;
use wasmtime::AsContextMut;

use crate::codec;
use crate::descriptor::TypeDescriptor;
use crate::error::{Error, Result};
use crate::memory::{Detached, GuestMemory, InstanceHandle, WasmMemory};
use crate::value::{RawValue, Value};

/// A host function: decodes its arguments, does its work, and returns the
/// encoded result, or `None` for void.
pub type HostFn<L> = fn(&mut L, &mut CallArgs<'_>) -> Result<Option<RawValue>>;

/// Ordered registration table filled in by [`Library::register`].
pub struct Exports<L> {
    entries: Vec<(&'static str, HostFn<L>)>,
}

impl<L> Exports<L> {
    fn new() -> Self {
        Exports {
            entries: Vec::new(),
        }
    }

    /// Register `name`. Registering a name twice is rejected when the
    /// library is constructed.
    pub fn func(&mut self, name: &'static str, f: HostFn<L>) -> &mut Self {
        self.entries.push((name, f));
        self
    }
}

/// A host library in one capability domain.
pub trait Library: Send + Sized + 'static {
    /// Name guests use as the import prefix, e.g. `math` in `math.sin`.
    const NAME: &'static str;

    fn register(exports: &mut Exports<Self>);
}

/// What the resolver and session see of a library.
pub trait Capability: Send {
    fn name(&self) -> &str;
    /// Index of `function` in the export table.
    fn function(&self, function: &str) -> Option<usize>;
    fn function_names(&self) -> Vec<&'static str>;
    /// Point the library at the live instance whose memory it marshals into.
    fn bind_instance(&mut self, instance: InstanceHandle);
    fn instance(&self) -> Option<InstanceHandle>;
    fn invoke(
        &mut self,
        index: usize,
        memory: &mut dyn GuestMemory,
        args: &[RawValue],
    ) -> Result<Option<RawValue>>;
}

pub type SharedCapability = Arc<Mutex<dyn Capability>>;

/// A library together with its export table and bound instance.
pub struct LibraryCell<L> {
    library: L,
    functions: IndexMap<&'static str, HostFn<L>>,
    instance: Option<InstanceHandle>,
}

impl<L: Library> LibraryCell<L> {
    pub fn new(library: L) -> Result<Self> {
        let mut exports = Exports::new();
        L::register(&mut exports);
        let mut functions = IndexMap::with_capacity(exports.entries.len());
        for (name, f) in exports.entries {
            if functions.insert(name, f).is_some() {
                return Err(Error::DuplicateFunction {
                    module: L::NAME.to_string(),
                    function: name.to_string(),
                });
            }
        }
        Ok(LibraryCell {
            library,
            functions,
            instance: None,
        })
    }

    pub fn library(&self) -> &L {
        &self.library
    }
}

impl<L: Library> Capability for LibraryCell<L> {
    fn name(&self) -> &str {
        L::NAME
    }

    fn function(&self, function: &str) -> Option<usize> {
        self.functions.get_index_of(function)
    }

    fn function_names(&self) -> Vec<&'static str> {
        self.functions.keys().copied().collect()
    }

    fn bind_instance(&mut self, instance: InstanceHandle) {
        self.instance = Some(instance);
    }

    fn instance(&self) -> Option<InstanceHandle> {
        self.instance.clone()
    }

    fn invoke(
        &mut self,
        index: usize,
        memory: &mut dyn GuestMemory,
        args: &[RawValue],
    ) -> Result<Option<RawValue>> {
        let (&name, &f) = self
            .functions
            .get_index(index)
            .ok_or_else(|| Error::FunctionNotFound {
                module: L::NAME.to_string(),
                function: format!("#{index}"),
            })?;
        trace!(module = L::NAME, function = name, ?args, "host call");
        let mut call = CallArgs::new(name, memory, args);
        f(&mut self.library, &mut call)
    }
}

/// Construct `library` and wrap it for sharing between the resolver, the
/// import table and the session.
pub fn share<L: Library>(library: L) -> Result<SharedCapability> {
    Ok(Arc::new(Mutex::new(LibraryCell::new(library)?)))
}

/// Builds a fresh library instance on demand.
pub type Constructor = fn() -> Result<SharedCapability>;

/// [`Constructor`] for any library with a default configuration.
pub fn construct<L: Library + Default>() -> Result<SharedCapability> {
    share(L::default())
}

pub(crate) fn lock(library: &SharedCapability) -> MutexGuard<'_, dyn Capability + 'static> {
    library.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One resolved import: a library and the function inside it.
#[derive(Clone)]
pub struct BoundFunction {
    library: SharedCapability,
    module: String,
    function: String,
    index: usize,
}

impl BoundFunction {
    pub(crate) fn new(library: SharedCapability, module: &str, function: &str, index: usize) -> Self {
        BoundFunction {
            library,
            module: module.to_string(),
            function: function.to_string(),
            index,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn library(&self) -> &SharedCapability {
        &self.library
    }

    /// Call the function against explicit memory.
    pub fn call(&self, memory: &mut dyn GuestMemory, args: &[RawValue]) -> Result<Option<RawValue>> {
        lock(&self.library).invoke(self.index, memory, args)
    }

    /// Call the function from inside the engine, against the memory of the
    /// instance the library is bound to.
    pub fn call_in<C>(&self, ctx: C, args: &[RawValue]) -> Result<Option<RawValue>>
    where
        C: AsContextMut,
        C::Data: 'static,
    {
        let mut library = lock(&self.library);
        match library.instance() {
            Some(handle) => library.invoke(self.index, &mut WasmMemory::new(ctx, handle), args),
            None => library.invoke(self.index, &mut Detached { module: &self.module }, args),
        }
    }
}

impl std::fmt::Debug for BoundFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoundFunction({}.{})", self.module, self.function)
    }
}

/// Positional arguments of one host call, with the memory they refer into.
pub struct CallArgs<'a> {
    function: &'static str,
    memory: &'a mut dyn GuestMemory,
    raw: &'a [RawValue],
}

impl<'a> CallArgs<'a> {
    pub fn new(function: &'static str, memory: &'a mut dyn GuestMemory, raw: &'a [RawValue]) -> Self {
        CallArgs {
            function,
            memory,
            raw,
        }
    }

    pub fn function(&self) -> &'static str {
        self.function
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn raw(&self, index: usize) -> Result<RawValue> {
        self.raw.get(index).copied().ok_or_else(|| {
            Error::capability(self.function, format!("missing argument {index}"))
        })
    }

    pub fn int(&self, index: usize) -> Result<i32> {
        Ok(self.raw(index)?.as_i32())
    }

    pub fn num(&self, index: usize) -> Result<f64> {
        Ok(self.raw(index)?.as_f64())
    }

    pub fn bool(&self, index: usize) -> Result<bool> {
        Ok(self.raw(index)?.as_i32() != 0)
    }

    pub fn decode(&self, index: usize, ty: &TypeDescriptor) -> Result<Value> {
        codec::decode(&*self.memory, ty, self.raw(index)?)
    }

    pub fn opt_str(&self, index: usize) -> Result<Option<String>> {
        match self.decode(index, &TypeDescriptor::Str)? {
            Value::Str(s) => Ok(Some(s)),
            _ => Ok(None),
        }
    }

    pub fn str(&self, index: usize) -> Result<String> {
        self.opt_str(index)?
            .ok_or_else(|| Error::capability(self.function, format!("argument {index} is null")))
    }

    pub fn str_array(&self, index: usize) -> Result<Vec<String>> {
        self.array(index, TypeDescriptor::Str)?
            .into_iter()
            .map(|v| match v {
                Value::Str(s) => Ok(s),
                other => Err(Error::mismatch("str", other.kind())),
            })
            .collect()
    }

    pub fn int_array(&self, index: usize) -> Result<Vec<i32>> {
        self.array(index, TypeDescriptor::Int)?
            .into_iter()
            .map(|v| match v {
                Value::Int(i) => Ok(i),
                other => Err(Error::mismatch("int", other.kind())),
            })
            .collect()
    }

    /// A `[num]` argument, `None` when the guest passed null.
    pub fn opt_num_array(&self, index: usize) -> Result<Option<Vec<f64>>> {
        match self.decode(index, &TypeDescriptor::array(TypeDescriptor::Num))? {
            Value::Array(items) => Ok(Some(items.iter().filter_map(Value::as_f64).collect())),
            _ => Ok(None),
        }
    }

    fn array(&self, index: usize, element: TypeDescriptor) -> Result<Vec<Value>> {
        self.decode(index, &TypeDescriptor::array(element))?
            .into_array()
            .ok_or_else(|| Error::capability(self.function, format!("argument {index} is null")))
    }

    pub fn memory(&mut self) -> &mut dyn GuestMemory {
        &mut *self.memory
    }

    pub fn encode(&mut self, ty: &TypeDescriptor, value: &Value) -> Result<RawValue> {
        codec::encode(&mut *self.memory, ty, value)
    }

    pub fn ret_str(&mut self, s: &str) -> Result<Option<RawValue>> {
        codec::encode_str(&mut *self.memory, s).map(|addr| Some(RawValue::I32(addr)))
    }

    pub fn ret_value(&mut self, ty: &TypeDescriptor, value: impl Into<Value>) -> Result<Option<RawValue>> {
        self.encode(ty, &value.into()).map(Some)
    }

    pub fn ret_str_array(&mut self, items: Vec<String>) -> Result<Option<RawValue>> {
        self.ret_value(&TypeDescriptor::array(TypeDescriptor::Str), items)
    }

    pub fn ret_int_array(&mut self, items: Vec<i32>) -> Result<Option<RawValue>> {
        self.ret_value(&TypeDescriptor::array(TypeDescriptor::Int), items)
    }
}

/// Scalar result helper for host function bodies.
pub fn ret(value: impl Into<RawValue>) -> Result<Option<RawValue>> {
    Ok(Some(value.into()))
}
