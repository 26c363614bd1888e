//! One guest execution, from source to decoded result.
//!
//! A session walks a fixed sequence of states:
//!
//! 1. **Compiling**: the external compiler produces a binary and the return
//!    type descriptor.
//! 2. **Resolving**: every declared host import is bound to a library
//!    function.
//! 3. **Instantiating**: each bound function becomes a host function with the
//!    signature the guest declared for it.
//! 4. **Bound**: every library involved is pointed at the live instance, so it
//!    can read and allocate guest memory.
//! 5. **Executed**: `_start` has run and its result has been decoded.
//!
//! Libraries must not touch guest memory before step 4. A call that does,
//! such as one made from a wasm start function, fails with
//! [`Error::Unbound`].

use std::fmt;

use indexmap::IndexSet;
use tracing::debug;
use wasmtime::{ExternType, Linker, Store, Val, ValType};

use crate::codec;
use crate::compiler::Compiler;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::library::lock;
use crate::linker::Resolution;
use crate::memory::{InstanceHandle, WasmMemory};
use crate::module::{GuestModule, HOST_MODULE};
use crate::value::{RawValue, Value};

/// Exported linear memory.
pub const MEMORY_EXPORT: &str = "mem";
/// Exported allocator, `(size: i32) -> address: i32`.
pub const MALLOC_EXPORT: &str = "malloc";
/// Exported entry point.
pub const START_EXPORT: &str = "_start";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Compiling,
    Resolving,
    Instantiating,
    Bound,
    Executed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct HostSession<'e> {
    engine: &'e Engine,
    state: SessionState,
    resolution: Option<Resolution>,
}

impl<'e> HostSession<'e> {
    pub(crate) fn new(engine: &'e Engine) -> Self {
        HostSession {
            engine,
            state: SessionState::Compiling,
            resolution: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Imports bound by the last run, if it got that far.
    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "session state");
        self.state = next;
    }

    /// Compile `source` and run the result.
    pub fn eval<C: Compiler + ?Sized>(&mut self, compiler: &C, source: &str) -> Result<Option<Value>> {
        self.transition(SessionState::Compiling);
        let compiled = compiler.compile(source)?;
        let module = self.engine.load(compiled)?;
        self.run(&module)
    }

    /// Resolve, instantiate, bind and execute `module`, decoding the value
    /// `_start` returns with the module's return type. Returns `None` for a
    /// module without a return type.
    pub fn run(&mut self, module: &GuestModule) -> Result<Option<Value>> {
        self.transition(SessionState::Resolving);
        let resolution = self.engine.resolver().resolve(module.imports())?;

        self.transition(SessionState::Instantiating);
        let wasm = wasmtime::Module::new(self.engine.wasm(), module.bytes())?;
        let mut store = Store::new(self.engine.wasm(), ());
        let mut linker: Linker<()> = Linker::new(self.engine.wasm());
        let mut defined = IndexSet::new();
        for import in wasm.imports() {
            // A name imported more than once is defined once and shared.
            if import.module() != HOST_MODULE || !defined.insert(import.name().to_string()) {
                continue;
            }
            let (ExternType::Func(ty), Some(bound)) = (import.ty(), resolution.get(import.name()))
            else {
                continue;
            };
            let bound = bound.clone();
            let results: Vec<ValType> = ty.results().collect();
            linker.func_new(HOST_MODULE, import.name(), ty, move |mut caller, params, out| {
                let args = params.iter().map(RawValue::from_val).collect::<Result<Vec<_>>>()?;
                let returned = bound.call_in(&mut caller, &args)?;
                if let (Some(slot), Some(ty)) = (out.first_mut(), results.first()) {
                    *slot = returned.unwrap_or(RawValue::I32(0)).to_val(ty)?;
                }
                Ok(())
            })?;
        }
        let instance = linker
            .instantiate(&mut store, &wasm)
            .map_err(Error::from_trap)?;

        let memory = instance
            .get_memory(&mut store, MEMORY_EXPORT)
            .ok_or_else(|| Error::MissingExport(MEMORY_EXPORT.to_string()))?;
        let malloc = instance
            .get_func(&mut store, MALLOC_EXPORT)
            .ok_or_else(|| Error::MissingExport(MALLOC_EXPORT.to_string()))?
            .typed::<i32, i32>(&store)?;
        let start = instance
            .get_func(&mut store, START_EXPORT)
            .ok_or_else(|| Error::MissingExport(START_EXPORT.to_string()))?;
        let handle = InstanceHandle { memory, malloc };
        for library in resolution.libraries.values() {
            lock(library).bind_instance(handle.clone());
        }
        self.resolution = Some(resolution);
        self.transition(SessionState::Bound);

        let mut results = start
            .ty(&store)
            .results()
            .map(|ty| RawValue::I32(0).to_val(&ty))
            .collect::<Result<Vec<Val>>>()?;
        start
            .call(&mut store, &[], &mut results)
            .map_err(Error::from_trap)?;
        self.transition(SessionState::Executed);

        let (Some(ty), Some(raw)) = (module.return_type(), results.first()) else {
            return Ok(None);
        };
        let raw = RawValue::from_val(raw)?;
        let memory = WasmMemory::new(&mut store, handle);
        codec::decode(&memory, ty, raw).map(Some)
    }
}
