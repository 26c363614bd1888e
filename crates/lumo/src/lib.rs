pub mod codec;
mod compiler;
mod descriptor;
mod engine;
mod error;
pub mod library;
mod linker;
pub mod memory;
mod module;
mod repl;
mod session;
mod value;

pub use compiler::{CommandCompiler, CompiledModule, Compiler, WatCompiler};
pub use descriptor::{Field, TypeDescriptor, SLOT};
pub use engine::{Config, Engine, Environment};
pub use error::{Error, Result};
pub use library::{share, Library, SharedCapability};
pub use linker::{ImportResolver, Resolution};
pub use module::{GuestModule, ImportKind, ImportRequirement, HOST_MODULE, RETURN_TYPE_SECTION};
pub use repl::Repl;
pub use session::{HostSession, SessionState, MALLOC_EXPORT, MEMORY_EXPORT, START_EXPORT};
pub use value::{RawValue, Value, NULL};
