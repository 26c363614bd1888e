//! Host engine: configuration, the library registry and session creation.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use tracing::debug;

use crate::compiler::{CompiledModule, Compiler};
use crate::error::Result;
use crate::library::datetime::DatetimeLib;
use crate::library::math::MathLib;
use crate::library::os::OsLib;
use crate::library::random::Random;
use crate::library::stdlib::{NodeLib, WebLib};
use crate::library::time::TimeLib;
use crate::library::{construct, Constructor, Library, SharedCapability};
use crate::linker::ImportResolver;
use crate::module::GuestModule;
use crate::session::HostSession;
use crate::value::Value;

/// Host flavour. Decides the default standard library and which libraries
/// guests may import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Node,
    Web,
}

impl Environment {
    /// Library that serves undotted import names.
    pub fn default_library(self) -> &'static str {
        match self {
            Environment::Node => NodeLib::NAME,
            Environment::Web => WebLib::NAME,
        }
    }

    pub(crate) fn default_constructor(self) -> Constructor {
        match self {
            Environment::Node => construct::<NodeLib>,
            Environment::Web => construct::<WebLib>,
        }
    }

    /// Libraries constructible by name in this environment.
    pub fn classes(self) -> IndexMap<&'static str, Constructor> {
        let mut classes: IndexMap<&'static str, Constructor> = IndexMap::new();
        classes.insert(MathLib::NAME, construct::<MathLib>);
        if self == Environment::Node {
            classes.insert(OsLib::NAME, construct::<OsLib>);
        }
        classes.insert(Random::NAME, construct::<Random>);
        classes.insert(DatetimeLib::NAME, construct::<DatetimeLib>);
        classes.insert(TimeLib::NAME, construct::<TimeLib>);
        classes
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_library())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "node" => Ok(Environment::Node),
            "web" => Ok(Environment::Web),
            other => Err(format!("unknown environment '{other}' (expected node or web)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    /// Validate guest binaries before inspecting them.
    pub validate: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            environment: Environment::Node,
            validate: true,
        }
    }
}

impl Config {
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }
}

/// Shared state for running guest modules.
///
/// Holds the wasm engine, the class map of libraries that can be constructed
/// by name and any library instances supplied by the embedder, which take
/// precedence over construction.
pub struct Engine {
    wasm: wasmtime::Engine,
    config: Config,
    classes: IndexMap<&'static str, Constructor>,
    overrides: IndexMap<String, SharedCapability>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Engine {
            wasm: wasmtime::Engine::default(),
            classes: config.environment.classes(),
            overrides: IndexMap::new(),
            config,
        }
    }

    /// Supply a ready-made library under `name`. It is used instead of
    /// constructing one, including for the default standard library.
    pub fn with_library(mut self, name: impl Into<String>, library: SharedCapability) -> Self {
        let name = name.into();
        debug!(library = %name, "registered library override");
        self.overrides.insert(name, library);
        self
    }

    /// Make another library constructible by name.
    pub fn register(&mut self, name: &'static str, constructor: Constructor) {
        self.classes.insert(name, constructor);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn wasm(&self) -> &wasmtime::Engine {
        &self.wasm
    }

    pub fn resolver(&self) -> ImportResolver<'_> {
        ImportResolver::new(self.config.environment, &self.classes, &self.overrides)
    }

    pub fn load(&self, compiled: CompiledModule) -> Result<GuestModule> {
        Ok(GuestModule::from_bytes(compiled.bytes, self.config.validate)?
            .with_return_type(compiled.return_type))
    }

    pub fn session(&self) -> HostSession<'_> {
        HostSession::new(self)
    }

    /// Compile `source` and run it to completion in a fresh session.
    pub fn eval<C: Compiler + ?Sized>(&self, compiler: &C, source: &str) -> Result<Option<Value>> {
        self.session().eval(compiler, source)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environments_differ_in_os_access() {
        let node = Environment::Node.classes();
        let web = Environment::Web.classes();
        assert!(node.contains_key("os"));
        assert!(!web.contains_key("os"));
        for name in ["math", "random", "datetime", "time"] {
            assert!(web.contains_key(name) && node.contains_key(name));
        }
        assert_eq!(Environment::Web.default_library(), "web");
    }

    #[test]
    fn parses_environment_names() {
        assert_eq!("Node".parse::<Environment>().unwrap(), Environment::Node);
        assert_eq!("web".parse::<Environment>().unwrap(), Environment::Web);
        assert!("deno".parse::<Environment>().is_err());
    }
}
