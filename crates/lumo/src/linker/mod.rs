//! Import resolution for guest instantiation.
//!
//! The [`ImportResolver`] maps each host import a guest declares onto a
//! function of a library instance, constructing libraries the first time one
//! of their functions is requested.

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::engine::Environment;
use crate::error::{Error, Result};
use crate::library::{lock, BoundFunction, Constructor, SharedCapability};
use crate::module::{ImportKind, ImportRequirement, HOST_MODULE};

/// Resolved imports of one guest module.
pub struct Resolution {
    /// Import name to bound function, in declaration order.
    pub imports: IndexMap<String, BoundFunction>,
    /// Every library instance involved, the default standard library first.
    /// Each appears once no matter how many of its functions were imported.
    pub libraries: IndexMap<String, SharedCapability>,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("imports", &self.imports)
            .field("libraries", &self.libraries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Resolution {
    pub fn get(&self, name: &str) -> Option<&BoundFunction> {
        self.imports.get(name)
    }
}

/// Resolves a module's declared imports against the library registry.
///
/// Lookup order for a library name:
/// 1. a library supplied by the embedder,
/// 2. an instance already used by this resolution,
/// 3. a new instance built from the environment's class map.
pub struct ImportResolver<'a> {
    environment: Environment,
    classes: &'a IndexMap<&'static str, Constructor>,
    overrides: &'a IndexMap<String, SharedCapability>,
}

impl<'a> ImportResolver<'a> {
    pub fn new(
        environment: Environment,
        classes: &'a IndexMap<&'static str, Constructor>,
        overrides: &'a IndexMap<String, SharedCapability>,
    ) -> Self {
        ImportResolver {
            environment,
            classes,
            overrides,
        }
    }

    /// Split an import name into its library and function.
    ///
    /// `math.sin` names `sin` in `math`; an undotted name belongs to the
    /// environment's default standard library.
    pub fn target<'n>(&self, name: &'n str) -> (&'n str, &'n str) {
        match name.split_once('.') {
            Some((library, function)) => (library, function),
            None => (self.environment.default_library(), name),
        }
    }

    /// Bind every `env` function import of a module.
    pub fn resolve(&self, imports: &[ImportRequirement]) -> Result<Resolution> {
        let mut libraries = IndexMap::new();
        let default = self.environment.default_library();
        let standard = match self.overrides.get(default) {
            Some(library) => library.clone(),
            None => (self.environment.default_constructor())()?,
        };
        libraries.insert(default.to_string(), standard);

        let mut bound = IndexMap::new();
        for import in imports {
            if import.module != HOST_MODULE {
                warn!(module = %import.module, name = %import.name, "skipping import outside host module");
                continue;
            }
            if import.kind != ImportKind::Func {
                warn!(name = %import.name, kind = %import.kind, "skipping non-function host import");
                continue;
            }
            let (library_name, function) = self.target(&import.name);
            let library = self.library(&mut libraries, library_name)?;
            let index = lock(&library)
                .function(function)
                .ok_or_else(|| Error::FunctionNotFound {
                    module: library_name.to_string(),
                    function: function.to_string(),
                })?;
            debug!(import = %import.name, library = library_name, function, "bound import");
            bound.insert(
                import.name.clone(),
                BoundFunction::new(library, library_name, function, index),
            );
        }
        Ok(Resolution {
            imports: bound,
            libraries,
        })
    }

    fn library(
        &self,
        libraries: &mut IndexMap<String, SharedCapability>,
        name: &str,
    ) -> Result<SharedCapability> {
        if let Some(library) = self.overrides.get(name) {
            libraries.entry(name.to_string()).or_insert_with(|| library.clone());
            return Ok(library.clone());
        }
        if let Some(library) = libraries.get(name) {
            return Ok(library.clone());
        }
        let constructor = self.classes.get(name).ok_or_else(|| Error::UnknownModule {
            module: name.to_string(),
        })?;
        let library = constructor()?;
        debug!(library = name, "constructed library");
        libraries.insert(name.to_string(), library.clone());
        Ok(library)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::library::{construct, ret, share, Exports, Library};

    fn func(name: &str) -> ImportRequirement {
        ImportRequirement::func("env", name)
    }

    #[derive(Default)]
    struct Greeter;

    impl Library for Greeter {
        const NAME: &'static str = "greeter";

        fn register(exports: &mut Exports<Self>) {
            exports.func("answer", |_, _| ret(42));
        }
    }

    fn resolve(
        environment: Environment,
        overrides: &IndexMap<String, SharedCapability>,
        imports: &[ImportRequirement],
    ) -> Result<Resolution> {
        let classes = environment.classes();
        ImportResolver::new(environment, &classes, overrides).resolve(imports)
    }

    #[test]
    fn routes_dotted_and_bare_names() {
        let resolution = resolve(
            Environment::Node,
            &IndexMap::new(),
            &[func("print"), func("math.sin"), func("math.cos"), func("to_str")],
        )
        .unwrap();
        let names: Vec<_> = resolution.libraries.keys().cloned().collect();
        assert_eq!(names, ["node", "math"]);
        assert_eq!(resolution.get("math.cos").unwrap().function(), "cos");
        assert_eq!(resolution.get("print").unwrap().module(), "node");
        assert!(Arc::ptr_eq(
            resolution.get("math.sin").unwrap().library(),
            resolution.get("math.cos").unwrap().library()
        ));
    }

    #[test]
    fn unknown_library_and_function_are_errors() {
        let err = resolve(Environment::Node, &IndexMap::new(), &[func("nope.x")]).unwrap_err();
        assert!(matches!(err, Error::UnknownModule { module } if module == "nope"));

        let err = resolve(Environment::Node, &IndexMap::new(), &[func("math.tau")]).unwrap_err();
        assert!(
            matches!(err, Error::FunctionNotFound { module, function } if module == "math" && function == "tau")
        );

        let err = resolve(Environment::Web, &IndexMap::new(), &[func("os.getcwd")]).unwrap_err();
        assert!(matches!(err, Error::UnknownModule { .. }));
        let err = resolve(Environment::Web, &IndexMap::new(), &[func("print")]).unwrap_err();
        assert!(matches!(err, Error::FunctionNotFound { module, .. } if module == "web"));
    }

    #[test]
    fn overrides_win_over_construction() {
        let custom = share(Greeter).unwrap();
        let mut overrides = IndexMap::new();
        overrides.insert("math".to_string(), custom.clone());
        overrides.insert("greeter".to_string(), custom.clone());

        let resolution = resolve(
            Environment::Node,
            &overrides,
            &[func("greeter.answer"), func("math.answer")],
        )
        .unwrap();
        assert!(Arc::ptr_eq(resolution.get("math.answer").unwrap().library(), &custom));

        let err = resolve(Environment::Node, &overrides, &[func("math.sin")]).unwrap_err();
        assert!(matches!(err, Error::FunctionNotFound { .. }));
    }

    #[test]
    fn skips_foreign_and_non_function_imports() {
        let imports = [
            ImportRequirement::func("wasi_snapshot_preview1", "fd_write"),
            ImportRequirement {
                module: "env".into(),
                name: "memory".into(),
                kind: ImportKind::Memory,
            },
        ];
        let resolution = resolve(Environment::Node, &IndexMap::new(), &imports).unwrap();
        assert!(resolution.imports.is_empty());
        assert_eq!(resolution.libraries.len(), 1);
    }

    #[test]
    fn registered_classes_are_constructible() {
        let mut classes = Environment::Node.classes();
        classes.insert(Greeter::NAME, construct::<Greeter>);
        let overrides = IndexMap::new();
        let resolver = ImportResolver::new(Environment::Node, &classes, &overrides);
        let resolution = resolver.resolve(&[func("greeter.answer")]).unwrap();
        assert_eq!(resolution.get("greeter.answer").unwrap().module(), "greeter");
    }
}
