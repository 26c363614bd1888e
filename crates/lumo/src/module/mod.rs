//! Guest module inspection.
//!
//! A [`GuestModule`] is a validated wasm binary together with what the host
//! needs to know before instantiating it: the imports it declares, the names
//! it exports and the descriptor of its return value.

use std::fmt;

use wasmparser::{ExternalKind, Parser, Payload, TypeRef, Validator};

use crate::descriptor::TypeDescriptor;
use crate::error::{Error, Result};

/// Custom section in which the compiler stores the return-type descriptor.
pub const RETURN_TYPE_SECTION: &str = "lumo.return_type";

/// Module tag under which guests declare host imports.
pub const HOST_MODULE: &str = "env";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Func,
    Table,
    Memory,
    Global,
    Tag,
}

impl From<&TypeRef> for ImportKind {
    fn from(ty: &TypeRef) -> Self {
        match ty {
            TypeRef::Func(_) => ImportKind::Func,
            TypeRef::Table(_) => ImportKind::Table,
            TypeRef::Memory(_) => ImportKind::Memory,
            TypeRef::Global(_) => ImportKind::Global,
            TypeRef::Tag(_) => ImportKind::Tag,
        }
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImportKind::Func => "func",
            ImportKind::Table => "table",
            ImportKind::Memory => "memory",
            ImportKind::Global => "global",
            ImportKind::Tag => "tag",
        })
    }
}

/// One import declared by a guest module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequirement {
    pub module: String,
    pub name: String,
    pub kind: ImportKind,
}

impl ImportRequirement {
    pub fn func(module: &str, name: &str) -> Self {
        ImportRequirement {
            module: module.to_string(),
            name: name.to_string(),
            kind: ImportKind::Func,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GuestModule {
    bytes: Vec<u8>,
    imports: Vec<ImportRequirement>,
    exports: Vec<(String, ExternalKind)>,
    return_type: Option<TypeDescriptor>,
}

fn binary_error(err: wasmparser::BinaryReaderError) -> Error {
    Error::Wasm(err.into())
}

impl GuestModule {
    /// Inspect a wasm binary, validating it first when `validate` is set.
    pub fn from_bytes(bytes: Vec<u8>, validate: bool) -> Result<Self> {
        if validate {
            Validator::new().validate_all(&bytes).map_err(binary_error)?;
        }
        let mut imports = Vec::new();
        let mut exports = Vec::new();
        let mut return_type = None;
        for payload in Parser::new(0).parse_all(&bytes) {
            match payload.map_err(binary_error)? {
                Payload::ImportSection(reader) => {
                    for import in reader {
                        let import = import.map_err(binary_error)?;
                        imports.push(ImportRequirement {
                            module: import.module.to_string(),
                            name: import.name.to_string(),
                            kind: ImportKind::from(&import.ty),
                        });
                    }
                }
                Payload::ExportSection(reader) => {
                    for export in reader {
                        let export = export.map_err(binary_error)?;
                        exports.push((export.name.to_string(), export.kind));
                    }
                }
                Payload::CustomSection(reader) if reader.name() == RETURN_TYPE_SECTION => {
                    return_type = parse_section(reader.data())?;
                }
                _ => {}
            }
        }
        Ok(GuestModule {
            bytes,
            imports,
            exports,
            return_type,
        })
    }

    /// Replace the descriptor read from the module.
    pub fn with_return_type(mut self, return_type: Option<TypeDescriptor>) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn imports(&self) -> &[ImportRequirement] {
        &self.imports
    }

    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.exports.iter().map(|(name, _)| name.as_str())
    }

    pub fn exports_func(&self, name: &str) -> bool {
        self.exports
            .iter()
            .any(|(n, kind)| n == name && *kind == ExternalKind::Func)
    }

    pub fn return_type(&self) -> Option<&TypeDescriptor> {
        self.return_type.as_ref()
    }
}

/// Read only the return-type section of a binary.
pub fn read_return_type(bytes: &[u8]) -> Result<Option<TypeDescriptor>> {
    for payload in Parser::new(0).parse_all(bytes) {
        if let Payload::CustomSection(reader) = payload.map_err(binary_error)? {
            if reader.name() == RETURN_TYPE_SECTION {
                return parse_section(reader.data());
            }
        }
    }
    Ok(None)
}

fn parse_section(data: &[u8]) -> Result<Option<TypeDescriptor>> {
    let text = std::str::from_utf8(data).map_err(|e| Error::MalformedDescriptor(e.to_string()))?;
    TypeDescriptor::parse(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUEST: &str = r#"
        (module
          (import "env" "print" (func (param i32)))
          (import "env" "math.sin" (func (param f32) (result f32)))
          (import "host" "mem" (memory 1))
          (func (export "_start") (result i32) i32.const 0)
          (@custom "lumo.return_type" "\"int\"")
        )
    "#;

    #[test]
    fn lists_imports_exports_and_return_type() {
        let module = GuestModule::from_bytes(wat::parse_str(GUEST).unwrap(), true).unwrap();
        assert_eq!(
            module.imports(),
            [
                ImportRequirement::func("env", "print"),
                ImportRequirement::func("env", "math.sin"),
                ImportRequirement {
                    module: "host".into(),
                    name: "mem".into(),
                    kind: ImportKind::Memory,
                },
            ]
        );
        assert!(module.exports_func("_start"));
        assert!(!module.exports_func("malloc"));
        assert_eq!(module.return_type(), Some(&TypeDescriptor::Int));
    }

    #[test]
    fn missing_section_means_no_return_value() {
        let bytes = wat::parse_str(r#"(module (func (export "_start")))"#).unwrap();
        assert_eq!(read_return_type(&bytes).unwrap(), None);
        let module = GuestModule::from_bytes(bytes, true)
            .unwrap()
            .with_return_type(Some(TypeDescriptor::Str));
        assert_eq!(module.return_type(), Some(&TypeDescriptor::Str));
    }

    #[test]
    fn malformed_return_type_is_rejected() {
        let bytes = wat::parse_str(
            r#"(module (@custom "lumo.return_type" "alert(1)") (func (export "_start")))"#,
        )
        .unwrap();
        assert!(matches!(
            GuestModule::from_bytes(bytes, true),
            Err(Error::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn invalid_binary_is_rejected() {
        assert!(matches!(
            GuestModule::from_bytes(b"\0asm\x01\0\0\0\xff".to_vec(), true),
            Err(Error::Wasm(_))
        ));
    }
}
