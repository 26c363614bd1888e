//! Value shapes exchanged across the guest boundary.
//!
//! A [`TypeDescriptor`] tells the codec how a value is laid out in guest
//! linear memory. The compiler emits the descriptor of the program's return
//! value as JSON text; it is parsed as data with [`TypeDescriptor::parse`] and
//! never evaluated.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Width of every slot in an array or dict, regardless of the scalar width.
pub const SLOT: u32 = 4;

/// Closed vocabulary of value shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Repr", into = "Repr")]
pub enum TypeDescriptor {
    Int,
    Num,
    Bool,
    Str,
    Array { element: Box<TypeDescriptor> },
    Dict { fields: IndexMap<String, Field> },
    Enum { values: Vec<String> },
    /// Self-reference from a dict field to the enclosing dict.
    Alias { name: String },
}

/// A dict field: its slot offset from the record base and its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub offset: u32,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
}

impl TypeDescriptor {
    /// Parse the compiler's return-type text. `null` means the program
    /// returns nothing.
    pub fn parse(text: &str) -> Result<Option<TypeDescriptor>> {
        serde_json::from_str(text).map_err(|e| Error::MalformedDescriptor(e.to_string()))
    }

    pub fn array(element: TypeDescriptor) -> Self {
        TypeDescriptor::Array {
            element: Box::new(element),
        }
    }

    /// Build a dict whose fields occupy consecutive slots in declaration order.
    pub fn dict<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, TypeDescriptor)>,
        S: Into<String>,
    {
        let fields = fields
            .into_iter()
            .enumerate()
            .map(|(i, (name, ty))| {
                let offset = i as u32 * SLOT;
                (name.into(), Field { offset, ty })
            })
            .collect();
        TypeDescriptor::Dict { fields }
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TypeDescriptor::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether slots holding this shape use the float32 view.
    pub fn is_float(&self) -> bool {
        matches!(self, TypeDescriptor::Num)
    }

    /// Bytes a value of this shape occupies when stored, for reference
    /// types only the fixed part (length prefix plus slots) is counted.
    pub fn storage_size(&self, len: usize) -> u32 {
        match self {
            TypeDescriptor::Array { .. } => SLOT * (1 + len as u32),
            TypeDescriptor::Dict { fields } => SLOT * fields.len() as u32,
            _ => SLOT,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TypeDescriptor::Int => "int",
            TypeDescriptor::Num => "num",
            TypeDescriptor::Bool => "bool",
            TypeDescriptor::Str => "str",
            TypeDescriptor::Array { .. } => "array",
            TypeDescriptor::Dict { .. } => "dict",
            TypeDescriptor::Enum { .. } => "enum",
            TypeDescriptor::Alias { .. } => "alias",
        }
    }
}

impl std::fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeDescriptor::Array { element } => write!(f, "[{element}]"),
            TypeDescriptor::Dict { fields } => {
                f.write_str("@{")?;
                for (i, (name, field)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {}", field.ty)?;
                }
                f.write_str("}")
            }
            TypeDescriptor::Enum { values } => write!(f, "({})", values.join(" | ")),
            TypeDescriptor::Alias { name } => f.write_str(name),
            scalar => f.write_str(scalar.kind()),
        }
    }
}

// Wire representation: scalars are bare strings, compound shapes are objects
// tagged by "type".

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Repr {
    Scalar(Scalar),
    Compound(Compound),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Scalar {
    Int,
    Num,
    Bool,
    Str,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Compound {
    Array {
        element: Box<TypeDescriptor>,
    },
    Dict {
        fields: IndexMap<String, Field>,
    },
    Enum {
        #[serde(rename = "enum", alias = "values")]
        values: Vec<String>,
    },
    Alias {
        name: String,
    },
}

impl From<Repr> for TypeDescriptor {
    fn from(repr: Repr) -> Self {
        match repr {
            Repr::Scalar(Scalar::Int) => TypeDescriptor::Int,
            Repr::Scalar(Scalar::Num) => TypeDescriptor::Num,
            Repr::Scalar(Scalar::Bool) => TypeDescriptor::Bool,
            Repr::Scalar(Scalar::Str) => TypeDescriptor::Str,
            Repr::Compound(Compound::Array { element }) => TypeDescriptor::Array { element },
            Repr::Compound(Compound::Dict { fields }) => TypeDescriptor::Dict { fields },
            Repr::Compound(Compound::Enum { values }) => TypeDescriptor::Enum { values },
            Repr::Compound(Compound::Alias { name }) => TypeDescriptor::Alias { name },
        }
    }
}

impl From<TypeDescriptor> for Repr {
    fn from(ty: TypeDescriptor) -> Self {
        match ty {
            TypeDescriptor::Int => Repr::Scalar(Scalar::Int),
            TypeDescriptor::Num => Repr::Scalar(Scalar::Num),
            TypeDescriptor::Bool => Repr::Scalar(Scalar::Bool),
            TypeDescriptor::Str => Repr::Scalar(Scalar::Str),
            TypeDescriptor::Array { element } => Repr::Compound(Compound::Array { element }),
            TypeDescriptor::Dict { fields } => Repr::Compound(Compound::Dict { fields }),
            TypeDescriptor::Enum { values } => Repr::Compound(Compound::Enum { values }),
            TypeDescriptor::Alias { name } => Repr::Compound(Compound::Alias { name }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars_and_void() {
        assert_eq!(TypeDescriptor::parse("\"int\"").unwrap(), Some(TypeDescriptor::Int));
        assert_eq!(TypeDescriptor::parse("\"str\"").unwrap(), Some(TypeDescriptor::Str));
        assert_eq!(TypeDescriptor::parse("null").unwrap(), None);
    }

    #[test]
    fn parses_nested_dict_preserving_field_order() {
        let text = r#"{
            "type": "dict",
            "fields": {
                "zeta": { "type": "int", "offset": 0 },
                "alpha": { "type": { "type": "array", "element": "num" }, "offset": 4 },
                "next": { "type": { "type": "alias", "name": "Node" }, "offset": 8 }
            }
        }"#;
        let ty = TypeDescriptor::parse(text).unwrap().unwrap();
        let TypeDescriptor::Dict { fields } = &ty else {
            panic!("expected dict, got {ty:?}");
        };
        let names: Vec<_> = fields.keys().cloned().collect();
        assert_eq!(names, ["zeta", "alpha", "next"]);
        assert_eq!(fields["alpha"].offset, 4);
        assert_eq!(fields["alpha"].ty, TypeDescriptor::array(TypeDescriptor::Num));
        assert_eq!(ty.storage_size(0), 12);
    }

    #[test]
    fn enum_accepts_both_member_keys() {
        let a = TypeDescriptor::parse(r#"{"type":"enum","enum":["red","green"]}"#).unwrap();
        let b = TypeDescriptor::parse(r#"{"type":"enum","values":["red","green"]}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Some(TypeDescriptor::enumeration(["red", "green"])));
    }

    #[test]
    fn rejects_code_and_unknown_tags() {
        for text in [
            "\"float\"",
            r#"{"type":"tuple","items":[]}"#,
            "(() => { throw 1 })()",
            r#"{ type: "array", element: "int" }"#,
        ] {
            assert!(
                matches!(TypeDescriptor::parse(text), Err(Error::MalformedDescriptor(_))),
                "accepted {text}"
            );
        }
    }

    #[test]
    fn serializes_back_to_wire_form() {
        let ty = TypeDescriptor::array(TypeDescriptor::dict([("a", TypeDescriptor::Int)]));
        let text = serde_json::to_string(&ty).unwrap();
        assert_eq!(
            text,
            r#"{"type":"array","element":{"type":"dict","fields":{"a":{"offset":0,"type":"int"}}}}"#
        );
        assert_eq!(TypeDescriptor::parse(&text).unwrap(), Some(ty));
    }

    #[test]
    fn display_uses_source_syntax() {
        let ty = TypeDescriptor::dict([
            ("name", TypeDescriptor::Str),
            ("tags", TypeDescriptor::array(TypeDescriptor::Str)),
        ]);
        assert_eq!(ty.to_string(), "@{name: str, tags: [str]}");
        assert_eq!(TypeDescriptor::enumeration(["a", "b"]).to_string(), "(a | b)");
    }
}
