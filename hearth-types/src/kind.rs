//! Field kinds: a primitive plus the container shape and modifiers.
//!
//! Kinds were historically declared as OR-ed bit masks (`INT | MANDATORY`).
//! The mask form is still accepted through [`Kind::from_bits`] and the text
//! form (`"int|mandatory"`), but internally a kind is a [`Shape`] so that
//! combinations such as copy-object arrays cannot be expressed at all.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bit values of the legacy mask encoding.
pub mod bits {
    pub const BOOL: u32 = 1;
    pub const INT: u32 = 2;
    pub const FLOAT: u32 = 4;
    pub const STRING: u32 = 8;
    pub const DATETIME: u32 = 16;
    pub const PRIMITIVE: u32 = BOOL | INT | FLOAT | STRING | DATETIME;
    pub const ARRAY: u32 = 32;
    pub const OBJECT: u32 = 64;
    pub const MANDATORY: u32 = 128;
    pub const COPY_OBJECT: u32 = 256;
    pub const DELETE_MISSING: u32 = 512;
    pub const ALL: u32 = PRIMITIVE | ARRAY | OBJECT | MANDATORY | COPY_OBJECT | DELETE_MISSING;
}

/// The scalar type a leaf value is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Bool,
    Int,
    Float,
    String,
    DateTime,
}

impl Primitive {
    const ALL: [Primitive; 5] = [
        Primitive::Bool,
        Primitive::Int,
        Primitive::Float,
        Primitive::String,
        Primitive::DateTime,
    ];

    /// Returns the bit this primitive occupies in the mask encoding.
    #[must_use]
    pub const fn bit(self) -> u32 {
        match self {
            Primitive::Bool => bits::BOOL,
            Primitive::Int => bits::INT,
            Primitive::Float => bits::FLOAT,
            Primitive::String => bits::STRING,
            Primitive::DateTime => bits::DATETIME,
        }
    }

    const fn token(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::String => "string",
            Primitive::DateTime => "datetime",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// What a copy-object container holds under each of its pre-existing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyShape {
    Scalar(Primitive),
    Object,
}

/// The structural shape of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// A single coerced value.
    Scalar(Primitive),
    /// A sequence of coerced values, always replaced wholesale.
    Array(Primitive),
    /// A nested document described by child attributes.
    Object,
    /// A sequence of nested documents, reconciled by key or position.
    ObjectArray,
    /// A pass-through container that only updates keys it already holds.
    Copy(CopyShape),
}

impl Shape {
    /// Returns true if values of this shape are JSON objects or hold them.
    #[must_use]
    pub const fn holds_objects(self) -> bool {
        matches!(
            self,
            Shape::Object | Shape::ObjectArray | Shape::Copy(CopyShape::Object)
        )
    }
}

/// A field kind: shape plus the mandatory and delete-missing modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "KindRepr", into = "String")]
pub struct Kind {
    shape: Shape,
    mandatory: bool,
    delete_missing: bool,
}

impl Kind {
    /// Creates a kind, rejecting delete-missing on shapes without attributes.
    pub fn new(shape: Shape, mandatory: bool, delete_missing: bool) -> Result<Self> {
        if delete_missing && !shape.holds_objects() {
            return Err(Error::InvalidKind(format!(
                "delete_missing requires an object shape, got {shape:?}"
            )));
        }
        Ok(Self {
            shape,
            mandatory,
            delete_missing,
        })
    }

    #[must_use]
    pub const fn scalar(primitive: Primitive) -> Self {
        Self::plain(Shape::Scalar(primitive))
    }

    #[must_use]
    pub const fn array(primitive: Primitive) -> Self {
        Self::plain(Shape::Array(primitive))
    }

    #[must_use]
    pub const fn object() -> Self {
        Self::plain(Shape::Object)
    }

    #[must_use]
    pub const fn object_array() -> Self {
        Self::plain(Shape::ObjectArray)
    }

    #[must_use]
    pub const fn copy_scalars(primitive: Primitive) -> Self {
        Self::plain(Shape::Copy(CopyShape::Scalar(primitive)))
    }

    #[must_use]
    pub const fn copy_objects() -> Self {
        Self::plain(Shape::Copy(CopyShape::Object))
    }

    const fn plain(shape: Shape) -> Self {
        Self {
            shape,
            mandatory: false,
            delete_missing: false,
        }
    }

    /// Marks the field mandatory.
    #[must_use]
    pub const fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Deletes attributes a patch omits. Ignored on shapes without attributes.
    #[must_use]
    pub const fn delete_missing(mut self) -> Self {
        self.delete_missing = self.shape.holds_objects();
        self
    }

    #[must_use]
    pub const fn shape(&self) -> Shape {
        self.shape
    }

    /// Returns the leaf primitive, if the shape has one.
    #[must_use]
    pub const fn primitive(&self) -> Option<Primitive> {
        match self.shape {
            Shape::Scalar(p) | Shape::Array(p) | Shape::Copy(CopyShape::Scalar(p)) => Some(p),
            Shape::Object | Shape::ObjectArray | Shape::Copy(CopyShape::Object) => None,
        }
    }

    #[must_use]
    pub const fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    #[must_use]
    pub const fn deletes_missing(&self) -> bool {
        self.delete_missing
    }

    /// The kind each key of a copy-object container is merged with.
    /// Other kinds are returned unchanged.
    #[must_use]
    pub const fn without_copy(self) -> Self {
        let shape = match self.shape {
            Shape::Copy(CopyShape::Scalar(p)) => Shape::Scalar(p),
            Shape::Copy(CopyShape::Object) => Shape::Object,
            other => other,
        };
        Self { shape, ..self }
    }

    /// Decodes the legacy bit-mask encoding.
    pub fn from_bits(mask: u32) -> Result<Self> {
        if mask & !bits::ALL != 0 {
            return Err(Error::InvalidKind(format!("unknown bits in {mask:#x}")));
        }
        let mut primitives = Primitive::ALL.iter().filter(|p| mask & p.bit() != 0);
        let primitive = primitives.next().copied();
        if primitives.next().is_some() {
            return Err(Error::InvalidKind(format!(
                "{mask:#x} combines more than one primitive"
            )));
        }
        let require = || {
            primitive.ok_or_else(|| Error::InvalidKind(format!("{mask:#x} has no primitive")))
        };

        let array = mask & bits::ARRAY != 0;
        let object = mask & bits::OBJECT != 0;
        let copy = mask & bits::COPY_OBJECT != 0;
        let shape = match (copy, array, object) {
            (true, true, _) => {
                return Err(Error::InvalidKind(
                    "copy_object cannot be combined with array".into(),
                ));
            }
            (true, false, true) => Shape::Copy(CopyShape::Object),
            (true, false, false) => Shape::Copy(CopyShape::Scalar(require()?)),
            (false, true, true) => Shape::ObjectArray,
            (false, false, true) => Shape::Object,
            (false, true, false) => Shape::Array(require()?),
            (false, false, false) => Shape::Scalar(require()?),
        };
        Self::new(
            shape,
            mask & bits::MANDATORY != 0,
            mask & bits::DELETE_MISSING != 0,
        )
    }

    /// Encodes this kind as a bit mask.
    #[must_use]
    pub fn bits(&self) -> u32 {
        let mut mask = self.primitive().map_or(0, Primitive::bit);
        mask |= match self.shape {
            Shape::Scalar(_) => 0,
            Shape::Array(_) => bits::ARRAY,
            Shape::Object => bits::OBJECT,
            Shape::ObjectArray => bits::ARRAY | bits::OBJECT,
            Shape::Copy(CopyShape::Scalar(_)) => bits::COPY_OBJECT,
            Shape::Copy(CopyShape::Object) => bits::COPY_OBJECT | bits::OBJECT,
        };
        if self.mandatory {
            mask |= bits::MANDATORY;
        }
        if self.delete_missing {
            mask |= bits::DELETE_MISSING;
        }
        mask
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = self.bits();
        let mut tokens: Vec<&str> = Vec::new();
        if let Some(p) = self.primitive() {
            tokens.push(p.token());
        }
        for (bit, token) in [
            (bits::ARRAY, "array"),
            (bits::OBJECT, "object"),
            (bits::COPY_OBJECT, "copy_object"),
            (bits::MANDATORY, "mandatory"),
            (bits::DELETE_MISSING, "delete_missing"),
        ] {
            if mask & bit != 0 {
                tokens.push(token);
            }
        }
        f.write_str(&tokens.join("|"))
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut mask = 0;
        for token in s.split(['|', '+']) {
            let token = token.trim().to_ascii_lowercase();
            mask |= match token.as_str() {
                "bool" | "boolean" => bits::BOOL,
                "int" | "integer" => bits::INT,
                "float" | "number" => bits::FLOAT,
                "string" => bits::STRING,
                "datetime" | "date_time" => bits::DATETIME,
                "array" => bits::ARRAY,
                "object" => bits::OBJECT,
                "mandatory" => bits::MANDATORY,
                "copy_object" => bits::COPY_OBJECT,
                "delete_missing" => bits::DELETE_MISSING,
                other => {
                    return Err(Error::InvalidKind(format!("unknown kind token '{other}'")));
                }
            };
        }
        Self::from_bits(mask)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KindRepr {
    Bits(u32),
    Text(String),
}

impl TryFrom<KindRepr> for Kind {
    type Error = Error;

    fn try_from(repr: KindRepr) -> Result<Self> {
        match repr {
            KindRepr::Bits(mask) => Kind::from_bits(mask),
            KindRepr::Text(text) => text.parse(),
        }
    }
}

impl From<Kind> for String {
    fn from(kind: Kind) -> Self {
        kind.to_string()
    }
}
