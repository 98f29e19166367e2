// src/packages/schema.rs

//! Key table for the `%KEY%` descriptor format
//!
//! Parsing, validation, local conversion and serialization all read this
//! table, so the order here is also the order keys are written in.

/// How many value lines a key may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Single,
    Multi,
}

/// How the values of a key are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Integer,
}

/// Which descriptor variant may contain a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Sync database and local database
    Common,
    /// Sync database only; dropped when a package is installed
    Remote,
    /// Local database only; set when a package is installed
    Local,
}

impl Scope {
    pub fn allows(self, variant: Scope) -> bool {
        self == Scope::Common || self == variant
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub required: bool,
    pub arity: Arity,
    pub kind: ValueKind,
    pub scope: Scope,
}

const fn field(key: &'static str, arity: Arity, kind: ValueKind, scope: Scope) -> FieldSpec {
    FieldSpec {
        key,
        required: false,
        arity,
        kind,
        scope,
    }
}

const fn required(key: &'static str) -> FieldSpec {
    FieldSpec {
        key,
        required: true,
        arity: Arity::Single,
        kind: ValueKind::Text,
        scope: Scope::Common,
    }
}

use Arity::{Multi, Single};
use Scope::{Common, Local, Remote};
use ValueKind::{Integer, Text};

pub const FIELDS: &[FieldSpec] = &[
    field("FILENAME", Single, Text, Remote),
    required("NAME"),
    field("BASE", Single, Text, Common),
    required("VERSION"),
    field("DESC", Multi, Text, Common),
    field("GROUPS", Multi, Text, Common),
    field("CSIZE", Single, Integer, Remote),
    field("ISIZE", Single, Integer, Remote),
    field("MD5SUM", Single, Text, Remote),
    field("SHA256SUM", Single, Text, Remote),
    field("PGPSIG", Single, Text, Remote),
    field("URL", Single, Text, Common),
    field("LICENSE", Multi, Text, Common),
    required("ARCH"),
    field("BUILDDATE", Single, Integer, Common),
    field("INSTALLDATE", Single, Integer, Local),
    field("PACKAGER", Single, Text, Common),
    field("SIZE", Single, Integer, Local),
    field("REASON", Single, Integer, Local),
    field("VALIDATION", Multi, Text, Local),
    field("REPLACES", Multi, Text, Common),
    field("DEPENDS", Multi, Text, Common),
    field("OPTDEPENDS", Multi, Text, Common),
    field("MAKEDEPENDS", Multi, Text, Remote),
    field("CHECKDEPENDS", Multi, Text, Remote),
    field("CONFLICTS", Multi, Text, Common),
    field("PROVIDES", Multi, Text, Common),
];

/// Look up the schema entry for a key name (without `%` markers)
pub fn lookup(key: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|spec| spec.key == key)
}

/// Position of a key in serialization order; unknown keys sort last
pub fn position(key: &str) -> usize {
    FIELDS
        .iter()
        .position(|spec| spec.key == key)
        .unwrap_or(FIELDS.len())
}
