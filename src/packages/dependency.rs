// src/packages/dependency.rs

//! Dependency strings as found in `%DEPENDS%` and `%OPTDEPENDS%`

/// A dependency on another package by name
///
/// Version constraints are kept for display only; they are not solved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub constraint: Option<String>,
    pub description: Option<String>,
}

impl Dependency {
    /// Parse "package>=1.0", "package=1.0", "package<2.0" or just "package"
    pub fn parse(dep: &str) -> Self {
        let dep = dep.trim();
        match dep.find(['<', '>', '=']) {
            Some(pos) => Self {
                name: dep[..pos].trim().to_string(),
                constraint: Some(dep[pos..].trim().to_string()),
                description: None,
            },
            None => Self {
                name: dep.to_string(),
                constraint: None,
                description: None,
            },
        }
    }

    /// Parse an optional dependency: "package: description" or "package"
    pub fn parse_optional(dep: &str) -> Self {
        match dep.split_once(':') {
            Some((pkg, desc)) => Self {
                description: Some(desc.trim().to_string()),
                ..Self::parse(pkg)
            },
            None => Self::parse(dep),
        }
    }
}
