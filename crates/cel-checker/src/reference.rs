//! Resolved references recorded per expression node.

use std::fmt;

use cel_checker_common::CelValue;

/// Reference information for a resolved identifier or function.
#[derive(Debug, Clone)]
pub struct ReferenceInfo {
    /// The fully qualified name.
    pub name: String,
    /// Matching overload ids for function calls.
    pub overload_ids: Vec<String>,
    /// Constant value for enum constants.
    pub value: Option<CelValue>,
}

impl ReferenceInfo {
    /// Create an identifier reference.
    pub fn ident(name: impl Into<String>, value: Option<CelValue>) -> Self {
        Self {
            name: name.into(),
            overload_ids: Vec::new(),
            value,
        }
    }

    /// Create a function reference with overload ids.
    pub fn function(name: impl Into<String>, overload_ids: Vec<String>) -> Self {
        Self {
            name: name.into(),
            overload_ids,
            value: None,
        }
    }

    /// Returns true if this reference names a function.
    pub fn is_function(&self) -> bool {
        !self.overload_ids.is_empty()
    }

    /// Record another matching overload id, ignoring duplicates.
    pub fn add_overload(&mut self, overload_id: &str) {
        if !self.overload_ids.iter().any(|id| id == overload_id) {
            self.overload_ids.push(overload_id.to_string());
        }
    }
}

/// Overload ids compare as a set.
impl PartialEq for ReferenceInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.value == other.value
            && self.overload_ids.len() == other.overload_ids.len()
            && self.overload_ids.iter().all(|id| other.overload_ids.contains(id))
    }
}

impl fmt::Display for ReferenceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.is_function() {
            write!(f, "[{}]", self.overload_ids.join(", "))?;
        }
        if let Some(value) = &self.value {
            write!(f, " = {}", value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overload_order_does_not_matter() {
        let a = ReferenceInfo::function("_+_", vec!["add_int64".into(), "add_double".into()]);
        let b = ReferenceInfo::function("_+_", vec!["add_double".into(), "add_int64".into()]);
        assert_eq!(a, b);
        assert_ne!(a, ReferenceInfo::function("_+_", vec!["add_int64".into()]));
    }

    #[test]
    fn test_add_overload_dedupes() {
        let mut r = ReferenceInfo::function("size", vec!["size_string".into()]);
        r.add_overload("size_string");
        r.add_overload("size_bytes");
        assert_eq!(r.overload_ids, vec!["size_string", "size_bytes"]);
    }

    #[test]
    fn test_display() {
        assert_eq!(ReferenceInfo::ident("x", None).to_string(), "x");
        assert_eq!(
            ReferenceInfo::ident("pkg.Color.RED", Some(CelValue::Int(1))).to_string(),
            "pkg.Color.RED = 1"
        );
        assert_eq!(
            ReferenceInfo::function("size", vec!["size_string".into()]).to_string(),
            "size[size_string]"
        );
    }
}
