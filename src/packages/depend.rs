// src/packages/depend.rs

//! Requires/provides/conflicts/obsoletes entries

use serde::Serialize;
use std::fmt;

/// Comparison attached to a versioned dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependFlag {
    Any,
    Less,
    Greater,
    Equal,
}

impl DependFlag {
    /// Parse the flag column used by repository indexes (`LT`, `GE`, ...)
    ///
    /// Inclusive comparisons fold onto their strict direction. An unknown
    /// value yields `None` so the caller can skip the entry.
    pub fn from_index_text(text: Option<&str>) -> Option<Self> {
        match text {
            None | Some("") => Some(DependFlag::Any),
            Some("LT") | Some("LE") => Some(DependFlag::Less),
            Some("GT") | Some("GE") => Some(DependFlag::Greater),
            Some("EQ") => Some(DependFlag::Equal),
            Some(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DependFlag::Any => "~",
            DependFlag::Less => "<",
            DependFlag::Greater => ">",
            DependFlag::Equal => "=",
        }
    }
}

/// A named capability with an optional version constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Depend {
    name: String,
    flag: DependFlag,
    version: Option<String>,
}

impl Depend {
    pub fn new(name: impl Into<String>, flag: DependFlag, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            flag,
            version,
        }
    }

    /// Unversioned capability
    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, DependFlag::Any, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flag(&self) -> DependFlag {
        self.flag
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl fmt::Display for Depend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.flag, &self.version) {
            (DependFlag::Any, _) | (_, None) => write!(f, "{}", self.name),
            (flag, Some(version)) => write!(f, "{} {} {}", self.name, flag.as_str(), version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_from_index_text() {
        assert_eq!(DependFlag::from_index_text(None), Some(DependFlag::Any));
        assert_eq!(DependFlag::from_index_text(Some("LE")), Some(DependFlag::Less));
        assert_eq!(DependFlag::from_index_text(Some("GE")), Some(DependFlag::Greater));
        assert_eq!(DependFlag::from_index_text(Some("EQ")), Some(DependFlag::Equal));
        assert_eq!(DependFlag::from_index_text(Some("XX")), None);
    }

    #[test]
    fn test_display() {
        let versioned = Depend::new("glib2", DependFlag::Greater, Some("2.16".to_string()));
        assert_eq!(versioned.to_string(), "glib2 > 2.16");
        assert_eq!(Depend::any("bash").to_string(), "bash");
    }
}
