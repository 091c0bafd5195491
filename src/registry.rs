use std::collections::BTreeMap;

use serde::Serialize;

use crate::data::model::Channel;
use crate::error::RegistrySourceError;

// ---------------------------------------------------------------------------
// Name normalization
// ---------------------------------------------------------------------------

/// Normalize a standard or sample identifier so registry keys and sample
/// identifiers compare equal regardless of incidental formatting: uppercase,
/// internal whitespace stripped, one trailing `.` dropped.
///
/// `"  ormea "`, `"Ormea"` and `"ORMEA."` all normalize to `"ORMEA"`.
pub fn normalize_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    if name.ends_with('.') {
        name.pop();
    }
    name
}

// ---------------------------------------------------------------------------
// Standard
// ---------------------------------------------------------------------------

/// A reference material with accepted δ18O/δ2H values (‰).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standard {
    /// Normalized name, the unique registry key.
    pub name: String,
    pub d18o: f64,
    pub d2h: f64,
}

impl Standard {
    pub fn reference(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Delta18O => self.d18o,
            Channel::Delta2H => self.d2h,
        }
    }
}

/// A `(name, δ18O, δ2H)` triple as supplied by the external loader
/// collaborator. The core never reads the source format itself.
pub type StandardEntry = (String, f64, f64);

/// Built-in reference standards used when no external source is available.
pub const DEFAULT_STANDARDS: [(&str, f64, f64); 4] = [
    ("NIVOLET", -22.47, -171.6),
    ("ORMEA", -11.52, -77.9),
    ("H2OPI", -6.68, -39.4),
    ("SSW", -0.54, -2.2),
];

// ---------------------------------------------------------------------------
// StandardRegistry
// ---------------------------------------------------------------------------

/// The mapping of normalized standard name → reference values.
///
/// Owned by the process for the session lifetime and read-only during a run.
/// Session overrides produce a new registry (`with_overrides`) rather than
/// mutating loaded state, so runs stay reproducible.
#[derive(Debug, Clone)]
pub struct StandardRegistry {
    entries: BTreeMap<String, Standard>,
    used_defaults: bool,
}

impl StandardRegistry {
    /// Registry holding only the built-in default standards.
    pub fn defaults() -> Self {
        let entries = DEFAULT_STANDARDS
            .iter()
            .map(|&(name, d18o, d2h)| {
                let standard = Standard {
                    name: name.to_string(),
                    d18o,
                    d2h,
                };
                (standard.name.clone(), standard)
            })
            .collect();
        Self {
            entries,
            used_defaults: true,
        }
    }

    /// Build from loader-supplied entries. An empty supply falls back to the
    /// built-in defaults, observably (`used_defaults`).
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = StandardEntry>,
    {
        let entries: BTreeMap<String, Standard> = entries
            .into_iter()
            .map(|(name, d18o, d2h)| {
                let name = normalize_name(&name);
                (
                    name.clone(),
                    Standard { name, d18o, d2h },
                )
            })
            .collect();

        if entries.is_empty() {
            log::warn!("standards source supplied no entries, using built-in defaults");
            return Self::defaults();
        }
        Self {
            entries,
            used_defaults: false,
        }
    }

    /// Consume the loader collaborator's outcome. A failed source is
    /// recovered locally: defaults are used and the failure is logged, never
    /// propagated.
    pub fn from_source(source: Result<Vec<StandardEntry>, RegistrySourceError>) -> Self {
        match source {
            Ok(entries) => Self::from_entries(entries),
            Err(e) => {
                log::warn!("{e}, using built-in defaults");
                Self::defaults()
            }
        }
    }

    /// Look up a standard by name, under normalization.
    pub fn lookup(&self, name: &str) -> Option<&Standard> {
        self.entries.get(&normalize_name(name))
    }

    /// All standards in deterministic (name) order.
    pub fn all(&self) -> impl Iterator<Item = &Standard> {
        self.entries.values()
    }

    /// Whether the built-in defaults are in use instead of a loaded source.
    pub fn used_defaults(&self) -> bool {
        self.used_defaults
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A copy of this registry with the given entries merged over it, for
    /// session-only target adjustments. `self` is left untouched.
    pub fn with_overrides<I>(&self, overrides: I) -> Self
    where
        I: IntoIterator<Item = StandardEntry>,
    {
        let mut merged = self.clone();
        for (name, d18o, d2h) in overrides {
            let name = normalize_name(&name);
            merged
                .entries
                .insert(name.clone(), Standard { name, d18o, d2h });
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_entry_and_sample_identifier_resolve_to_the_same_key() {
        let registry = StandardRegistry::from_entries(vec![("  ormea ".to_string(), -11.52, -77.9)]);
        let standard = registry.lookup("Ormea").expect("lookup failed");
        assert_eq!(standard.name, "ORMEA");
        assert_eq!(standard.d18o, -11.52);
    }

    #[test]
    fn trailing_dot_is_stripped() {
        assert_eq!(normalize_name("SSW."), "SSW");
        assert_eq!(normalize_name(" h2o pi "), "H2OPI");
    }

    #[test]
    fn empty_supply_falls_back_to_defaults() {
        let registry = StandardRegistry::from_entries(Vec::new());
        assert!(registry.used_defaults());
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.lookup("NIVOLET").unwrap().d2h, -171.6);
    }

    #[test]
    fn failed_source_falls_back_to_defaults() {
        let registry = StandardRegistry::from_source(Err(crate::error::RegistrySourceError(
            "standards.xlsx not found".to_string(),
        )));
        assert!(registry.used_defaults());
        assert!(registry.lookup("SSW").is_some());
    }

    #[test]
    fn loaded_source_is_not_flagged_as_defaults() {
        let registry =
            StandardRegistry::from_source(Ok(vec![("LAB1".to_string(), -5.0, -30.0)]));
        assert!(!registry.used_defaults());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn overrides_merge_into_a_copy() {
        let base = StandardRegistry::defaults();
        let adjusted = base.with_overrides(vec![("SSW".to_string(), -0.5, -2.0)]);

        assert_eq!(adjusted.lookup("SSW").unwrap().d18o, -0.5);
        // The session override never mutates the loaded registry.
        assert_eq!(base.lookup("SSW").unwrap().d18o, -0.54);
        assert_eq!(adjusted.len(), 4);
    }
}
