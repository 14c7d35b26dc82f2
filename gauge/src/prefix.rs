//! Prefix resolution
//!
//! Maps an unresolved identifier onto a known unit, possibly after stripping
//! one or more multiplicative prefixes, with a trailing-plural fallback.
//! Longest matching prefix wins; all-uppercase identifiers are treated as
//! fixed symbols and never split.

use gauge_core::GaugeError;

use crate::tables::TablesSnapshot;

/// Outcome of resolving an identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Product of every stripped prefix's multiplier (1.0 when none).
    pub multiplier: f64,
    /// Lookup key of the base unit, or `None` for a bare prefix used as a
    /// dimensionless value (`kilo` alone means 1000).
    pub base: Option<String>,
}

/// Resolve `name` against the snapshot.
///
/// Order of attempts: verbatim unit; bare prefix; prefix + recursively
/// resolved remainder (longest prefix wins); trailing-`s` plural strip as
/// the last resort. All-uppercase names only get the verbatim attempt.
pub fn resolve(name: &str, tables: &TablesSnapshot) -> Result<Resolved, GaugeError> {
    if tables.unit(name).is_some() {
        return Ok(Resolved { multiplier: 1.0, base: Some(name.to_string()) });
    }

    // Acronym-style symbols (PSI, GB) must not be mistaken for prefix
    // stacks; they resolve verbatim or not at all.
    if is_all_uppercase(name) {
        return Err(GaugeError::unknown_unit(name));
    }

    if let Some(prefix) = tables.prefix(name) {
        return Ok(Resolved { multiplier: prefix.multiplier, base: None });
    }

    if let Some(result) = split_prefixed(name, tables)? {
        return Ok(result);
    }

    if let Some(stripped) = name.strip_suffix('s') {
        if !stripped.is_empty() {
            if let Ok(resolved) = resolve(stripped, tables) {
                return Ok(resolved);
            }
        }
    }

    Err(GaugeError::unknown_unit(name))
}

fn is_all_uppercase(name: &str) -> bool {
    let mut has_letter = false;
    for c in name.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_alphabetic() {
            has_letter = true;
        }
    }
    has_letter
}

/// Try every prefix that is a proper leading substring of `name` and whose
/// remainder itself resolves. Longest prefix wins; an exact length tie
/// between distinct matches is an ambiguity.
fn split_prefixed(
    name: &str,
    tables: &TablesSnapshot,
) -> Result<Option<Resolved>, GaugeError> {
    let mut best: Option<(usize, String, Resolved)> = None;
    let mut tied_with: Option<String> = None;

    for prefix in tables.prefixes() {
        if prefix.name.len() >= name.len() || !name.starts_with(&prefix.name) {
            continue;
        }
        let remainder = &name[prefix.name.len()..];
        let rest = match resolve(remainder, tables) {
            Ok(rest) => rest,
            Err(_) => continue,
        };
        let candidate = Resolved {
            multiplier: prefix.multiplier * rest.multiplier,
            base: rest.base,
        };
        match &best {
            Some((len, held, _)) if *len == prefix.name.len() && *held != prefix.name => {
                tied_with = Some(prefix.name.clone());
            }
            Some((len, _, _)) if *len > prefix.name.len() => {}
            _ => {
                best = Some((prefix.name.len(), prefix.name.clone(), candidate));
                tied_with = None;
            }
        }
    }

    match (best, tied_with) {
        (Some((_, held, _)), Some(other)) => Err(GaugeError::domain(
            name.to_string(),
            format!("ambiguous prefix: '{}-' and '{}-' both match", held, other),
        )),
        (Some((_, _, resolved)), None) => Ok(Some(resolved)),
        (None, _) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::TableBuilder;

    fn tables(text: &str) -> TablesSnapshot {
        let (tables, errors) = TableBuilder::new().add_source("test", text).build();
        assert!(errors.is_empty(), "{:?}", errors);
        tables
    }

    #[test]
    fn test_verbatim() {
        let t = tables("m  !\n");
        assert_eq!(
            resolve("m", &t).unwrap(),
            Resolved { multiplier: 1.0, base: Some("m".into()) }
        );
    }

    #[test]
    fn test_single_prefix() {
        let t = tables("meter  !\nkilo-  1000\n");
        let r = resolve("kilometer", &t).unwrap();
        assert_eq!(r.multiplier, 1000.0);
        assert_eq!(r.base.as_deref(), Some("meter"));
    }

    #[test]
    fn test_longest_prefix_wins() {
        // "centi" must beat a hypothetical shorter "c" prefix for
        // "centimeter" even when both could match.
        let t = tables("meter  !\ncenti-  0.01\nc-  0.01\n");
        let r = resolve("centimeter", &t).unwrap();
        assert_eq!(r.multiplier, 0.01);
        assert_eq!(r.base.as_deref(), Some("meter"));
    }

    #[test]
    fn test_stacked_prefixes() {
        let t = tables("meter  !\nkilo-  1000\nmilli-  0.001\n");
        let r = resolve("millikilometer", &t).unwrap();
        assert!((r.multiplier - 1.0).abs() < 1e-12);
        assert_eq!(r.base.as_deref(), Some("meter"));
    }

    #[test]
    fn test_bare_prefix() {
        let t = tables("kilo-  1000\n");
        let r = resolve("kilo", &t).unwrap();
        assert_eq!(r.multiplier, 1000.0);
        assert_eq!(r.base, None);
    }

    #[test]
    fn test_plural_strip() {
        let t = tables("mile  !\nkilo-  1000\n");
        assert_eq!(resolve("miles", &t).unwrap().base.as_deref(), Some("mile"));
        // plural of a prefixed name
        assert_eq!(resolve("kilomiles", &t).unwrap().multiplier, 1000.0);
    }

    #[test]
    fn test_uppercase_exempt_from_splitting() {
        // "PA" could parse as prefix "P" + unit "A"; the uppercase rule
        // forbids the split.
        let t = tables("A  !\nP-  1e15\n");
        assert!(resolve("PA", &t).is_err());
        assert!(resolve("A", &t).is_ok());
    }

    #[test]
    fn test_unknown() {
        let t = tables("m  !\n");
        assert_eq!(
            resolve("zorble", &t).unwrap_err(),
            GaugeError::unknown_unit("zorble")
        );
    }
}
