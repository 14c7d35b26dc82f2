//! Definition tables: the line-oriented database builder and its snapshot
//!
//! A database is one or more named text sources. Each non-comment logical
//! line defines a unit, a prefix (name ending in `-`), or introduces a
//! function block. The builder is resilient: a malformed entry becomes a
//! collected `TableBuildError` and is skipped, and later sources override
//! earlier definitions of the same name so personal files can layer over
//! the default database.
//!
//! The result is an immutable `TablesSnapshot`. Reduced quantities for every
//! resolvable unit are memoized eagerly during the build, so the snapshot is
//! never written after `build` returns and is safe to share across threads.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use gauge_core::{Dimension, Quantity, TableBuildError};

use crate::parser::parse;
use crate::reduce::Reducer;

/// Where a definition came from, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub source_name: String,
    /// 1-based line of the entry's first physical line.
    pub line: usize,
}

/// Body of a unit definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnitBody {
    /// No further definition; a basis vector of the dimensional space.
    /// `dimensionless` primitives (marked `!dimensionless`) are ignored by
    /// lenient conformability checks.
    Primitive { dimensionless: bool },
    /// Raw definition expression, resolved lazily by the reducer.
    Expression(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDef {
    /// Canonical name (first name on the defining line).
    pub name: String,
    /// Alternate names from the same line.
    pub aka: BTreeSet<String>,
    pub body: UnitBody,
    pub location: SourceLocation,
}

impl UnitDef {
    pub fn is_primitive(&self) -> bool {
        matches!(self.body, UnitBody::Primitive { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixDef {
    /// Prefix name without the trailing `-` marker.
    pub name: String,
    pub multiplier: f64,
    pub location: SourceLocation,
}

/// Interpolation policy of a tabular function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    /// Piecewise-linear inside the breakpoint range, error outside.
    Linear,
    /// Round to the closer breakpoint, error outside the range.
    Nearest,
    /// Piecewise-linear inside, nearest end value outside.
    Clamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinOp {
    Sqrt,
    CubeRoot,
    Ln,
    Log10,
    Sin,
    Cos,
    Tan,
    Atan,
}

impl BuiltinOp {
    fn from_keyword(word: &str) -> Option<BuiltinOp> {
        Some(match word {
            "sqrt" => BuiltinOp::Sqrt,
            "cuberoot" => BuiltinOp::CubeRoot,
            "ln" => BuiltinOp::Ln,
            "log10" => BuiltinOp::Log10,
            "sin" => BuiltinOp::Sin,
            "cos" => BuiltinOp::Cos,
            "tan" => BuiltinOp::Tan,
            "atan" => BuiltinOp::Atan,
            _ => return None,
        })
    }
}

/// The four function variants, closed so every evaluation path has to match
/// all of them exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunctionKind {
    Linear {
        slope: f64,
        intercept: f64,
        /// Required dimension of the input quantity.
        domain: Dimension,
        /// Dimension of the result, e.g. temperature for `tempC(x)` taking
        /// a bare number.
        range: Dimension,
    },
    Table {
        /// (x, y) pairs, ascending in x. Validated at build time.
        breakpoints: Vec<(f64, f64)>,
        interpolation: Interpolation,
    },
    Builtin {
        op: BuiltinOp,
    },
    Computed {
        /// Raw formula, re-parsed and evaluated per call with the
        /// placeholder bound to the input quantity.
        formula: String,
        referenced: BTreeSet<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    /// Placeholder identifier from the introducer, e.g. the `x` of `tempF(x)`.
    pub placeholder: String,
    pub kind: FunctionKind,
    pub location: SourceLocation,
}

/// Immutable snapshot of all definitions. Built once; never mutated.
/// Rebuilding a changed database produces a brand-new snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TablesSnapshot {
    units: HashMap<String, UnitDef>,
    prefixes: HashMap<String, PrefixDef>,
    functions: HashMap<String, FunctionDef>,
    /// Primitive names marked `!dimensionless`, ignored by lenient
    /// conformability.
    dimensionless: BTreeSet<String>,
    /// Eagerly memoized reduced quantities, keyed by canonical unit name.
    cache: HashMap<String, Quantity>,
}

impl TablesSnapshot {
    pub fn unit(&self, name: &str) -> Option<&UnitDef> {
        self.units.get(name)
    }

    pub fn prefix(&self, name: &str) -> Option<&PrefixDef> {
        self.prefixes.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &PrefixDef> {
        self.prefixes.values()
    }

    /// All unit names (canonical and aliases), sorted.
    pub fn unit_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.units.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// The configured ignore set for lenient conformability.
    pub fn ignored_dimensionless(&self) -> &BTreeSet<String> {
        &self.dimensionless
    }

    /// Memoized reduced quantity for a canonical unit name.
    pub fn cached(&self, canonical_name: &str) -> Option<&Quantity> {
        self.cache.get(canonical_name)
    }
}

/// Builds a `TablesSnapshot` from ordered text sources.
///
/// ```
/// use gauge::TableBuilder;
///
/// let (tables, errors) = TableBuilder::new()
///     .add_source("base", "m  !\nkilo-  1000\nkm  kilo m\n")
///     .build();
/// assert!(errors.is_empty());
/// assert!(tables.unit("km").is_some());
/// ```
#[derive(Debug, Default)]
pub struct TableBuilder {
    sources: Vec<(String, String)>,
}

/// A function whose parameters still need reduction against the finished
/// unit/prefix tables.
#[derive(Debug)]
enum PendingKind {
    Linear { formula: String, formula_line: usize },
    Ready(FunctionKind),
}

#[derive(Debug)]
struct PendingFunction {
    name: String,
    placeholder: String,
    kind: PendingKind,
    location: SourceLocation,
}

#[derive(Debug)]
struct PendingPrefix {
    names: Vec<String>,
    body: String,
    location: SourceLocation,
}

impl TableBuilder {
    pub fn new() -> Self {
        TableBuilder::default()
    }

    pub fn add_source(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.sources.push((name.into(), text.into()));
        self
    }

    /// Consume every source in order and return the snapshot together with
    /// all collected entry errors. The snapshot is usable even when errors
    /// occurred; the caller decides whether a nonzero count is fatal.
    pub fn build(self) -> (TablesSnapshot, Vec<TableBuildError>) {
        let mut snapshot = TablesSnapshot::default();
        let mut errors = Vec::new();
        let mut pending_prefixes: Vec<PendingPrefix> = Vec::new();
        let mut pending_functions: HashMap<String, PendingFunction> = HashMap::new();

        for (source_name, text) in &self.sources {
            scan_source(
                source_name,
                text,
                &mut snapshot,
                &mut pending_prefixes,
                &mut pending_functions,
                &mut errors,
            );
        }

        resolve_prefixes(&mut snapshot, pending_prefixes, &mut errors);
        resolve_functions(&mut snapshot, pending_functions, &mut errors);
        memoize_units(&mut snapshot);

        debug!(
            units = snapshot.units.len(),
            prefixes = snapshot.prefixes.len(),
            functions = snapshot.functions.len(),
            errors = errors.len(),
            "definition tables built"
        );
        (snapshot, errors)
    }
}

/// One logical line: continuations joined, comments stripped.
struct LogicalLine {
    line: usize,
    text: String,
    indented: bool,
}

fn logical_lines(text: &str) -> Vec<LogicalLine> {
    let mut out = Vec::new();
    let mut pending: Option<LogicalLine> = None;

    for (idx, raw) in text.lines().enumerate() {
        let uncommented = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let continued = uncommented.trim_end().ends_with('\\');
        let content = uncommented.trim_end().trim_end_matches('\\');

        match pending.as_mut() {
            Some(cur) => {
                cur.text.push(' ');
                cur.text.push_str(content.trim());
            }
            None => {
                if content.trim().is_empty() {
                    continue;
                }
                pending = Some(LogicalLine {
                    line: idx + 1,
                    indented: content.starts_with(' ') || content.starts_with('\t'),
                    text: content.trim_end().to_string(),
                });
            }
        }

        if !continued {
            if let Some(done) = pending.take() {
                out.push(done);
            }
        }
    }
    if let Some(done) = pending.take() {
        out.push(done);
    }
    out
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Split the leading name field: a comma-separated alias list followed by
/// the definition body. `metre, meter  m` yields (["metre", "meter"], "m").
fn split_names(line: &str) -> Option<(Vec<String>, String)> {
    let mut names = Vec::new();
    let mut rest = line.trim_start();
    loop {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let (token, tail) = rest.split_at(end);
        if let Some(name) = token.strip_suffix(',') {
            names.push(name.to_string());
            rest = tail.trim_start();
            if rest.is_empty() {
                return None;
            }
        } else {
            names.push(token.to_string());
            rest = tail.trim_start();
            break;
        }
    }
    if names.iter().any(|n| n.is_empty()) {
        return None;
    }
    Some((names, rest.to_string()))
}

/// Parse a function introducer name field like `tempF(x)`.
fn split_function_name(token: &str) -> Option<(String, String)> {
    let open = token.find('(')?;
    let close = token.strip_suffix(')')?;
    let name = &token[..open];
    let placeholder = &close[open + 1..];
    if is_valid_name(name) && is_valid_name(placeholder) {
        Some((name.to_string(), placeholder.to_string()))
    } else {
        None
    }
}

fn scan_source(
    source_name: &str,
    text: &str,
    snapshot: &mut TablesSnapshot,
    pending_prefixes: &mut Vec<PendingPrefix>,
    pending_functions: &mut HashMap<String, PendingFunction>,
    errors: &mut Vec<TableBuildError>,
) {
    let lines = logical_lines(text);
    let mut i = 0;

    while i < lines.len() {
        let entry = &lines[i];
        if entry.indented {
            errors.push(TableBuildError::new(
                source_name,
                entry.line,
                "indented line outside a function block",
            ));
            i += 1;
            continue;
        }

        let first_token = entry.text.split_whitespace().next().unwrap_or("");
        if first_token.contains('(') {
            i = scan_function_block(source_name, &lines, i, pending_functions, errors);
            continue;
        }

        match split_names(&entry.text) {
            Some((names, body)) if !body.is_empty() => {
                if names[0].ends_with('-') {
                    scan_prefix_entry(source_name, entry, names, body, pending_prefixes, errors);
                } else {
                    scan_unit_entry(source_name, entry, names, body, snapshot, errors);
                }
            }
            _ => {
                errors.push(TableBuildError::new(
                    source_name,
                    entry.line,
                    format!("missing definition for '{}'", first_token),
                ));
            }
        }
        i += 1;
    }
}

fn scan_unit_entry(
    source_name: &str,
    entry: &LogicalLine,
    names: Vec<String>,
    body: String,
    snapshot: &mut TablesSnapshot,
    errors: &mut Vec<TableBuildError>,
) {
    if let Some(bad) = names.iter().find(|n| !is_valid_name(n)) {
        errors.push(TableBuildError::new(
            source_name,
            entry.line,
            format!("invalid unit name '{}'", bad),
        ));
        return;
    }

    let unit_body = match body.as_str() {
        "!" => UnitBody::Primitive { dimensionless: false },
        "!dimensionless" => UnitBody::Primitive { dimensionless: true },
        expr => {
            // Validate the expression now so the entry fails here, at its
            // own line, instead of at first use.
            if let Err(e) = parse(expr) {
                errors.push(TableBuildError::new(
                    source_name,
                    entry.line,
                    format!("bad definition for '{}': {}", names[0], e),
                ));
                return;
            }
            UnitBody::Expression(expr.to_string())
        }
    };

    let canonical = names[0].clone();
    let aka: BTreeSet<String> = names.iter().skip(1).cloned().collect();
    if let UnitBody::Primitive { dimensionless: true } = unit_body {
        snapshot.dimensionless.insert(canonical.clone());
    }
    let def = UnitDef {
        name: canonical,
        aka,
        body: unit_body,
        location: SourceLocation {
            source_name: source_name.to_string(),
            line: entry.line,
        },
    };
    for name in names {
        snapshot.units.insert(name, def.clone());
    }
}

fn scan_prefix_entry(
    source_name: &str,
    entry: &LogicalLine,
    names: Vec<String>,
    body: String,
    pending_prefixes: &mut Vec<PendingPrefix>,
    errors: &mut Vec<TableBuildError>,
) {
    let mut stripped = Vec::new();
    for name in &names {
        match name.strip_suffix('-') {
            Some(base) if is_valid_name(base) => stripped.push(base.to_string()),
            _ => {
                errors.push(TableBuildError::new(
                    source_name,
                    entry.line,
                    format!("invalid prefix name '{}'", name),
                ));
                return;
            }
        }
    }
    if let Err(e) = parse(&body) {
        errors.push(TableBuildError::new(
            source_name,
            entry.line,
            format!("bad multiplier for prefix '{}': {}", names[0], e),
        ));
        return;
    }
    pending_prefixes.push(PendingPrefix {
        names: stripped,
        body,
        location: SourceLocation {
            source_name: source_name.to_string(),
            line: entry.line,
        },
    });
}

/// Scan a function block starting at `start`; returns the index of the first
/// line after the block.
fn scan_function_block(
    source_name: &str,
    lines: &[LogicalLine],
    start: usize,
    pending_functions: &mut HashMap<String, PendingFunction>,
    errors: &mut Vec<TableBuildError>,
) -> usize {
    let intro = &lines[start];
    let mut words = intro.text.split_whitespace();
    let name_token = words.next().unwrap_or("");
    let location = SourceLocation {
        source_name: source_name.to_string(),
        line: intro.line,
    };

    let (name, placeholder) = match split_function_name(name_token) {
        Some(parts) => parts,
        None => {
            errors.push(TableBuildError::new(
                source_name,
                intro.line,
                format!("malformed function introducer '{}'", name_token),
            ));
            return start + 1;
        }
    };

    let kind_word = words.next().unwrap_or("");
    match kind_word {
        "linear" | "computed" => {
            let formula = match lines.get(start + 1) {
                Some(l) if l.indented => l,
                _ => {
                    errors.push(TableBuildError::new(
                        source_name,
                        intro.line,
                        format!("function '{}' is missing its formula line", name),
                    ));
                    return start + 1;
                }
            };
            let text = formula.text.trim().to_string();
            let kind = if kind_word == "linear" {
                PendingKind::Linear { formula: text, formula_line: formula.line }
            } else {
                match parse(&text) {
                    Ok(expr) => {
                        let mut referenced = BTreeSet::new();
                        expr.referenced_names(&mut referenced);
                        referenced.remove(&placeholder);
                        PendingKind::Ready(FunctionKind::Computed { formula: text, referenced })
                    }
                    Err(e) => {
                        errors.push(TableBuildError::new(
                            source_name,
                            formula.line,
                            format!("bad formula for function '{}': {}", name, e),
                        ));
                        return start + 2;
                    }
                }
            };
            pending_functions.insert(
                name.clone(),
                PendingFunction { name, placeholder, kind, location },
            );
            start + 2
        }
        "table" => {
            let interpolation = match words.next() {
                None => Interpolation::Linear,
                Some("linear") => Interpolation::Linear,
                Some("nearest") => Interpolation::Nearest,
                Some("clamp") => Interpolation::Clamp,
                Some(other) => {
                    errors.push(TableBuildError::new(
                        source_name,
                        intro.line,
                        format!("unknown interpolation '{}' for table '{}'", other, name),
                    ));
                    // Still consume the block so its rows do not error too.
                    let mut j = start + 1;
                    while j < lines.len() && lines[j].indented {
                        j += 1;
                    }
                    return j;
                }
            };

            let mut breakpoints = Vec::new();
            let mut j = start + 1;
            let mut bad = false;
            while j < lines.len() && lines[j].indented {
                let row = &lines[j];
                let fields: Vec<&str> = row.text.split_whitespace().collect();
                let parsed = match fields.as_slice() {
                    [x, y] => x.parse::<f64>().ok().zip(y.parse::<f64>().ok()),
                    _ => None,
                };
                match parsed {
                    Some(pair) => breakpoints.push(pair),
                    None => {
                        errors.push(TableBuildError::new(
                            source_name,
                            row.line,
                            format!("bad breakpoint in table '{}': '{}'", name, row.text.trim()),
                        ));
                        bad = true;
                    }
                }
                j += 1;
            }

            if !bad {
                if breakpoints.len() < 2 {
                    errors.push(TableBuildError::new(
                        source_name,
                        intro.line,
                        format!("table '{}' needs at least two breakpoints", name),
                    ));
                } else if breakpoints.windows(2).any(|w| w[0].0 >= w[1].0) {
                    errors.push(TableBuildError::new(
                        source_name,
                        intro.line,
                        format!("table '{}' breakpoints must be strictly ascending in x", name),
                    ));
                } else {
                    pending_functions.insert(
                        name.clone(),
                        PendingFunction {
                            name,
                            placeholder,
                            kind: PendingKind::Ready(FunctionKind::Table { breakpoints, interpolation }),
                            location,
                        },
                    );
                }
            }
            j
        }
        "builtin" => {
            let op_word = words.next().unwrap_or("");
            match BuiltinOp::from_keyword(op_word) {
                Some(op) => {
                    pending_functions.insert(
                        name.clone(),
                        PendingFunction {
                            name,
                            placeholder,
                            kind: PendingKind::Ready(FunctionKind::Builtin { op }),
                            location,
                        },
                    );
                }
                None => {
                    errors.push(TableBuildError::new(
                        source_name,
                        intro.line,
                        format!("unknown builtin operation '{}' for '{}'", op_word, name),
                    ));
                }
            }
            start + 1
        }
        other => {
            errors.push(TableBuildError::new(
                source_name,
                intro.line,
                format!("unknown function kind '{}' for '{}'", other, name),
            ));
            start + 1
        }
    }
}

/// Reduce prefix multiplier expressions. Prefixes may reference units and
/// other prefixes, so iterate to a fixpoint: each pass resolves whatever has
/// become resolvable; anything left after a pass with no progress is an
/// error.
fn resolve_prefixes(
    snapshot: &mut TablesSnapshot,
    mut pending: Vec<PendingPrefix>,
    errors: &mut Vec<TableBuildError>,
) {
    loop {
        let mut unresolved = Vec::new();
        let mut progressed = false;

        for entry in pending {
            let reduced = parse(&entry.body)
                .and_then(|expr| Reducer::new(snapshot).reduce(&expr));
            match reduced {
                Ok(q) if q.is_dimensionless() => {
                    for name in &entry.names {
                        snapshot.prefixes.insert(
                            name.clone(),
                            PrefixDef {
                                name: name.clone(),
                                multiplier: q.factor,
                                location: entry.location.clone(),
                            },
                        );
                    }
                    progressed = true;
                }
                Ok(_) => {
                    errors.push(TableBuildError::new(
                        entry.location.source_name.clone(),
                        entry.location.line,
                        format!("prefix '{}-' multiplier is not dimensionless", entry.names[0]),
                    ));
                    progressed = true;
                }
                Err(_) => unresolved.push(entry),
            }
        }

        if unresolved.is_empty() {
            return;
        }
        if !progressed {
            for entry in unresolved {
                let failure = parse(&entry.body)
                    .and_then(|expr| Reducer::new(snapshot).reduce(&expr))
                    .err()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unresolvable multiplier".to_string());
                errors.push(TableBuildError::new(
                    entry.location.source_name.clone(),
                    entry.location.line,
                    format!("prefix '{}-': {}", entry.names[0], failure),
                ));
            }
            return;
        }
        pending = unresolved;
    }
}

/// Resolve linear-function parameters now that units and prefixes are final.
fn resolve_functions(
    snapshot: &mut TablesSnapshot,
    pending: HashMap<String, PendingFunction>,
    errors: &mut Vec<TableBuildError>,
) {
    for (_, entry) in pending {
        let kind = match entry.kind {
            PendingKind::Ready(kind) => kind,
            PendingKind::Linear { formula, formula_line } => {
                match resolve_linear(snapshot, &formula) {
                    Ok(kind) => kind,
                    Err(message) => {
                        errors.push(TableBuildError::new(
                            entry.location.source_name.clone(),
                            formula_line,
                            format!("linear function '{}': {}", entry.name, message),
                        ));
                        continue;
                    }
                }
            }
        };
        snapshot.functions.insert(
            entry.name.clone(),
            FunctionDef {
                name: entry.name,
                placeholder: entry.placeholder,
                kind,
                location: entry.location,
            },
        );
    }
}

/// Formula line of a linear function:
/// `slope ; intercept [; domain-expr [; range-expr]]`.
///
/// Domain defaults to dimensionless; range defaults to the domain. The
/// affine map applies to the reduced numeric factor, so `tempC(x)` is
/// `1 ; 273.15 ; 1 ; K`: a bare number in, kelvins out.
fn resolve_linear(snapshot: &TablesSnapshot, formula: &str) -> Result<FunctionKind, String> {
    let fields: Vec<&str> = formula.split(';').map(str::trim).collect();
    if fields.len() < 2 || fields.len() > 4 {
        return Err("expected 'slope ; intercept [; domain [; range]]'".to_string());
    }

    let mut reduce_field = |text: &str| -> Result<Quantity, String> {
        parse(text)
            .and_then(|expr| Reducer::new(snapshot).reduce(&expr))
            .map_err(|e| e.to_string())
    };

    let slope = reduce_field(fields[0])?;
    let intercept = reduce_field(fields[1])?;
    // The affine map applies to the reduced numeric factor; a dimension on
    // either coefficient is a typo, not a unit conversion.
    if !slope.is_dimensionless() {
        return Err(format!("slope '{}' must be dimensionless", fields[0]));
    }
    if !intercept.is_dimensionless() {
        return Err(format!("intercept '{}' must be dimensionless", fields[1]));
    }
    let domain = match fields.get(2) {
        Some(text) => reduce_field(text)?.dimension,
        None => Dimension::dimensionless(),
    };
    let range = match fields.get(3) {
        Some(text) => reduce_field(text)?.dimension,
        None => domain.clone(),
    };
    Ok(FunctionKind::Linear {
        slope: slope.factor,
        intercept: intercept.factor,
        domain,
        range,
    })
}

/// Eager memoization pass: reduce every unit once and cache the successes
/// under their canonical names. Failures stay uncached; they re-fail on
/// demand with their precise error.
fn memoize_units(snapshot: &mut TablesSnapshot) {
    let canonical: Vec<String> = snapshot
        .units
        .iter()
        .filter(|(key, def)| **key == def.name)
        .map(|(key, _)| key.clone())
        .collect();

    for name in canonical {
        if snapshot.cache.contains_key(&name) {
            continue;
        }
        let reduced = Reducer::new(snapshot).reduce_name(&name);
        if let Ok(q) = reduced {
            snapshot.cache.insert(name, q);
        }
    }
}
