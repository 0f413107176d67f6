//! Parameter, error and warning tables.
//!
//! The tables are plain text, one entry per line, fields separated by
//! spaces. See `data/parameters.txt` for the syntax. The built-in tables
//! are compiled into the crate; [`Catalogue::load_dir`] reads replacements
//! from disk.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::error::{CatalogueError, Error};
use crate::numeric::{DataType, Number, Value};

const PARAMETERS: &str = include_str!("../data/parameters.txt");
const ERRORS: &str = include_str!("../data/errors.txt");
const WARNINGS: &str = include_str!("../data/warnings.txt");

const COMMENT: char = '#';
const PARAMETER_FIELDS: usize = 9;
const ERROR_FIELDS: usize = 4;

/// A minimum or maximum value.
#[derive(Debug, Clone, PartialEq)]
pub enum Limit {
    Value(Value),
    /// The current value of another parameter.
    Reference(u16),
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Value(v) => v.fmt(f),
            Limit::Reference(n) => write!(f, "P{}", n),
        }
    }
}

/// Default value of a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// The same value at every index.
    Single(Value),
    /// One value per index.
    PerIndex(Vec<Value>),
}

/// Immutable description of a pump parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub number: u16,
    pub name: String,
    /// Empty for unindexed parameters.
    pub indices: Range<u16>,
    pub min: Limit,
    pub max: Limit,
    pub default: DefaultValue,
    pub unit: String,
    pub writable: bool,
    pub datatype: DataType,
    pub bits: u32,
    pub description: String,
}

impl Parameter {
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Number of live values: one per index, or one if unindexed.
    pub fn value_count(&self) -> usize {
        self.indices.len().max(1)
    }

    /// The position of `index` in the live value list.
    ///
    /// Unindexed parameters have a single slot and ignore the index.
    pub fn slot(&self, index: u16) -> Option<usize> {
        if !self.is_indexed() {
            return Some(0);
        }
        self.indices
            .contains(&index)
            .then(|| usize::from(index - self.indices.start))
    }

    /// The live values a freshly started pump has.
    pub fn initial_values(&self) -> Vec<Value> {
        match &self.default {
            DefaultValue::Single(value) => vec![value.clone(); self.value_count()],
            DefaultValue::PerIndex(values) => values.clone(),
        }
    }

    /// The format token this parameter was declared with, e.g. `u16`.
    pub fn format(&self) -> String {
        let prefix = match self.datatype {
            DataType::Uint => "u",
            DataType::Sint => "s",
            DataType::Float => "real",
        };
        format!("{}{}", prefix, self.bits)
    }
}

/// An error or a warning the pump can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorOrWarning {
    pub number: u16,
    pub name: String,
    pub possible_cause: String,
    pub remedy: String,
}

/// All parameters, errors and warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalogue {
    parameters: BTreeMap<u16, Parameter>,
    errors: BTreeMap<u16, ErrorOrWarning>,
    warnings: BTreeMap<u16, ErrorOrWarning>,
}

static BUILTIN: OnceLock<Result<Arc<Catalogue>, CatalogueError>> = OnceLock::new();

impl Catalogue {
    /// The tables compiled into the crate. Parsed once per process.
    pub fn builtin() -> Result<Arc<Catalogue>, CatalogueError> {
        BUILTIN
            .get_or_init(|| {
                Catalogue::from_tables(
                    ("parameters.txt", PARAMETERS),
                    ("errors.txt", ERRORS),
                    ("warnings.txt", WARNINGS),
                )
                .map(Arc::new)
            })
            .clone()
    }

    /// Read `parameters.txt`, `errors.txt` and `warnings.txt` from `dir`.
    pub fn load_dir(dir: &Path) -> Result<Catalogue, Error> {
        let read = |name: &str| fs::read_to_string(dir.join(name));
        let parameters = read("parameters.txt")?;
        let errors = read("errors.txt")?;
        let warnings = read("warnings.txt")?;
        Ok(Catalogue::from_tables(
            ("parameters.txt", &parameters),
            ("errors.txt", &errors),
            ("warnings.txt", &warnings),
        )?)
    }

    /// Parse three tables, each given as `(source name, text)`.
    pub fn from_tables(
        parameters: (&str, &str),
        errors: (&str, &str),
        warnings: (&str, &str),
    ) -> Result<Catalogue, CatalogueError> {
        let (parameters_name, parameters_text) = parameters;
        let (errors_name, errors_text) = errors;
        let (warnings_name, warnings_text) = warnings;
        let catalogue = Catalogue {
            parameters: index_by_number(
                parameters_name,
                parse_parameters(parameters_text, parameters_name)?,
                |p| p.number,
            )?,
            errors: index_by_number(
                errors_name,
                parse_errors_or_warnings(errors_text, errors_name)?,
                |e| e.number,
            )?,
            warnings: index_by_number(
                warnings_name,
                parse_errors_or_warnings(warnings_text, warnings_name)?,
                |w| w.number,
            )?,
        };
        catalogue.check_references()?;
        debug!(
            parameters = catalogue.parameters.len(),
            errors = catalogue.errors.len(),
            warnings = catalogue.warnings.len(),
            "catalogue loaded"
        );
        Ok(catalogue)
    }

    pub fn parameter(&self, number: u16) -> Option<&Parameter> {
        self.parameters.get(&number)
    }

    pub fn error(&self, number: u16) -> Option<&ErrorOrWarning> {
        self.errors.get(&number)
    }

    pub fn warning(&self, number: u16) -> Option<&ErrorOrWarning> {
        self.warnings.get(&number)
    }

    /// All parameters, by number.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.values()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ErrorOrWarning> {
        self.errors.values()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ErrorOrWarning> {
        self.warnings.values()
    }

    fn check_references(&self) -> Result<(), CatalogueError> {
        for parameter in self.parameters.values() {
            for limit in [&parameter.min, &parameter.max] {
                if let Limit::Reference(target) = limit {
                    if !self.parameters.contains_key(target) {
                        return Err(CatalogueError::DanglingReference {
                            number: parameter.number,
                            target: *target,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn index_by_number<T>(
    source_name: &str,
    items: Vec<T>,
    number: impl Fn(&T) -> u16,
) -> Result<BTreeMap<u16, T>, CatalogueError> {
    let mut map = BTreeMap::new();
    for item in items {
        let n = number(&item);
        if map.insert(n, item).is_some() {
            return Err(CatalogueError::Duplicate {
                source_name: source_name.to_string(),
                number: n,
            });
        }
    }
    Ok(map)
}

/// Parse a parameter table. Lines are numbered from 1 in errors.
pub fn parse_parameters(
    text: &str,
    source_name: &str,
) -> Result<Vec<Parameter>, CatalogueError> {
    parse_lines(text, source_name, PARAMETER_FIELDS, parameter_from_fields)
}

/// Parse an error or warning table.
pub fn parse_errors_or_warnings(
    text: &str,
    source_name: &str,
) -> Result<Vec<ErrorOrWarning>, CatalogueError> {
    parse_lines(text, source_name, ERROR_FIELDS, |fields| {
        let (number, _) = parse_number(&fields[0])?;
        Ok(ErrorOrWarning {
            number,
            name: fields[1].clone(),
            possible_cause: fields[2].clone(),
            remedy: fields[3].clone(),
        })
    })
}

fn parse_lines<T>(
    text: &str,
    source_name: &str,
    n_fields: usize,
    build: impl Fn(&[String]) -> Result<T, String>,
) -> Result<Vec<T>, CatalogueError> {
    let mut items = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let parsed = split_fields(line).and_then(|fields| {
            if fields.is_empty() {
                return Ok(None);
            }
            if fields.len() != n_fields {
                return Err(format!("{} fields instead of {}", fields.len(), n_fields));
            }
            build(&fields).map(Some)
        });
        match parsed {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(message) => {
                return Err(CatalogueError::Line {
                    source_name: source_name.to_string(),
                    line: i + 1,
                    message,
                })
            }
        }
    }
    Ok(items)
}

/// Split a line into fields, dropping comments.
///
/// `"..."` groups a field containing spaces; the quotes are removed and a
/// literal `\n` becomes a line break.
pub fn split_fields(line: &str) -> Result<Vec<String>, String> {
    let content = line.split(COMMENT).next().unwrap_or_default();
    let mut fields = Vec::new();
    let mut chars = content.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut field = String::new();
        if c == '"' {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(ch) => field.push(ch),
                    None => return Err(format!("unterminated quote in {:?}", content.trim())),
                }
            }
            if chars.peek().is_some_and(|ch| !ch.is_whitespace()) {
                return Err(format!("missing space after quoted field {:?}", field));
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                if ch == '"' {
                    return Err(format!("stray quote in field {:?}", field));
                }
                field.push(ch);
                chars.next();
            }
        }
        fields.push(field.replace("\\n", "\n"));
    }
    Ok(fields)
}

fn parameter_from_fields(fields: &[String]) -> Result<Parameter, String> {
    let (number, indices) = parse_number(&fields[0])?;
    let writable = parse_writable(&fields[6])?;
    let (datatype, bits) = parse_format(&fields[7])?;
    let min = parse_limit(&fields[2], datatype, bits)?;
    let max = parse_limit(&fields[3], datatype, bits)?;
    let default = parse_default(&fields[4], datatype, bits)?;

    if let DefaultValue::PerIndex(values) = &default {
        if values.len() != indices.len() {
            return Err(format!(
                "{} default values for {} indices",
                values.len(),
                indices.len()
            ));
        }
    }

    Ok(Parameter {
        number,
        name: fields[1].clone(),
        indices,
        min,
        max,
        default,
        unit: fields[5].clone(),
        writable,
        datatype,
        bits,
        description: fields[8].clone(),
    })
}

/// `N` or `N[a:b]`, where `b` is the last index.
fn parse_number(text: &str) -> Result<(u16, Range<u16>), String> {
    let invalid = || format!("invalid number or indices: {}", text);
    let (number, indices) = match text.split_once('[') {
        None => (text, None),
        Some((number, rest)) => {
            let inner = rest.strip_suffix(']').ok_or_else(invalid)?;
            let (first, last) = inner.split_once(':').ok_or_else(invalid)?;
            (number, Some((first, last)))
        }
    };
    let parse = |s: &str| -> Result<u16, String> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        s.parse().map_err(|_| invalid())
    };
    let number = parse(number)?;
    let indices = match indices {
        None => 0..0,
        Some((first, last)) => {
            let first = parse(first)?;
            let last = parse(last)?;
            let end = last.checked_add(1).ok_or_else(invalid)?;
            if end <= first {
                return Err(invalid());
            }
            first..end
        }
    };
    Ok((number, indices))
}

fn parse_writable(text: &str) -> Result<bool, String> {
    match text {
        "r/w" => Ok(true),
        "r" | "" => Ok(false),
        _ => Err(format!("invalid r/w string: {}", text)),
    }
}

fn parse_format(text: &str) -> Result<(DataType, u32), String> {
    let split = text
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| format!("invalid format: {}", text))?;
    let (letters, digits) = text.split_at(split);
    let datatype = match letters {
        "u" => DataType::Uint,
        "s" => DataType::Sint,
        "real" => DataType::Float,
        _ => return Err(format!("invalid type: {}", text)),
    };
    match digits {
        "16" if datatype != DataType::Float => Ok((datatype, 16)),
        "32" => Ok((datatype, 32)),
        _ => Err(format!("invalid bits: {}", text)),
    }
}

/// A literal of the parameter's own type and width.
fn parse_value(text: &str, datatype: DataType, bits: u32) -> Result<Value, String> {
    let number = match datatype {
        DataType::Float => text.parse::<f64>().ok().map(Number::Float),
        _ => text.parse::<i128>().ok().map(Number::Int),
    }
    .ok_or_else(|| format!("invalid {} literal: {}", datatype, text))?;
    datatype.value(number, bits).map_err(|e| e.to_string())
}

fn parse_limit(text: &str, datatype: DataType, bits: u32) -> Result<Limit, String> {
    if let Ok(value) = parse_value(text, datatype, bits) {
        return Ok(Limit::Value(value));
    }
    text.strip_prefix('P')
        .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|n| n.parse().ok())
        .map(Limit::Reference)
        .ok_or_else(|| format!("invalid min/max value: {}", text))
}

fn parse_default(text: &str, datatype: DataType, bits: u32) -> Result<DefaultValue, String> {
    if let Ok(value) = parse_value(text, datatype, bits) {
        return Ok(DefaultValue::Single(value));
    }
    let invalid = || format!("invalid default value: {}", text);
    let inner = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(invalid)?;
    let values = inner
        .split(',')
        .map(|item| parse_value(item.trim(), datatype, bits))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;
    Ok(DefaultValue::PerIndex(values))
}
