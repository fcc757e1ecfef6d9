//! Layered lookup table with lazy, recursive `{placeholder}` interpolation.
//!
//! A [`TemplateMap`] scans its layers closest-first and interpolates string
//! values against the same chain, so a placeholder may itself need
//! resolving. With conditionals enabled, an object value is a table of
//! `condition -> value` branches; the first branch whose condition holds is
//! used.
//!
//! Placeholder grammar: `{key}`, `{key!conv}` or `{key!conv:spec}` where
//! `conv` is `s` (string form), `v` (dot-joined version, `spec` = optional
//! component count) or `r` (regex substitution, `spec` =
//! `<mode><delim><pattern><delim><replacement>[<delim>]`, mode `s` for the
//! first match or `g` for all). `{{` and `}}` are literal braces.

use globset::GlobBuilder;
use regex::Regex;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("missing key '{key}' (while resolving '{context}')")]
    MissingKey { key: String, context: String },
    #[error("malformed pattern in '{key}': {reason}")]
    MalformedPattern { key: String, reason: String },
    #[error("no matching condition for '{key}': {}", conditions.join("|"))]
    NoMatchingCondition {
        key: String,
        conditions: Vec<String>,
    },
    #[error("interpolation cycle through '{key}'")]
    Cycle { key: String },
}

impl InterpolationError {
    fn malformed(key: &str, reason: impl Into<String>) -> Self {
        Self::MalformedPattern {
            key: key.to_owned(),
            reason: reason.into(),
        }
    }
}

/// One lookup layer. Literal layers are returned verbatim, never interpolated.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    values: Map<String, Value>,
    literal: bool,
}

impl Layer {
    pub fn new(values: Map<String, Value>) -> Self {
        Self {
            values,
            literal: false,
        }
    }

    pub fn literal(values: Map<String, Value>) -> Self {
        Self {
            values,
            literal: true,
        }
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// Read-only chain map with lazy (recursive) string interpolation.
///
/// Results are memoized per key; layers never change after construction.
#[derive(Debug)]
pub struct TemplateMap {
    layers: Vec<Layer>,
    conditional: bool,
    cache: RefCell<HashMap<String, Value>>,
    active: RefCell<Vec<String>>,
}

impl TemplateMap {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self {
            layers,
            conditional: false,
            cache: RefCell::new(HashMap::new()),
            active: RefCell::new(Vec::new()),
        }
    }

    /// A map where object values select a branch by condition.
    pub fn with_conditionals(layers: Vec<Layer>) -> Self {
        Self {
            conditional: true,
            ..Self::new(layers)
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.layers.iter().any(|l| l.values.contains_key(key))
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.layers
            .iter()
            .flat_map(|l| l.values.keys().cloned())
            .collect()
    }

    fn raw(&self, key: &str) -> Option<(&Value, bool)> {
        self.layers
            .iter()
            .find_map(|l| l.values.get(key).map(|v| (v, l.literal)))
    }

    /// Resolve `key`, failing with `MissingKey` if no layer defines it.
    pub fn get(&self, key: &str) -> Result<Value, InterpolationError> {
        if let Some(v) = self.cache.borrow().get(key) {
            return Ok(v.clone());
        }
        let Some((raw, literal)) = self.raw(key) else {
            return Err(InterpolationError::MissingKey {
                key: key.to_owned(),
                context: key.to_owned(),
            });
        };
        if literal {
            let value = raw.clone();
            self.cache
                .borrow_mut()
                .insert(key.to_owned(), value.clone());
            return Ok(value);
        }
        if self.active.borrow().iter().any(|k| k == key) {
            return Err(InterpolationError::Cycle {
                key: key.to_owned(),
            });
        }

        self.active.borrow_mut().push(key.to_owned());
        let result = self.interpolate(key, raw);
        self.active.borrow_mut().pop();

        let value = result?;
        self.cache
            .borrow_mut()
            .insert(key.to_owned(), value.clone());
        Ok(value)
    }

    /// Like [`get`](Self::get), but an undefined key is `Ok(None)`.
    pub fn try_get(&self, key: &str) -> Result<Option<Value>, InterpolationError> {
        if self.contains_key(key) {
            self.get(key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Resolve every key defined by any layer.
    pub fn resolve_all(&self) -> Result<BTreeMap<String, Value>, InterpolationError> {
        self.keys()
            .into_iter()
            .map(|k| self.get(&k).map(|v| (k, v)))
            .collect()
    }

    fn interpolate(&self, key: &str, value: &Value) -> Result<Value, InterpolationError> {
        match value {
            Value::Object(branches) if self.conditional => {
                for (condition, branch) in branches {
                    if self.condition_holds(key, condition)? {
                        return self.interpolate(key, branch);
                    }
                }
                Err(InterpolationError::NoMatchingCondition {
                    key: key.to_owned(),
                    conditions: branches.keys().cloned().collect(),
                })
            }
            other => self.interpolate_plain(key, other),
        }
    }

    // Objects nested in lists are data, not conditionals.
    fn interpolate_plain(&self, key: &str, value: &Value) -> Result<Value, InterpolationError> {
        match value {
            Value::String(s) => self.format(key, s).map(Value::String),
            Value::Array(items) => items
                .iter()
                .map(|item| self.interpolate_plain(key, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn condition_holds(&self, key: &str, condition: &str) -> Result<bool, InterpolationError> {
        for atom in condition.split(';') {
            if !self.atom_holds(key, atom)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn atom_holds(&self, key: &str, atom: &str) -> Result<bool, InterpolationError> {
        if atom.is_empty() {
            return Ok(true);
        }
        let test = Condition::parse(atom)
            .ok_or_else(|| InterpolationError::malformed(key, format!("invalid condition '{atom}'")))?;

        if !self.contains_key(test.key) {
            return Ok(false);
        }
        let value = match self.get(test.key) {
            Ok(v) => v,
            Err(InterpolationError::NoMatchingCondition { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };

        let holds = match test.pattern {
            None => truthy(&value),
            Some(pattern) => match value {
                Value::Bool(b) => pattern.eq_ignore_ascii_case(if b { "true" } else { "false" }),
                other => glob_match(key, pattern, &display_value(&other))?,
            },
        };
        Ok(holds ^ test.negate)
    }

    fn format(&self, key: &str, template: &str) -> Result<String, InterpolationError> {
        let mut out = String::with_capacity(template.len());
        let mut chars = template.char_indices().peekable();

        while let Some((start, c)) = chars.next() {
            match c {
                '{' if chars.peek().is_some_and(|&(_, n)| n == '{') => {
                    chars.next();
                    out.push('{');
                }
                '{' => {
                    let mut depth = 1usize;
                    let mut end = None;
                    for (i, n) in chars.by_ref() {
                        match n {
                            '{' => depth += 1,
                            '}' => {
                                depth -= 1;
                                if depth == 0 {
                                    end = Some(i);
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                    let end = end.ok_or_else(|| {
                        InterpolationError::malformed(key, format!("unterminated '{{' in '{template}'"))
                    })?;
                    self.render_field(key, &template[start + 1..end], &mut out)?;
                }
                '}' if chars.peek().is_some_and(|&(_, n)| n == '}') => {
                    chars.next();
                    out.push('}');
                }
                '}' => {
                    return Err(InterpolationError::malformed(
                        key,
                        format!("single '}}' in '{template}'"),
                    ));
                }
                other => out.push(other),
            }
        }
        Ok(out)
    }

    fn render_field(&self, key: &str, field: &str, out: &mut String) -> Result<(), InterpolationError> {
        let name_end = field.find(['!', ':']).unwrap_or(field.len());
        let name = &field[..name_end];
        let rest = &field[name_end..];

        let (conversion, spec) = if let Some(conv) = rest.strip_prefix('!') {
            let mut it = conv.chars();
            let c = it.next();
            let after = it.as_str();
            let spec = if after.is_empty() {
                ""
            } else if let Some(spec) = after.strip_prefix(':') {
                spec
            } else {
                return Err(InterpolationError::malformed(
                    key,
                    format!("expected ':' after conversion in '{{{field}}}'"),
                ));
            };
            (c, spec)
        } else {
            (None, rest.strip_prefix(':').unwrap_or(""))
        };

        if name.is_empty() {
            return Err(InterpolationError::malformed(
                key,
                "empty placeholder name",
            ));
        }

        let value = self.get(name).map_err(|e| match e {
            InterpolationError::MissingKey { key: missing, .. } if missing == name => {
                InterpolationError::MissingKey {
                    key: missing,
                    context: key.to_owned(),
                }
            }
            other => other,
        })?;

        match conversion {
            None | Some('s') if spec.is_empty() => out.push_str(&display_value(&value)),
            None | Some('s') => {
                return Err(InterpolationError::malformed(
                    key,
                    format!("unsupported format spec '{spec}' for '{name}'"),
                ));
            }
            Some('v') => out.push_str(&version_join(key, &value, spec)?),
            Some('r') => out.push_str(&regex_substitute(key, &display_value(&value), spec)?),
            Some(other) => {
                return Err(InterpolationError::malformed(
                    key,
                    format!("unknown conversion '!{other}'"),
                ));
            }
        }
        Ok(())
    }
}

struct Condition<'a> {
    key: &'a str,
    pattern: Option<&'a str>,
    negate: bool,
}

impl<'a> Condition<'a> {
    /// `key`, `!key`, `key=glob` or `key!=glob`.
    fn parse(atom: &'a str) -> Option<Self> {
        if let Some((lhs, pattern)) = atom.split_once('=') {
            let (key, negate) = match lhs.strip_suffix('!') {
                Some(k) => (k, true),
                None => (lhs, false),
            };
            if key.is_empty() || pattern.is_empty() {
                return None;
            }
            Some(Self {
                key,
                pattern: Some(pattern),
                negate,
            })
        } else {
            let (key, negate) = match atom.strip_prefix('!') {
                Some(k) => (k, true),
                None => (atom, false),
            };
            if key.is_empty() {
                return None;
            }
            Some(Self {
                key,
                pattern: None,
                negate,
            })
        }
    }
}

/// String form of a value as it appears in interpolated text.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn glob_match(key: &str, pattern: &str, text: &str) -> Result<bool, InterpolationError> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(false)
        .build()
        .map_err(|e| InterpolationError::malformed(key, format!("invalid glob '{pattern}': {e}")))?;
    Ok(glob.compile_matcher().is_match(text))
}

fn version_join(key: &str, value: &Value, spec: &str) -> Result<String, InterpolationError> {
    let limit = if spec.is_empty() {
        None
    } else {
        Some(spec.parse::<usize>().map_err(|_| {
            InterpolationError::malformed(key, format!("version spec must be a digit count, got '{spec}'"))
        })?)
    };
    let parts: Vec<String> = match value {
        Value::Array(items) => items.iter().map(display_value).collect(),
        Value::String(s) => s.split('.').map(str::to_owned).collect(),
        other => vec![display_value(other)],
    };
    let take = limit.unwrap_or(parts.len());
    Ok(parts.into_iter().take(take).collect::<Vec<_>>().join("."))
}

fn regex_substitute(key: &str, text: &str, spec: &str) -> Result<String, InterpolationError> {
    let mut chars = spec.chars();
    let (Some(mode), Some(delim)) = (chars.next(), chars.next()) else {
        return Err(InterpolationError::malformed(
            key,
            format!("regex spec too short: '{spec}'"),
        ));
    };
    let body = chars.as_str();
    let mut parts = body.splitn(3, delim);
    let pattern = parts.next().unwrap_or_default();
    let Some(replacement) = parts.next() else {
        return Err(InterpolationError::malformed(
            key,
            format!("regex spec missing replacement: '{spec}'"),
        ));
    };
    if parts.next().is_some_and(|trailing| !trailing.is_empty()) {
        return Err(InterpolationError::malformed(
            key,
            format!("trailing characters in regex spec: '{spec}'"),
        ));
    }
    let re = Regex::new(pattern)
        .map_err(|e| InterpolationError::malformed(key, format!("invalid regex '{pattern}': {e}")))?;
    match mode {
        's' => Ok(re.replacen(text, 1, replacement).into_owned()),
        'g' => Ok(re.replace_all(text, replacement).into_owned()),
        other => Err(InterpolationError::malformed(
            key,
            format!("unknown regex mode '{other}'"),
        )),
    }
}
