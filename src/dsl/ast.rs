//! Syntax tree types for the case language.
//!
//! The tree is deliberately shallow: every line becomes a [`Statement`] and
//! interpretation of its arguments happens when the circuit is built.

use std::collections::HashMap;

use crate::error::{MagError, Result};

/// Complete representation of a parsed case file.
#[derive(Debug, Clone, Default)]
pub struct CaseAst {
    /// Dot directives in source order
    pub directives: Vec<Statement>,
    /// `REGION` lines
    pub regions: Vec<Statement>,
    /// `COIL` lines
    pub coils: Vec<Statement>,
}

impl CaseAst {
    pub fn new() -> Self {
        Self::default()
    }

    /// First directive with the given keyword (leading '.' optional).
    pub fn directive<'a>(&'a self, keyword: &'a str) -> Option<&'a Statement> {
        self.directives_named(keyword).next()
    }

    /// All directives with the given keyword, in source order.
    pub fn directives_named<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a Statement> + 'a {
        let keyword = keyword.trim_start_matches('.');
        self.directives
            .iter()
            .filter(move |stmt| stmt.keyword.eq_ignore_ascii_case(keyword))
    }
}

/// A single argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Numeric literal, engineering suffix already applied
    Number(f64),
    /// Bare identifier
    Ident(String),
    /// Quoted string
    Str(String),
}

impl Value {
    /// Textual form, used where a name is expected.
    pub fn text(&self) -> String {
        match self {
            Value::Number(v) => v.to_string(),
            Value::Ident(s) | Value::Str(s) => s.clone(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }
}

/// One line of the case file.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Lowercase keyword without the leading '.' (`region`, `coil`, `material`, ...)
    pub keyword: String,
    /// Positional arguments
    pub args: Vec<Value>,
    /// `key=value` parameters, keys lowercased
    pub params: HashMap<String, Value>,
    /// Contents of the parenthesised list, if any
    pub list: Vec<Value>,
    /// Source line number for error reporting
    pub line: usize,
}

impl Statement {
    pub fn new(keyword: impl Into<String>, line: usize) -> Self {
        Self {
            keyword: keyword.into(),
            args: Vec::new(),
            params: HashMap::new(),
            list: Vec::new(),
            line,
        }
    }

    /// Error pointing at this statement.
    pub fn invalid(&self, message: impl Into<String>) -> MagError {
        let name = match self.args.first() {
            Some(value) => value.text(),
            None => self.keyword.clone(),
        };
        MagError::invalid_definition(name, self.line, message)
    }

    /// Positional argument `index` used as a name.
    pub fn name(&self, index: usize) -> Result<String> {
        match self.args.get(index) {
            Some(Value::Ident(s)) | Some(Value::Str(s)) => Ok(s.clone()),
            Some(Value::Number(v)) => Err(self.invalid(format!("expected a name, got number {}", v))),
            None => Err(self.invalid(format!("missing argument {}", index + 1))),
        }
    }

    /// Positional argument `index` used as a node name. `GND` maps to `0`.
    pub fn node(&self, index: usize) -> Result<String> {
        match self.args.get(index) {
            Some(Value::Ident(s)) if s.eq_ignore_ascii_case("gnd") => Ok("0".to_string()),
            Some(value) => Ok(value.text()),
            None => Err(self.invalid(format!("missing node {}", index + 1))),
        }
    }

    pub fn positional_number(&self, index: usize) -> Result<f64> {
        match self.args.get(index) {
            Some(Value::Number(v)) => Ok(*v),
            Some(other) => Err(self.invalid(format!("expected a number, got '{}'", other.text()))),
            None => Err(self.invalid(format!("missing argument {}", index + 1))),
        }
    }

    /// All positional arguments from `start` on, each of which must be numeric.
    pub fn trailing_numbers(&self, start: usize) -> Result<Vec<f64>> {
        self.args
            .iter()
            .skip(start)
            .map(|value| {
                value
                    .as_number()
                    .ok_or_else(|| self.invalid(format!("expected a number, got '{}'", value.text())))
            })
            .collect()
    }

    /// Required numeric parameter.
    pub fn number(&self, key: &str) -> Result<f64> {
        self.optional_number(key)?
            .ok_or_else(|| self.invalid(format!("missing '{}'", key)))
    }

    pub fn optional_number(&self, key: &str) -> Result<Option<f64>> {
        match self.params.get(key) {
            Some(Value::Number(v)) => Ok(Some(*v)),
            Some(other) => Err(self.invalid(format!("'{}' must be a number, got '{}'", key, other.text()))),
            None => Ok(None),
        }
    }

    /// Non-negative integer parameter with a default.
    pub fn count_or(&self, key: &str, default: usize) -> Result<usize> {
        match self.optional_number(key)? {
            None => Ok(default),
            Some(v) if v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 => Ok(v as usize),
            Some(v) => Err(self.invalid(format!("'{}' must be a non-negative integer, got {}", key, v))),
        }
    }

    /// The parenthesised list, which must be all numbers.
    pub fn list_numbers(&self) -> Result<Vec<f64>> {
        self.list
            .iter()
            .map(|value| {
                value
                    .as_number()
                    .ok_or_else(|| self.invalid(format!("expected a number in list, got '{}'", value.text())))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> Statement {
        let mut stmt = Statement::new("region", 4);
        stmt.args = vec![
            Value::Ident("core".into()),
            Value::Ident("GND".into()),
            Value::Number(2.0),
            Value::Number(0.0),
            Value::Number(1.0),
        ];
        stmt.params.insert("length".into(), Value::Number(0.2));
        stmt.params.insert("iterations".into(), Value::Number(2.5));
        stmt.params.insert("table".into(), Value::Ident("IRON".into()));
        stmt
    }

    #[test]
    fn test_accessors() {
        let stmt = region();
        assert_eq!(stmt.name(0).unwrap(), "core");
        assert_eq!(stmt.node(1).unwrap(), "0");
        assert_eq!(stmt.node(2).unwrap(), "2");
        assert_eq!(stmt.trailing_numbers(3).unwrap(), vec![0.0, 1.0]);
        assert!(stmt.trailing_numbers(10).unwrap().is_empty());
        assert_eq!(stmt.number("length").unwrap(), 0.2);
        assert_eq!(stmt.optional_number("area").unwrap(), None);
        assert_eq!(stmt.count_or("inner", 8).unwrap(), 8);
    }

    #[test]
    fn test_errors_name_the_statement() {
        let stmt = region();
        match stmt.number("area") {
            Err(MagError::InvalidDefinition { name, line, .. }) => {
                assert_eq!(name, "core");
                assert_eq!(line, 4);
            }
            other => panic!("expected invalid definition, got {:?}", other),
        }
        assert!(stmt.name(2).is_err());
        assert!(stmt.number("table").is_err());
        assert!(stmt.count_or("iterations", 1).is_err());
        assert!(stmt.trailing_numbers(0).is_err());

        let bare = Statement::new("export", 9);
        assert!(matches!(bare.name(0), Err(MagError::InvalidDefinition { ref name, .. }) if name == "export"));
    }

    #[test]
    fn test_directive_lookup() {
        let mut ast = CaseAst::new();
        ast.directives.push(Statement::new("material", 1));
        ast.directives.push(Statement::new("solver", 2));
        ast.directives.push(Statement::new("material", 3));

        assert_eq!(ast.directive(".solver").unwrap().line, 2);
        assert_eq!(ast.directive("SOLVER").unwrap().line, 2);
        assert_eq!(ast.directives_named("material").count(), 2);
        assert!(ast.directive("runner").is_none());
    }
}
