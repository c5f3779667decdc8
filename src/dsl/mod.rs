//! Parser for magnetic circuit case descriptions.
//!
//! The case language is line-oriented and human-editable. Each line is
//! either a dot directive, a `REGION`, or a `COIL`; interpretation of the
//! arguments happens in [`crate::circuit::MagneticCircuit::from_ast`].
//!
//! # Grammar Overview
//!
//! ```text
//! case        = { line }
//! line        = comment | directive | region | coil | empty
//! comment     = ('#' | ';') { any_char }
//! directive   = '.' directive_name { item }
//! region      = "REGION" name node node { item }
//! coil        = "COIL" name region { item }
//! item        = value | identifier '=' value | list
//! list        = '(' { value | newline } ')'
//! value       = number | identifier | string
//!
//! directive_name = "solver" | "runner" | "table" | "waveform" | "material"
//!                | "report" | "scan" | "export"
//! node        = identifier | number | "GND"
//! number      = ['-'|'+'] digit+ ['.' digit*] [('e'|'E') ['-'|'+'] digit+] [unit_suffix]
//! unit_suffix = 'p' | 'n' | 'u' | 'm' | 'k' | 'M' | 'G'
//! identifier  = (letter | '_') { letter | digit | '_' }
//! string      = '"' { any_char_but_quote } '"'
//! ```
//!
//! Keywords and parameter names are case-insensitive. Commas are treated as
//! whitespace, so B-H lists may be written as `(0, 0, 100, 0.1)`.
//!
//! # Directives
//!
//! | Directive | Syntax |
//! |-----------|--------|
//! | .runner | `.runner steady iterations=N` or `.runner transient time=T step=DT inner=N` |
//! | .solver | `.solver scheme=newton\|fixed_point tolerance=X growth=G patience=N limit=L margin=M backtracks=K` |
//! | .table | `.table <name> [order=hb\|bh\|auto] (h b ...)` or `file="path.csv"` |
//! | .waveform | `.waveform <name> constant value=X`, `harmonic amplitude=A frequency=F [phase=P]`, `table (t v ...)` |
//! | .material | `.material <name> constant\|vacuum\|nonlinear\|permanent [mur= table= br= sigma=] (regions)` |
//! | .report | `.report <kind> [target]` |
//! | .scan | `.scan <coil> <start> <stop> <count> [iterations=N]` |
//! | .export | `.export b h flux j` |
//!
//! # Example
//!
//! ```text
//! # C-core with an air gap
//! .table IRON order=hb (0 0 100 0.1 1000 1.2)
//! .material Iron nonlinear table=IRON (core)
//! .material Air vacuum (gap)
//! .report flux core
//!
//! REGION core a 0 length=0.1 area=1e-4
//! REGION gap  a 0 length=0.1m area=1e-4
//! COIL drive core turns=100 current=1
//! ```

mod ast;
mod lexer;
mod parser;

pub use ast::*;
pub use lexer::{parse_value, Lexer, Token, TokenKind};
pub use parser::Parser;

use std::path::Path;

use crate::error::{MagError, Result};

/// Parse a case description string into an AST.
pub fn parse(input: &str) -> Result<CaseAst> {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer)?;
    parser.parse()
}

/// Parse a case description file.
pub fn parse_file(path: &Path) -> Result<CaseAst> {
    let content = std::fs::read_to_string(path).map_err(|e| MagError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_example_case() {
        let input = "\
# C-core with an air gap
.table IRON order=hb (0 0 100 0.1 1000 1.2)
.material Iron nonlinear table=IRON (core)
.material Air vacuum (gap)
.report flux core

REGION core a 0 length=0.1 area=1e-4
REGION gap  a 0 length=0.1m area=1e-4
COIL drive core turns=100 current=1
";
        let ast = parse(input).unwrap();
        assert_eq!(ast.directives.len(), 4);
        assert_eq!(ast.directives_named("material").count(), 2);
        assert_eq!(ast.regions.len(), 2);
        assert_eq!(ast.coils.len(), 1);
        assert_eq!(ast.regions[1].number("length").unwrap(), 1e-4);
    }

    #[test]
    fn test_parse_file_missing() {
        let err = parse_file(Path::new("definitely/not/here.case")).unwrap_err();
        assert!(matches!(err, MagError::FileReadError { .. }));
    }
}
