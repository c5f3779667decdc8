//! Error types for the magcore solver.
//!
//! This module provides a unified error type [`MagError`] that covers
//! all error conditions that can occur during case parsing, configuration
//! validation, table loading and the nonlinear solve.
//!
//! Out-of-range table lookups are not errors: they are reported through
//! [`crate::diagnostics::OutOfRangeWarning`] and the solve continues.

use thiserror::Error;

/// Result type alias using [`MagError`].
pub type Result<T> = std::result::Result<T, MagError>;

/// Broad classification of a [`MagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed case description
    Input,
    /// Bad material, region or coil setup, detected before the solve
    Configuration,
    /// Malformed B-H data
    Table,
    /// Ill-posed voltage-excitation circuit
    Circuit,
    /// Nonlinear iteration blew up
    Divergence,
    /// Linear algebra or run control failure during the solve
    Solve,
    /// File system failure
    Io,
}

/// Unified error type for all magcore operations.
#[derive(Error, Debug)]
pub enum MagError {
    // ============ Case Parsing Errors ============
    /// Error during lexical analysis
    #[error("Lexer error at line {line}, column {column}: {message}")]
    LexerError {
        line: usize,
        column: usize,
        message: String,
    },

    /// Error during parsing
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Invalid definition of a region, coil, material or table
    #[error("Invalid definition '{name}' at line {line}: {message}")]
    InvalidDefinition {
        name: String,
        line: usize,
        message: String,
    },

    // ============ Configuration Errors ============
    /// Generic configuration problem
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Region without a material
    #[error("Region '{region}' has no material assigned")]
    UnassignedRegion { region: String },

    /// Region claimed by two materials
    #[error("Region '{region}' is assigned to both '{first}' and '{second}'")]
    DuplicateAssignment {
        region: String,
        first: String,
        second: String,
    },

    /// Reference to a region that does not exist
    #[error("Unknown region '{region}' referenced by '{referenced_by}'")]
    UnknownRegion {
        region: String,
        referenced_by: String,
    },

    /// Reference to a B-H table that does not exist
    #[error("Unknown B-H table '{table}' referenced by material '{material}'")]
    UnknownTable { table: String, material: String },

    /// Reference to a waveform that does not exist
    #[error("Unknown waveform '{waveform}' referenced by coil '{coil}'")]
    UnknownWaveform { waveform: String, coil: String },

    /// Reference to a coil that does not exist
    #[error("Unknown coil '{coil}'")]
    UnknownCoil { coil: String },

    /// Duplicate name in one namespace
    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    // ============ Table Errors ============
    /// Malformed B-H table
    #[error("Invalid B-H table '{table}': {message}")]
    InvalidTable { table: String, message: String },

    // ============ Circuit Coupling Errors ============
    /// Voltage-driven coil whose circuit equation has no well-posed solution
    #[error("Ill-posed circuit for coil '{coil}': {message}")]
    CircuitConfiguration { coil: String, message: String },

    // ============ Solve Errors ============
    /// Matrix is singular and cannot be solved
    #[error("Singular matrix - a node may be floating or a region has zero permeance")]
    SingularMatrix,

    /// Nonlinear iteration diverged
    #[error(
        "Nonlinear iteration diverged at iteration {iteration} (residual: {residual:.2e}) in region '{region}' (material '{material}')"
    )]
    Divergence {
        iteration: usize,
        residual: f64,
        region: String,
        material: String,
    },

    /// Run aborted through a cancel flag
    #[error("Run cancelled before iteration {iteration}")]
    Cancelled { iteration: usize },

    /// Invalid solver parameter
    #[error("Invalid solver parameter: {message}")]
    InvalidSolverParam { message: String },

    // ============ I/O Errors ============
    /// Error reading a case or table file
    #[error("Failed to read file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl MagError {
    /// Create a lexer error
    pub fn lexer(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::LexerError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid definition error
    pub fn invalid_definition(name: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            name: name.into(),
            line,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a table error
    pub fn table(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTable {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a circuit configuration error
    pub fn circuit(coil: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CircuitConfiguration {
            coil: coil.into(),
            message: message.into(),
        }
    }

    /// Which part of the taxonomy this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::LexerError { .. } | Self::ParseError { .. } | Self::InvalidDefinition { .. } => {
                ErrorCategory::Input
            }
            Self::Configuration { .. }
            | Self::UnassignedRegion { .. }
            | Self::DuplicateAssignment { .. }
            | Self::UnknownRegion { .. }
            | Self::UnknownTable { .. }
            | Self::UnknownWaveform { .. }
            | Self::UnknownCoil { .. }
            | Self::DuplicateName { .. } => ErrorCategory::Configuration,
            Self::InvalidTable { .. } => ErrorCategory::Table,
            Self::CircuitConfiguration { .. } => ErrorCategory::Circuit,
            Self::Divergence { .. } => ErrorCategory::Divergence,
            Self::SingularMatrix | Self::Cancelled { .. } | Self::InvalidSolverParam { .. } => {
                ErrorCategory::Solve
            }
            Self::FileReadError { .. } => ErrorCategory::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divergence_message_names_region_and_material() {
        let err = MagError::Divergence {
            iteration: 4,
            residual: 10.0,
            region: "core".to_string(),
            material: "Iron".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("'core'"));
        assert!(text.contains("'Iron'"));
        assert_eq!(err.category(), ErrorCategory::Divergence);
    }

    #[test]
    fn test_categories() {
        assert_eq!(MagError::table("T", "bad").category(), ErrorCategory::Table);
        assert_eq!(MagError::circuit("C", "bad").category(), ErrorCategory::Circuit);
        assert_eq!(
            MagError::UnassignedRegion { region: "gap".into() }.category(),
            ErrorCategory::Configuration
        );
    }
}
