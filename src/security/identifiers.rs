//! SQL Server identifier escaping utilities.
//!
//! Procedure, table, and column names come from configuration and are spliced
//! into SQL text, so they are validated and wrapped in bracket notation
//! `[identifier]` first. Report parameters are never spliced; they are bound.

use crate::error::ServerError;

/// Maximum length for SQL Server identifiers.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Escape a SQL Server identifier using bracket notation.
///
/// This function handles:
/// - Schema-qualified names (`dbo.Category` -> `[dbo].[Category]`)
/// - Simple names (`BudgetName` -> `[BudgetName]`)
/// - Names with spaces
/// - Names that contain brackets (escaped as `]]`)
///
/// # Examples
///
/// ```
/// use budget_report_api::security::escape_identifier;
///
/// assert_eq!(escape_identifier("Category").unwrap(), "[Category]");
/// assert_eq!(escape_identifier("dbo.Category").unwrap(), "[dbo].[Category]");
/// assert_eq!(escape_identifier("Budget Name").unwrap(), "[Budget Name]");
/// ```
pub fn escape_identifier(identifier: &str) -> Result<String, ServerError> {
    if identifier.is_empty() {
        return Err(ServerError::invalid_input("Identifier cannot be empty"));
    }

    // Handle schema-qualified names (e.g., "dbo.Category")
    if let Some((schema, name)) = identifier.split_once('.') {
        let schema = escape_single_identifier(schema)?;
        let name = escape_single_identifier(name)?;
        return Ok(format!("{}.{}", schema, name));
    }

    escape_single_identifier(identifier)
}

/// Escape a single identifier (no dots).
fn escape_single_identifier(identifier: &str) -> Result<String, ServerError> {
    let trimmed = identifier.trim();

    if trimmed.is_empty() {
        return Err(ServerError::invalid_input("Identifier cannot be empty"));
    }

    if trimmed.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ServerError::invalid_input(format!(
            "Identifier exceeds maximum length of {} characters",
            MAX_IDENTIFIER_LENGTH
        )));
    }

    // Only strip brackets when both outer brackets exist
    let clean = if trimmed.len() >= 2 && trimmed.starts_with('[') && trimmed.ends_with(']') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

    // Escape any embedded right brackets by doubling them
    let escaped = clean.replace(']', "]]");

    Ok(format!("[{}]", escaped))
}

/// Validate that an identifier contains no statement-breaking sequences.
pub fn validate_identifier(identifier: &str) -> Result<(), ServerError> {
    if identifier.is_empty() {
        return Err(ServerError::invalid_input("Identifier cannot be empty"));
    }

    let dangerous_patterns = [
        "--",   // SQL comment
        "/*",   // Multi-line comment start
        "*/",   // Multi-line comment end
        ";",    // Statement separator
        "'",    // String delimiter
        "\"",   // Quoted identifier delimiter (we use brackets instead)
        "\\",   // Escape character
        "\x00", // Null byte
    ];

    for pattern in &dangerous_patterns {
        if identifier.contains(pattern) {
            return Err(ServerError::invalid_input(format!(
                "Identifier contains forbidden character sequence: {}",
                pattern.escape_debug()
            )));
        }
    }

    Ok(())
}

/// Validate and escape an identifier for safe use in SQL.
pub fn safe_identifier(identifier: &str) -> Result<String, ServerError> {
    validate_identifier(identifier)?;
    escape_identifier(identifier)
}
