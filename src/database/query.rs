//! Query text, result sets, and row-to-object mapping.

use crate::config::ReportConfig;
use crate::database::types::{SqlValue, TypeMapper};
use crate::error::ServerError;
use crate::security::safe_identifier;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tiberius::QueryStream;

/// One row of a report, keyed by column name in result-set order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportRow {
    columns: Vec<(String, SqlValue)>,
}

impl ReportRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row by pairing column names with values positionally.
    ///
    /// Extra values without a column name are dropped; missing values are NULL.
    pub fn from_columns(columns: &[String], values: Vec<SqlValue>) -> Self {
        let mut row = Self::new();
        let mut values = values.into_iter();
        for name in columns {
            row.insert(name.clone(), values.next().unwrap_or(SqlValue::Null));
        }
        row
    }

    /// Insert a value. A repeated column name replaces the earlier value but
    /// keeps its position.
    pub fn insert(&mut self, column: String, value: SqlValue) {
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Get a value by column name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Serialize for ReportRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// The first result set of a statement: column names plus raw row values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column names in driver order.
    pub columns: Vec<String>,

    /// Row values, positionally aligned with `columns`.
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    /// Create a result set from column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    /// Map every row onto a column-name-keyed object.
    pub fn into_report_rows(self) -> Vec<ReportRow> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|values| ReportRow::from_columns(&columns, values))
            .collect()
    }

    /// Non-empty string values of the first column, in row order.
    pub fn first_column_strings(self) -> Vec<String> {
        self.rows
            .into_iter()
            .filter_map(|values| {
                values
                    .into_iter()
                    .next()
                    .and_then(|v| v.as_non_empty_str().map(str::to_string))
            })
            .collect()
    }

    /// Read the first result set from a tiberius stream.
    ///
    /// Later result sets (if a procedure emits more than one) are drained
    /// and ignored.
    pub async fn from_stream(mut stream: QueryStream<'_>) -> Result<Self, ServerError> {
        use futures_util::stream::TryStreamExt;

        let mut result = ResultSet::default();

        while let Some(item) = stream.try_next().await? {
            match item {
                tiberius::QueryItem::Metadata(meta) if meta.result_index() == 0 => {
                    result.columns = meta
                        .columns()
                        .iter()
                        .map(|col| col.name().to_string())
                        .collect();
                }
                tiberius::QueryItem::Row(row) if row.result_index() == 0 => {
                    let values = (0..row.len())
                        .map(|idx| TypeMapper::extract_column(&row, idx))
                        .collect();
                    result.rows.push(values);
                }
                _ => {}
            }
        }

        Ok(result)
    }
}

/// SQL text for the two report statements, built once from configuration.
#[derive(Debug, Clone)]
pub struct ReportQueries {
    budget_names_sql: String,
    report_sql: String,
}

impl ReportQueries {
    /// Validate the configured object names and build the statements.
    pub fn new(config: &ReportConfig) -> Result<Self, ServerError> {
        let procedure = escape_setting("REPORT_PROCEDURE", &config.procedure)?;
        let table = escape_setting("REPORT_CATEGORY_TABLE", &config.category_table)?;
        let column = escape_setting("REPORT_BUDGET_COLUMN", &config.budget_column)?;

        Ok(Self {
            budget_names_sql: format!(
                "SELECT DISTINCT {column} FROM {table} WHERE {column} IS NOT NULL ORDER BY {column}"
            ),
            report_sql: format!("EXEC {procedure} @P1, @P2, @P3, @P4"),
        })
    }

    /// Statement listing distinct, non-null budget names in ascending order.
    pub fn budget_names_sql(&self) -> &str {
        &self.budget_names_sql
    }

    /// Statement calling the report procedure with four positional parameters.
    pub fn report_sql(&self) -> &str {
        &self.report_sql
    }
}

impl Default for ReportQueries {
    fn default() -> Self {
        // The default names are static and always valid.
        Self {
            budget_names_sql: "SELECT DISTINCT [BudgetName] FROM [dbo].[Category] \
                               WHERE [BudgetName] IS NOT NULL ORDER BY [BudgetName]"
                .to_string(),
            report_sql: "EXEC [dbo].[usp_GetMonthlyBudgetReport] @P1, @P2, @P3, @P4".to_string(),
        }
    }
}

fn escape_setting(name: &str, value: &str) -> Result<String, ServerError> {
    safe_identifier(value).map_err(|e| ServerError::config(format!("{} is invalid: {}", name, e)))
}

/// Truncate a string for logging purposes.
pub fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
