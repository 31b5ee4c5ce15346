//! Report request parsing and parameter validation.

use crate::constants::BUDGET_NAME_SEPARATOR;
use crate::error::ServerError;
use serde::Deserialize;

/// Body of a report request as sent by clients.
///
/// Every field is optional at this stage so that a missing field is reported
/// as a missing parameter rather than a malformed body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    /// One budget name or several.
    #[serde(default)]
    pub budget_names: Option<BudgetSelection>,

    /// Singular spelling of `budgetNames`, used when that key is absent.
    #[serde(default)]
    pub budget_name: Option<BudgetSelection>,

    /// Token selecting which amounts the procedure reports.
    #[serde(default)]
    pub amount_flag: Option<String>,

    /// First day of the reporting window.
    #[serde(default)]
    pub start_date: Option<String>,

    /// Last day of the reporting window.
    #[serde(default)]
    pub end_date: Option<String>,
}

/// Budget names as a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BudgetSelection {
    One(String),
    Many(Vec<String>),
}

impl BudgetSelection {
    /// Collapse the selection into the single value bound to the procedure.
    ///
    /// Returns `None` when nothing non-empty was supplied.
    pub fn to_parameter(&self) -> Option<String> {
        match self {
            BudgetSelection::One(name) => non_empty(Some(name)),
            BudgetSelection::Many(names) => {
                let names: Vec<&str> = names
                    .iter()
                    .map(String::as_str)
                    .filter(|n| !n.is_empty())
                    .collect();
                if names.is_empty() {
                    None
                } else {
                    Some(names.join(BUDGET_NAME_SEPARATOR))
                }
            }
        }
    }
}

/// Report parameters after the presence check, in procedure argument order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportParams {
    pub budget_names: String,
    pub amount_flag: String,
    pub start_date: String,
    pub end_date: String,
}

impl ReportParams {
    /// Values in the order the procedure expects them.
    pub fn positional(&self) -> [&str; 4] {
        [
            self.budget_names.as_str(),
            self.amount_flag.as_str(),
            self.start_date.as_str(),
            self.end_date.as_str(),
        ]
    }
}

impl ReportRequest {
    /// Parse a request body.
    ///
    /// Content-Type is not checked; any body that is a JSON object with the
    /// expected field types is accepted.
    pub fn from_body(body: &[u8]) -> Result<Self, ServerError> {
        serde_json::from_slice(body).map_err(|e| ServerError::malformed_body(e.to_string()))
    }

    /// Check that all four parameters are present and non-empty.
    pub fn validate(&self) -> Result<ReportParams, ServerError> {
        let budget_names = self
            .budget_names
            .as_ref()
            .or(self.budget_name.as_ref())
            .and_then(BudgetSelection::to_parameter);
        let amount_flag = non_empty(self.amount_flag.as_ref());
        let start_date = non_empty(self.start_date.as_ref());
        let end_date = non_empty(self.end_date.as_ref());

        match (budget_names, amount_flag, start_date, end_date) {
            (Some(budget_names), Some(amount_flag), Some(start_date), Some(end_date)) => {
                Ok(ReportParams {
                    budget_names,
                    amount_flag,
                    start_date,
                    end_date,
                })
            }
            (budget_names, amount_flag, start_date, end_date) => {
                let missing: Vec<&str> = [
                    ("budgetNames", budget_names.is_none()),
                    ("amountFlag", amount_flag.is_none()),
                    ("startDate", start_date.is_none()),
                    ("endDate", end_date.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, is_missing)| is_missing.then_some(name))
                .collect();
                Err(ServerError::missing_parameters(missing.join(", ")))
            }
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}
