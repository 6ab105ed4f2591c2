use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDate};
use portal_plugin::{Permission, Plugin, PluginOutput, Result};
use serde_json::Value;
use tracing::debug;

/// Formats a date like `June 16th 2025`.
pub fn format_spelled_date(date: NaiveDate) -> String {
    let day = date.day();
    let suffix = match day {
        11..=13 => "th",
        _ => match day % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        },
    };
    format!("{} {}{} {}", date.format("%B"), day, suffix, date.year())
}

/// Tool returning the local calendar date.
#[derive(Debug, Default)]
pub struct CurrentDatePlugin;

impl CurrentDatePlugin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for CurrentDatePlugin {
    fn name(&self) -> &str {
        "get_current_date"
    }

    fn description(&self) -> &str {
        "Returns the current date spelled out, like 'June 16th 2025'."
    }

    fn parameter_schema(&self) -> Option<Value> {
        None
    }

    fn required_permission(&self) -> Permission {
        Permission::NONE
    }

    async fn execute(&self, _input: Value) -> Result<PluginOutput> {
        let today = format_spelled_date(Local::now().date_naive());
        debug!(date = %today, "Current date requested");
        Ok(PluginOutput::new(today))
    }
}
