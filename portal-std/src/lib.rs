//! Standard tools for the research portal
//!
//! The tools the analyst model can call:
//! - `get_current_date`: today's date, spelled out
//! - `list_reports`: names of the available report files
//! - `read_file_content`: raw JSON of one report

mod date;
mod reports;

pub use date::{format_spelled_date, CurrentDatePlugin};
pub use reports::{ListReportsPlugin, ReadReportPlugin, ReportStore};

use portal_plugin::Plugin;
use std::sync::Arc;

/// All standard tools, sharing one report store.
pub fn standard_tools(store: ReportStore) -> Vec<Arc<dyn Plugin>> {
    let store = Arc::new(store);
    vec![
        Arc::new(CurrentDatePlugin::new()),
        Arc::new(ListReportsPlugin::new(store.clone())),
        Arc::new(ReadReportPlugin::new(store)),
    ]
}
