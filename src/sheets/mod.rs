//! Google Sheets access and mark-sheet layout parsing.

pub mod api;
pub mod layout;

pub use api::{SheetsAuth, SheetsClient};
pub use layout::{LayoutError, SheetData, SheetParameters};
