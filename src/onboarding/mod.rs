pub mod formatter;
pub mod importer;

pub use formatter::{
    format_clients, resolve_advisor_link, ContactEntry, FormatOptions, ImportExtras, ImportRecord,
};
pub use importer::{ClientImporter, ImportOutcome};
