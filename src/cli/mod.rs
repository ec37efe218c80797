pub mod ascii_preview;
pub mod export;

pub use ascii_preview::{check_for_escape, clear_screen, progress_bar, AsciiRenderer};
pub use export::{export_records, records_to_csv};
