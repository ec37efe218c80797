use crate::common::Result;
use crate::storage::{write_atomic, PersonRecord};
use std::path::Path;

const HEADER: [&str; 3] = ["ID", "Name", "Status"];

/// One CSV row per record, in the order given.
pub fn records_to_csv(records: &[PersonRecord]) -> String {
    let mut content = String::new();
    push_row(&mut content, &HEADER);
    for record in records {
        push_row(&mut content, &[record.person_id.as_str(), record.name.as_str(), record.status.as_str()]);
    }
    content
}

pub fn export_records(records: &[PersonRecord], output: &Path) -> Result<usize> {
    write_atomic(output, records_to_csv(records).as_bytes())?;
    tracing::info!("Exported {} records to {}", records.len(), output.display());
    Ok(records.len())
}

fn push_row(content: &mut String, fields: &[&str]) {
    let row: Vec<String> = fields.iter().map(|f| escape_field(f)).collect();
    content.push_str(&row.join(","));
    content.push_str("\r\n");
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PersonStatus;

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(escape_field("Alice"), "Alice");
        assert_eq!(escape_field("Smith, John"), "\"Smith, John\"");
        assert_eq!(escape_field("The \"Rock\""), "\"The \"\"Rock\"\"\"");
    }

    #[test]
    fn header_then_rows_in_order() {
        let records = vec![
            PersonRecord::new("20", "Zed", PersonStatus::Active),
            PersonRecord::new("1", "Ann, B.", PersonStatus::Enrolled),
        ];
        assert_eq!(
            records_to_csv(&records),
            "ID,Name,Status\r\n20,Zed,active\r\n1,\"Ann, B.\",enrolled\r\n"
        );
    }
}
