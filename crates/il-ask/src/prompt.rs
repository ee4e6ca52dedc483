use arrow::record_batch::RecordBatch;
use il_data::{export_csv_head, DataError};

/// Build the prompt for `question`, embedding the first `rows` rows as CSV
pub fn build_prompt(question: &str, table: &RecordBatch, rows: usize) -> Result<String, DataError> {
    let csv = export_csv_head(table, rows)?;
    let csv = String::from_utf8_lossy(&csv);

    Ok(format!(
        "Answer this question based only on the data:\n{}\nHere is the data:\n{}\nOnly give the answer. Do not generate code.\n",
        question, csv
    ))
}
