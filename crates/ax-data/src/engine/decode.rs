//! Decoding of source file buffers and loading them into SQLite tables

use std::io::Cursor;
use std::sync::Arc;
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::kernels::cast::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type, SchemaRef};
use arrow::record_batch::RecordBatch;
use rusqlite::types::Value as SqlValue;

use crate::query::quote_ident;
use crate::{DataError, Result};

const ARROW_MAGIC: &[u8] = b"ARROW1";
const PARQUET_MAGIC: &[u8] = b"PAR1";

/// Rows sampled for CSV type inference
const CSV_INFER_ROWS: usize = 1000;
const CSV_BATCH_SIZE: usize = 8192;

/// Storage class a column is loaded as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SqlType {
    Integer,
    Real,
    Text,
}

impl SqlType {
    fn for_arrow(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean
            | DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
            | DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => SqlType::Integer,
            DataType::Float16 | DataType::Float32 | DataType::Float64
            | DataType::Decimal128(_, _) | DataType::Decimal256(_, _) => SqlType::Real,
            _ => SqlType::Text,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
        }
    }
}

/// Decode a file buffer into record batches.
///
/// Arrow IPC files are recognized by their magic bytes; anything else is
/// read as CSV with a header row and inferred column types.
pub(crate) fn decode_batches(bytes: &[u8]) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    if bytes.starts_with(ARROW_MAGIC) {
        let reader = arrow::ipc::reader::FileReader::try_new(Cursor::new(bytes), None)?;
        let schema = reader.schema();
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
        return Ok((schema, batches));
    }

    if bytes.starts_with(PARQUET_MAGIC) {
        return Err(DataError::Decode("Parquet files must be converted to Arrow IPC first".into()));
    }

    if std::str::from_utf8(bytes).is_err() {
        return Err(DataError::Decode("neither an Arrow IPC file nor UTF-8 CSV".into()));
    }

    let (schema, _) = arrow::csv::reader::Format::default()
        .with_header(true)
        .infer_schema(Cursor::new(bytes), Some(CSV_INFER_ROWS))?;
    let schema = Arc::new(schema);

    let reader = arrow::csv::ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_batch_size(CSV_BATCH_SIZE)
        .build(Cursor::new(bytes))?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

/// Create `table` from `schema` and insert every batch.
///
/// Any existing table with that name is dropped first. Returns the number of
/// rows inserted.
pub(crate) fn load_table(
    conn: &mut rusqlite::Connection,
    table: &str,
    schema: &SchemaRef,
    batches: &[RecordBatch],
) -> Result<usize> {
    let table_ident = quote_ident(table);
    let columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|field| format!("{} {}", quote_ident(field.name()), SqlType::for_arrow(field.data_type()).keyword()))
        .collect();

    if columns.is_empty() {
        return Err(DataError::Decode(format!("source for '{}' has no columns", table)));
    }

    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({columns});",
        table = table_ident,
        columns = columns.join(", "),
    ))?;

    let mut inserted = 0;
    {
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {} VALUES ({})",
            table_ident,
            placeholders.join(", ")
        ))?;

        for batch in batches {
            let column_values = batch
                .columns()
                .iter()
                .map(column_values)
                .collect::<Result<Vec<_>>>()?;

            for row_idx in 0..batch.num_rows() {
                let row = column_values.iter().map(|values| &values[row_idx]);
                stmt.execute(rusqlite::params_from_iter(row))?;
                inserted += 1;
            }
        }
    }
    tx.commit()?;

    Ok(inserted)
}

/// Convert one arrow column to SQLite values
fn column_values(array: &ArrayRef) -> Result<Vec<SqlValue>> {
    let values = match SqlType::for_arrow(array.data_type()) {
        SqlType::Integer => {
            let cast = cast(array, &DataType::Int64)?;
            let ints = cast.as_primitive::<Int64Type>();
            (0..ints.len())
                .map(|i| if ints.is_null(i) { SqlValue::Null } else { SqlValue::Integer(ints.value(i)) })
                .collect()
        }
        SqlType::Real => {
            let cast = cast(array, &DataType::Float64)?;
            let floats = cast.as_primitive::<Float64Type>();
            (0..floats.len())
                .map(|i| if floats.is_null(i) { SqlValue::Null } else { SqlValue::Real(floats.value(i)) })
                .collect()
        }
        SqlType::Text => {
            let cast = cast(array, &DataType::Utf8)?;
            let strings = cast.as_string::<i32>();
            (0..strings.len())
                .map(|i| {
                    if strings.is_null(i) {
                        SqlValue::Null
                    } else {
                        SqlValue::Text(strings.value(i).to_string())
                    }
                })
                .collect()
        }
    };
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{Field, Schema};

    #[test]
    fn test_csv_buffer_infers_types() {
        let csv = "award_date,contractor_name,contract_amount\n2023-01-05,ACME CORP,100.5\n2023-02-01,Globex,\n";
        let (schema, batches) = decode_batches(csv.as_bytes()).unwrap();

        assert_eq!(schema.fields().len(), 3);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 2);
    }

    #[test]
    fn test_ipc_buffer_round_trips_into_sqlite() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("contractor_name", DataType::Utf8, true),
            Field::new("contract_amount", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![Some("ACME CORP"), None])),
                Arc::new(Float64Array::from(vec![Some(1.5), Some(2.0)])),
            ],
        )
        .unwrap();

        let mut buffer = Vec::new();
        {
            let mut writer = arrow::ipc::writer::FileWriter::try_new(&mut buffer, &schema).unwrap();
            writer.write(&batch).unwrap();
            writer.finish().unwrap();
        }

        let (decoded_schema, batches) = decode_batches(&buffer).unwrap();
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        let inserted = load_table(&mut conn, "facts", &decoded_schema, &batches).unwrap();
        assert_eq!(inserted, 2);

        let total: f64 = conn
            .query_row("SELECT SUM(contract_amount) FROM facts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(total, 3.5);
        let nulls: i64 = conn
            .query_row("SELECT COUNT(*) FROM facts WHERE contractor_name IS NULL", [], |row| row.get(0))
            .unwrap();
        assert_eq!(nulls, 1);
    }

    #[test]
    fn test_parquet_is_rejected_with_decode_error() {
        let err = decode_batches(b"PAR1\x00\x00").unwrap_err();
        assert!(matches!(err, DataError::Decode(_)));
    }
}
