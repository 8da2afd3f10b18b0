use std::time::Duration;

use serde_json::{Map, Value};
use tokio_postgres::SimpleQueryMessage;

/// Rows returned by one executed statement, copied out of the backend
/// buffer. Values are kept in the server's text representation; a `None`
/// cell is SQL NULL.
///
/// A `ResultSet` owns its data and outlives the `Connection` that produced it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
    affected_rows: Option<u64>,
    execution_time: Duration,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self {
            columns,
            rows,
            affected_rows: None,
            execution_time: Duration::ZERO,
        }
    }

    /// Build from the messages of a simple-query round trip. When the text
    /// held several statements, the last one's result is kept.
    pub fn from_messages(messages: Vec<SimpleQueryMessage>, execution_time: Duration) -> Self {
        let mut last = ResultSet::default();
        let mut current: Option<ResultSet> = None;

        for message in messages {
            match message {
                SimpleQueryMessage::RowDescription(columns) => {
                    let columns = columns.iter().map(|c| c.name().to_string()).collect();
                    current = Some(ResultSet::new(columns, vec![]));
                }
                SimpleQueryMessage::Row(row) => {
                    let set = current.get_or_insert_with(|| {
                        let columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                        ResultSet::new(columns, vec![])
                    });
                    let values = (0..row.len())
                        .map(|idx| row.get(idx).map(str::to_string))
                        .collect();
                    set.rows.push(values);
                }
                SimpleQueryMessage::CommandComplete(affected) => {
                    let mut set = current.take().unwrap_or_default();
                    set.affected_rows = Some(affected);
                    last = set;
                }
                _ => {}
            }
        }

        // A statement cut short without CommandComplete still counts.
        if let Some(set) = current {
            last = set;
        }
        last.execution_time = execution_time;
        last
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Column names in declaration order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Rows changed or returned, as reported by the command tag.
    pub fn affected_rows(&self) -> Option<u64> {
        self.affected_rows
    }

    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    /// # Panics
    ///
    /// If `row` is out of range or `column` is not part of the result.
    pub fn is_null_at(&self, row: usize, column: &str) -> bool {
        self.cell(row, column).is_none()
    }

    /// Text value of a cell. NULL reads as the empty string; use
    /// [`ResultSet::is_null_at`] or [`ResultSet::value`] to tell them apart.
    ///
    /// # Panics
    ///
    /// If `row` is out of range or `column` is not part of the result.
    pub fn get(&self, row: usize, column: &str) -> &str {
        self.cell(row, column).unwrap_or("")
    }

    /// Like [`ResultSet::get`], with NULL as `None`.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        self.cell(row, column)
    }

    /// Every row as a JSON object keyed by column name.
    pub fn to_json(&self) -> Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(name, value)| {
                        let value = value.clone().map_or(Value::Null, Value::String);
                        (name.clone(), value)
                    })
                    .collect();
                Value::Object(object)
            })
            .collect();
        Value::Array(rows)
    }

    fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = match self.column_index(column) {
            Some(idx) => idx,
            None => panic!(
                "no column `{}` in result (columns: {:?})",
                column, self.columns
            ),
        };
        let values = match self.rows.get(row) {
            Some(values) => values,
            None => panic!("row {} out of range (height {})", row, self.height()),
        };
        values[idx].as_deref()
    }
}
