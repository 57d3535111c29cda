//! In-memory `SqlExecutor` that records every statement and answers from a queue.

#![allow(dead_code)]

use async_trait::async_trait;
use schema_records::config::{load_from_str, resolve, Record, Schema};
use schema_records::sql::Dialect;
use schema_records::{AppError, DataSheet, SqlExecutor, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Clone, Debug)]
pub enum Reply {
    Count(u64),
    Counts(Vec<u64>),
    Rows(Vec<Vec<Value>>),
    Keys(u64, Vec<i64>),
    Exists(bool),
}

#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<Call>>,
    replies: Mutex<VecDeque<Reply>>,
    rollbacks: Mutex<usize>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        RecordingExecutor::default()
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Batches rolled back because a row was not matched.
    pub fn rollbacks(&self) -> usize {
        *self.rollbacks.lock().unwrap()
    }

    pub fn last(&self) -> Call {
        self.calls().pop().expect("no statement was run")
    }

    fn record(&self, sql: &str, params: &[Value]) -> Option<Reply> {
        self.calls.lock().unwrap().push(Call {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.replies.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl SqlExecutor for RecordingExecutor {
    async fn execute(&self, sql: &str, params: &[Value], _treat: bool) -> Result<u64, AppError> {
        Ok(match self.record(sql, params) {
            Some(Reply::Count(n)) => n,
            _ => 1,
        })
    }

    async fn execute_batch(
        &self,
        sql: &str,
        rows: &[Vec<Value>],
        _treat: bool,
        every_row_must_match: bool,
    ) -> Result<Vec<u64>, AppError> {
        let flat: Vec<Value> = rows.iter().flatten().cloned().collect();
        let mut counts = match self.record(sql, &flat) {
            Some(Reply::Counts(c)) => c,
            _ => vec![1; rows.len()],
        };
        if every_row_must_match {
            if let Some(miss) = counts.iter().position(|c| *c == 0) {
                counts.truncate(miss + 1);
                *self.rollbacks.lock().unwrap() += 1;
            }
        }
        Ok(counts)
    }

    async fn extract(
        &self,
        sql: &str,
        params: &[Value],
        out: &mut dyn DataSheet,
        _single_row: bool,
    ) -> Result<usize, AppError> {
        match self.record(sql, params) {
            Some(Reply::Rows(rows)) => {
                let n = rows.len();
                for row in rows {
                    out.add_row(row)?;
                }
                Ok(n)
            }
            _ => Ok(0),
        }
    }

    async fn insert_and_get_keys(
        &self,
        sql: &str,
        params: &[Value],
        _key_columns: &[String],
        _treat: bool,
    ) -> Result<(u64, Vec<i64>), AppError> {
        Ok(match self.record(sql, params) {
            Some(Reply::Keys(n, keys)) => (n, keys),
            _ => (1, Vec::new()),
        })
    }

    async fn exists(&self, sql: &str, params: &[Value]) -> Result<bool, AppError> {
        Ok(matches!(self.record(sql, params), Some(Reply::Exists(true))))
    }
}

pub fn schema(json: &str) -> Schema {
    let config = load_from_str(json).expect("config parses");
    resolve(&config, &Dialect::default()).expect("config compiles")
}

pub fn record(schema: &Schema, name: &str) -> Arc<Record> {
    schema.get_record(name).expect("record defined")
}
