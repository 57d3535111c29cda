use crate::value::Value;

/// Streaming sink for nested output.
pub trait ResponseWriter {
    fn begin_object(&mut self);
    fn end_object(&mut self);
    fn begin_array(&mut self);
    fn end_array(&mut self);
    /// Name of the next member of the current object.
    fn key(&mut self, name: &str);
    /// Unknown values are written as null.
    fn value(&mut self, value: &Value);
}

/// Writes compact JSON text.
#[derive(Debug, Default)]
pub struct JsonWriter {
    out: String,
    /// One entry per open object or array: whether nothing has been written in it yet.
    first: Vec<bool>,
    after_key: bool,
}

impl JsonWriter {
    pub fn new() -> Self {
        JsonWriter::default()
    }

    fn separate(&mut self) {
        if self.after_key {
            self.after_key = false;
            return;
        }
        if let Some(first) = self.first.last_mut() {
            if !*first {
                self.out.push(',');
            }
            *first = false;
        }
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

impl ResponseWriter for JsonWriter {
    fn begin_object(&mut self) {
        self.separate();
        self.out.push('{');
        self.first.push(true);
    }

    fn end_object(&mut self) {
        self.first.pop();
        self.out.push('}');
    }

    fn begin_array(&mut self) {
        self.separate();
        self.out.push('[');
        self.first.push(true);
    }

    fn end_array(&mut self) {
        self.first.pop();
        self.out.push(']');
    }

    fn key(&mut self, name: &str) {
        self.separate();
        self.out
            .push_str(&serde_json::Value::String(name.to_string()).to_string());
        self.out.push(':');
        self.after_key = true;
    }

    fn value(&mut self, value: &Value) {
        self.separate();
        self.out.push_str(&value.to_json().to_string());
    }
}
