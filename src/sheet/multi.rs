use super::{check_row, check_value, coerce_value, DataSheet, Fields};
use crate::error::AppError;
use crate::value::{Value, ValueType};

/// Sheet with any number of rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultiRowsSheet {
    names: Vec<String>,
    types: Vec<ValueType>,
    data: Vec<Vec<Value>>,
}

impl MultiRowsSheet {
    pub fn new(names: Vec<String>, types: Vec<ValueType>) -> Self {
        debug_assert_eq!(names.len(), types.len());
        MultiRowsSheet {
            names,
            types,
            data: Vec::new(),
        }
    }

    pub fn from_rows(
        names: Vec<String>,
        types: Vec<ValueType>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, AppError> {
        let mut sheet = MultiRowsSheet::new(names, types);
        for row in rows {
            sheet.add_row(row)?;
        }
        Ok(sheet)
    }

    pub(crate) fn push_unchecked(&mut self, row: Vec<Value>) {
        self.data.push(row);
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.data
    }

    fn ensure_column(&mut self, name: &str, value_type: ValueType) -> usize {
        if let Some(idx) = self.names.iter().position(|c| c == name) {
            return idx;
        }
        self.names.push(name.to_string());
        self.types.push(value_type);
        for row in self.data.iter_mut() {
            row.push(Value::Unknown(value_type));
        }
        self.names.len() - 1
    }
}

impl Fields for MultiRowsSheet {
    fn get_value(&self, name: &str) -> Option<&Value> {
        self.column_value(name, 0)
    }

    fn set_value(&mut self, name: &str, value: Value) {
        if self.data.is_empty() {
            let row = self.types.iter().map(|t| Value::Unknown(*t)).collect();
            self.data.push(row);
        }
        self.put_value(name, 0, value);
    }
}

impl DataSheet for MultiRowsSheet {
    fn column_names(&self) -> &[String] {
        &self.names
    }

    fn value_types(&self) -> &[ValueType] {
        &self.types
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn row(&self, idx: usize) -> Option<&[Value]> {
        self.data.get(idx).map(|r| r.as_slice())
    }

    fn rows(&self) -> Box<dyn Iterator<Item = &[Value]> + '_> {
        Box::new(self.data.iter().map(|r| r.as_slice()))
    }

    fn add_row(&mut self, row: Vec<Value>) -> Result<(), AppError> {
        check_row(&self.names, &self.types, &row)?;
        self.data.push(row);
        Ok(())
    }

    fn set_column_value(&mut self, name: &str, row: usize, value: Value) -> Result<(), AppError> {
        let idx = self
            .col_idx(name)
            .ok_or_else(|| AppError::BadRequest(format!("no column named {}", name)))?;
        check_value(name, self.types[idx], &value)?;
        let r = self
            .data
            .get_mut(row)
            .ok_or_else(|| AppError::BadRequest(format!("row {} does not exist", row)))?;
        r[idx] = value;
        Ok(())
    }

    fn put_value(&mut self, name: &str, row: usize, value: Value) {
        let idx = self.ensure_column(name, value.value_type());
        let value = coerce_value(name, self.types[idx], value);
        if let Some(r) = self.data.get_mut(row) {
            r[idx] = value;
        }
    }

    fn add_column(
        &mut self,
        name: &str,
        value_type: ValueType,
        values: Vec<Value>,
    ) -> Result<(), AppError> {
        for v in &values {
            check_value(name, value_type, v)?;
        }
        let idx = self.ensure_column(name, value_type);
        self.types[idx] = value_type;
        let mut values = values.into_iter();
        for row in self.data.iter_mut() {
            row[idx] = values.next().unwrap_or(Value::Unknown(value_type));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sheet() -> MultiRowsSheet {
        MultiRowsSheet::from_rows(
            vec!["id".into(), "name".into()],
            vec![ValueType::Integer, ValueType::Text],
            vec![
                vec![Value::Integer(1), Value::text("a")],
                vec![Value::Integer(2), Value::Unknown(ValueType::Text)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_add_row_rejects_misaligned_rows() {
        let mut s = sheet();
        assert!(s.add_row(vec![Value::Integer(3)]).is_err());
        assert!(s.add_row(vec![Value::text("x"), Value::text("y")]).is_err());
        assert!(s.add_row(vec![Value::Unknown(ValueType::Date), Value::text("y")]).is_ok());
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn test_add_column_back_fills() {
        let mut s = sheet();
        s.add_column("flag", ValueType::Boolean, vec![Value::Boolean(true)]).unwrap();
        assert_eq!(s.width(), 3);
        assert_eq!(s.column_value("flag", 0), Some(&Value::Boolean(true)));
        assert_eq!(s.column_value("flag", 1), Some(&Value::Unknown(ValueType::Boolean)));
        assert!(s.add_column("bad", ValueType::Integer, vec![Value::text("no")]).is_err());
    }

    #[test]
    fn test_add_column_with_value_every_row() {
        let mut s = sheet();
        s.add_column_with_value("order_id", Value::Integer(9)).unwrap();
        assert_eq!(
            s.column_values("order_id").unwrap(),
            vec![Value::Integer(9), Value::Integer(9)]
        );
    }

    #[test]
    fn test_set_column_value_checks_type() {
        let mut s = sheet();
        s.set_column_value("name", 1, Value::text("b")).unwrap();
        assert_eq!(s.column_value("name", 1), Some(&Value::text("b")));
        assert!(s.set_column_value("name", 1, Value::Integer(1)).is_err());
        assert!(s.set_column_value("nope", 0, Value::Integer(1)).is_err());
        assert!(s.set_column_value("id", 5, Value::Integer(1)).is_err());
    }

    #[test]
    fn test_put_value_fits_the_column_type() {
        let mut s = sheet();
        s.put_value("id", 1, Value::text("7"));
        assert_eq!(s.column_value("id", 1), Some(&Value::Integer(7)));
        s.put_value("id", 0, Value::text("x"));
        assert_eq!(s.column_value("id", 0), Some(&Value::Unknown(ValueType::Integer)));
        assert_eq!(s.value_types(), &[ValueType::Integer, ValueType::Text]);
    }

    #[test]
    fn test_fields_view_is_first_row() {
        let mut s = MultiRowsSheet::new(vec!["id".into()], vec![ValueType::Integer]);
        assert_eq!(s.get_value("id"), None);
        s.set_value("id", Value::Integer(4));
        assert_eq!(s.len(), 1);
        assert_eq!(s.get_value("id"), Some(&Value::Integer(4)));
    }
}
