use super::{check_row, check_value, coerce_value, DataSheet, Fields};
use crate::error::AppError;
use crate::value::{Value, ValueType};

/// Sheet with exactly one row. Columns start out unknown.
#[derive(Clone, Debug, PartialEq)]
pub struct SingleRowSheet {
    names: Vec<String>,
    types: Vec<ValueType>,
    values: Vec<Value>,
}

impl SingleRowSheet {
    pub fn new(names: Vec<String>, types: Vec<ValueType>) -> Self {
        let values = types.iter().map(|t| Value::Unknown(*t)).collect();
        SingleRowSheet {
            names,
            types,
            values,
        }
    }

    /// One row from parallel names and values; column types follow the values.
    pub fn from_values(names: Vec<String>, values: Vec<Value>) -> Result<Self, AppError> {
        if names.len() != values.len() {
            return Err(AppError::Validation(format!(
                "{} column names but {} values",
                names.len(),
                values.len()
            )));
        }
        let types = values.iter().map(|v| v.value_type()).collect();
        Ok(SingleRowSheet {
            names,
            types,
            values,
        })
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl Fields for SingleRowSheet {
    fn get_value(&self, name: &str) -> Option<&Value> {
        self.col_idx(name).map(|i| &self.values[i])
    }

    fn set_value(&mut self, name: &str, value: Value) {
        self.put_value(name, 0, value);
    }
}

impl DataSheet for SingleRowSheet {
    fn column_names(&self) -> &[String] {
        &self.names
    }

    fn value_types(&self) -> &[ValueType] {
        &self.types
    }

    fn len(&self) -> usize {
        1
    }

    fn row(&self, idx: usize) -> Option<&[Value]> {
        (idx == 0).then_some(self.values.as_slice())
    }

    fn rows(&self) -> Box<dyn Iterator<Item = &[Value]> + '_> {
        Box::new(std::iter::once(self.values.as_slice()))
    }

    fn add_row(&mut self, row: Vec<Value>) -> Result<(), AppError> {
        check_row(&self.names, &self.types, &row)?;
        self.values = row;
        Ok(())
    }

    fn set_column_value(&mut self, name: &str, row: usize, value: Value) -> Result<(), AppError> {
        if row != 0 {
            return Err(AppError::BadRequest(format!(
                "single-row sheet has no row {}",
                row
            )));
        }
        let idx = self
            .col_idx(name)
            .ok_or_else(|| AppError::BadRequest(format!("no column named {}", name)))?;
        check_value(name, self.types[idx], &value)?;
        self.values[idx] = value;
        Ok(())
    }

    fn put_value(&mut self, name: &str, row: usize, value: Value) {
        if row != 0 {
            return;
        }
        match self.col_idx(name) {
            Some(idx) => self.values[idx] = coerce_value(name, self.types[idx], value),
            None => {
                self.names.push(name.to_string());
                self.types.push(value.value_type());
                self.values.push(value);
            }
        }
    }

    fn add_column(
        &mut self,
        name: &str,
        value_type: ValueType,
        values: Vec<Value>,
    ) -> Result<(), AppError> {
        let value = values
            .into_iter()
            .next()
            .unwrap_or(Value::Unknown(value_type));
        check_value(name, value_type, &value)?;
        match self.col_idx(name) {
            Some(idx) => {
                self.types[idx] = value_type;
                self.values[idx] = value;
            }
            None => {
                self.names.push(name.to_string());
                self.types.push(value_type);
                self.values.push(value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_always_one_row() {
        let mut s = SingleRowSheet::new(vec!["a".into()], vec![ValueType::Text]);
        assert_eq!(s.len(), 1);
        assert_eq!(s.get_value("a"), Some(&Value::Unknown(ValueType::Text)));
        s.add_row(vec![Value::text("x")]).unwrap();
        s.add_row(vec![Value::text("y")]).unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s.get_value("a"), Some(&Value::text("y")));
        assert_eq!(s.row(1), None);
    }

    #[test]
    fn test_add_column_takes_first_value() {
        let mut s = SingleRowSheet::new(vec![], vec![]);
        s.add_column("n", ValueType::Integer, vec![Value::Integer(1), Value::Integer(2)])
            .unwrap();
        assert_eq!(s.get_value("n"), Some(&Value::Integer(1)));
        s.add_column("m", ValueType::Date, vec![]).unwrap();
        assert_eq!(s.get_value("m"), Some(&Value::Unknown(ValueType::Date)));
    }

    #[test]
    fn test_set_value_adds_field() {
        let mut s = SingleRowSheet::from_values(vec!["a".into()], vec![Value::Integer(1)]).unwrap();
        s.set_value("b", Value::text("two"));
        assert_eq!(s.width(), 2);
        assert_eq!(s.value_types(), &[ValueType::Integer, ValueType::Text]);
        s.set_value("a", Value::text("3"));
        assert_eq!(s.get_value("a"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_from_values_needs_a_value_per_name() {
        let s = SingleRowSheet::from_values(vec!["a".into(), "b".into()], vec![Value::Integer(1)]);
        assert!(s.is_err());
    }
}
