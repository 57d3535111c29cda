mod common;

use common::{record, schema, RecordingExecutor, Reply};
use schema_records::crypt;
use schema_records::sheet::{DataSheet, Fields, FieldValues, MultiRowsSheet};
use schema_records::{AppError, CrudService, SaveActionType, Schema, Value, ValueType};
use pretty_assertions::assert_eq;

const RECORDS: &str = r#"{
  "records": [
    {
      "name": "orders",
      "key_to_be_generated": true,
      "use_timestamp_for_concurrency": true,
      "fields": [
        { "name": "id", "field_type": "PRIMARY_KEY", "data_type": "integer" },
        { "name": "code", "data_type": "text", "column_name": "order_code" },
        { "name": "secret", "data_type": "text", "encrypted": true },
        { "name": "modifiedAt", "field_type": "MODIFIED_TIME_STAMP", "data_type": "timestamp", "column_name": "mod_at" },
        { "name": "modifiedBy", "field_type": "MODIFIED_BY_USER", "data_type": "text" },
        { "name": "createdBy", "field_type": "CREATED_BY_USER", "data_type": "text" }
      ]
    },
    {
      "name": "batches",
      "fields": [
        { "name": "id", "field_type": "PRIMARY_KEY", "data_type": "integer" },
        { "name": "label", "data_type": "text" }
      ]
    },
    {
      "name": "lines",
      "fields": [
        { "name": "orderId", "field_type": "PRIMARY_AND_PARENT_KEY", "data_type": "integer", "referred_field": "id" },
        { "name": "lineNo", "field_type": "PRIMARY_KEY", "data_type": "integer" },
        { "name": "qty", "data_type": "integer" }
      ]
    },
    {
      "name": "customers",
      "list_field_name": "name",
      "suggestion_key_name": "name",
      "suggestion_output_names": ["code", "name"],
      "fields": [
        { "name": "code", "field_type": "PRIMARY_KEY", "data_type": "text" },
        { "name": "name", "data_type": "text" }
      ]
    }
  ]
}"#;

fn records() -> Schema {
    schema(RECORDS)
}

fn user() -> Value {
    Value::text("u1")
}

fn stamp() -> Value {
    Value::parse("2024-01-02 03:04:05", ValueType::Timestamp).unwrap()
}

#[tokio::test]
async fn test_composite_key_read_and_short_key() {
    let s = records();
    let lines = record(&s, "lines");
    let exec = RecordingExecutor::new();
    exec.reply(Reply::Rows(vec![vec![Value::Integer(1), Value::Integer(2), Value::Integer(5)]]));

    let mut out = lines.new_sheet(true);
    let key = FieldValues::new().with("orderId", 1i64).with("lineNo", 2i64);
    let n = CrudService::read_one(&lines, &exec, &key, out.as_mut()).await.unwrap();
    assert_eq!(n, 1);
    let call = exec.last();
    assert!(call.sql.ends_with("FROM lines WHERE orderId=? AND lineNo=?"), "{}", call.sql);
    assert_eq!(call.params, vec![Value::Integer(1), Value::Integer(2)]);
    assert_eq!(out.get_value("qty"), Some(&Value::Integer(5)));

    let short = FieldValues::new().with("orderId", 1i64);
    let n = CrudService::read_one(&lines, &exec, &short, out.as_mut()).await.unwrap();
    assert_eq!(n, 0);
    assert_eq!(exec.calls().len(), 1);
}

#[tokio::test]
async fn test_read_many_batches_composite_keys() {
    let s = records();
    let lines = record(&s, "lines");
    let exec = RecordingExecutor::new();
    let keys = MultiRowsSheet::from_rows(
        vec!["orderId".into(), "lineNo".into()],
        vec![ValueType::Integer, ValueType::Integer],
        vec![
            vec![Value::Integer(1), Value::Integer(1)],
            vec![Value::Integer(1), Value::Integer(2)],
        ],
    )
    .unwrap();
    let mut out = lines.new_multi_sheet();
    CrudService::read_many(&lines, &exec, &keys, &mut out).await.unwrap();
    let call = exec.last();
    assert!(
        call.sql.ends_with("WHERE (orderId=? AND lineNo=?) OR (orderId=? AND lineNo=?)"),
        "{}",
        call.sql
    );
    assert_eq!(call.params.len(), 4);

    let mut partial = keys.clone();
    partial.add_row(vec![Value::Integer(2), Value::Unknown(ValueType::Integer)]).unwrap();
    let n = CrudService::read_many(&lines, &exec, &partial, &mut out).await.unwrap();
    assert_eq!(n, 0);
    assert_eq!(exec.calls().len(), 1);
}

#[tokio::test]
async fn test_generated_key_decides_add_or_modify() {
    let s = records();
    let orders = record(&s, "orders");
    let exec = RecordingExecutor::new();
    exec.reply(Reply::Keys(1, vec![42]));

    let mut row = FieldValues::new().with("code", "A1").with("secret", "hush");
    let action = CrudService::save_one(&orders, &exec, &mut row, &user(), false).await.unwrap();
    assert_eq!(action, SaveActionType::Add);
    assert_eq!(row.get_value("id"), Some(&Value::Integer(42)));
    assert_eq!(row.get_value("createdBy"), Some(&user()));
    let call = exec.last();
    assert_eq!(
        call.sql,
        "INSERT INTO orders (order_code, secret, mod_at, modifiedBy, createdBy) VALUES (?, ?, CURRENT_TIMESTAMP, ?, ?)"
    );
    assert_eq!(
        call.params,
        vec![Value::text("A1"), Value::text(crypt::encrypt("hush")), user(), user()]
    );

    // the key now present, the same row is modified
    let action = CrudService::save_one(&orders, &exec, &mut row, &user(), false).await.unwrap();
    assert_eq!(action, SaveActionType::Modify);
    let call = exec.last();
    assert_eq!(
        call.sql,
        "UPDATE orders SET order_code=?, secret=?, mod_at=CURRENT_TIMESTAMP, modifiedBy=? WHERE id=? AND mod_at=?"
    );
    assert_eq!(call.params[3], Value::Integer(42));
}

#[tokio::test]
async fn test_stale_timestamp_is_a_conflict() {
    let s = records();
    let orders = record(&s, "orders");
    let exec = RecordingExecutor::new();
    let mut row = FieldValues::new()
        .with("id", 7i64)
        .with("code", "B")
        .with("_saveAction", "Modify");
    row.set_value("modifiedAt", stamp());

    exec.reply(Reply::Count(0));
    let err = CrudService::save_one(&orders, &exec, &mut row, &user(), false)
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "{:?}", err);

    exec.reply(Reply::Count(1));
    let action = CrudService::save_one(&orders, &exec, &mut row, &user(), false).await.unwrap();
    assert_eq!(action, SaveActionType::Modify);
    let call = exec.last();
    assert_eq!(call.params.last(), Some(&stamp()));
    assert_eq!(row.get_value("modifiedBy"), Some(&user()));
}

#[tokio::test]
async fn test_selective_update_is_repeatable() {
    let s = records();
    let orders = record(&s, "orders");
    let exec = RecordingExecutor::new();
    let mut fields = FieldValues::new().with("id", 7i64).with("code", "B");
    fields.set_value("modifiedAt", stamp());

    CrudService::selective_update(&orders, &exec, &fields, &user(), false).await.unwrap();
    CrudService::selective_update(&orders, &exec, &fields, &user(), false).await.unwrap();
    let calls = exec.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], calls[1]);
    assert_eq!(
        calls[0].sql,
        "UPDATE orders SET order_code=?, mod_at=CURRENT_TIMESTAMP, modifiedBy=? WHERE id=? AND mod_at=?"
    );
    assert_eq!(calls[0].params, vec![Value::text("B"), user(), Value::Integer(7), stamp()]);
}

#[tokio::test]
async fn test_filter_needs_criteria_unless_select_all() {
    let s = records();
    let customers = record(&s, "customers");
    let exec = RecordingExecutor::new();

    let err = CrudService::filter(&customers, &exec, &FieldValues::new()).await.unwrap_err();
    assert!(matches!(err, AppError::SelectAllNotAllowed(_)));
    assert!(exec.calls().is_empty());

    let bad_sort = FieldValues::new()
        .with("name", "x")
        .with("_sortColumns", "name; drop table customers");
    let err = CrudService::filter(&customers, &exec, &bad_sort).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert!(exec.calls().is_empty());

    let criteria = FieldValues::new()
        .with("name", "a%b")
        .with("nameOperator", "~")
        .with("_sortColumns", "name desc");
    CrudService::filter(&customers, &exec, &criteria).await.unwrap();
    let call = exec.last();
    assert!(
        call.sql.ends_with("WHERE name LIKE ? ESCAPE '!' ORDER BY name DESC"),
        "{}",
        call.sql
    );
    assert_eq!(call.params, vec![Value::text("%a!%b%")]);
}

#[tokio::test]
async fn test_encrypted_field_is_decrypted_on_read() {
    let s = records();
    let orders = record(&s, "orders");
    let exec = RecordingExecutor::new();
    exec.reply(Reply::Rows(vec![vec![
        Value::Integer(1),
        Value::text("A1"),
        Value::text(crypt::encrypt("hush")),
        stamp(),
        Value::Unknown(ValueType::Text),
        Value::Unknown(ValueType::Text),
    ]]));
    let mut out = orders.new_sheet(true);
    let key = FieldValues::new().with("id", 1i64);
    CrudService::read_one(&orders, &exec, &key, out.as_mut()).await.unwrap();
    assert_eq!(out.get_value("secret"), Some(&Value::text("hush")));
    assert_eq!(out.get_value("code"), Some(&Value::text("A1")));
}

#[tokio::test]
async fn test_save_with_parent_copies_the_parent_key() {
    let s = records();
    let lines = record(&s, "lines");
    let exec = RecordingExecutor::new();
    let mut sheet = MultiRowsSheet::from_rows(
        vec!["lineNo".into(), "qty".into()],
        vec![ValueType::Integer, ValueType::Integer],
        vec![
            vec![Value::Integer(1), Value::Integer(10)],
            vec![Value::Integer(2), Value::Integer(20)],
        ],
    )
    .unwrap();

    let no_parent = FieldValues::new();
    let n = CrudService::save_with_parent(&lines, &exec, &mut sheet, &no_parent, &user())
        .await
        .unwrap();
    assert_eq!(n, 0);
    assert!(exec.calls().is_empty());

    let parent = FieldValues::new().with("id", 5i64);
    let n = CrudService::save_with_parent(&lines, &exec, &mut sheet, &parent, &user())
        .await
        .unwrap();
    assert_eq!(n, 2);
    let calls = exec.calls();
    // an existence probe, then an insert, per row
    assert_eq!(calls.len(), 4);
    assert!(calls[1].sql.starts_with("INSERT INTO lines"));
    assert_eq!(calls[3].params, vec![Value::Integer(5), Value::Integer(2), Value::Integer(20)]);
    assert_eq!(sheet.column_value("orderId", 1), Some(&Value::Integer(5)));

    let batches = record(&s, "batches");
    let err = CrudService::save_with_parent(&batches, &exec, &mut sheet, &parent, &user())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoParentKey(_)));
}

#[tokio::test]
async fn test_save_with_children_follows_the_buckets() {
    let s = records();
    let batches = record(&s, "batches");
    let lines = record(&s, "lines");
    let exec = RecordingExecutor::new();
    let mut parents = MultiRowsSheet::from_rows(
        vec!["id".into(), "label".into(), "_saveAction".into()],
        vec![ValueType::Integer, ValueType::Text, ValueType::Text],
        (1..=3)
            .map(|i| vec![Value::Integer(i), Value::text("b"), Value::text("modify")])
            .collect(),
    )
    .unwrap();
    let mut rows = Vec::new();
    for (parent, count) in [(1, 3), (3, 4)] {
        for n in 0..count {
            rows.push(vec![Value::Integer(parent), Value::Integer(n), Value::Integer(1)]);
        }
    }
    let children = MultiRowsSheet::from_rows(
        vec!["orderId".into(), "lineNo".into(), "qty".into()],
        vec![ValueType::Integer; 3],
        rows,
    )
    .unwrap();

    let actions = CrudService::save_with_children(&batches, &lines, &exec, &mut parents, &children, &user())
        .await
        .unwrap();
    assert_eq!(actions, vec![SaveActionType::Modify; 3]);
    let inserts: Vec<i64> = exec
        .calls()
        .into_iter()
        .filter(|c| c.sql.starts_with("INSERT INTO lines"))
        .filter_map(|c| c.params[0].as_i64())
        .collect();
    assert_eq!(inserts.iter().filter(|p| **p == 1).count(), 3);
    assert_eq!(inserts.iter().filter(|p| **p == 2).count(), 0);
    assert_eq!(inserts.iter().filter(|p| **p == 3).count(), 4);
}

#[tokio::test]
async fn test_delete_and_filter_for_parent() {
    let s = records();
    let lines = record(&s, "lines");
    let exec = RecordingExecutor::new();
    let parent = FieldValues::new().with("id", 9i64);
    CrudService::delete_with_parent(&lines, &exec, &parent).await.unwrap();
    let call = exec.last();
    assert_eq!(call.sql, "DELETE FROM lines WHERE orderId=?");
    assert_eq!(call.params, vec![Value::Integer(9)]);

    let parents = MultiRowsSheet::from_rows(
        vec!["id".into()],
        vec![ValueType::Integer],
        vec![
            vec![Value::Integer(1)],
            vec![Value::Unknown(ValueType::Integer)],
            vec![Value::Integer(3)],
        ],
    )
    .unwrap();
    CrudService::filter_for_parents(&lines, &exec, &parents).await.unwrap();
    let call = exec.last();
    assert!(call.sql.ends_with("WHERE orderId IN (?,?)"), "{}", call.sql);
    assert_eq!(call.params, vec![Value::Integer(1), Value::Integer(3)]);
}

#[tokio::test]
async fn test_read_only_and_keyless_records() {
    let s = schema(
        r#"{ "records": [
            { "name": "v", "record_type": "view", "fields": [
                { "name": "id", "field_type": "PRIMARY_KEY", "data_type": "integer" } ] },
            { "name": "log", "fields": [ { "name": "msg", "data_type": "text" } ] }
        ] }"#,
    );
    let exec = RecordingExecutor::new();
    let mut row = FieldValues::new().with("id", 1i64);
    let err = CrudService::save_one(&record(&s, "v"), &exec, &mut row, &user(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotWritable(_)));
    let err = CrudService::update_one(&record(&s, "log"), &exec, &row, &user(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoPrimaryKey(_)));
    assert!(exec.calls().is_empty());
}

#[tokio::test]
async fn test_list_and_suggest() {
    let s = records();
    let customers = record(&s, "customers");
    let exec = RecordingExecutor::new();
    exec.reply(Reply::Rows(vec![vec![Value::text("c1"), Value::text("Ann")]]));
    let list = CrudService::list(&customers, &exec, None).await.unwrap().unwrap();
    assert_eq!(list.column_names(), &["id".to_string(), "value".to_string()]);
    assert_eq!(list.len(), 1);
    assert_eq!(exec.last().sql, "SELECT code id, name value FROM customers");

    CrudService::suggest(&customers, &exec, "a_", true).await.unwrap();
    let call = exec.last();
    assert_eq!(
        call.sql,
        "SELECT code \"code\", name \"name\" FROM customers WHERE name LIKE ? ESCAPE '!'"
    );
    assert_eq!(call.params, vec![Value::text("a!_%")]);
}

#[tokio::test]
async fn test_unlinked_children_are_not_shared_by_new_parents() {
    let s = records();
    let orders = record(&s, "orders");
    let lines = record(&s, "lines");
    let exec = RecordingExecutor::new();
    exec.reply(Reply::Keys(1, vec![10]));
    exec.reply(Reply::Keys(1, vec![11]));
    let mut parents = MultiRowsSheet::from_rows(
        vec!["id".into(), "code".into()],
        vec![ValueType::Integer, ValueType::Text],
        vec![
            vec![Value::Unknown(ValueType::Integer), Value::text("A")],
            vec![Value::Unknown(ValueType::Integer), Value::text("B")],
        ],
    )
    .unwrap();
    let children = MultiRowsSheet::from_rows(
        vec!["orderId".into(), "lineNo".into(), "qty".into()],
        vec![ValueType::Integer; 3],
        vec![
            vec![Value::Unknown(ValueType::Integer), Value::Integer(1), Value::Integer(1)],
            vec![Value::Unknown(ValueType::Integer), Value::Integer(2), Value::Integer(1)],
        ],
    )
    .unwrap();

    let actions = CrudService::save_with_children(&orders, &lines, &exec, &mut parents, &children, &user())
        .await
        .unwrap();
    assert_eq!(actions, vec![SaveActionType::Add; 2]);
    assert_eq!(
        parents.column_values("id").unwrap(),
        vec![Value::Integer(10), Value::Integer(11)]
    );
    let calls = exec.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.sql.starts_with("INSERT INTO orders")));
}

#[tokio::test]
async fn test_batch_update_conflict_rolls_back() {
    let s = records();
    let orders = record(&s, "orders");
    let exec = RecordingExecutor::new();
    let sheet = MultiRowsSheet::from_rows(
        vec!["id".into(), "code".into(), "modifiedAt".into()],
        vec![ValueType::Integer, ValueType::Text, ValueType::Timestamp],
        (1..=3).map(|i| vec![Value::Integer(i), Value::text("c"), stamp()]).collect(),
    )
    .unwrap();

    exec.reply(Reply::Counts(vec![1, 0, 1]));
    let err = CrudService::update(&orders, &exec, &sheet, &user(), false).await.unwrap_err();
    assert!(err.is_conflict(), "{:?}", err);
    assert_eq!(exec.rollbacks(), 1);

    exec.reply(Reply::Counts(vec![1, 0, 1]));
    let err = CrudService::delete(&orders, &exec, &sheet, false).await.unwrap_err();
    assert!(err.is_conflict(), "{:?}", err);
    assert_eq!(exec.rollbacks(), 2);

    // rows of untracked records may miss without undoing the rest
    let batches = record(&s, "batches");
    let plain = MultiRowsSheet::from_rows(
        vec!["id".into(), "label".into()],
        vec![ValueType::Integer, ValueType::Text],
        (1..=2).map(|i| vec![Value::Integer(i), Value::text("b")]).collect(),
    )
    .unwrap();
    exec.reply(Reply::Counts(vec![1, 0]));
    let n = CrudService::update(&batches, &exec, &plain, &user(), false).await.unwrap();
    assert_eq!(n, 1);
    assert_eq!(exec.rollbacks(), 2);
}

#[tokio::test]
async fn test_list_and_suggest_decrypt_their_output() {
    let s = schema(
        r#"{ "records": [ {
            "name": "people",
            "list_field_name": "secret",
            "suggestion_key_name": "code",
            "suggestion_output_names": ["code", "secret"],
            "fields": [
                { "name": "code", "field_type": "PRIMARY_KEY", "data_type": "text" },
                { "name": "secret", "data_type": "text", "encrypted": true }
            ]
        } ] }"#,
    );
    let people = record(&s, "people");
    let exec = RecordingExecutor::new();
    let hidden = Value::text(crypt::encrypt("hush"));

    exec.reply(Reply::Rows(vec![vec![Value::text("p1"), hidden.clone()]]));
    let list = CrudService::list(&people, &exec, None).await.unwrap().unwrap();
    assert_eq!(list.column_value("id", 0), Some(&Value::text("p1")));
    assert_eq!(list.column_value("value", 0), Some(&Value::text("hush")));

    exec.reply(Reply::Rows(vec![vec![Value::text("p1"), hidden]]));
    let found = CrudService::suggest(&people, &exec, "p", true).await.unwrap();
    assert_eq!(found.column_value("code", 0), Some(&Value::text("p1")));
    assert_eq!(found.column_value("secret", 0), Some(&Value::text("hush")));
}
