//! TDengine SQL 文本生成

use iothub_core::models::{sanitize_identifier, ColumnDef, ColumnType, SubTableBatch};
use serde_json::Value;
use std::fmt::Write;

/// 设备标签列
pub const DEVICE_TAG: &str = "device_id";
const DEVICE_TAG_TYPE: ColumnType = ColumnType::NChar(128);

pub fn describe(database: &str, stable: &str) -> String {
    format!("DESCRIBE {}.{}", database, sanitize_identifier(stable))
}

pub fn create_stable(database: &str, stable: &str, columns: &[ColumnDef]) -> String {
    let mut defs = vec![format!("ts {}", ColumnType::Timestamp)];
    defs.extend(
        columns
            .iter()
            .map(|c| format!("{} {}", sanitize_identifier(&c.name), c.column_type)),
    );
    format!(
        "CREATE STABLE IF NOT EXISTS {}.{} ({}) TAGS ({} {})",
        database,
        sanitize_identifier(stable),
        defs.join(", "),
        DEVICE_TAG,
        DEVICE_TAG_TYPE
    )
}

pub fn add_column(database: &str, stable: &str, column: &ColumnDef) -> String {
    format!(
        "ALTER STABLE {}.{} ADD COLUMN {} {}",
        database,
        sanitize_identifier(stable),
        sanitize_identifier(&column.name),
        column.column_type
    )
}

/// 多子表单语句写入，子表不存在时按超级表自动创建
pub fn insert(database: &str, batches: &[SubTableBatch]) -> Option<String> {
    let batches: Vec<&SubTableBatch> = batches.iter().filter(|b| !b.rows.is_empty()).collect();
    if batches.is_empty() {
        return None;
    }

    let mut sql = String::from("INSERT INTO");
    for batch in batches {
        let columns: Vec<String> = std::iter::once("ts".to_string())
            .chain(batch.columns.iter().map(|c| sanitize_identifier(c)))
            .collect();
        let _ = write!(
            sql,
            " {db}.{table} USING {db}.{stable} TAGS ({tag}) ({columns}) VALUES",
            db = database,
            table = sanitize_identifier(&batch.table),
            stable = sanitize_identifier(&batch.stable),
            tag = literal(&Value::String(batch.device_id.clone())),
            columns = columns.join(", "),
        );
        for row in &batch.rows {
            let values: Vec<String> = std::iter::once(row.ts_millis.to_string())
                .chain(row.values.iter().map(|v| match v {
                    Some(value) => literal(value),
                    None => "NULL".to_string(),
                }))
                .collect();
            let _ = write!(sql, " ({})", values.join(", "));
        }
    }
    Some(sql)
}

/// DESCRIBE 结果中的属性列：跳过首列时间戳与标签列
pub fn data_columns(rows: &[Vec<Value>]) -> Vec<String> {
    rows.iter()
        .skip(1)
        .filter(|row| {
            row.get(3)
                .and_then(Value::as_str)
                .map_or(true, |note| !note.eq_ignore_ascii_case("TAG"))
        })
        .filter_map(|row| row.first().and_then(Value::as_str).map(str::to_string))
        .collect()
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        other => quote(&other.to_string()),
    }
}

fn quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use iothub_core::models::TableRow;
    use serde_json::json;

    #[test]
    fn test_create_stable_and_add_column() {
        let columns = vec![
            ColumnDef::new("temp", ColumnType::Double),
            ColumnDef::new("mode", ColumnType::NChar(16)),
        ];
        assert_eq!(
            create_stable("iot", "Meter", &columns),
            "CREATE STABLE IF NOT EXISTS iot.meter (ts TIMESTAMP, temp DOUBLE, mode NCHAR(16)) TAGS (device_id NCHAR(128))"
        );
        assert_eq!(
            add_column("iot", "meter", &ColumnDef::new("on", ColumnType::Bool)),
            "ALTER STABLE iot.meter ADD COLUMN on BOOL"
        );
    }

    #[test]
    fn test_multi_table_insert() {
        let batches = vec![
            SubTableBatch {
                stable: "meter".into(),
                table: "d_dev1".into(),
                device_id: "dev1".into(),
                columns: vec!["temp".into(), "mode".into()],
                rows: vec![
                    TableRow {
                        ts_millis: 1000,
                        values: vec![Some(json!(21.5)), None],
                    },
                    TableRow {
                        ts_millis: 2000,
                        values: vec![Some(json!(22)), Some(json!("it's"))],
                    },
                ],
            },
            SubTableBatch {
                stable: "switch".into(),
                table: "d_dev2".into(),
                device_id: "dev2".into(),
                columns: vec!["on".into()],
                rows: vec![TableRow {
                    ts_millis: 1000,
                    values: vec![Some(json!(true))],
                }],
            },
        ];

        let sql = insert("iot", &batches).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO iot.d_dev1 USING iot.meter TAGS ('dev1') (ts, temp, mode) VALUES (1000, 21.5, NULL) (2000, 22, 'it\\'s') \
             iot.d_dev2 USING iot.switch TAGS ('dev2') (ts, on) VALUES (1000, true)"
        );
    }

    #[test]
    fn test_insert_skips_empty_batches() {
        let batch = SubTableBatch {
            stable: "meter".into(),
            table: "d_dev1".into(),
            device_id: "dev1".into(),
            columns: vec![],
            rows: vec![],
        };
        assert!(insert("iot", &[batch]).is_none());
    }

    #[test]
    fn test_data_columns_skip_ts_and_tags() {
        let rows = vec![
            vec![json!("ts"), json!("TIMESTAMP"), json!(8), json!("")],
            vec![json!("temp"), json!("DOUBLE"), json!(8), json!("")],
            vec![json!("mode"), json!("NCHAR"), json!(16), json!("")],
            vec![json!("device_id"), json!("NCHAR"), json!(128), json!("TAG")],
        ];
        assert_eq!(data_columns(&rows), vec!["temp", "mode"]);
    }
}
