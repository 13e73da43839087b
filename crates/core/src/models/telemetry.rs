use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// 一台设备在某一时刻的一次属性上报
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub device_id: String,
    pub properties: BTreeMap<String, Value>,
    /// 事件时间，Unix 秒
    pub timestamp: i64,
}

impl TelemetryPoint {
    pub fn new(device_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            device_id: device_id.into(),
            properties: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn with_property(mut self, code: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(code.into(), value.into());
        self
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.saturating_mul(1000)
    }
}

/// 物模型声明的属性值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Numeric,
    Boolean,
    Text,
}

impl ValueKind {
    /// 解析物模型中的类型名称
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" | "long" | "float" | "double" | "number" | "numeric" | "decimal" => {
                Some(ValueKind::Numeric)
            }
            "bool" | "boolean" => Some(ValueKind::Boolean),
            "text" | "string" | "enum" | "date" => Some(ValueKind::Text),
            _ => None,
        }
    }

    /// 物模型未声明时根据上报值推断
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Number(_) => ValueKind::Numeric,
            Value::Bool(_) => ValueKind::Boolean,
            _ => ValueKind::Text,
        }
    }
}

/// 物模型中的一个属性声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub code: String,
    pub kind: ValueKind,
    /// 文本属性的最大长度
    pub length: Option<u32>,
}

impl PropertySpec {
    pub fn new(code: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            code: code.into(),
            kind,
            length: None,
        }
    }

    pub fn text(code: impl Into<String>, length: u32) -> Self {
        Self {
            code: code.into(),
            kind: ValueKind::Text,
            length: Some(length),
        }
    }
}

/// 时序库列类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Double,
    Bool,
    NChar(u32),
    Timestamp,
}

impl ColumnType {
    pub fn from_spec(spec: &PropertySpec, default_text_length: u32) -> Self {
        match spec.kind {
            ValueKind::Numeric => ColumnType::Double,
            ValueKind::Boolean => ColumnType::Bool,
            ValueKind::Text => ColumnType::NChar(spec.length.unwrap_or(default_text_length)),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Double => f.write_str("DOUBLE"),
            ColumnType::Bool => f.write_str("BOOL"),
            ColumnType::NChar(len) => write!(f, "NCHAR({len})"),
            ColumnType::Timestamp => f.write_str("TIMESTAMP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// 一张子表的一批待写入行，列为该批次所有点的属性并集
#[derive(Debug, Clone, PartialEq)]
pub struct SubTableBatch {
    pub stable: String,
    pub table: String,
    pub device_id: String,
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub ts_millis: i64,
    /// 与 `SubTableBatch::columns` 一一对应，缺失的属性写 NULL
    pub values: Vec<Option<Value>>,
}

/// 将任意编码转为时序库合法的标识符
pub fn sanitize_identifier(raw: &str) -> String {
    let mut ident: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident.to_ascii_lowercase()
}

/// 设备子表名
///
/// 小写字母和数字原样保留，其余每个字节编码为 `_xx`（两位十六进制），
/// 不同的设备ID总是得到不同的表名。
pub fn device_table_name(device_id: &str) -> String {
    let mut table = String::with_capacity(device_id.len() + 2);
    table.push_str("d_");
    for byte in device_id.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() {
            table.push(byte as char);
        } else {
            table.push_str(&format!("_{byte:02x}"));
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_kind_parse_and_infer() {
        assert_eq!(ValueKind::parse("float"), Some(ValueKind::Numeric));
        assert_eq!(ValueKind::parse("BOOL"), Some(ValueKind::Boolean));
        assert_eq!(ValueKind::parse("string"), Some(ValueKind::Text));
        assert_eq!(ValueKind::parse("struct"), None);

        assert_eq!(ValueKind::infer(&json!(1.5)), ValueKind::Numeric);
        assert_eq!(ValueKind::infer(&json!(true)), ValueKind::Boolean);
        assert_eq!(ValueKind::infer(&json!("on")), ValueKind::Text);
    }

    #[test]
    fn test_column_type_from_spec() {
        let spec = PropertySpec::text("mode", 16);
        assert_eq!(ColumnType::from_spec(&spec, 64).to_string(), "NCHAR(16)");

        let spec = PropertySpec::new("label", ValueKind::Text);
        assert_eq!(ColumnType::from_spec(&spec, 64), ColumnType::NChar(64));

        let spec = PropertySpec::new("temp", ValueKind::Numeric);
        assert_eq!(ColumnType::from_spec(&spec, 64).to_string(), "DOUBLE");
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("Temp-1"), "temp_1");
        assert_eq!(sanitize_identifier("1abc"), "_1abc");
        assert_eq!(sanitize_identifier("a b;c"), "a_b_c");
    }

    #[test]
    fn test_device_table_name_is_injective() {
        assert_eq!(device_table_name("m1"), "d_m1");
        assert_eq!(device_table_name("GW-01:dev"), "d__47_57_2d01_3adev");

        let ids = ["Dev-1", "dev_1", "dev.1", "dev-1", "dev1", "dev_2d1", "设备1"];
        let tables: std::collections::HashSet<String> =
            ids.iter().map(|id| device_table_name(id)).collect();
        assert_eq!(tables.len(), ids.len());

        for table in &tables {
            assert_eq!(&sanitize_identifier(table), table);
        }
    }
}
