//! Result sets and the values they carry

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use erpops_core::{OpsError, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use sqlx::postgres::types::{Oid, PgInterval};
use sqlx::postgres::{PgColumn, PgRow, PgTypeInfo, PgTypeKind, PgValueFormat, PgValueRef};
use sqlx::{Column as _, Row as _, TypeInfo as _, ValueRef as _};
use std::net::IpAddr;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Result column metadata
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Column {
    pub name: String,
    /// Database type name as reported by the server, e.g. `INT4`
    pub type_name: String,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A single cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact decimal text
    Numeric(String),
    Text(String),
    /// ISO-8601 date, time or timestamp
    Temporal(String),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    /// A value that has no sensible text form, shown as a placeholder
    Unrepresentable {
        type_name: String,
        detail: Option<String>,
    },
}

impl Value {
    pub fn unrepresentable(type_name: impl Into<String>, detail: Option<String>) -> Self {
        Self::Unrepresentable {
            type_name: type_name.into(),
            detail,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::Numeric(value) | Value::Text(value) | Value::Temporal(value) => {
                write!(f, "{}", value)
            }
            Value::Uuid(value) => write!(f, "{}", value),
            Value::Json(value) => write!(f, "{}", value),
            Value::Unrepresentable {
                type_name,
                detail: Some(detail),
            } => write!(f, "<{}: {}>", type_name, detail),
            Value::Unrepresentable { type_name, .. } => write!(f, "<{}>", type_name),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Int(value) => serializer.serialize_i64(*value),
            Value::Float(value) => serializer.serialize_f64(*value),
            // Kept as a string so no precision is lost in JSON consumers.
            Value::Numeric(value) | Value::Text(value) | Value::Temporal(value) => {
                serializer.serialize_str(value)
            }
            Value::Uuid(value) => serializer.collect_str(value),
            Value::Json(value) => value.serialize(serializer),
            Value::Unrepresentable { .. } => serializer.collect_str(self),
        }
    }
}

/// One row of values, positionally aligned with the result columns
#[derive(Debug, Clone, PartialEq)]
pub struct Row(Vec<Value>);

impl Row {
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

/// Ordered columns and rows produced by one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row; its width must match the column count
    pub fn push_row(&mut self, values: Vec<Value>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(OpsError::internal(format!(
                "row has {} values but result has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(Row(values));
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Value of `column` in row `row`
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).map(|row| &row.0[index])
    }

    /// Rows viewed as column-name keyed records
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |row| Record {
            columns: &self.columns,
            row,
        })
    }
}

/// A row paired with its column names; serializes as an object in column order
pub struct Record<'a> {
    columns: &'a [Column],
    row: &'a Row,
}

impl Record<'_> {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.name == column)
            .map(|index| &self.row.0[index])
    }
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.row.values()) {
            map.serialize_entry(&column.name, value)?;
        }
        map.end()
    }
}

pub(crate) fn columns_of(columns: &[PgColumn]) -> Vec<Column> {
    columns
        .iter()
        .map(|column| Column::new(column.name(), column.type_info().name()))
        .collect()
}

/// Decode every cell of `row`. Undecodable cells become placeholders.
pub(crate) fn decode_row(row: &PgRow) -> Vec<Value> {
    (0..row.len()).map(|index| decode_cell(row, index)).collect()
}

fn decode_cell(row: &PgRow, index: usize) -> Value {
    let raw = match row.try_get_raw(index) {
        Ok(raw) => raw,
        Err(e) => return Value::unrepresentable("unknown", Some(e.to_string())),
    };
    if raw.is_null() {
        return Value::Null;
    }
    let type_info = raw.type_info().into_owned();
    let type_name = type_info.name().to_string();
    let base = base_type(&type_info);

    // Domains decode as their base type; the driver's type check is bypassed.
    let decoded = if let PgTypeKind::Enum(_) = base.kind() {
        row.try_get_unchecked::<String, _>(index).map(Value::Text)
    } else {
        match base.name() {
            "BOOL" => row.try_get_unchecked::<bool, _>(index).map(Value::Bool),
            "INT2" => row.try_get_unchecked::<i16, _>(index).map(|v| Value::Int(v.into())),
            "INT4" => row.try_get_unchecked::<i32, _>(index).map(|v| Value::Int(v.into())),
            "INT8" => row.try_get_unchecked::<i64, _>(index).map(Value::Int),
            "OID" => row.try_get_unchecked::<Oid, _>(index).map(|v| Value::Int(v.0.into())),
            "FLOAT4" => row.try_get_unchecked::<f32, _>(index).map(|v| Value::Float(v.into())),
            "FLOAT8" => row.try_get_unchecked::<f64, _>(index).map(Value::Float),
            "NUMERIC" => {
                return match decode_numeric(raw) {
                    Ok(text) => Value::Numeric(text),
                    Err(e) => Value::unrepresentable("numeric", Some(e)),
                };
            }
            "INET" | "CIDR" => {
                return match decode_inet(raw) {
                    Ok(text) => Value::Text(text),
                    Err(e) => Value::unrepresentable(type_name.to_lowercase(), Some(e)),
                };
            }
            "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "CITEXT" | "UNKNOWN" => {
                row.try_get_unchecked::<String, _>(index).map(Value::Text)
            }
            "DATE" => row
                .try_get_unchecked::<NaiveDate, _>(index)
                .map(|v| Value::Temporal(v.to_string())),
            "TIME" => row
                .try_get_unchecked::<NaiveTime, _>(index)
                .map(|v| Value::Temporal(v.to_string())),
            "TIMESTAMP" => row
                .try_get_unchecked::<NaiveDateTime, _>(index)
                .map(|v| Value::Temporal(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
            "TIMESTAMPTZ" => row
                .try_get_unchecked::<DateTime<Utc>, _>(index)
                .map(|v| Value::Temporal(v.to_rfc3339())),
            "INTERVAL" => row
                .try_get_unchecked::<PgInterval, _>(index)
                .map(|v| Value::Text(format_interval(&v))),
            "UUID" => row.try_get_unchecked::<uuid::Uuid, _>(index).map(Value::Uuid),
            "JSON" | "JSONB" => row
                .try_get_unchecked::<serde_json::Value, _>(index)
                .map(Value::Json),
            "TEXT[]" | "VARCHAR[]" | "CHAR[]" | "NAME[]" => array::<Vec<Option<String>>>(row, index),
            "BOOL[]" => array::<Vec<Option<bool>>>(row, index),
            "INT2[]" => array::<Vec<Option<i16>>>(row, index),
            "INT4[]" => array::<Vec<Option<i32>>>(row, index),
            "INT8[]" => array::<Vec<Option<i64>>>(row, index),
            "FLOAT4[]" => array::<Vec<Option<f32>>>(row, index),
            "FLOAT8[]" => array::<Vec<Option<f64>>>(row, index),
            "BYTEA" => {
                return match row.try_get_unchecked::<Vec<u8>, _>(index) {
                    Ok(bytes) => Value::unrepresentable("bytea", Some(format!("{} bytes", bytes.len()))),
                    Err(_) => Value::unrepresentable("bytea", None),
                };
            }
            _ => row.try_get::<String, _>(index).map(Value::Text),
        }
    };

    decoded.unwrap_or_else(|e| {
        tracing::debug!(column = index, type_name = %type_name, error = %e, "Value not decodable");
        Value::unrepresentable(type_name.to_lowercase(), None)
    })
}

/// Follow domains down to the type they are defined over
fn base_type(type_info: &PgTypeInfo) -> PgTypeInfo {
    let mut current = type_info.clone();
    loop {
        let next = match current.kind() {
            PgTypeKind::Domain(base) => base.clone(),
            _ => return current,
        };
        current = next;
    }
}

/// Decode a one-dimensional array as a JSON array
fn array<T>(row: &PgRow, index: usize) -> std::result::Result<Value, sqlx::Error>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres> + serde::Serialize,
{
    let items = row.try_get_unchecked::<T, _>(index)?;
    serde_json::to_value(items)
        .map(Value::Json)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// Render an interval the way PostgreSQL's default `IntervalStyle` does
pub(crate) fn format_interval(interval: &PgInterval) -> String {
    let plural = |count: i64, unit: &str| {
        if count == 1 {
            format!("{} {}", count, unit)
        } else {
            format!("{} {}s", count, unit)
        }
    };

    let mut parts = Vec::new();
    let years = interval.months / 12;
    let months = interval.months % 12;
    if years != 0 {
        parts.push(plural(years.into(), "year"));
    }
    if months != 0 {
        parts.push(plural(months.into(), "mon"));
    }
    if interval.days != 0 {
        parts.push(plural(interval.days.into(), "day"));
    }
    if interval.microseconds != 0 || parts.is_empty() {
        let sign = if interval.microseconds < 0 { "-" } else { "" };
        let micros = interval.microseconds.unsigned_abs();
        let seconds = micros / 1_000_000;
        let fraction = micros % 1_000_000;
        let mut time = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            seconds / 3600,
            (seconds / 60) % 60,
            seconds % 60
        );
        if fraction != 0 {
            time.push('.');
            time.push_str(format!("{:06}", fraction).trim_end_matches('0'));
        }
        parts.push(time);
    }
    parts.join(" ")
}

fn decode_inet(raw: PgValueRef<'_>) -> std::result::Result<String, String> {
    match raw.format() {
        PgValueFormat::Text => raw.as_str().map(str::to_string).map_err(|e| e.to_string()),
        PgValueFormat::Binary => raw
            .as_bytes()
            .map_err(|e| e.to_string())
            .and_then(inet_from_binary),
    }
}

/// Render the binary `inet`/`cidr` wire form.
///
/// Layout: family (2 = IPv4, 3 = IPv6), prefix bits, cidr flag, address
/// length, then the address bytes.
pub(crate) fn inet_from_binary(bytes: &[u8]) -> std::result::Result<String, String> {
    let [family, bits, is_cidr, length, address @ ..] = bytes else {
        return Err(format!("inet value too short ({} bytes)", bytes.len()));
    };
    if address.len() != usize::from(*length) {
        return Err(format!("inet address needs {} bytes, got {}", length, address.len()));
    }
    let (ip, full_bits) = match (family, address) {
        (2, [a, b, c, d]) => (IpAddr::from([*a, *b, *c, *d]), 32),
        (3, address) if address.len() == 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(address);
            (IpAddr::from(octets), 128)
        }
        _ => return Err(format!("unsupported inet family {}", family)),
    };
    if *is_cidr != 0 || *bits != full_bits {
        Ok(format!("{}/{}", ip, bits))
    } else {
        Ok(ip.to_string())
    }
}

fn decode_numeric(raw: PgValueRef<'_>) -> std::result::Result<String, String> {
    match raw.format() {
        PgValueFormat::Text => raw.as_str().map(str::to_string).map_err(|e| e.to_string()),
        PgValueFormat::Binary => raw
            .as_bytes()
            .map_err(|e| e.to_string())
            .and_then(numeric_from_binary),
    }
}

/// Render the binary `NUMERIC` wire form as exact decimal text.
///
/// Layout: ndigits, weight, sign, dscale (all big-endian 16 bit) followed
/// by `ndigits` base-10000 digits; `weight` is the power of 10000 of the
/// first digit.
pub(crate) fn numeric_from_binary(bytes: &[u8]) -> std::result::Result<String, String> {
    if bytes.len() < 8 {
        return Err(format!("numeric header too short ({} bytes)", bytes.len()));
    }
    let read = |at: usize| u16::from_be_bytes([bytes[at], bytes[at + 1]]);
    let ndigits = read(0) as usize;
    let weight = i32::from(read(2) as i16);
    let sign = read(4);
    let dscale = read(6) as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign 0x{:04x}", other)),
    }
    if bytes.len() != 8 + ndigits * 2 {
        return Err(format!(
            "numeric with {} digits needs {} bytes, got {}",
            ndigits,
            8 + ndigits * 2,
            bytes.len()
        ));
    }

    let digits: Vec<u16> = (0..ndigits).map(|i| read(8 + i * 2)).collect();
    let digit_at = |position: i32| -> u16 {
        usize::try_from(position)
            .ok()
            .and_then(|position| digits.get(position).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        for position in 0..=weight {
            if position == 0 {
                text.push_str(&digit_at(position).to_string());
            } else {
                text.push_str(&format!("{:04}", digit_at(position)));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut position = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit_at(position)));
            position += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }

    Ok(text)
}
