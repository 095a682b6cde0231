//! Extender attribute set shared by annotations and metadata
//!
//! An extender is a named, typed value attached to an entity. Annotations and
//! metadata are both extenders; they differ only in where they are stored and
//! in what deleting them cascades to.

use chrono::{DateTime, TimeZone, Utc};
use margin_core::{validation_error, Guid, MarginError, MarginResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Row id of an annotation or metadata record. `0` means "not saved yet".
pub type ExtenderId = i64;

/// Which family of extender a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtenderKind {
    Annotation,
    Metadata,
}

impl ExtenderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtenderKind::Annotation => "annotation",
            ExtenderKind::Metadata => "metadata",
        }
    }
}

impl fmt::Display for ExtenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the stored string value should be read back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Integer,
    #[default]
    #[serde(alias = "string")]
    Text,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Integer => "integer",
            ValueType::Text => "text",
        }
    }

    /// Integer when the whole value parses as one, text otherwise
    pub fn detect(value: &str) -> Self {
        if value.trim() == value && value.parse::<i64>().is_ok() {
            ValueType::Integer
        } else {
            ValueType::Text
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" => Ok(ValueType::Integer),
            "text" | "string" => Ok(ValueType::Text),
            _ => Err(format!("Unknown value type: {}", s)),
        }
    }
}

/// A value together with its type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtenderValue {
    Integer(i64),
    Text(String),
}

impl ExtenderValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ExtenderValue::Integer(_) => ValueType::Integer,
            ExtenderValue::Text(_) => ValueType::Text,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ExtenderValue::Integer(n) => Some(*n),
            ExtenderValue::Text(_) => None,
        }
    }
}

impl fmt::Display for ExtenderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtenderValue::Integer(n) => write!(f, "{}", n),
            ExtenderValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ExtenderValue {
    fn from(n: i64) -> Self {
        ExtenderValue::Integer(n)
    }
}

impl From<i32> for ExtenderValue {
    fn from(n: i32) -> Self {
        ExtenderValue::Integer(n.into())
    }
}

impl From<&str> for ExtenderValue {
    fn from(s: &str) -> Self {
        ExtenderValue::Text(s.to_string())
    }
}

impl From<String> for ExtenderValue {
    fn from(s: String) -> Self {
        ExtenderValue::Text(s)
    }
}

/// Read permission attached to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum AccessLevel {
    Private,
    LoggedIn,
    Public,
    Friends,
    /// A custom access collection
    Collection(i64),
}

impl AccessLevel {
    pub fn id(&self) -> i64 {
        match self {
            AccessLevel::Private => 0,
            AccessLevel::LoggedIn => 1,
            AccessLevel::Public => 2,
            AccessLevel::Friends => -2,
            AccessLevel::Collection(id) => *id,
        }
    }
}

impl Default for AccessLevel {
    fn default() -> Self {
        AccessLevel::Private
    }
}

impl From<i64> for AccessLevel {
    fn from(id: i64) -> Self {
        match id {
            0 => AccessLevel::Private,
            1 => AccessLevel::LoggedIn,
            2 => AccessLevel::Public,
            -2 => AccessLevel::Friends,
            other => AccessLevel::Collection(other),
        }
    }
}

impl From<AccessLevel> for i64 {
    fn from(level: AccessLevel) -> Self {
        level.id()
    }
}

/// The attribute set of one annotation or metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtenderAttributes {
    pub id: ExtenderId,
    pub entity_guid: Guid,
    pub owner_guid: Guid,
    pub name: String,
    pub value: String,
    pub value_type: ValueType,
    pub access: AccessLevel,
    pub time_created: DateTime<Utc>,
    pub enabled: bool,
    /// Stored columns without a dedicated field. Loaded for reading only;
    /// `save` never writes them back.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for ExtenderAttributes {
    fn default() -> Self {
        Self {
            id: 0,
            entity_guid: 0,
            owner_guid: 0,
            name: String::new(),
            value: String::new(),
            value_type: ValueType::Text,
            access: AccessLevel::Private,
            time_created: Utc::now(),
            enabled: true,
            extra: BTreeMap::new(),
        }
    }
}

impl ExtenderAttributes {
    /// Set the value and take its type from the value itself
    pub fn set_value(&mut self, value: impl Into<ExtenderValue>) {
        let value = value.into();
        self.value_type = value.value_type();
        self.value = value.to_string();
    }

    /// The stored value read back according to its type
    ///
    /// An integer-typed value that no longer parses is returned as text.
    pub fn typed_value(&self) -> ExtenderValue {
        match self.value_type {
            ValueType::Integer => match self.value.parse() {
                Ok(n) => ExtenderValue::Integer(n),
                Err(_) => ExtenderValue::Text(self.value.clone()),
            },
            ValueType::Text => ExtenderValue::Text(self.value.clone()),
        }
    }

    pub fn fields(&self) -> ExtenderFields {
        ExtenderFields {
            entity_guid: self.entity_guid,
            name: self.name.clone(),
            value: self.value.clone(),
            value_type: self.value_type,
            owner_guid: self.owner_guid,
            access: self.access,
            time_created: self.time_created,
        }
    }

    pub(crate) fn validate_for_insert(&self, component: &str) -> MarginResult<()> {
        if self.entity_guid <= 0 {
            return Err(validation_error!(
                "an extender must be attached to an entity",
                "entity_guid",
                component
            ));
        }
        if self.name.trim().is_empty() {
            return Err(validation_error!(
                "an extender needs a name",
                "name",
                component
            ));
        }
        Ok(())
    }
}

/// Columns written by inserts and updates
///
/// Updates never move a record to another entity, so `entity_guid` and
/// `time_created` only matter on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtenderFields {
    pub entity_guid: Guid,
    pub name: String,
    pub value: String,
    pub value_type: ValueType,
    pub owner_guid: Guid,
    pub access: AccessLevel,
    pub time_created: DateTime<Utc>,
}

/// Persisted form of an extender row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtenderRecord {
    pub id: ExtenderId,
    pub entity_guid: Guid,
    pub owner_guid: Guid,
    pub name: String,
    pub value: String,
    pub value_type: String,
    pub access_id: i64,
    /// Unix seconds
    pub time_created: i64,
    /// `yes` or `no`
    pub enabled: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ExtenderRecord {
    pub fn from_fields(id: ExtenderId, fields: &ExtenderFields) -> Self {
        Self {
            id,
            entity_guid: fields.entity_guid,
            owner_guid: fields.owner_guid,
            name: fields.name.clone(),
            value: fields.value.clone(),
            value_type: fields.value_type.as_str().to_string(),
            access_id: fields.access.id(),
            time_created: fields.time_created.timestamp(),
            enabled: "yes".to_string(),
            extra: BTreeMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled == "yes"
    }
}

impl TryFrom<ExtenderRecord> for ExtenderAttributes {
    type Error = MarginError;

    fn try_from(record: ExtenderRecord) -> Result<Self, Self::Error> {
        let value_type = record
            .value_type
            .parse::<ValueType>()
            .map_err(|e| validation_error!(e, "value_type", "extender"))?;

        let enabled = match record.enabled.as_str() {
            "yes" => true,
            "no" => false,
            other => {
                return Err(validation_error!(
                    format!("enabled must be yes or no, got {}", other),
                    "enabled",
                    "extender"
                ))
            }
        };

        let time_created = Utc
            .timestamp_opt(record.time_created, 0)
            .single()
            .ok_or_else(|| validation_error!("time_created out of range", "time_created", "extender"))?;

        Ok(Self {
            id: record.id,
            entity_guid: record.entity_guid,
            owner_guid: record.owner_guid,
            name: record.name,
            value: record.value,
            value_type,
            access: AccessLevel::from(record.access_id),
            time_created,
            enabled,
            extra: record.extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_type_detection() {
        assert_eq!(ValueType::detect("5"), ValueType::Integer);
        assert_eq!(ValueType::detect("-12"), ValueType::Integer);
        assert_eq!(ValueType::detect("5 stars"), ValueType::Text);
        assert_eq!(ValueType::detect(" 5"), ValueType::Text);
        assert_eq!("string".parse::<ValueType>().unwrap(), ValueType::Text);
        assert!("float".parse::<ValueType>().is_err());
    }

    #[test]
    fn test_set_value_tracks_type() {
        let mut attributes = ExtenderAttributes::default();
        attributes.set_value(5);
        assert_eq!(attributes.value, "5");
        assert_eq!(attributes.value_type, ValueType::Integer);
        assert_eq!(attributes.typed_value(), ExtenderValue::Integer(5));

        attributes.set_value("great");
        assert_eq!(attributes.value_type, ValueType::Text);
        assert_eq!(attributes.typed_value().as_i64(), None);
    }

    #[test]
    fn test_corrupt_integer_reads_back_as_text() {
        let attributes = ExtenderAttributes {
            value: "five".to_string(),
            value_type: ValueType::Integer,
            ..ExtenderAttributes::default()
        };
        assert_eq!(
            attributes.typed_value(),
            ExtenderValue::Text("five".to_string())
        );
    }

    #[test]
    fn test_access_levels() {
        assert_eq!(AccessLevel::from(2), AccessLevel::Public);
        assert_eq!(AccessLevel::from(-2), AccessLevel::Friends);
        assert_eq!(AccessLevel::from(17), AccessLevel::Collection(17));
        assert_eq!(AccessLevel::Collection(17).id(), 17);
        assert_eq!(serde_json::to_value(AccessLevel::LoggedIn).unwrap(), json!(1));
    }

    #[test]
    fn test_record_with_unknown_columns_keeps_them() {
        let record: ExtenderRecord = serde_json::from_value(json!({
            "id": 3,
            "entity_guid": 42,
            "owner_guid": 7,
            "name": "rating",
            "value": "5",
            "value_type": "integer",
            "access_id": 2,
            "time_created": 1_700_000_000,
            "enabled": "yes",
            "river_visibility": "hidden"
        }))
        .unwrap();

        let attributes = ExtenderAttributes::try_from(record).unwrap();
        assert_eq!(attributes.id, 3);
        assert_eq!(attributes.access, AccessLevel::Public);
        assert_eq!(attributes.extra.get("river_visibility"), Some(&json!("hidden")));
    }

    #[test]
    fn test_record_with_bad_enabled_flag_rejected() {
        let mut record = ExtenderRecord::from_fields(1, &ExtenderAttributes::default().fields());
        record.enabled = "maybe".to_string();
        assert!(matches!(
            ExtenderAttributes::try_from(record),
            Err(MarginError::Validation { .. })
        ));
    }
}
