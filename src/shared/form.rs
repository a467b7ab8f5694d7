//! Form schema and flattened wire keys
//!
//! Records are sent to the backend as flat key/value forms. Nesting is
//! encoded in the key: `location.x`, `details[0].collectPart`,
//! `multimedia_[1].url`. Each record type declares its mapping once with
//! [`form_fields!`] inside a [`FormSchema`] impl, so a renamed struct field is
//! a compile error rather than a silently missing form key.
//!
//! Value formatting (dates in particular) happens here and nowhere else.

use crate::shared::media::Media;
use crate::shared::record::Coordinate;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A scalar form value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FormValue {
    /// String form used on the wire
    pub fn to_wire(&self) -> String {
        match self {
            FormValue::Bool(b) => b.to_string(),
            FormValue::Integer(i) => i.to_string(),
            FormValue::Float(f) => f.to_string(),
            FormValue::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Text(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        FormValue::Text(value)
    }
}

impl From<i64> for FormValue {
    fn from(value: i64) -> Self {
        FormValue::Integer(value)
    }
}

impl From<f64> for FormValue {
    fn from(value: f64) -> Self {
        FormValue::Float(value)
    }
}

impl From<bool> for FormValue {
    fn from(value: bool) -> Self {
        FormValue::Bool(value)
    }
}

/// A local file to attach as a multipart part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Part name, equal to the flattened key (`multimedia[0]`)
    pub name: String,
    /// Filesystem path on the device
    pub path: PathBuf,
}

/// Flattened record ready for transmission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub params: BTreeMap<String, FormValue>,
    pub files: Vec<FilePart>,
}

impl Payload {
    /// Whether the multipart path must be used
    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    /// Params as wire strings, in key order
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(key, value)| (key.clone(), value.to_wire()))
            .collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FormValue>) {
        self.params.insert(key.into(), value.into());
    }
}

/// A typed value that knows how to appear in a form
///
/// Returns `None` when the value should be left out entirely.
pub trait FormField {
    fn form_value(&self) -> Option<FormValue>;
}

impl FormField for String {
    fn form_value(&self) -> Option<FormValue> {
        if self.trim().is_empty() {
            None
        } else {
            Some(FormValue::Text(self.clone()))
        }
    }
}

impl FormField for i64 {
    fn form_value(&self) -> Option<FormValue> {
        Some(FormValue::Integer(*self))
    }
}

impl FormField for f64 {
    fn form_value(&self) -> Option<FormValue> {
        self.is_finite().then_some(FormValue::Float(*self))
    }
}

impl FormField for bool {
    fn form_value(&self) -> Option<FormValue> {
        Some(FormValue::Bool(*self))
    }
}

impl FormField for NaiveDate {
    fn form_value(&self) -> Option<FormValue> {
        Some(FormValue::Text(self.format("%Y-%m-%d").to_string()))
    }
}

impl FormField for DateTime<Utc> {
    fn form_value(&self) -> Option<FormValue> {
        Some(FormValue::Text(
            self.to_rfc3339_opts(SecondsFormat::Millis, true),
        ))
    }
}

impl<T: FormField> FormField for Option<T> {
    fn form_value(&self) -> Option<FormValue> {
        self.as_ref().and_then(FormField::form_value)
    }
}

/// Declarative mapping from a record type to its form keys
pub trait FormSchema {
    fn write_form(&self, writer: &mut FormWriter<'_>);
}

/// Writes flattened keys into a [`Payload`] under an optional prefix
pub struct FormWriter<'a> {
    payload: &'a mut Payload,
    prefix: String,
}

impl<'a> FormWriter<'a> {
    pub fn new(payload: &'a mut Payload) -> Self {
        Self {
            payload,
            prefix: String::new(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Scalar field; skipped when empty
    pub fn field<V: FormField + ?Sized>(&mut self, name: &str, value: &V) {
        if let Some(value) = value.form_value() {
            let key = self.key(name);
            self.payload.params.insert(key, value);
        }
    }

    /// Coordinate pair as `name.x` / `name.y`
    pub fn coordinate(&mut self, name: &str, value: Option<&Coordinate>) {
        if let Some(coordinate) = value {
            self.field(&format!("{}.x", name), &coordinate.x);
            self.field(&format!("{}.y", name), &coordinate.y);
        }
    }

    /// Media list split into file parts (`name[j]`) and retained remote
    /// entries (`retained_name[i].id`, `.url`, ...)
    ///
    /// Local and remote entries are indexed independently, each from zero.
    pub fn media(&mut self, name: &str, retained_name: &str, items: &[Media]) {
        let mut local_index = 0;
        let mut remote_index = 0;
        for item in items {
            match item {
                Media::Local(local) => {
                    let part = self.key(&format!("{}[{}]", name, local_index));
                    self.payload.files.push(FilePart {
                        name: part,
                        path: local.fs_path(),
                    });
                    local_index += 1;
                }
                Media::Remote(remote) => {
                    for (sub, value) in remote.fields() {
                        let key = self.key(&format!("{}[{}].{}", retained_name, remote_index, sub));
                        self.payload.params.insert(key, FormValue::Text(value));
                    }
                    remote_index += 1;
                }
            }
        }
    }

    /// Repeated sub-records as `name[i].field`
    pub fn nested<T: FormSchema>(&mut self, name: &str, items: &[T]) {
        for (index, item) in items.iter().enumerate() {
            let mut child = FormWriter {
                payload: &mut *self.payload,
                prefix: format!("{}{}[{}].", self.prefix, name, index),
            };
            item.write_form(&mut child);
        }
    }
}

/// Map record fields to form keys in one table
///
/// ```ignore
/// form_fields!(writer, self, {
///     "treeSpecies" => tree_species,
///     "estimatedAge" => estimated_age,
/// });
/// ```
#[macro_export]
macro_rules! form_fields {
    ($writer:expr, $record:expr, { $($key:literal => $field:ident),* $(,)? }) => {
        $( $writer.field($key, &$record.$field); )*
    };
}
