//! What patched code calls back into at run time
//!
//! The spliced blocks only carry references to these callbacks. Given a
//! resolver they decide whether an override exists and what it says, and
//! [`OverrideCallbacks`] binds them to the stream evaluator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::il::{
    core::{FieldRef, MethodRef},
    exec::{ExecError, Runtime, Value},
};

/// `base + "_" + entity`, the lookup key of an override.
pub fn override_key(base: &str, entity: &str) -> String {
    format!("{base}_{entity}")
}

pub trait KeyResolver {
    fn resolve(&self, key: &str) -> Option<&str>;
}

/// Map-backed resolver, usually read from a JSON object of key/value strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StringTable(BTreeMap<String, String>);

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(src: &str) -> serde_json::Result<Self> {
        serde_json::from_str(src)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl KeyResolver for StringTable {
    fn resolve(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StringTable {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

pub fn check_for_named_string(resolver: &dyn KeyResolver, base: &str, entity: &str) -> bool {
    resolver.resolve(&override_key(base, entity)).is_some()
}

pub fn named_string<'r>(resolver: &'r dyn KeyResolver, base: &str, entity: &str) -> Option<&'r str> {
    resolver.resolve(&override_key(base, entity))
}

/// Decides whether tents may be pitched in a location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TentGate {
    manifest: String,
}

impl TentGate {
    pub fn new(manifest: impl Into<String>) -> Self {
        Self {
            manifest: manifest.into(),
        }
    }

    pub fn field_name(&self) -> String {
        format!("{}_UnsafeForTent", self.manifest)
    }

    /// Unsafe only when the location data says exactly `"True"`.
    pub fn is_unsafe(&self, custom_fields: Option<&BTreeMap<String, String>>) -> bool {
        custom_fields
            .and_then(|fields| fields.get(&self.field_name()))
            .is_some_and(|value| value == "True")
    }
}

/// Evaluator runtime serving the callbacks patched methods reference.
///
/// Entities are either a plain name string or an object with a `Name`
/// field; locations are objects whose `CustomFields` object holds strings.
/// Unknown keys loaded through `LoadString` come back as the key itself.
pub struct OverrideCallbacks<'r> {
    resolver: &'r dyn KeyResolver,
    gate: TentGate,
    pub messages: Vec<String>,
}

pub const TENT_UNALLOWED: &str = "Strings\\StringsFromMaps:TentUnallowed";

impl<'r> OverrideCallbacks<'r> {
    pub fn new(resolver: &'r dyn KeyResolver, gate: TentGate) -> Self {
        Self {
            resolver,
            gate,
            messages: Vec::new(),
        }
    }

    fn load_string(&self, key: &str) -> String {
        self.resolver.resolve(key).unwrap_or(key).to_string()
    }
}

fn entity_name(value: &Value) -> Option<&str> {
    match value {
        Value::Str(name) => Some(name),
        Value::Object(_) => value.field("Name").and_then(Value::as_str),
        _ => None,
    }
}

fn custom_fields(location: &Value) -> Option<BTreeMap<String, String>> {
    let Some(Value::Object(fields)) = location.field("CustomFields") else {
        return None;
    };
    Some(
        fields
            .iter()
            .filter_map(|(key, value)| Some((key.clone(), value.as_str()?.to_string())))
            .collect(),
    )
}

fn bad_args(method: &MethodRef, reason: &str) -> ExecError {
    ExecError::Call {
        method: method.clone(),
        reason: reason.to_string(),
    }
}

impl Runtime for OverrideCallbacks<'_> {
    fn load_static(&mut self, field: &FieldRef) -> Option<Value> {
        match field.name.as_str() {
            "content" => Some(Value::from("content")),
            _ => None,
        }
    }

    fn invoke(&mut self, method: &MethodRef, args: Vec<Value>) -> Result<Option<Value>, ExecError> {
        trace!(%method, ?args, "callback");
        match (method.name.as_str(), args.as_slice()) {
            ("CheckForNamedString", [base, entity]) => {
                let (Some(base), Some(entity)) = (base.as_str(), entity_name(entity)) else {
                    return Err(bad_args(method, "expected a base string and an entity"));
                };
                let found = check_for_named_string(self.resolver, base, entity);
                debug!(key = %override_key(base, entity), found, "override check");
                Ok(Some(Value::bool(found)))
            }
            ("NamedString", [base, entity]) => {
                let (Some(base), Some(entity)) = (base.as_str(), entity_name(entity)) else {
                    return Err(bad_args(method, "expected a base string and an entity"));
                };
                let key = override_key(base, entity);
                Ok(Some(Value::Str(self.load_string(&key))))
            }
            ("LoadString", [_content, key]) => {
                let key = key.as_str().ok_or_else(|| bad_args(method, "expected a key"))?;
                Ok(Some(Value::Str(self.load_string(key))))
            }
            ("LocationCheck", [location]) => {
                let fields = custom_fields(location);
                Ok(Some(Value::bool(self.gate.is_unsafe(fields.as_ref()))))
            }
            ("ShowMessage", []) => {
                let message = self.load_string(TENT_UNALLOWED);
                self.messages.push(message);
                Ok(None)
            }
            _ => Err(bad_args(method, "no callback bound")),
        }
    }
}
