//! Tie models: the uniform object shape every tie exposes.
//!
//! Whatever a tie is registered with, its model is an object. Non-object
//! values are wrapped as `{value: ...}` so every tie has addressable
//! properties.

use crate::value::{Object, Value};

/// The root tie; fallback configuration source for every other tie.
pub const ROOT_TIE: &str = "app";
/// Key that wrapped non-object values are stored under.
pub const VALUE_KEY: &str = "value";
/// Prefix of handle-backed properties (`$view`, `$request`, ...).
pub const HANDLE_PREFIX: char = '$';
/// Prefix of dependency back-references (`@app`).
pub const REFERENCE_PREFIX: char = '@';
/// Reserved dependency declaration list.
pub const DEPS_KEY: &str = "$deps";
/// Computed readiness flag.
pub const READY_KEY: &str = "$ready";

/// Property holding the configuration (and later the output) of a handle.
pub fn handle_property(handle: &str) -> String {
    format!("{HANDLE_PREFIX}{handle}")
}

/// Property holding the back-reference to a dependency.
pub fn reference_property(dependency: &str) -> String {
    format!("{REFERENCE_PREFIX}{dependency}")
}

/// Handle name addressed by a property path, if the path's root is a handle
/// property.
pub fn handle_name(path: &str) -> Option<&str> {
    let root = path.split('.').next().unwrap_or(path);
    root.strip_prefix(HANDLE_PREFIX)
        .filter(|name| !name.is_empty() && root != DEPS_KEY && root != READY_KEY)
}

fn is_unobserved(key: &str) -> bool {
    key.starts_with(REFERENCE_PREFIX) || key == DEPS_KEY
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    fields: Object,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize an arbitrary value into a model.
    pub fn wrap(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            other => {
                let mut fields = Object::new();
                fields.insert(VALUE_KEY.to_owned(), other);
                Self { fields }
            }
        }
    }

    pub fn fields(&self) -> &Object {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        match path.split_once('.') {
            None => self.fields.get(path),
            Some((head, rest)) => self.fields.get(head)?.lookup(rest),
        }
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        match path.split_once('.') {
            None => self.fields.get_mut(path),
            Some((head, rest)) => self.fields.get_mut(head)?.lookup_mut(rest),
        }
    }

    /// Write a value, creating (or replacing non-object) intermediate
    /// segments with empty objects. Returns the previous value.
    pub fn set(&mut self, path: &str, value: Value) -> Option<Value> {
        set_in(&mut self.fields, path, value)
    }

    pub fn remove(&mut self, path: &str) -> Option<Value> {
        remove_in(&mut self.fields, path)
    }

    /// Every observable property path, parents before their nested paths.
    ///
    /// Back-references and the `$deps` declaration are skipped; lists are
    /// observed as a whole and never expanded per index.
    pub fn observable_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        explore(&self.fields, None, &mut paths);
        paths
    }

    /// Object view of the model without its own back-references.
    ///
    /// This is what dependents receive as their `@name` property.
    pub fn snapshot(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .filter(|(key, _)| !key.starts_with(REFERENCE_PREFIX))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    /// Dependency names declared through the `$deps` property.
    pub fn declared_dependencies(&self) -> Vec<String> {
        self.fields
            .get(DEPS_KEY)
            .and_then(Value::as_list)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn set_in(fields: &mut Object, path: &str, value: Value) -> Option<Value> {
    match path.split_once('.') {
        None => fields.insert(path.to_owned(), value),
        Some((head, rest)) => {
            let slot = fields
                .entry(head.to_owned())
                .or_insert_with(|| Value::Object(Object::new()));
            if !slot.is_object() {
                *slot = Value::Object(Object::new());
            }
            match slot {
                Value::Object(nested) => set_in(nested, rest, value),
                _ => None,
            }
        }
    }
}

fn remove_in(fields: &mut Object, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => fields.shift_remove(path),
        Some((head, rest)) => match fields.get_mut(head) {
            Some(Value::Object(nested)) => remove_in(nested, rest),
            _ => None,
        },
    }
}

fn explore(fields: &Object, prefix: Option<&str>, paths: &mut Vec<String>) {
    for (key, value) in fields {
        if prefix.is_none() && is_unobserved(key) {
            continue;
        }
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        paths.push(path.clone());
        if let Value::Object(nested) = value {
            explore(nested, Some(&path), paths);
        }
    }
}
