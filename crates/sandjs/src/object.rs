//! Object and array backing stores.
//!
//! Ordered own-property semantics are implemented on top of `indexmap`,
//! matching the teacher's `Object` type (`DictPairs`-style ordered
//! iteration). All own properties are writable/enumerable/configurable —
//! the dialect's single, stricter property-attribute rule, so no attribute
//! bitflags are carried per slot.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::{ObjRef, Value};

/// A single own property: either a plain data slot or an accessor pair.
#[derive(Debug, Clone)]
pub enum PropertySlot {
    Value(Value),
    Accessor { getter: Option<Value>, setter: Option<Value> },
}

/// A plain object: ordered property map plus an optional prototype link.
///
/// The prototype link is a non-owning back-edge (§9 "Prototype chains and
/// back-pointers"): cycles through `Rc` are possible (e.g. a constructor's
/// prototype object whose `constructor` points back) but never outlive the
/// owning `Context`, so no cycle collector is needed.
#[derive(Debug, Default)]
pub struct ObjectData {
    pub properties: IndexMap<Rc<str>, PropertySlot>,
    pub prototype: Option<ObjRef>,
}

impl ObjectData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_prototype(prototype: Option<ObjRef>) -> Self {
        Self { properties: IndexMap::new(), prototype }
    }

    #[must_use]
    pub fn get_own(&self, key: &str) -> Option<&PropertySlot> {
        self.properties.get(key)
    }

    pub fn set_data(&mut self, key: Rc<str>, value: Value) {
        self.properties.insert(key, PropertySlot::Value(value));
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.properties.shift_remove(key).is_some()
    }

    /// Own enumerable keys in insertion order (`for…in` / `Object.keys`).
    pub fn own_keys(&self) -> impl Iterator<Item = &Rc<str>> {
        self.properties.keys()
    }
}

/// An array: a dense element vector plus an object for non-index own
/// properties. `length` is intercepted specially by the VM's property
/// resolver rather than stored as an ordinary slot.
#[derive(Debug, Default)]
pub struct ArrayData {
    pub elements: Vec<Value>,
    pub object: ObjectData,
}

impl ArrayData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_vec(elements: Vec<Value>) -> Self {
        Self { elements, object: ObjectData::new() }
    }

    pub fn set_length(&mut self, new_len: usize) {
        self.elements.resize(new_len, Value::Undefined);
    }
}

/// Error returned by host-facing constructors fed malformed input
/// (mirrors the teacher's `InvalidInputError` shape for ambient parity).
#[derive(Debug, Clone)]
pub struct InvalidInputError(pub String);

impl std::fmt::Display for InvalidInputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid input: {}", self.0)
    }
}

impl std::error::Error for InvalidInputError {}

/// Snapshot of an object's own key/value pairs, used by `Object.entries`
/// and similar built-ins that must not observe later mutation.
#[must_use]
pub fn dict_pairs(obj: &ObjectData) -> Vec<(Rc<str>, Value)> {
    obj.properties
        .iter()
        .map(|(k, slot)| {
            let v = match slot {
                PropertySlot::Value(v) => v.clone(),
                PropertySlot::Accessor { .. } => Value::Undefined,
            };
            (Rc::clone(k), v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_keys_preserve_insertion_order() {
        let mut obj = ObjectData::new();
        obj.set_data(Rc::from("z"), Value::Number(1.0));
        obj.set_data(Rc::from("a"), Value::Number(2.0));
        obj.set_data(Rc::from("m"), Value::Number(3.0));
        let keys: Vec<&str> = obj.own_keys().map(|k| k.as_ref()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn set_data_overwrites_existing_key_in_place() {
        let mut obj = ObjectData::new();
        obj.set_data(Rc::from("x"), Value::Number(1.0));
        obj.set_data(Rc::from("y"), Value::Number(2.0));
        obj.set_data(Rc::from("x"), Value::Number(99.0));
        let keys: Vec<&str> = obj.own_keys().map(|k| k.as_ref()).collect();
        assert_eq!(keys, vec!["x", "y"], "overwriting a key must not move it to the end");
        assert!(matches!(obj.get_own("x"), Some(PropertySlot::Value(Value::Number(n))) if *n == 99.0));
    }

    #[test]
    fn delete_removes_key_and_shifts_remaining_ones() {
        let mut obj = ObjectData::new();
        obj.set_data(Rc::from("a"), Value::Number(1.0));
        obj.set_data(Rc::from("b"), Value::Number(2.0));
        obj.set_data(Rc::from("c"), Value::Number(3.0));
        assert!(obj.delete("b"));
        assert!(!obj.delete("b"));
        let keys: Vec<&str> = obj.own_keys().map(|k| k.as_ref()).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn dict_pairs_snapshots_accessor_slots_as_undefined() {
        let mut obj = ObjectData::new();
        obj.set_data(Rc::from("plain"), Value::Number(1.0));
        obj.properties.insert(Rc::from("accessor"), PropertySlot::Accessor { getter: None, setter: None });
        let pairs = dict_pairs(&obj);
        assert_eq!(pairs.len(), 2);
        assert!(matches!(pairs[1].1, Value::Undefined));
    }

    #[test]
    fn array_set_length_pads_with_undefined_and_truncates() {
        let mut arr = ArrayData::from_vec(vec![Value::Number(1.0), Value::Number(2.0)]);
        arr.set_length(4);
        assert_eq!(arr.elements.len(), 4);
        assert!(matches!(arr.elements[2], Value::Undefined));
        arr.set_length(1);
        assert_eq!(arr.elements.len(), 1);
    }
}
