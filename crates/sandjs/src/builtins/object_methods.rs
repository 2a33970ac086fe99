//! The `Object` global's static methods (§6.1, §9.1 supplement):
//! `keys`/`values`/`entries`/`assign`, grounded on `dict_pairs`'s ordered
//! own-property snapshot (`object.rs`), mirroring `context.py`'s use of
//! the same snapshot for its `dict`-backed guest objects.

use std::cell::RefCell;
use std::rc::Rc;

use super::{arg, native};
use crate::object::{ArrayData, ObjectData, dict_pairs};
use crate::value::Value;

pub(super) fn install(globals: &mut ObjectData) {
    let mut object = ObjectData::new();
    object.set_data(Rc::from("keys"), native("keys", 1, |_host, _this, args| {
        let Value::Object(o) = arg(args, 0) else { return Ok(Value::Array(Rc::new(RefCell::new(ArrayData::new())))) };
        let keys: Vec<Value> = dict_pairs(&o.borrow()).into_iter().map(|(k, _)| Value::String(k)).collect();
        Ok(Value::Array(Rc::new(RefCell::new(ArrayData::from_vec(keys)))))
    }));
    object.set_data(Rc::from("values"), native("values", 1, |_host, _this, args| {
        let Value::Object(o) = arg(args, 0) else { return Ok(Value::Array(Rc::new(RefCell::new(ArrayData::new())))) };
        let values: Vec<Value> = dict_pairs(&o.borrow()).into_iter().map(|(_, v)| v).collect();
        Ok(Value::Array(Rc::new(RefCell::new(ArrayData::from_vec(values)))))
    }));
    object.set_data(Rc::from("entries"), native("entries", 1, |_host, _this, args| {
        let Value::Object(o) = arg(args, 0) else { return Ok(Value::Array(Rc::new(RefCell::new(ArrayData::new())))) };
        let entries: Vec<Value> = dict_pairs(&o.borrow())
            .into_iter()
            .map(|(k, v)| Value::Array(Rc::new(RefCell::new(ArrayData::from_vec(vec![Value::String(k), v])))))
            .collect();
        Ok(Value::Array(Rc::new(RefCell::new(ArrayData::from_vec(entries)))))
    }));
    object.set_data(Rc::from("assign"), native("assign", 2, |host, _this, args| {
        let Value::Object(target) = arg(args, 0) else {
            return Err(host.type_error("Object.assign target must be an object"));
        };
        for source in args.get(1..).unwrap_or(&[]) {
            if let Value::Object(src) = source {
                for (k, v) in dict_pairs(&src.borrow()) {
                    target.borrow_mut().set_data(k, v);
                }
            }
        }
        Ok(Value::Object(target))
    }));
    globals.set_data(Rc::from("Object"), Value::Object(Rc::new(RefCell::new(object))));
}
