//! `console.log` (§6.1), grounded on `ouros::builtins::print`'s thin
//! wrapper over the embedding's output sink.

use std::rc::Rc;

use super::native;
use crate::object::ObjectData;
use crate::value::Value;

pub(super) fn install(globals: &mut ObjectData) {
    let mut console = ObjectData::new();
    console.set_data(Rc::from("log"), native("log", 0, |host, _this, args| {
        host.console_log(args)?;
        Ok(Value::Undefined)
    }));
    globals.set_data(Rc::from("console"), Value::Object(Rc::new(std::cell::RefCell::new(console))));
}
