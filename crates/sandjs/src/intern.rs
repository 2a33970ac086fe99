//! Identifier/string interning.
//!
//! Interned names back `LOAD_NAME`/`STORE_NAME` and property keys that the
//! compiler knows statically, so the VM can compare them by id rather than
//! by string content.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// An interned string id, unique within one `Interner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(u32);

impl NameId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A growable string interner shared by one compilation unit.
///
/// Interning is append-only: ids are never reused or invalidated, so a
/// `NameId` produced by a nested function's compiler remains valid for the
/// lifetime of the owning `Interner`.
#[derive(Debug, Default)]
pub struct Interner {
    strings: RefCell<Vec<Rc<str>>>,
    lookup: RefCell<HashMap<Rc<str>, NameId>>,
}

impl Interner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, s: &str) -> NameId {
        if let Some(id) = self.lookup.borrow().get(s) {
            return *id;
        }
        let rc: Rc<str> = Rc::from(s);
        let mut strings = self.strings.borrow_mut();
        let id = NameId(strings.len() as u32);
        strings.push(Rc::clone(&rc));
        self.lookup.borrow_mut().insert(rc, id);
        id
    }

    #[must_use]
    pub fn resolve(&self, id: NameId) -> Rc<str> {
        Rc::clone(&self.strings.borrow()[id.index()])
    }
}
