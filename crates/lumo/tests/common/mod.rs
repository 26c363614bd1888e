//! Guest modules for integration tests, written as WAT.

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use lumo::{CompiledModule, Engine, GuestModule};

/// A guest with the exports every session needs: `mem`, a bump `malloc`
/// starting at 1024 and `_start`.
///
/// `items` goes inside the module before the exports, so imports and data
/// segments can be declared there. `start` is the whole `_start` function
/// after its export name, e.g. `(result i32) i32.const 1`.
pub fn guest(items: &str, start: &str, returns: Option<&str>) -> String {
    let section = returns
        .map(|json| format!("(@custom \"lumo.return_type\" \"{}\")", json.replace('"', "\\\"")))
        .unwrap_or_default();
    format!(
        r#"(module
  {items}
  (memory (export "mem") 1)
  (global $heap (mut i32) (i32.const 1024))
  (func (export "malloc") (param $size i32) (result i32)
    (local $addr i32)
    global.get $heap
    local.set $addr
    global.get $heap
    local.get $size
    i32.add
    global.set $heap
    local.get $addr)
  (func (export "_start") {start})
  {section})"#
    )
}

pub fn load(engine: &Engine, wat: &str) -> GuestModule {
    let compiled = CompiledModule::from_wasm(wat.as_bytes()).unwrap();
    engine.load(compiled).unwrap()
}

/// Writer whose output stays readable after it has been moved into a
/// library.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
