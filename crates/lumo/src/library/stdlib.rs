//! Standard libraries: the text and array table every guest gets, plus the
//! environment-specific I/O functions of `node` and `web`.

use std::io::{self, BufRead, Write};

use super::{ret, CallArgs, Exports, Library};
use crate::codec;
use crate::descriptor::TypeDescriptor;
use crate::error::{Error, Result};
use crate::value::RawValue;

type Ret = Result<Option<RawValue>>;

/// Register the functions shared by every standard library.
pub fn register_base<L>(exports: &mut Exports<L>) {
    exports
        .func("to_str", to_str)
        .func("to_num", to_num)
        .func("repeat", repeat)
        .func("concat", concat)
        .func("strcmp", strcmp)
        .func("strlen", strlen)
        .func("split", split)
        .func("array", array)
        .func("slice", slice)
        .func("arrlen", arrlen)
        .func("join", join)
        .func("append", append);
}

fn to_str<L>(_: &mut L, args: &mut CallArgs<'_>) -> Ret {
    let text = match args.raw(0)? {
        RawValue::I32(v) => v.to_string(),
        RawValue::I64(v) => v.to_string(),
        RawValue::F32(v) => v.to_string(),
        RawValue::F64(v) => v.to_string(),
    };
    args.ret_str(&text)
}

fn to_num<L>(_: &mut L, args: &mut CallArgs<'_>) -> Ret {
    ret(parse_float(&args.str(0)?))
}

fn repeat<L>(_: &mut L, args: &mut CallArgs<'_>) -> Ret {
    let text = args.str(0)?;
    let count = args.num(1)?.floor();
    if !(0.0..=u32::MAX as f64).contains(&count) {
        return Err(Error::capability("repeat", format!("invalid count {count}")));
    }
    args.ret_str(&text.repeat(count as usize))
}

fn concat<L>(_: &mut L, args: &mut CallArgs<'_>) -> Ret {
    let joined = args.str(0)? + &args.str(1)?;
    args.ret_str(&joined)
}

fn strcmp<L>(_: &mut L, args: &mut CallArgs<'_>) -> Ret {
    ret(args.str(0)? == args.str(1)?)
}

fn strlen<L>(_: &mut L, args: &mut CallArgs<'_>) -> Ret {
    ret(args.str(0)?.chars().count() as i32)
}

fn split<L>(_: &mut L, args: &mut CallArgs<'_>) -> Ret {
    let text = args.str(0)?;
    let delimiter = args.str(1)?;
    let parts = if delimiter.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(delimiter.as_str()).map(str::to_string).collect()
    };
    args.ret_str_array(parts)
}

fn array<L>(_: &mut L, args: &mut CallArgs<'_>) -> Ret {
    let init = args.int(0)?;
    let len = usize::try_from(args.int(1)?)
        .map_err(|_| Error::capability("array", "length must be non-negative"))?;
    args.ret_int_array(vec![init; len])
}

fn slice<L>(_: &mut L, args: &mut CallArgs<'_>) -> Ret {
    let items = args.int_array(0)?;
    let (start, end) = slice_bounds(items.len(), args.int(1)?, args.int(2)?);
    args.ret_int_array(items[start..end].to_vec())
}

fn arrlen<L>(_: &mut L, args: &mut CallArgs<'_>) -> Ret {
    let address = args.int(0)?;
    ret(codec::array_len(args.memory(), address)?)
}

fn join<L>(_: &mut L, args: &mut CallArgs<'_>) -> Ret {
    let items = args.str_array(0)?;
    let delimiter = args.str(1)?;
    args.ret_str(&items.join(&delimiter))
}

fn append<L>(_: &mut L, args: &mut CallArgs<'_>) -> Ret {
    let mut items = args.int_array(0)?;
    items.extend(args.int_array(1)?);
    args.ret_int_array(items)
}

/// Resolve slice indices the way sequence slicing does: negative counts from
/// the end, everything clamps to the sequence.
fn slice_bounds(len: usize, start: i32, end: i32) -> (usize, usize) {
    let resolve = |i: i32| {
        let i = i as i64;
        let i = if i < 0 { len as i64 + i } else { i };
        i.clamp(0, len as i64) as usize
    };
    let (start, end) = (resolve(start), resolve(end));
    (start, end.max(start))
}

/// Parse the longest numeric prefix of `text`, NaN if there is none.
fn parse_float(text: &str) -> f64 {
    let text = text.trim_start();
    let prefix_len = text
        .char_indices()
        .take_while(|&(_, c)| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        .count();
    (1..=prefix_len)
        .rev()
        .find_map(|len| text[..len].parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

/// Standard library for command-line hosts.
pub struct NodeLib {
    out: Box<dyn Write + Send>,
}

impl NodeLib {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        NodeLib { out: Box::new(out) }
    }
}

impl Default for NodeLib {
    fn default() -> Self {
        NodeLib::new(io::stdout())
    }
}

impl Library for NodeLib {
    const NAME: &'static str = "node";

    fn register(exports: &mut Exports<Self>) {
        register_base(exports);
        exports
            .func("print", |lib, args| {
                let message = args.opt_str(0)?;
                writeln!(lib.out, "{}", message.as_deref().unwrap_or("null"))?;
                Ok(None)
            })
            .func("write", |lib, args| {
                let message = args.str(0)?;
                lib.out.write_all(message.as_bytes())?;
                lib.out.flush()?;
                Ok(None)
            });
    }
}

/// User interaction behind the `web` library's dialog functions.
pub trait Dialog: Send {
    fn alert(&mut self, message: &str) -> io::Result<()>;
    fn confirm(&mut self, message: &str) -> io::Result<bool>;
    /// `None` when the user dismissed the prompt.
    fn prompt(&mut self, message: &str) -> io::Result<Option<String>>;
}

/// Dialogs on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalDialog;

impl TerminalDialog {
    fn ask(&self, question: &str) -> io::Result<Option<String>> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{question} ")?;
        stdout.flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

impl Dialog for TerminalDialog {
    fn alert(&mut self, message: &str) -> io::Result<()> {
        writeln!(io::stdout().lock(), "{message}")
    }

    fn confirm(&mut self, message: &str) -> io::Result<bool> {
        let answer = self.ask(&format!("{message} [y/N]"))?;
        Ok(answer.is_some_and(|a| a.trim().eq_ignore_ascii_case("y") || a.trim().eq_ignore_ascii_case("yes")))
    }

    fn prompt(&mut self, message: &str) -> io::Result<Option<String>> {
        self.ask(message)
    }
}

/// Standard library for browser-style hosts.
pub struct WebLib {
    dialog: Box<dyn Dialog>,
}

impl WebLib {
    pub fn new(dialog: impl Dialog + 'static) -> Self {
        WebLib {
            dialog: Box::new(dialog),
        }
    }
}

impl Default for WebLib {
    fn default() -> Self {
        WebLib::new(TerminalDialog)
    }
}

impl Library for WebLib {
    const NAME: &'static str = "web";

    fn register(exports: &mut Exports<Self>) {
        register_base(exports);
        exports
            .func("alert", |lib, args| {
                lib.dialog.alert(&args.str(0)?)?;
                Ok(None)
            })
            .func("confirm", |lib, args| ret(lib.dialog.confirm(&args.str(0)?)?))
            .func("prompt", |lib, args| {
                let answer = lib.dialog.prompt(&args.str(0)?)?;
                args.ret_value(&TypeDescriptor::Str, answer)
            });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::descriptor::TypeDescriptor;
    use crate::library::testing::{call, read_str, str_arg};
    use crate::library::{Capability, LibraryCell};
    use crate::memory::LinearBuffer;
    use crate::value::{Value, NULL};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    struct Scripted {
        answers: Vec<Option<String>>,
        alerts: Vec<String>,
    }

    impl Dialog for Scripted {
        fn alert(&mut self, message: &str) -> io::Result<()> {
            self.alerts.push(message.to_string());
            Ok(())
        }

        fn confirm(&mut self, _message: &str) -> io::Result<bool> {
            Ok(self.answers.pop().flatten().is_some())
        }

        fn prompt(&mut self, _message: &str) -> io::Result<Option<String>> {
            Ok(self.answers.pop().flatten())
        }
    }

    fn node() -> (LibraryCell<NodeLib>, Captured) {
        let out = Captured::default();
        (LibraryCell::new(NodeLib::new(out.clone())).unwrap(), out)
    }

    fn ints(mem: &mut LinearBuffer, items: Vec<i32>) -> RawValue {
        codec::encode(mem, &TypeDescriptor::array(TypeDescriptor::Int), &Value::from(items)).unwrap()
    }

    fn read_ints(mem: &LinearBuffer, raw: Option<RawValue>) -> Value {
        codec::decode(mem, &TypeDescriptor::array(TypeDescriptor::Int), raw.unwrap()).unwrap()
    }

    #[test]
    fn to_str_formats_ints_and_floats() {
        let (mut lib, _) = node();
        let mut mem = LinearBuffer::default();
        let out = call(&mut lib, &mut mem, "to_str", &[RawValue::I32(42)]).unwrap();
        assert_eq!(read_str(&mem, out), "42");
        let out = call(&mut lib, &mut mem, "to_str", &[RawValue::F32(1.5)]).unwrap();
        assert_eq!(read_str(&mem, out), "1.5");
    }

    #[test]
    fn to_num_parses_numeric_prefix() {
        assert_eq!(parse_float(" 3.25abc"), 3.25);
        assert_eq!(parse_float("-1e3"), -1000.0);
        assert_eq!(parse_float("12e"), 12.0);
        assert!(parse_float("abc").is_nan());
    }

    #[test]
    fn string_functions() {
        let (mut lib, _) = node();
        let mut mem = LinearBuffer::default();
        let a = str_arg(&mut mem, "ab");
        let b = str_arg(&mut mem, "cd");

        let out = call(&mut lib, &mut mem, "concat", &[a, b]).unwrap();
        assert_eq!(read_str(&mem, out), "abcd");
        let out = call(&mut lib, &mut mem, "repeat", &[a, RawValue::F32(3.7)]).unwrap();
        assert_eq!(read_str(&mem, out), "ababab");
        assert_eq!(call(&mut lib, &mut mem, "strcmp", &[a, a]).unwrap(), Some(RawValue::I32(1)));
        assert_eq!(call(&mut lib, &mut mem, "strcmp", &[a, b]).unwrap(), Some(RawValue::I32(0)));

        let text = str_arg(&mut mem, "héllo");
        assert_eq!(call(&mut lib, &mut mem, "strlen", &[text]).unwrap(), Some(RawValue::I32(5)));
        assert!(call(&mut lib, &mut mem, "repeat", &[a, RawValue::I32(-1)]).is_err());
    }

    #[test]
    fn split_and_join() {
        let (mut lib, _) = node();
        let mut mem = LinearBuffer::default();
        let text = str_arg(&mut mem, "a,b,,c");
        let comma = str_arg(&mut mem, ",");
        let parts = call(&mut lib, &mut mem, "split", &[text, comma]).unwrap().unwrap();
        let decoded = codec::decode(&mem, &TypeDescriptor::array(TypeDescriptor::Str), parts).unwrap();
        assert_eq!(decoded, Value::from(vec!["a", "b", "", "c"]));

        let dash = str_arg(&mut mem, "-");
        let joined = call(&mut lib, &mut mem, "join", &[parts, dash]).unwrap();
        assert_eq!(read_str(&mem, joined), "a-b--c");

        let empty = str_arg(&mut mem, "");
        let chars = call(&mut lib, &mut mem, "split", &[dash, empty]).unwrap().unwrap();
        assert_eq!(codec::array_len(&mem, chars.as_i32()).unwrap(), 1);
    }

    #[test]
    fn array_functions() {
        let (mut lib, _) = node();
        let mut mem = LinearBuffer::default();
        let filled = call(&mut lib, &mut mem, "array", &[RawValue::I32(7), RawValue::I32(3)]).unwrap();
        assert_eq!(read_ints(&mem, filled), Value::from(vec![7, 7, 7]));
        assert_eq!(call(&mut lib, &mut mem, "arrlen", &[filled.unwrap()]).unwrap(), Some(RawValue::I32(3)));

        let a = ints(&mut mem, vec![1, 2, 3, 4, 5]);
        let tail = call(&mut lib, &mut mem, "slice", &[a, RawValue::I32(-2), RawValue::I32(5)]).unwrap();
        assert_eq!(read_ints(&mem, tail), Value::from(vec![4, 5]));
        let middle = call(&mut lib, &mut mem, "slice", &[a, RawValue::I32(1), RawValue::I32(-1)]).unwrap();
        assert_eq!(read_ints(&mem, middle), Value::from(vec![2, 3, 4]));
        let empty = call(&mut lib, &mut mem, "slice", &[a, RawValue::I32(4), RawValue::I32(2)]).unwrap();
        assert_eq!(read_ints(&mem, empty), Value::from(Vec::<i32>::new()));

        let b = ints(&mut mem, vec![9]);
        let joined = call(&mut lib, &mut mem, "append", &[b, a]).unwrap();
        assert_eq!(read_ints(&mem, joined), Value::from(vec![9, 1, 2, 3, 4, 5]));
    }

    #[test]
    fn print_and_write_go_to_the_injected_writer() {
        let (mut lib, out) = node();
        let mut mem = LinearBuffer::default();
        let hello = str_arg(&mut mem, "hello");
        call(&mut lib, &mut mem, "write", &[hello]).unwrap();
        call(&mut lib, &mut mem, "print", &[hello]).unwrap();
        call(&mut lib, &mut mem, "print", &[RawValue::I32(NULL)]).unwrap();
        assert_eq!(out.text(), "hellohello\nnull\n");
    }

    #[test]
    fn web_dialogs() {
        let dialog = Scripted {
            answers: vec![None, Some("ok".into()), Some("ada".into())],
            alerts: Vec::new(),
        };
        let mut lib = LibraryCell::new(WebLib::new(dialog)).unwrap();
        let mut mem = LinearBuffer::default();
        let question = str_arg(&mut mem, "name?");

        let answer = call(&mut lib, &mut mem, "prompt", &[question]).unwrap();
        assert_eq!(read_str(&mem, answer), "ada");
        assert_eq!(call(&mut lib, &mut mem, "confirm", &[question]).unwrap(), Some(RawValue::I32(1)));
        let dismissed = call(&mut lib, &mut mem, "prompt", &[question]).unwrap();
        assert_eq!(dismissed, Some(RawValue::I32(NULL)));

        call(&mut lib, &mut mem, "alert", &[question]).unwrap();
        assert!(lib.function("print").is_none());
    }
}
