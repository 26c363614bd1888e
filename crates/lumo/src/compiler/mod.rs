//! The seam to the external compiler.
//!
//! Compiling source is not the host's job. A [`Compiler`] hands back a wasm
//! binary plus the descriptor of the program's return value; the host only
//! runs what it is given.

use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use tracing::debug;

use crate::descriptor::TypeDescriptor;
use crate::error::{Error, Result};
use crate::module::read_return_type;

/// Output of a compiler.
#[derive(Debug, Clone)]
pub struct CompiledModule {
    pub bytes: Vec<u8>,
    /// `None` when the program returns nothing.
    pub return_type: Option<TypeDescriptor>,
}

impl CompiledModule {
    /// Accept wasm binary or text, reading the return type from the binary's
    /// custom section.
    pub fn from_wasm(input: &[u8]) -> Result<Self> {
        let bytes = wat::parse_bytes(input)
            .map_err(|e| Error::Compile(e.to_string()))?
            .into_owned();
        let return_type = read_return_type(&bytes)?;
        Ok(CompiledModule { bytes, return_type })
    }
}

pub trait Compiler {
    fn compile(&self, source: &str) -> Result<CompiledModule>;
}

/// Treats source as a WebAssembly module in text or binary form.
#[derive(Debug, Default, Clone, Copy)]
pub struct WatCompiler;

impl Compiler for WatCompiler {
    fn compile(&self, source: &str) -> Result<CompiledModule> {
        CompiledModule::from_wasm(source.as_bytes())
    }
}

/// Runs an external program that reads source on stdin and writes a module
/// to stdout.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
}

impl CommandCompiler {
    pub fn new(program: impl Into<String>) -> Self {
        CommandCompiler {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Split a shell-style command line on whitespace.
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| Error::Compile("empty compiler command".to_string()))?;
        Ok(CommandCompiler {
            program,
            args: words.collect(),
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl Compiler for CommandCompiler {
    fn compile(&self, source: &str) -> Result<CompiledModule> {
        debug!(program = %self.program, args = ?self.args, "running compiler");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Compile(format!("{}: {e}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Compile("compiler stdin unavailable".to_string()))?;
        let source = source.to_string();
        let writer = thread::spawn(move || stdin.write_all(source.as_bytes()));

        let output = child.wait_with_output()?;
        match writer.join() {
            Ok(Ok(())) => {}
            // The compiler may stop reading early; its exit status decides.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(Error::Compile("stdin writer panicked".to_string())),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Compile(format!("{} ({})", stderr.trim(), output.status)));
        }
        CompiledModule::from_wasm(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wat_compiler_reads_return_type() {
        let compiled = WatCompiler
            .compile(r#"(module (@custom "lumo.return_type" "\"num\"") (func (export "_start")))"#)
            .unwrap();
        assert_eq!(compiled.return_type, Some(TypeDescriptor::Num));
        assert_eq!(&compiled.bytes[..4], b"\0asm");
    }

    #[test]
    fn wat_compiler_reports_syntax_errors() {
        assert!(matches!(WatCompiler.compile("(module (func"), Err(Error::Compile(_))));
    }

    #[test]
    fn command_line_is_split() {
        let compiler = CommandCompiler::from_command_line("lumoc --emit wasm").unwrap();
        assert_eq!(compiler.program, "lumoc");
        assert_eq!(compiler.args, ["--emit", "wasm"]);
        assert!(CommandCompiler::from_command_line("  ").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn command_compiler_pipes_source_through() {
        let compiled = CommandCompiler::new("cat")
            .compile(r#"(module (func (export "_start")))"#)
            .unwrap();
        assert_eq!(compiled.return_type, None);

        let err = CommandCompiler::new("sh")
            .arg("-c")
            .arg("echo boom >&2; exit 3")
            .compile("")
            .unwrap_err();
        assert!(matches!(err, Error::Compile(msg) if msg.contains("boom")));
    }
}
