//! `os`: process, filesystem and path functions.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use super::{ret, CallArgs, Exports, Library};
use crate::error::{Error, Result};
use crate::value::RawValue;

type Ret = Result<Option<RawValue>>;

pub struct OsLib {
    argv: Vec<String>,
}

impl OsLib {
    /// An `os` library reporting `argv` as the guest's command line.
    pub fn new(argv: Vec<String>) -> Self {
        OsLib { argv }
    }
}

impl Default for OsLib {
    fn default() -> Self {
        OsLib::new(std::env::args().collect())
    }
}

fn io_error<'a>(function: &'static str, path: &'a str) -> impl FnOnce(io::Error) -> Error + 'a {
    move |e| Error::capability(function, format!("{path}: {e}"))
}

impl Library for OsLib {
    const NAME: &'static str = "os";

    fn register(exports: &mut Exports<Self>) {
        exports
            .func("argv", |lib, args| args.ret_str_array(lib.argv.clone()))
            .func("getcwd", |_, args| {
                let cwd = std::env::current_dir().map_err(io_error("getcwd", "."))?;
                args.ret_str(&cwd.to_string_lossy())
            })
            .func("remove", |_, args| {
                let path = args.str(0)?;
                fs::remove_file(&path).map_err(io_error("remove", &path))?;
                Ok(None)
            })
            .func("mkdir", |_, args| {
                let path = args.str(0)?;
                fs::create_dir(&path).map_err(io_error("mkdir", &path))?;
                Ok(None)
            })
            .func("rename", |_, args| {
                let (from, to) = (args.str(0)?, args.str(1)?);
                fs::rename(&from, &to).map_err(io_error("rename", &from))?;
                Ok(None)
            })
            .func("chdir", |_, args| {
                let path = args.str(0)?;
                std::env::set_current_dir(&path).map_err(io_error("chdir", &path))?;
                Ok(None)
            })
            .func("listdir", listdir)
            .func("path_join", |_, args| {
                let joined = Path::new(&args.str(0)?).join(args.str(1)?);
                args.ret_str(&joined.to_string_lossy())
            })
            .func("path_basename", |_, args| {
                let path = args.str(0)?;
                let name = Path::new(&path).file_name().unwrap_or_default();
                args.ret_str(&name.to_string_lossy())
            })
            .func("path_parent", |_, args| {
                let path = args.str(0)?;
                args.ret_str(&parent(&path))
            })
            .func("path_abs", |_, args| {
                let path = args.str(0)?;
                let abs = std::path::absolute(&path).map_err(io_error("path_abs", &path))?;
                args.ret_str(&abs.to_string_lossy())
            })
            .func("path_exist", |_, args| ret(Path::new(&args.str(0)?).exists()))
            .func("path_isfile", |_, args| ret(Path::new(&args.str(0)?).is_file()))
            .func("path_isdir", |_, args| ret(Path::new(&args.str(0)?).is_dir()))
            .func("path_isabs", |_, args| ret(Path::new(&args.str(0)?).is_absolute()))
            .func("path_root", |_, args| {
                let path = args.str(0)?;
                args.ret_str(&root(&path))
            })
            .func("path_ext", |_, args| {
                let path = args.str(0)?;
                let ext = Path::new(&path)
                    .extension()
                    .map(|ext| format!(".{}", ext.to_string_lossy()))
                    .unwrap_or_default();
                args.ret_str(&ext)
            })
            .func("read_file", |_, args| {
                let path = args.str(0)?;
                let content = fs::read_to_string(&path).map_err(io_error("read_file", &path))?;
                args.ret_str(&content)
            })
            .func("write_file", |_, args| {
                let (path, content) = (args.str(0)?, args.str(1)?);
                fs::write(&path, content).map_err(io_error("write_file", &path))?;
                Ok(None)
            });
    }
}

fn listdir(_: &mut OsLib, args: &mut CallArgs<'_>) -> Ret {
    let path = args.str(0)?;
    let mut names = fs::read_dir(&path)
        .and_then(|entries| {
            entries
                .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
                .collect::<io::Result<Vec<_>>>()
        })
        .map_err(io_error("listdir", &path))?;
    names.sort();
    args.ret_str_array(names)
}

/// Directory part of `path`, `.` when there is none.
fn parent(path: &str) -> String {
    match Path::new(path).parent() {
        Some(p) if p.as_os_str().is_empty() => ".".to_string(),
        Some(p) => p.to_string_lossy().into_owned(),
        None if Path::new(path).has_root() => path.to_string(),
        None => ".".to_string(),
    }
}

/// Prefix and root directory of `path`, empty for relative paths.
fn root(path: &str) -> String {
    Path::new(path)
        .components()
        .take_while(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
        .collect::<PathBuf>()
        .to_string_lossy()
        .into_owned()
}
