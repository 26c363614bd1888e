use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use lumo::{
    CommandCompiler, CompiledModule, Config, Engine, Environment, GuestModule, Repl, TypeDescriptor, Value,
    HOST_MODULE,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lumo", about = "Host runtime for Lumo guest modules")]
struct Cli {
    /// Host environment: node or web.
    #[arg(long, global = true, default_value = "node")]
    env: Environment,

    /// Skip validation of guest binaries.
    #[arg(long, global = true)]
    no_validate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a compiled module (.wasm or .wat).
    Run {
        module: PathBuf,
        /// Return type descriptor as JSON, replacing the module's own.
        #[arg(long)]
        returns: Option<String>,
    },
    /// Compile a source file with an external compiler and run it.
    Eval {
        #[arg(long)]
        compiler: String,
        source: PathBuf,
    },
    /// Compile and run a single line of source.
    Line {
        #[arg(long)]
        compiler: String,
        code: String,
    },
    /// Read lines from stdin, running each after everything accepted so far.
    Repl {
        #[arg(long)]
        compiler: String,
        /// Source to start from.
        #[arg(long)]
        prelude: Option<PathBuf>,
    },
    /// List a module's imports and the library function each resolves to.
    Imports { module: PathBuf },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lumo=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let engine = Engine::new(
        Config::default()
            .environment(cli.env)
            .validate(!cli.no_validate),
    );
    match cli.command {
        Command::Run { module, returns } => run(&engine, module, returns),
        Command::Eval { compiler, source } => {
            let source = std::fs::read_to_string(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            let compiler = CommandCompiler::from_command_line(&compiler)?;
            show(engine.eval(&compiler, &source)?);
            Ok(())
        }
        Command::Line { compiler, code } => {
            let compiler = CommandCompiler::from_command_line(&compiler)?;
            show(engine.eval(&compiler, &code)?);
            Ok(())
        }
        Command::Repl { compiler, prelude } => repl(&engine, &compiler, prelude),
        Command::Imports { module } => imports(&engine, module),
    }
}

fn load(engine: &Engine, path: &Path) -> anyhow::Result<GuestModule> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let compiled = CompiledModule::from_wasm(&bytes)?;
    Ok(engine.load(compiled)?)
}

fn run(engine: &Engine, path: PathBuf, returns: Option<String>) -> anyhow::Result<()> {
    let mut module = load(engine, &path)?;
    if let Some(text) = returns {
        module = module.with_return_type(TypeDescriptor::parse(&text)?);
    }
    show(engine.session().run(&module)?);
    Ok(())
}

fn repl(engine: &Engine, compiler: &str, prelude: Option<PathBuf>) -> anyhow::Result<()> {
    let compiler = CommandCompiler::from_command_line(compiler)?;
    let mut repl = match prelude {
        Some(path) => Repl::with_prelude(compiler, std::fs::read_to_string(&path)?),
        None => Repl::new(compiler),
    };
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        match repl.submit(engine, line.trim_end()) {
            Ok(value) => show(value),
            Err(e) => eprintln!("error: {e}"),
        }
    }
}

fn imports(engine: &Engine, path: PathBuf) -> anyhow::Result<()> {
    let module = load(engine, &path)?;
    let resolver = engine.resolver();
    let resolution = resolver.resolve(module.imports())?;
    for import in module.imports() {
        let bound = resolution.get(&import.name).filter(|_| import.module == HOST_MODULE);
        match bound {
            Some(bound) => println!(
                "{}.{} -> {}.{}",
                import.module,
                import.name,
                bound.module(),
                bound.function()
            ),
            None => println!("{}.{} ({}, not bound)", import.module, import.name, import.kind),
        }
    }
    Ok(())
}

fn show(value: Option<Value>) {
    if let Some(value) = value {
        println!("{value}");
    }
}
