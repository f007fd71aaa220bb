mod model;
mod test_runner;

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use interpreter::{CompileArgs, FileResolver, RuntimeValue, compile, compile_sync};
use razor::{ParsedSectionRegistry, RazorError};

const SUBCOMMANDS: &[&str] = &["render", "test", "help"];

#[derive(Parser)]
#[command(name = "razor", version, about = "Razor-style HTML template engine")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log compile and render steps to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a template file to stdout
    Render(RenderArgs),

    /// Run .test.raz test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Template file to render
    file: String,

    /// Model file (.json or .toml)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Directory searched for partials and layouts. Repeatable.
    #[arg(long)]
    views: Vec<PathBuf>,

    /// Extension appended to view names without one
    #[arg(long, default_value = interpreter::resolver::DEFAULT_EXTENSION)]
    ext: String,

    /// Parse only, don't render (exit 0 if valid)
    #[arg(long)]
    check: bool,

    /// Dump the generated program
    #[arg(long)]
    program: bool,

    /// Resolve layouts through the continuation-style entry point
    #[arg(long = "async")]
    use_async: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.raz file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    // `razor page.raz` works like `razor render page.raz`.
    let mut args: Vec<String> = std::env::args().collect();
    if let Some(pos) = args
        .iter()
        .skip(1)
        .position(|a| !a.starts_with('-'))
        .map(|i| i + 1)
    {
        if !SUBCOMMANDS.contains(&args[pos].as_str()) {
            args.insert(pos, "render".to_string());
        }
    }

    let cli = Cli::parse_from(&args);

    let default_filter = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Command::Render(render_args) => do_render(render_args, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn do_render(args: RenderArgs, no_color: bool) {
    let source = match std::fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", args.file, e);
            process::exit(1);
        }
    };

    // --check / --program: scan and generate only
    if args.check || args.program {
        log::debug!("scanning {} without rendering", args.file);
        let mut sections = ParsedSectionRegistry::new();
        match razor::compile(&source, &args.file, &mut sections) {
            Ok(program) if args.program => print!("{}", program),
            Ok(_) => eprintln!("ok: {} parsed successfully", args.file),
            Err(error) => {
                emit_error(&error, &args.file, &source, no_color);
                process::exit(1);
            }
        }
        return;
    }

    let model = match &args.model {
        Some(path) => match model::load(path) {
            Ok(model) => model,
            Err(e) => {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        },
        None => RuntimeValue::Undefined,
    };

    let resolver = args
        .views
        .iter()
        .fold(FileResolver::new().with_extension(args.ext.as_str()), |resolver, dir| {
            resolver.with_views(dir)
        });

    log::debug!(
        "rendering {} ({} view directories, async: {})",
        args.file,
        args.views.len(),
        args.use_async
    );
    let compile_args = CompileArgs::new(source.as_str())
        .file_path(args.file.as_str())
        .model(model)
        .resolver(&resolver);

    let result = if args.use_async {
        let outcome = RefCell::new(None);
        compile(compile_args, |result| *outcome.borrow_mut() = Some(result));
        outcome.into_inner().unwrap_or_else(|| {
            eprintln!("error: rendering did not complete");
            process::exit(1);
        })
    } else {
        compile_sync(compile_args)
    };

    match result {
        Ok(html) => print!("{}", html),
        Err(error) => {
            emit_error(&error, &args.file, &source, no_color);
            process::exit(1);
        }
    }
}

/// Print a template error, with a source snippet when its file can be read.
fn emit_error(error: &RazorError, main_path: &str, main_source: &str, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    let source = if error.file_path == main_path {
        Some(main_source.to_string())
    } else {
        std::fs::read_to_string(&error.file_path).ok()
    };

    match source {
        Some(source) if error.position.is_some() => {
            let mut files = SimpleFiles::new();
            let file_id = files.add(error.file_path.clone(), source);
            let diagnostic = error.to_diagnostic(file_id);
            let writer = StandardStream::stderr(color_choice);
            let config = term::Config::default();
            let _ = term::emit_to_write_style(&mut writer.lock(), &config, &files, &diagnostic);
        }
        _ => {
            eprintln!("error: {}", error);
            for note in &error.notes {
                eprintln!("  = {}", note);
            }
            if let Some(cause) = std::error::Error::source(error) {
                eprintln!("  caused by: {}", cause);
            }
        }
    }
}
