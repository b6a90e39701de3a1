use clap::{Parser, Subcommand};
use hawk_templates::{DirectorySource, Engine, Options, SourceProvider, Value};
use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hawk")]
#[command(about = "Hawk - tag-based templates rendered to HTML")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON settings file (delimiters, id prefix, depth limit)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template from a view directory
    Render {
        /// View directory
        dir: PathBuf,

        /// Template name, relative to the directory and without extension
        template: String,

        /// Variables as a JSON object, or `@file.json`
        #[arg(long)]
        vars: Option<String>,

        /// Prefer `<name>.<theme>` templates
        #[arg(long)]
        theme: Option<String>,

        /// Print the render history as JSON after the HTML
        #[arg(long)]
        history: bool,
    },
    /// Compile every template in a view directory and report errors
    Check {
        /// View directory
        dir: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("HAWK_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let options = match load_options(cli.config.as_deref()) {
        Ok(options) => options,
        Err(message) => fail(&message),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(err) => fail(&format!("could not start runtime: {}", err)),
    };

    match cli.command {
        Commands::Render {
            dir,
            template,
            vars,
            theme,
            history,
        } => runtime.block_on(render(options, &dir, &template, vars, theme, history)),
        Commands::Check { dir } => runtime.block_on(check(options, &dir)),
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn load_options(path: Option<&Path>) -> Result<Options, String> {
    let Some(path) = path else {
        return Ok(Options::default());
    };
    let json = fs::read_to_string(path).map_err(|err| format!("{}: {}", path.display(), err))?;
    Options::from_json(&json).map_err(|err| err.to_string())
}

fn load_variables(vars: Option<String>) -> Result<Value, String> {
    let Some(vars) = vars else {
        return Ok(Value::object(Default::default()));
    };
    let json = match vars.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).map_err(|err| format!("{}: {}", path, err))?,
        None => vars,
    };
    serde_json::from_str::<serde_json::Value>(&json)
        .map(Value::from)
        .map_err(|err| format!("invalid variables: {}", err))
}

fn source_for(options: &Options, dir: &Path) -> DirectorySource {
    if !dir.is_dir() {
        fail(&format!("{} is not a directory", dir.display()));
    }
    DirectorySource::new(dir).with_extensions(&options.extensions)
}

async fn render(
    options: Options,
    dir: &Path,
    template: &str,
    vars: Option<String>,
    theme: Option<String>,
    history: bool,
) {
    let variables = load_variables(vars).unwrap_or_else(|message| fail(&message));
    let engine = Engine::with_source(options.clone(), source_for(&options, dir));

    let start = Instant::now();
    let renderer = engine.render(template, variables);
    renderer.set_theme(theme.as_deref());

    match renderer.finish().await {
        Ok(html) => {
            print!("{}", html);
            if history {
                match serde_json::to_string_pretty(&renderer.history()) {
                    Ok(json) => println!("\n{}", json),
                    Err(err) => fail(&err.to_string()),
                }
            }
            print_summary("Rendered", 1, start.elapsed());
        }
        Err(err) => fail(&err.to_string()),
    }
}

async fn check(options: Options, dir: &Path) {
    let source = source_for(&options, dir);
    let names = source.templates();
    if names.is_empty() {
        fail(&format!("No templates found in {}", dir.display()));
    }

    let engine = Engine::new(options);
    let start = Instant::now();
    let mut failed = 0;

    for name in &names {
        let text = match source.get_source(name).await {
            Ok(text) => text,
            Err(err) => {
                eprintln!("{}", err);
                failed += 1;
                continue;
            }
        };
        match engine.compile(name, &text) {
            Ok(_) => print_checked(name, true),
            Err(err) => {
                print_checked(name, false);
                let rendered = if io::stderr().is_terminal() {
                    err.render_color(&text)
                } else {
                    err.render(&text)
                };
                eprintln!("{}", rendered);
                failed += 1;
            }
        }
    }

    print_summary("Checked", names.len(), start.elapsed());
    if failed > 0 {
        std::process::exit(1);
    }
}

fn print_checked(name: &str, ok: bool) {
    let is_tty = io::stderr().is_terminal();
    match (ok, is_tty) {
        (true, true) => eprintln!("  \x1b[32m✓\x1b[0m {}", name),
        (true, false) => eprintln!("  ✓ {}", name),
        (false, true) => eprintln!("  \x1b[31m✗\x1b[0m {}", name),
        (false, false) => eprintln!("  ✗ {}", name),
    }
}

fn print_summary(verb: &str, count: usize, elapsed: std::time::Duration) {
    let is_tty = io::stderr().is_terminal();
    let time_str = format_duration(elapsed);
    let templates_word = if count == 1 { "template" } else { "templates" };

    if is_tty {
        eprintln!("\n\x1b[1m{} {} {} in {}\x1b[0m", verb, count, templates_word, time_str);
    } else {
        eprintln!("\n{} {} {} in {}", verb, count, templates_word, time_str);
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let micros = d.as_micros();
    if micros < 1000 {
        format!("{}μs", micros)
    } else if micros < 1_000_000 {
        format!("{:.1}ms", micros as f64 / 1000.0)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}
