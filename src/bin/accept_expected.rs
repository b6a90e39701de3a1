//! Binary to generate/update .expected.html files for the template fixtures
//!
//! Usage:
//!   cargo run --bin accept_expected            # Update all
//!   cargo run --bin accept_expected -- blocks  # Update only fixtures matching "blocks"

use hawk_templates::{DirectorySource, Engine, Options, Value};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

fn main() {
    let filter: Option<String> = std::env::args().nth(1);
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures");

    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let mut updated = 0;
    let mut skipped = 0;

    for entry in WalkDir::new(&fixtures)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|s| s == "hwk").unwrap_or(false))
    {
        let path = entry.path();
        let path_str = path.to_string_lossy();

        // Only fixtures that already opted in are cases; the rest are layouts and partials
        if !path.with_extension("expected.html").exists() {
            continue;
        }

        if let Some(ref f) = filter {
            if !path_str.contains(f) {
                skipped += 1;
                continue;
            }
        }

        if runtime.block_on(process_file(&fixtures, path)) {
            updated += 1;
        }
    }

    println!("Updated {} files, skipped {}", updated, skipped);
}

async fn process_file(fixtures: &Path, path: &Path) -> bool {
    let name = match path.strip_prefix(fixtures) {
        Ok(relative) => relative.with_extension("").to_string_lossy().replace('\\', "/"),
        Err(_) => return false,
    };

    let vars_path = path.with_extension("vars.json");
    let vars = match fs::read_to_string(&vars_path) {
        Ok(json) => match serde_json::from_str::<serde_json::Value>(&json) {
            Ok(value) => Value::from(value),
            Err(e) => {
                eprintln!("Invalid variables in {:?}: {}", vars_path, e);
                return false;
            }
        },
        Err(_) => Value::object(Default::default()),
    };

    let engine = Engine::with_source(Options::default(), DirectorySource::new(fixtures));
    match engine.render(&name, vars).finish().await {
        Ok(html) => {
            let expected = path.with_extension("expected.html");
            if let Err(e) = fs::write(&expected, html) {
                eprintln!("Failed to write {:?}: {}", expected, e);
                return false;
            }
            println!("  wrote {}", expected.display());
            true
        }
        Err(e) => {
            eprintln!("Render failed for {}: {}", name, e);
            false
        }
    }
}
