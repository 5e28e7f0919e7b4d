//! chunkvault CLI - drive a project engine from the command line
//!
//! A thin driver over the library: open or create a project, stage and
//! fetch chunks, and manage checkpoints. One engine is attached per
//! invocation and detached on exit.

use std::path::PathBuf;
use std::sync::Arc;

use chunkvault::{ChunkEngine, EngineConfig, EngineObserver, DEFAULT_RETENTION};

/// Prints engine events to the terminal
struct ConsoleObserver;

impl EngineObserver for ConsoleObserver {
    fn on_status(&self, message: &str) {
        println!("  {}", message);
    }

    fn on_sync(&self) {
        println!("  committed to disk");
    }

    fn on_fault(&self, message: &str) {
        eprintln!("  FAULT: {}", message);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    let mut base_dir = PathBuf::from("user_projects");
    let mut rest: Vec<String> = Vec::new();

    // Simple argument parsing
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--base-dir" | "-d" => {
                if i + 1 < args.len() {
                    base_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => rest.push(other.to_string()),
        }
        i += 1;
    }

    if rest.is_empty() {
        print_help();
        return Ok(());
    }

    let config = EngineConfig::with_base_dir(&base_dir);
    let observer = Arc::new(ConsoleObserver);

    match rest[0].as_str() {
        "list" => {
            for project in ChunkEngine::list_projects(&base_dir) {
                println!("{}", project);
            }
        }
        "new" => {
            let id = arg(&rest, 1, "new <id>")?;
            let engine = ChunkEngine::create(id, config, observer)?;
            println!("created project '{}'", engine.project_id());
        }
        "stage" => {
            let id = arg(&rest, 1, "stage <id> <chunk> <json>")?;
            let chunk = arg(&rest, 2, "stage <id> <chunk> <json>")?;
            let body = arg(&rest, 3, "stage <id> <chunk> <json>")?;
            let value: serde_json::Value = serde_json::from_str(body)?;

            let engine = ChunkEngine::open(id, config, observer)?;
            engine.stage_update(chunk, value)?;
            engine.force_sync()?;
        }
        "show" => {
            let id = arg(&rest, 1, "show <id> <chunk>")?;
            let chunk = arg(&rest, 2, "show <id> <chunk>")?;

            let engine = ChunkEngine::open(id, config, observer)?;
            let value = engine.fetch_chunk(chunk)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        "checkpoint" => {
            let id = arg(&rest, 1, "checkpoint <id> <label> [notes]")?;
            let label = arg(&rest, 2, "checkpoint <id> <label> [notes]")?;
            let notes = rest.get(3).map(String::as_str).unwrap_or("");

            let engine = ChunkEngine::open(id, config, observer)?;
            let name = engine.create_checkpoint(label, notes, DEFAULT_RETENTION)?;
            println!("{}", name);
        }
        "checkpoints" => {
            let id = arg(&rest, 1, "checkpoints <id>")?;

            let engine = ChunkEngine::open(id, config, observer)?;
            for info in engine.list_checkpoints() {
                println!("{}  {}  {}", info.date, info.label, info.filename);
            }
        }
        "restore" => {
            let id = arg(&rest, 1, "restore <id> <zip>")?;
            let zip_name = arg(&rest, 2, "restore <id> <zip>")?;

            let engine = ChunkEngine::open(id, config, observer)?;
            engine.restore_checkpoint(zip_name)?;
        }
        "health" => {
            let id = arg(&rest, 1, "health <id>")?;

            let engine = ChunkEngine::open(id, config, observer)?;
            println!("{}", serde_json::to_string_pretty(&engine.health_report())?);
        }
        "delete" => {
            let id = arg(&rest, 1, "delete <id> --confirm")?;
            let confirmed = rest.get(2).map(String::as_str) == Some("--confirm");

            let engine = ChunkEngine::open(id, config, observer)?;
            if !engine.delete_project(confirmed)? {
                eprintln!("refusing to delete '{}' without --confirm", id);
            }
        }
        other => {
            eprintln!("unknown command '{}'", other);
            print_help();
        }
    }

    Ok(())
}

fn arg<'a>(rest: &'a [String], index: usize, usage: &str) -> Result<&'a str, String> {
    rest.get(index)
        .map(String::as_str)
        .ok_or_else(|| format!("usage: chunkvault {}", usage))
}

fn print_help() {
    println!("chunkvault - crash-safe JSON document store");
    println!();
    println!("Usage: chunkvault [OPTIONS] <COMMAND>");
    println!();
    println!("Options:");
    println!("  -d, --base-dir DIR    Root directory for projects (default: user_projects)");
    println!("  -h, --help            Show this help");
    println!();
    println!("Commands:");
    println!("  list                          List projects");
    println!("  new <id>                      Create a project");
    println!("  stage <id> <chunk> <json>     Stage a value and sync it");
    println!("  show <id> <chunk>             Print a chunk");
    println!("  checkpoint <id> <label> [notes]  Create a checkpoint");
    println!("  checkpoints <id>              List checkpoints");
    println!("  restore <id> <zip>            Restore from a checkpoint");
    println!("  health <id>                   Print a health report");
    println!("  delete <id> --confirm         Delete a project");
}
