use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use url::Url;
use zonediff::config::{SettingsEventKind, SettingsManager, load_settings};
use zonediff::diff::{DiffKind, LineDiff, diff_lines};
use zonediff::{Engine, EngineError, EngineResult, MemoryBuffer};

/// Line diffs and search/replace patches for text files
#[derive(Parser)]
#[command(name = "zonediff")]
#[command(version)]
#[command(about = "Line diffs and search/replace patches for text files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a file of ORIGINAL/UPDATED search/replace blocks to a file
    Apply {
        /// The file to patch
        file: PathBuf,

        /// File containing the search/replace blocks
        patch_file: PathBuf,

        /// Require every ORIGINAL section to match exactly, whitespace included
        #[arg(long)]
        exact: bool,

        /// Print the resulting changes without writing the file
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the line diff between two files
    Diff {
        original: PathBuf,
        modified: PathBuf,

        /// Print the operations as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective settings as TOML
    Config {
        /// Project directory whose zonediff.toml is layered on top (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Apply {
            file,
            patch_file,
            exact,
            dry_run,
        } => apply(&file, &patch_file, exact, dry_run),
        Commands::Diff {
            original,
            modified,
            json,
        } => diff(&original, &modified, json),
        Commands::Config { root } => print_config(root),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_manager(root: &Path) -> SettingsManager {
    let outcome = load_settings(Some(root));
    for event in &outcome.events {
        if event.kind == SettingsEventKind::Warning {
            eprintln!("Warning: {}", event.message);
        }
    }
    SettingsManager::new(outcome.settings)
}

fn apply(file: &Path, patch_file: &Path, exact: bool, dry_run: bool) -> EngineResult<()> {
    let file = file.canonicalize()?;
    let text = std::fs::read_to_string(&file)?;
    let patch_text = std::fs::read_to_string(patch_file)?;

    let root = file.parent().unwrap_or(Path::new("."));
    let manager = load_manager(root);
    let allow_fallback = !exact && manager.settings().patch.whitespace_fallback;

    let uri = Url::from_file_path(&file).map_err(|_| {
        EngineError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a file path: {}", file.display()),
        ))
    })?;
    let mut engine = Engine::new(manager.into());
    engine.open_document(uri.clone(), Box::new(MemoryBuffer::new(text)));

    let Some(zone) = engine.apply_patch_to_document(&uri, &patch_text, allow_fallback)? else {
        eprintln!("No changes");
        return Ok(());
    };

    if let Some(edit_zone) = engine.region(zone).and_then(|r| r.as_edit_zone()) {
        let mut diffs: Vec<_> = edit_zone.diffs().collect();
        diffs.sort_by_key(|d| (d.start_line, d.original_start_line));
        for d in diffs {
            print_hunk(
                d.kind,
                (d.original_start_line, d.original_end_line),
                (d.start_line, d.end_line),
                &d.original_code,
                &d.code,
            );
        }
    }

    if !dry_run {
        std::fs::write(&file, engine.document_text(&uri)?)?;
        eprintln!("Patched {}", file.display());
    }
    Ok(())
}

fn diff(original: &Path, modified: &Path, json: bool) -> EngineResult<()> {
    let old = std::fs::read_to_string(original)?;
    let new = std::fs::read_to_string(modified)?;
    let hunks = diff_lines(&old, &new);

    if json {
        let out = serde_json::to_string_pretty(&hunks)
            .map_err(|e| EngineError::invalid_state(e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }
    for LineDiff {
        kind,
        start_line,
        end_line,
        original_start_line,
        original_end_line,
        code,
        original_code,
    } in &hunks
    {
        print_hunk(
            *kind,
            (*original_start_line, *original_end_line),
            (*start_line, *end_line),
            original_code,
            code,
        );
    }
    Ok(())
}

fn print_hunk(
    kind: DiffKind,
    original: (usize, usize),
    modified: (usize, usize),
    original_code: &str,
    code: &str,
) {
    println!(
        "@@ {:?} -{},{} +{},{} @@",
        kind, original.0, original.1, modified.0, modified.1
    );
    if kind != DiffKind::Insertion {
        for line in original_code.split('\n') {
            println!("-{}", line);
        }
    }
    if kind != DiffKind::Deletion {
        for line in code.split('\n') {
            println!("+{}", line);
        }
    }
}

fn print_config(root: Option<PathBuf>) -> EngineResult<()> {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let outcome = load_settings(Some(&root));
    for event in &outcome.events {
        eprintln!("{:?}: {}", event.kind, event.message);
    }
    let out =
        toml::to_string_pretty(&outcome.settings).map_err(|e| EngineError::config(e.to_string()))?;
    print!("{}", out);
    Ok(())
}
