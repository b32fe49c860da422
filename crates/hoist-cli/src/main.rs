use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hoist_config::HoistConfig;
use hoist_index::Index;
use hoist_refactor::{
    commit, generate_preview, make_method_top_level, ArgumentStyle, CallSiteRewrite, FilePreview,
    FileId, MakeTopLevelError, MakeTopLevelOptions, MakeTopLevelParams, NewFunction,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

mod apply;

#[derive(Parser)]
#[command(name = "hoist", version, about = "Hoist: turn Python methods into module-level functions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Move a method out of its class and rewrite every call site
    MakeTopLevel(MakeTopLevelArgs),
    /// Print parse errors for a single file
    Parse(ParseArgs),
}

#[derive(Args)]
struct MakeTopLevelArgs {
    /// File declaring the class
    file: PathBuf,
    /// Class declaring the method (nested classes are searched too)
    #[arg(long = "class")]
    class_name: String,
    /// Method to convert
    #[arg(long)]
    method: String,
    /// Workspace root (defaults to current directory)
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Config file (defaults to `hoist.toml` in the workspace root)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the changes instead of only printing the diff
    #[arg(long)]
    apply: bool,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ParseArgs {
    /// File to parse
    file: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::MakeTopLevel(args) => make_top_level(args),
        Command::Parse(args) => parse(args),
    }
}

#[derive(Serialize)]
struct MakeTopLevelReport<'a> {
    status: &'static str,
    function: &'a NewFunction,
    argument_style: ArgumentStyle,
    call_sites: &'a [CallSiteRewrite],
    files: &'a [FilePreview],
    applied: bool,
}

#[derive(Serialize)]
struct RejectionReport {
    status: &'static str,
    error: String,
}

fn make_top_level(args: MakeTopLevelArgs) -> Result<i32> {
    let config = match &args.config {
        Some(path) => HoistConfig::load_from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => HoistConfig::discover(&args.root).context("failed to load hoist.toml")?,
    };
    hoist_config::init_tracing(&config.logging);

    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("workspace root {} not found", args.root.display()))?;
    let file = file_id_in(&root, &args.file)?;
    let index = Index::load(&root, config.refactor.source_roots.clone())
        .with_context(|| format!("failed to scan {}", root.display()))?;
    tracing::debug!(target: "hoist.cli", root = %root.display(), %file, "workspace loaded");

    let params = MakeTopLevelParams {
        file,
        class_name: args.class_name,
        method_name: args.method,
    };
    let options = MakeTopLevelOptions {
        temp_name: config.refactor.temp_name.clone(),
    };

    let plan = match make_method_top_level(&index, &index, &params, &options) {
        Ok(plan) => plan,
        Err(err) if err.is_rejection() => return report_rejection(&err, args.json),
        Err(err) => return Err(err).context("make-top-level failed"),
    };

    let preview = generate_preview(&index, &plan).context("failed to render preview")?;
    if args.apply {
        let original = index.snapshot();
        let changed = commit(&original, &plan).context("failed to apply edits")?;
        let written = apply::write_changes(&root, &original, &changed)?;
        tracing::info!(target: "hoist.cli", files = written.len(), "changes written");
    }

    if args.json {
        let report = MakeTopLevelReport {
            status: "ok",
            function: &plan.new_function,
            argument_style: plan.argument_style,
            call_sites: &plan.call_sites,
            files: &preview.files,
            applied: args.apply,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", preview.unified_diff());
    }
    Ok(0)
}

fn report_rejection(err: &MakeTopLevelError, json: bool) -> Result<i32> {
    if json {
        let report = RejectionReport {
            status: "rejected",
            error: err.to_string(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        eprintln!("refactoring rejected: {err}");
    }
    Ok(1)
}

/// Workspace-relative `/`-separated id of `path`.
fn file_id_in(root: &Path, path: &Path) -> Result<FileId> {
    let absolute = path
        .canonicalize()
        .with_context(|| format!("file {} not found", path.display()))?;
    let relative = absolute.strip_prefix(root).with_context(|| {
        format!(
            "{} is not inside the workspace root {}",
            path.display(),
            root.display()
        )
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(FileId::new(parts.join("/")))
}

#[derive(Serialize)]
struct ParseErrorReport {
    line: usize,
    column: usize,
    message: String,
}

fn parse(args: ParseArgs) -> Result<i32> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let result = hoist_syntax::parse(&text);
    let errors: Vec<ParseErrorReport> = result
        .errors
        .iter()
        .map(|error| {
            let (line, column) = line_col(&text, error.range.start);
            ParseErrorReport {
                line,
                column,
                message: error.message.clone(),
            }
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&errors)?);
    } else if errors.is_empty() {
        println!("{}: ok", args.file.display());
    } else {
        for error in &errors {
            println!(
                "{}:{}:{}: {}",
                args.file.display(),
                error.line,
                error.column,
                error.message
            );
        }
    }
    Ok(if errors.is_empty() { 0 } else { 1 })
}

/// 1-based line and column (in characters) of `offset`.
fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let before = &text[..offset.min(text.len())];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |idx| idx + 1);
    (line, before[line_start..].chars().count() + 1)
}
