//! Tailor Command Line Interface
//!
//! Compile markup and render it, or inspect what the compiler found.
//!
//! # Usage
//!
//! ```bash
//! # Render with bindings from a file plus inline overrides
//! tailor render --file Entity.java.cml --grammar code-ml --bindings fields.yaml --set name=Person
//!
//! # List the marks of a document
//! cat page.bml | tailor marks
//!
//! # Reconstruct the source from the compiled Dom
//! tailor markup --file page.bml
//! ```

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use markup_tailor::config::{load_bindings, TailorConfig};
use markup_tailor::{Compiler, Context, Dom, FileSource, Grammar, StringSource, Value};

#[derive(Parser)]
#[command(name = "tailor")]
#[command(version)]
#[command(about = "Compile marked-up text and tailor it against bindings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Grammar of the input; overrides the config file
    #[arg(long, short, global = true, value_enum)]
    grammar: Option<GrammarArg>,

    /// Config file (YAML or JSON); defaults to $TAILOR_CONFIG or ./tailor.yaml
    #[arg(long, short, global = true, env = "TAILOR_CONFIG")]
    config: Option<PathBuf>,

    /// Output format for inspection commands
    #[arg(long, short = 'o', global = true, default_value = "pretty", value_enum)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GrammarArg {
    BindMl,
    CodeMl,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and render markup
    Render {
        /// Input file (reads stdin if not provided)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Binding files (YAML, or JSON by extension), applied in order
        #[arg(short, long)]
        bindings: Vec<PathBuf>,

        /// Inline binding NAME=VALUE; a comma separated VALUE binds a list
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,

        /// Write the result here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List the marks found in markup
    Marks {
        /// Input file (reads stdin if not provided)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Print the markup reconstructed from the compiled Dom
    Markup {
        /// Input file (reads stdin if not provided)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

// =============================================================================
// MAIN
// =============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => TailorConfig::load(path)?,
        None => TailorConfig::from_env()?,
    };
    let grammar = match cli.grammar {
        Some(GrammarArg::BindMl) => Grammar::bind_ml(),
        Some(GrammarArg::CodeMl) => Grammar::code_ml(),
        None => config.grammar()?,
    };
    let compiler = Compiler::new(grammar);

    match cli.command {
        Commands::Render {
            file,
            bindings,
            set,
            output,
        } => cmd_render(&compiler, &config, file, &bindings, &set, output),
        Commands::Marks { file } => cmd_marks(&compiler, file, cli.format),
        Commands::Markup { file } => {
            print!("{}", compile(&compiler, file)?.markup());
            Ok(())
        }
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

fn cmd_render(
    compiler: &Compiler,
    config: &TailorConfig,
    file: Option<PathBuf>,
    bindings: &[PathBuf],
    set: &[String],
    output: Option<PathBuf>,
) -> Result<()> {
    let dom = compile(compiler, file)?;

    let mut ctx = Context::new();
    config.apply(&mut ctx)?;
    for path in bindings {
        for (name, value) in load_bindings(path)? {
            ctx.set(name, value);
        }
    }
    for assignment in set {
        let (name, value) = parse_assignment(assignment)?;
        ctx.set(name, value);
    }

    let rendered = dom.tailor(&mut ctx)?;
    match output {
        Some(path) => std::fs::write(&path, rendered)
            .with_context(|| format!("Failed to write '{}'", path.display()))?,
        None => print!("{}", rendered),
    }
    Ok(())
}

fn cmd_marks(compiler: &Compiler, file: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let dom = compile(compiler, file)?;
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "metadata": dom.metadata(),
                "directives": dom.directive_names(),
                "marks": dom.marks().iter().map(|m| serde_json::json!({
                    "line": m.line,
                    "kind": m.kind_name(),
                    "text": m.text,
                    "blank": m.fills_blank(),
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Pretty => {
            println!(
                "{} {} mark(s), {} blank(s)",
                "OK".green(),
                dom.marks().len(),
                dom.blanks().count()
            );
            for mark in dom.marks() {
                let kind = if mark.fills_blank() {
                    mark.kind_name().cyan()
                } else {
                    mark.kind_name().dimmed()
                };
                println!("  {:>4}  {:<32} {}", mark.line, kind, mark.text.trim_end());
            }
        }
    }
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

fn compile(compiler: &Compiler, file: Option<PathBuf>) -> Result<Dom> {
    let dom = match file {
        Some(path) => compiler.compile(&FileSource::new(path))?,
        None => {
            if io::stdin().is_terminal() {
                bail!("No input provided. Use --file or pipe input via stdin.");
            }
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            compiler.compile(&StringSource::named("stdin", buffer))?
        }
    };
    Ok(dom)
}

fn parse_assignment(assignment: &str) -> Result<(String, Value)> {
    let (name, value) = assignment
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected NAME=VALUE, got '{}'", assignment))?;
    let value = if value.contains(',') {
        Value::List(value.split(',').map(|v| Value::from(v.trim())).collect())
    } else {
        Value::from(value)
    };
    Ok((name.trim().to_string(), value))
}
