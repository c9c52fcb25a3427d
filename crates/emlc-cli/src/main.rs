//! `emlc-debug`: compiles a JSON model with every port exposed and checks each port of
//! the compiled artifact against direct interpretation of the graph.

mod comparison;
mod model_file;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use emlc::backend::Target;
use emlc::optimizer::detach_boundary;
use emlc::MapCompilerOptions;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TargetArg {
    Host,
    Embedded,
}

impl TargetArg {
    fn target(self) -> Target {
        match self {
            TargetArg::Host => Target::host(),
            TargetArg::Embedded => Target::embedded(),
        }
    }
}

/// Compare a compiled model against its interpreted graph, port by port.
#[derive(Parser, Debug)]
#[command(name = "emlc-debug", version, about, long_about = None)]
struct Args {
    /// JSON model description.
    #[arg(long)]
    model: PathBuf,

    /// Directory receiving the report, graphs and generated C.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = TargetArg::Host)]
    target: TargetArg,

    /// Largest accepted absolute difference per element.
    #[arg(long, default_value_t = 1e-4)]
    tolerance: f32,

    /// Seed for the generated inputs.
    #[arg(long, default_value = "123")]
    seed: String,

    /// Write `report.md`.
    #[arg(long)]
    report: bool,

    /// Write `graph.dot` and `graph.dgml`.
    #[arg(long)]
    graph: bool,

    /// Write the compiled map as `<function>.c`.
    #[arg(long)]
    emit_c: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    if !args.model.is_file() {
        anyhow::bail!("model file {} does not exist", args.model.display());
    }
    let map = model_file::load_map(&args.model)?;
    let options = MapCompilerOptions::default().with_target(args.target.target());
    let map = detach_boundary(map, &options).context("failed to detach model boundary")?;
    info!(
        model = %args.model.display(),
        nodes = map.model().len(),
        inputs = map.inputs().len(),
        "loaded model"
    );

    let inputs = comparison::random_inputs(&map, &args.seed)?;
    if args.emit_c {
        let compiled = emlc::MapCompiler::new(options.clone())
            .compile(&map)
            .context("compilation failed")?;
        let source = emlc_backend_c::render_c_module(&compiled)?;
        let path = output_path(&args.output_dir, &format!("{}.c", compiled.name()))?;
        fs::write(&path, source).with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "wrote C module");
    }

    let result = comparison::compare(map, &inputs, &options, args.tolerance)?;

    if args.report {
        let path = output_path(&args.output_dir, "report.md")?;
        let mut out = BufWriter::new(create(&path)?);
        result.write_report(&mut out, &args.model.display().to_string(), &args.seed)?;
        out.flush()?;
        info!(path = %path.display(), "wrote report");
    }
    if args.graph {
        let mut dot = BufWriter::new(create(&output_path(&args.output_dir, "graph.dot")?)?);
        result.save_dot(&mut dot)?;
        dot.flush()?;
        let mut dgml = BufWriter::new(create(&output_path(&args.output_dir, "graph.dgml")?)?);
        result.save_dgml(&mut dgml)?;
        dgml.flush()?;
        info!(dir = %args.output_dir.display(), "wrote graphs");
    }

    if !result.passed() {
        warn!(
            failures = result.failures(),
            tolerance = args.tolerance,
            "compiled ports differ from interpretation"
        );
    }
    println!("{}", result.summary());
    Ok(())
}

fn output_path(dir: &Path, file: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir.join(file))
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("failed to create {}", path.display()))
}
