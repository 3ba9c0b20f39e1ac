use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{error::ErrorKind, CommandFactory, Parser as ClapParser, ValueEnum};
use hashbrown::HashSet;
use p4mid::{
    ir::{prelude, print::render_program, Program},
    middle::{
        pass::{CompilationContext, Pass, PipelineOptions},
        passes::{standard_pipeline, CallGraph},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Json,
    P4,
}

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The program to compile, as JSON
    input: PathBuf,

    /// Run only these passes (comma separated); name resolution and type
    /// inference always run
    #[arg(long, value_delimiter = ',')]
    passes: Option<Vec<String>>,

    /// Abort after the first pass that reports an error
    #[arg(long)]
    stop_on_error: bool,

    /// Upper bound on the sweeps of the parser analysis
    #[arg(long, default_value_t = 16)]
    max_parser_iterations: usize,

    #[arg(long, value_enum, default_value_t = Emit::P4)]
    emit: Emit,

    /// Print the call graph of the resulting program instead of the program
    #[arg(long)]
    call_graph: bool,
}

impl Args {
    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            stop_on_error: self.stop_on_error,
            max_parser_iterations: self.max_parser_iterations,
            passes: self.passes.clone(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if !args.input.is_file() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Input path '{}' is not a file!", args.input.display()),
            )
            .exit()
    }

    let contents = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let input: Program = serde_json::from_str(&contents)
        .with_context(|| format!("parsing {}", args.input.display()))?;

    let prelude = prelude::standard_prelude();
    let prelude_names = prelude.iter().map(|d| d.name.symbol).collect::<HashSet<_>>();
    let mut declarations = prelude;
    declarations.extend(input.declarations.iter().cloned());

    let mut context = CompilationContext::new(args.options());
    let mut pipeline = standard_pipeline(&context.options);
    log::info!("running {} passes", pipeline.len());

    let result = pipeline.run(Program::new(declarations), &mut context);
    let color = colored::control::SHOULD_COLORIZE.should_colorize();
    context.diagnostics.emit(color);

    let program = result?;
    if context.diagnostics.has_errors() {
        bail!(
            "compilation failed with {} error(s)",
            context.diagnostics.error_count()
        );
    }

    if args.call_graph {
        let graph = CallGraph::build(&program, &context.reference_map, &mut context.type_map)?;
        match args.emit {
            Emit::Json => println!("{}", serde_json::to_string_pretty(&graph)?),
            Emit::P4 => print!("{graph}"),
        }
        return Ok(());
    }

    let user = Program::new(
        program
            .declarations
            .iter()
            .filter(|d| !prelude_names.contains(&d.name.symbol))
            .cloned()
            .collect(),
    );
    match args.emit {
        Emit::Json => println!("{}", serde_json::to_string_pretty(&*user)?),
        Emit::P4 => print!("{}", render_program(&user, color)),
    }

    Ok(())
}
