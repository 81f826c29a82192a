mod output;

use std::{
    fmt, fs,
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tacit_ir::{ir_writer::ProgramWriter, CfgConfig, ControlFlowGraph, Function, Program};
use tacit_middle::{
    optim::{Pass, Pipeline, Step},
    solve, DataflowConfig, DomTree, DominatorTreeTraversable, LiveVariables, ReachingDefinitions,
    ReachingDefsMode, SsaConfig, UNDEF_NAME,
};
use tacit_verifier::{verify_program, VerifierConfig};
use tracing_subscriber::EnvFilter;

use output::{def_name, BlockDominance, BlockFlow, FuncReport, Report};

/// Middle-end toolkit for the tacit three-address-code IR.
///
/// Reads a program in JSON form and prints the transformed program or the
/// requested analysis. Set `TACIT_LOG` to control log output on stderr.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input program. Reads stdin when omitted or `-`.
    #[arg(short, long, value_name = "FILE", global = true)]
    input: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Format::Json, global = true)]
    format: Format,

    /// Accept blocks that are unreachable from the entry.
    #[arg(long, global = true)]
    allow_unreachable: bool,

    /// Give up on an analysis after this many visits per block.
    #[arg(long, default_value_t = 256, global = true)]
    max_visits: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert every function to SSA form.
    Ssa {
        /// Rename variables that are only used in their defining block too.
        #[arg(long)]
        rename_locals: bool,

        /// Phi argument for edges along which a variable is undefined.
        #[arg(long, default_value = UNDEF_NAME)]
        undef_name: String,

        /// Check the result with the SSA verifier.
        #[arg(long)]
        verify: bool,
    },
    /// Local value numbering with constant folding.
    Lvn,
    /// Trivial dead code elimination.
    Dce,
    /// Run `lvn` and `dce` until nothing changes.
    Opt {
        /// Convert to SSA form first.
        #[arg(long)]
        ssa: bool,

        #[arg(long, default_value_t = 16)]
        max_iterations: usize,
    },
    /// Definitions reaching the top and the bottom of every block.
    ReachingDefs {
        /// Let later definitions of a variable kill earlier ones.
        #[arg(long)]
        kill: bool,
    },
    /// Variables live at the top and the bottom of every block.
    LiveVars,
    /// Dominators, immediate dominators, dominator tree and dominance frontiers.
    Dominators,
    /// Check that every function is in SSA form.
    Verify,
}

fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let mut program = read_program(args.input.as_deref())?;
    tracing::debug!(functions = program.functions.len(), "program loaded");

    let cfg_config = CfgConfig {
        allow_unreachable_blocks: args.allow_unreachable,
    };
    let dataflow_config = DataflowConfig {
        max_visits_per_block: args.max_visits,
    };

    match args.command {
        Command::Ssa {
            rename_locals,
            undef_name,
            verify,
        } => {
            let mut pipeline = Pipeline::new();
            pipeline.config.ssa = SsaConfig {
                rename_locals,
                undef_name: undef_name.clone(),
            };
            pipeline.add_step(Step::Ssa);
            pipeline.run(&mut program)?;

            if verify {
                let config = VerifierConfig {
                    undef_name,
                    allow_unreachable_blocks: args.allow_unreachable,
                    ..VerifierConfig::default()
                };
                let report = verify_program(&program, &config);
                if report.has_errors() {
                    eprint!("{report}");
                    bail!("SSA conversion produced an invalid program");
                }
            }
            emit_program(&program, args.format)
        }

        Command::Lvn => run_step(&mut program, Step::FuncPasses(vec![Pass::Lvn]), args.format),
        Command::Dce => run_step(&mut program, Step::FuncPasses(vec![Pass::Dce]), args.format),
        Command::Opt {
            ssa,
            max_iterations,
        } => {
            let mut pipeline = Pipeline::new();
            pipeline.config.max_iterations = max_iterations;
            if ssa {
                pipeline.add_step(Step::Ssa);
            }
            pipeline.add_step(Step::FixedPoint(vec![Pass::Lvn, Pass::Dce]));
            pipeline.run(&mut program)?;
            emit_program(&program, args.format)
        }

        Command::ReachingDefs { kill } => {
            let mode = if kill {
                ReachingDefsMode::Kill
            } else {
                ReachingDefsMode::KillFree
            };
            let report = collect(&program, &cfg_config, |func, cfg| {
                let analysis = ReachingDefinitions::new(&func.args, mode);
                let results = solve(&analysis, cfg, &dataflow_config)?;
                Ok(BlockFlow::collect(cfg, &results, |defs| {
                    defs.iter().map(|def| def_name(cfg, def)).collect()
                }))
            })?;
            emit(&report, args.format)
        }

        Command::LiveVars => {
            let report = collect(&program, &cfg_config, |_, cfg| {
                let results = solve(&LiveVariables, cfg, &dataflow_config)?;
                Ok(BlockFlow::collect(cfg, &results, |vars| {
                    vars.iter().cloned().collect()
                }))
            })?;
            emit(&report, args.format)
        }

        Command::Dominators => {
            let report = collect(&program, &cfg_config, |_, cfg| {
                let mut domtree = DomTree::new();
                domtree.compute(cfg);
                let mut tree = DominatorTreeTraversable::default();
                tree.compute(&domtree);
                let df = domtree.compute_df(cfg);
                Ok(BlockDominance::collect(cfg, &domtree, &tree, &df))
            })?;
            emit(&report, args.format)
        }

        Command::Verify => {
            let config = VerifierConfig {
                allow_unreachable_blocks: args.allow_unreachable,
                ..VerifierConfig::default()
            };
            let report = verify_program(&program, &config);
            match args.format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                Format::Text => println!("{report}"),
            }
            if report.has_errors() {
                bail!("verification failed");
            }
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TACIT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_program(input: Option<&Path>) -> Result<Program> {
    match input {
        Some(path) if path != Path::new("-") => {
            let file = fs::File::open(path)
                .with_context(|| format!("failed to open `{}`", path.display()))?;
            Program::from_reader(BufReader::new(file))
                .with_context(|| format!("failed to load `{}`", path.display()))
        }
        _ => Program::from_reader(io::stdin().lock()).context("failed to load stdin"),
    }
}

fn run_step(program: &mut Program, step: Step, format: Format) -> Result<()> {
    let mut pipeline = Pipeline::new();
    pipeline.add_step(step);
    pipeline.run(program)?;
    emit_program(program, format)
}

/// Splits every function into blocks and runs `analyze` on it.
fn collect<B>(
    program: &Program,
    cfg_config: &CfgConfig,
    mut analyze: impl FnMut(&Function, &ControlFlowGraph) -> Result<Vec<B>>,
) -> Result<Report<B>> {
    let functions = program
        .functions
        .iter()
        .map(|func| {
            let cfg = ControlFlowGraph::compute(func, cfg_config)?;
            let blocks = analyze(func, &cfg)
                .with_context(|| format!("analysis of `@{}` failed", func.name))?;
            Ok(FuncReport {
                name: func.name.clone(),
                blocks,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Report { functions })
}

fn emit_program(program: &Program, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", program.to_json_pretty()),
        Format::Text => print!("{}", ProgramWriter::new(program)),
    }
    Ok(())
}

fn emit<T: Serialize + fmt::Display>(value: &T, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Format::Text => print!("{value}"),
    }
    Ok(())
}
