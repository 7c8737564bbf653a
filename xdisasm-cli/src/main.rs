// CLI front-end for xdisasm-core.
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use xdisasm_core::config::EngineConfig;
use xdisasm_core::cpu::{CpuProfile, Mode, RegisterId};
use xdisasm_core::engine::DisassemblyEngine;

mod project;

#[derive(Parser)]
#[command(name = "xdisasm")]
#[command(about = "Recursive/linear-sweep x86 and x86_64 disassembly engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the disassembly engine over a project directory and report
    /// recovered functions, basic blocks, and CFG edges.
    Analyze {
        /// Directory containing the project's `image.json`.
        project_dir: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let Commands::Analyze { project_dir } = cli.command;

    let (image, decoder) = match project::load_project(&project_dir) {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("{e:#}");
            return Ok(ExitCode::from(1));
        }
    };

    let cpu = cpu_profile_for_arch(xdisasm_core::image::ImageProvider::arch(&image));
    let config = EngineConfig::default();
    let mut engine = DisassemblyEngine::new(&image, &decoder, cpu, config);

    if let Err(e) = engine.disassemble() {
        log::error!("engine error: {e}");
        return Ok(ExitCode::from(2));
    }

    let function_count = engine
        .basic_blocks()
        .filter(|bb| engine.is_marked(bb.start_address, xdisasm_core::shadow::bits::FUNCTION))
        .count();
    let basic_block_count = engine.basic_blocks().count();
    let cfg_edge_count = engine.cfg().get_edges().count();

    println!("functions (approx.): {function_count}");
    println!("basic blocks: {basic_block_count}");
    println!("cfg edges: {cfg_edge_count}");

    Ok(ExitCode::SUCCESS)
}

/// Minimal per-arch register tables for the two architectures the image
/// provider contract names (`"i386"`, `"x86_64"`). A production front-end
/// would source these from its decoder backend instead of hard-coding them
/// here.
fn cpu_profile_for_arch(arch: &str) -> CpuProfile {
    match arch {
        "x86_64" => CpuProfile::new(
            Mode::Protected64,
            RegisterId(1),
            RegisterId(2),
            vec![RegisterId(10), RegisterId(11), RegisterId(12)],
            RegisterId(10), // SS
            RegisterId(11), // FS
            RegisterId(12), // GS
            (0..16).map(RegisterId).collect(),
        ),
        _ => CpuProfile::new(
            Mode::Protected32,
            RegisterId(1),
            RegisterId(2),
            vec![RegisterId(10), RegisterId(11), RegisterId(12)],
            RegisterId(10), // SS
            RegisterId(11), // FS
            RegisterId(12), // GS
            (0..8).map(RegisterId).collect(),
        ),
    }
}
