//! VM Pager - Main Entry Point
//!
//! Loads a NOFF executable into a simulated machine with demand paging, then
//! replays a reference trace against it.
//!
//! Usage: vm-pager [OPTIONS] <image> <trace_file> <output_file>

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use vm_pager::fs::HostFileSystem;
use vm_pager::io::{read_trace, write_results};
use vm_pager::translation::VirtualAddress;
use vm_pager::{Kernel, PolicyKind, RunOutcome, SimMachine, VmConfig, VmError};

/// Demand-paged virtual memory simulator
#[derive(Debug, Parser)]
#[command(name = "vm-pager", version)]
struct Cli {
    /// Print every reference and enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// TOML file with machine and pager settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Page replacement policy, overrides the config file
    #[arg(long, value_enum)]
    policy: Option<PolicyKind>,

    /// Number of physical frames, overrides the config file
    #[arg(long)]
    frames: Option<usize>,

    /// NOFF executable to load
    image: PathBuf,

    /// Reference trace: `<vaddr>` reads, `w<vaddr>=<byte>` writes
    trace_file: PathBuf,

    /// Output file for physical addresses
    output_file: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<VmConfig, VmError> {
    let mut config = match &cli.config {
        Some(path) => VmConfig::from_file(path)?,
        None => VmConfig::default(),
    };
    if let Some(policy) = cli.policy {
        config.policy = policy;
    }
    if let Some(frames) = cli.frames {
        config.num_phys_pages = frames;
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli) -> Result<(), VmError> {
    // Step 1: settings
    let config = load_config(cli)?;

    // Step 2: machine and kernel, images are looked up next to the given one
    let root = cli.image.parent().unwrap_or(Path::new(".")).to_path_buf();
    let name = cli
        .image
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| VmError::ImageNotFound(cli.image.display().to_string()))?
        .to_string();

    let mut machine = SimMachine::new(config.num_phys_pages);
    let trace = read_trace(&cli.trace_file)?;
    if cli.verbose {
        eprintln!("=== VM Pager ===");
        eprintln!("Image:       {}", cli.image.display());
        eprintln!("Trace file:  {}", cli.trace_file.display());
        eprintln!("Output file: {}", cli.output_file.display());
        eprintln!("Frames:      {}", config.num_phys_pages);
        eprintln!("Policy:      {}", config.policy);
        eprintln!("References:  {}", trace.len());
        eprintln!();
    }
    machine.push_trace(trace);

    let mut kernel = Kernel::new(config, machine, Box::new(HostFileSystem::new(root)))?;

    // Step 3: load and run
    let outcome = kernel.execute(&name)?;
    let references = kernel.machine_mut().take_references();

    if cli.verbose {
        for reference in &references {
            let va = VirtualAddress::from_raw(reference.va);
            eprintln!(
                "{} {} -> PA {} (value {})",
                if reference.write { "W" } else { "R" },
                va,
                reference.pa,
                reference.value
            );
        }
        eprintln!();
        eprintln!("=== Summary ===");
        eprintln!("Outcome: {:?}", outcome);
        for value in kernel.console() {
            eprintln!("Printed: {}", value);
        }
        eprintln!();
    }

    // Step 4: results
    let addresses: Vec<usize> = references.iter().map(|r| r.pa).collect();
    write_results(&cli.output_file, &addresses)?;

    println!("{}", kernel.stats());
    if let RunOutcome::Exited(status) = outcome {
        println!("Exit status: {}", status);
    }
    Ok(())
}
