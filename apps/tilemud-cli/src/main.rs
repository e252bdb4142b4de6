use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tilemud_command::{Command, CommandRegistry, UserCommand};
use tilemud_engine::{EngineConfig, Mud};
use tilemud_persist::Database;
use tilemud_script::{SandboxLimits, ScriptSandbox};
use tilemud_session::MemoryTransport;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tilemud-cli", about = "CLI tool for tilemud worlds")]
struct Cli {
    /// World data directory
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print world metadata, the character counter and the command set
    Info,
    /// Compile every user command pattern and script body
    Check {
        /// Operation budget for scripts
        #[arg(long)]
        script_ops: Option<u64>,
    },
    /// Feed a file of input lines through one headless session and print
    /// the transcript. Runs against a scratch copy of the data directory.
    Replay {
        /// Input file, one line per input
        input: PathBuf,
        #[arg(long, default_value = "16")]
        width: u32,
        #[arg(long, default_value = "16")]
        height: u32,
        #[arg(long, default_value = "1")]
        layers: u32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info => {
            let db = Database::open(&cli.data_dir)?;
            let meta = db.meta();
            println!("tilemud-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("world: {} v{}", meta.name, meta.version);
            println!("default port: {}", meta.default_port);
            println!("next character id: {}", db.persistent().character_id);

            let registry = CommandRegistry::with_builtins()?;
            let builtins: Vec<_> = registry.commands().map(|c| c.name().to_string()).collect();
            println!("built-in commands: {}", builtins.join(", "));
            println!("user commands: {}", db.user_commands().len());
            for def in db.user_commands() {
                println!("  {:<16} {}", def.name, def.pattern);
            }
        }
        Commands::Check { script_ops } => {
            let db = Database::open(&cli.data_dir)?;
            let mut limits = SandboxLimits::default();
            if let Some(ops) = script_ops {
                limits.max_operations = ops;
            }
            let sandbox = ScriptSandbox::new(limits);

            let mut failed = 0;
            for def in db.user_commands() {
                match UserCommand::compile(def, &sandbox) {
                    Ok(command) => println!("ok    {:<16} {}", command.file(), command.name()),
                    Err(e) => {
                        failed += 1;
                        println!("FAIL  {:<16} {e}", def.name);
                    }
                }
            }
            println!("{} checked, {failed} failed", db.user_commands().len());
            if failed > 0 {
                anyhow::bail!("{failed} user command(s) failed to compile");
            }
        }
        Commands::Replay {
            input,
            width,
            height,
            layers,
        } => {
            let lines = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let scratch = tempfile::tempdir()?;
            stage_copy(&cli.data_dir, scratch.path())?;
            tracing::debug!(scratch = %scratch.path().display(), "replaying against a copy");

            let config = EngineConfig {
                dimensions: glam::UVec3::new(width, height, layers),
                ..EngineConfig::default()
            };
            let mut mud = Mud::boot(Database::open(scratch.path())?, config)?;
            let out = MemoryTransport::new();
            let id = mud.connect(Box::new(out.clone()));
            print!("{}", out.take_output());

            for line in lines.lines() {
                if !mud.is_connected(id) {
                    break;
                }
                let line = line.trim_end_matches('\r');
                println!("{line}");
                mud.input(id, line);
                print!("{}", out.take_output());
            }
            mud.shutdown()?;
            println!();
        }
    }

    Ok(())
}

/// Copy the files a world loads from `src` into `dst`. A missing source is
/// treated as an empty world.
fn stage_copy(src: &Path, dst: &Path) -> anyhow::Result<()> {
    if !src.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(src)? {
        let path = entry?.path();
        let target = dst.join(path.file_name().unwrap_or_default());
        if path.is_dir() {
            std::fs::create_dir_all(&target)?;
            stage_copy(&path, &target)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            std::fs::copy(&path, &target).with_context(|| format!("copying {}", path.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_copy_takes_json_files_and_command_dir() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("meta.json"), r#"{ "name": "Harbor" }"#).unwrap();
        std::fs::write(src.path().join("notes.txt"), "skip").unwrap();
        std::fs::create_dir(src.path().join("commands")).unwrap();
        std::fs::write(
            src.path().join("commands").join("wave.json"),
            r#"{ "pattern": "^wave$", "body": "" }"#,
        )
        .unwrap();

        let dst = tempfile::tempdir().unwrap();
        stage_copy(src.path(), dst.path()).unwrap();
        let db = Database::open(dst.path()).unwrap();
        assert_eq!(db.meta().name, "Harbor");
        assert_eq!(db.user_commands().len(), 1);
        assert!(!dst.path().join("notes.txt").exists());
    }

    #[test]
    fn missing_source_is_an_empty_world() {
        let dst = tempfile::tempdir().unwrap();
        stage_copy(&dst.path().join("absent"), dst.path()).unwrap();
        assert_eq!(std::fs::read_dir(dst.path()).unwrap().count(), 0);
    }
}
