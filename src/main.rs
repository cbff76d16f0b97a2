mod builtins;
mod config;
mod env;
mod error;
mod eval;
mod gc;
mod interpreter;
mod memory;
mod printer;
mod reader;
mod value;

use clap::Parser;
use config::{MemoryConfig, BUILTINS_SUMMARY, HELP_TEXT, WELCOME_MESSAGE, WELCOME_SUBTITLE};
use interpreter::Interpreter;
use rustyline::error::ReadlineError;
use rustyline::{Config, Editor};
use std::path::PathBuf;

/// A NaN-boxed Lisp runtime with tail-call optimization.
#[derive(Parser, Debug)]
#[command(name = "nanlisp")]
#[command(version = config::VERSION)]
#[command(about = "A NaN-boxed Lisp runtime")]
struct CliArgs {
    /// Script file to execute (optional - if not provided, starts the REPL)
    #[arg(value_name = "FILE")]
    script: Option<PathBuf>,

    /// Pair pool size, in cells
    #[arg(long = "pool-cells", value_name = "N")]
    pool_cells: Option<usize>,

    /// Total memory size (pool + heap + stack), in cells
    #[arg(long = "total-cells", value_name = "N")]
    total_cells: Option<usize>,

    /// Skip loading init.lisp on startup
    #[arg(long = "no-init")]
    no_init: bool,
}

fn memory_config(args: &CliArgs) -> MemoryConfig {
    let mut config = MemoryConfig::default();
    if let Some(p) = args.pool_cells {
        config.pool_cells = p;
    }
    if let Some(t) = args.total_cells {
        config.total_cells = t;
    }
    config
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let mut interp = Interpreter::new(memory_config(&args));

    if !args.no_init {
        if let Ok(contents) = std::fs::read_to_string("init.lisp") {
            if let Err(e) = interp.eval_source(&contents) {
                eprintln!("Warning: failed to load init.lisp: {e}");
            }
        }
    }

    if let Some(script_path) = args.script {
        return run_script(&mut interp, &script_path);
    }

    run_repl(&mut interp)
}

/// Execute every top-level form in a script file, in order, then exit.
fn run_script(interp: &mut Interpreter, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read script file {}: {e}", path.display()))?;
    match interp.eval_source(&contents) {
        Ok(_) => Ok(()),
        Err(e) => {
            let code = e.code().unwrap_or(0);
            Err(format!("ERR {code} {e}").into())
        }
    }
}

/// Read-eval-print loop, per spec §6.2: one expression per iteration, stack
/// fully unwound and GC run between iterations to report free-space gauges.
fn run_repl(interp: &mut Interpreter) -> Result<(), Box<dyn std::error::Error>> {
    let rl_config = Config::builder().auto_add_history(true).build();
    let mut rl: Editor<(), _> =
        Editor::with_config(rl_config).map_err(|e| format!("failed to initialize REPL: {e}"))?;

    let history_file = ".nanlisp_history";
    let _ = rl.load_history(history_file);

    println!("{WELCOME_MESSAGE}");
    println!("{WELCOME_SUBTITLE}");

    loop {
        let watermark = interp.mem.stack_watermark();
        let readline = rl.readline("nanlisp> ");

        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                if line.trim() == "(quit)" {
                    break;
                }
                if line.trim() == "(help)" {
                    print!("{HELP_TEXT}");
                    print!("{BUILTINS_SUMMARY}");
                    continue;
                }

                match read_and_eval(interp, &line) {
                    Ok(Some(result)) => println!("{}", interp.print(result)),
                    Ok(None) => {}
                    Err(e) => {
                        let code = e.code().unwrap_or(0);
                        eprintln!("ERR {code} {e}");
                    }
                }

                interp.unwind(watermark);
                interp.collect_garbage();
                eprintln!(
                    "; {} free pairs, heap at {}",
                    interp.free_pair_count(),
                    interp.hp()
                );
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                eprintln!("ERR 0 {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(history_file);
    Ok(())
}

fn read_and_eval(interp: &mut Interpreter, line: &str) -> error::LispResult<Option<value::Value>> {
    match reader::read(&mut interp.mem, line)? {
        Some((expr, _rest)) => {
            let global_env = interp.global_env();
            Ok(Some(interp.eval(expr, global_env)?))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_config_defaults_when_no_flags_given() {
        let args = CliArgs { script: None, pool_cells: None, total_cells: None, no_init: false };
        let config = memory_config(&args);
        assert_eq!(config.pool_cells, MemoryConfig::default().pool_cells);
    }

    #[test]
    fn memory_config_overrides_from_flags() {
        let args = CliArgs { script: None, pool_cells: Some(128), total_cells: Some(1024), no_init: false };
        let config = memory_config(&args);
        assert_eq!(config.pool_cells, 128);
        assert_eq!(config.total_cells, 1024);
    }
}
