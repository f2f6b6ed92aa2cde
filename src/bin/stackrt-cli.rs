//! Stackrt CLI - Command-line driver for the Stackrt runtime
//!
//! Builds a one-card stack from script files, sends it messages or calls its
//! functions, and evaluates chunk expressions.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use stackrt::runtime::chunk::{Chunk, Granularity};
use stackrt::runtime::config::{load_config, write_config};
use stackrt::runtime::ordinal::Ordinal;
use stackrt::runtime::part::PartType;
use stackrt::runtime::{ScriptError, ScriptResult};
use stackrt::{Message, PartSpecifier, Runtime, RuntimeConfig, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "stackrt")]
#[command(about = "Run card-and-stack scripts from the command line", long_about = None)]
struct Cli {
    /// Directory holding config.json (defaults are used when absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and print whether it was trapped
    Send {
        /// Message name
        message: String,

        /// Message arguments
        args: Vec<String>,

        /// Send to the named button instead of the card
        #[arg(long)]
        to: Option<String>,

        #[command(flatten)]
        scripts: ScriptArgs,
    },

    /// Call a function and print its value
    Call {
        /// Function name
        name: String,

        /// Function arguments
        args: Vec<String>,

        #[command(flatten)]
        scripts: ScriptArgs,
    },

    /// Print a chunk of some text
    Chunk {
        /// chars, words, items or lines
        granularity: String,

        /// First position (a number, last, middle or any)
        start: String,

        /// Last position of a range
        #[arg(long)]
        end: Option<String>,

        /// Text to take the chunk from
        text: String,
    },

    /// Write a default config.json
    InitConfig {
        /// Directory to write into
        #[arg(default_value = ".stackrt")]
        dir: PathBuf,
    },
}

#[derive(Args)]
struct ScriptArgs {
    /// Script file for the stack
    #[arg(long)]
    stack_script: Option<PathBuf>,

    /// Script file for the background
    #[arg(long)]
    background_script: Option<PathBuf>,

    /// Script file for the card
    #[arg(long)]
    card_script: Option<PathBuf>,

    /// Card button as NAME=SCRIPT_FILE (repeatable)
    #[arg(long = "button")]
    buttons: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(level.into()),
        )
        .init();

    let config = match &cli.config {
        Some(dir) => load_config(dir)?,
        None => RuntimeConfig::default(),
    };

    match cli.command {
        Commands::Send {
            message,
            args,
            to,
            scripts,
        } => {
            let runtime = Runtime::start(config)?;
            build_stack(&runtime, &scripts)?;

            let target = match to {
                Some(name) => PartSpecifier::by_name(PartType::Button, name),
                None => PartSpecifier::This(PartType::Card),
            };
            let message = Message::new(message).with_args(args.into_iter().map(Value::from).collect());
            let outcome = runtime.send_message_blocking(target, message)?;

            println!("trapped: {}", outcome.trapped);
            if let Some(err) = outcome.error {
                println!("error: {}", err);
            }
            let contents = runtime.get_property(PartSpecifier::MessageBox, "contents", None)?;
            if !contents.is_empty() {
                println!("msg: {}", contents);
            }
            runtime.shutdown()?;
        }

        Commands::Call { name, args, scripts } => {
            let runtime = Runtime::start(config)?;
            build_stack(&runtime, &scripts)?;

            let value = runtime.invoke_function(
                PartSpecifier::This(PartType::Card),
                &name,
                args.into_iter().map(Value::from).collect(),
            )?;
            println!("{}", value);
            runtime.shutdown()?;
        }

        Commands::Chunk {
            granularity,
            start,
            end,
            text,
        } => {
            let Some(granularity) = Granularity::from_keyword(&granularity) else {
                bail!("unknown chunk type '{}'", granularity);
            };
            let mut chunk = Chunk::new(granularity, Ordinal::from_value(&Value::text(start))?);
            if let Some(end) = end {
                chunk = chunk.through(Ordinal::from_value(&Value::text(end))?);
            }

            let runtime = Runtime::start(config)?;
            let value = runtime.get_chunk(Value::text(text), chunk)?;
            println!("{}", value);
            runtime.shutdown()?;
        }

        Commands::InitConfig { dir } => {
            write_config(&dir, &config)?;
            println!("Wrote default config to {:?}", dir.join("config.json"));
        }
    }

    Ok(())
}

fn read_script(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read script: {:?}", path)),
        None => Ok(String::new()),
    }
}

fn parse_button(spec: &str) -> Result<(String, String)> {
    let Some((name, path)) = spec.split_once('=') else {
        bail!("expected NAME=SCRIPT_FILE, got '{}'", spec);
    };
    let script = read_script(Some(Path::new(path)))?;
    Ok((name.to_string(), script))
}

/// Build a stack with one background and one card, loading the given scripts.
fn build_stack(runtime: &Runtime, scripts: &ScriptArgs) -> Result<()> {
    let stack_script = read_script(scripts.stack_script.as_deref())?;
    let background_script = read_script(scripts.background_script.as_deref())?;
    let card_script = read_script(scripts.card_script.as_deref())?;
    let buttons = scripts
        .buttons
        .iter()
        .map(String::as_str)
        .map(parse_button)
        .collect::<Result<Vec<_>>>()?;

    runtime.call(move |engine| -> ScriptResult<()> {
        let stack = engine.registry_mut().add_stack("Main");
        engine.part(stack)?.set_script(stack_script);
        let scope = engine.current_scope()?;
        if let Some(background) = scope.background {
            engine.part(background)?.set_script(background_script);
        }
        let card = scope
            .card
            .ok_or_else(|| ScriptError::PartNotFound("this card".into()))?;
        engine.part(card)?.set_script(card_script);
        for (name, script) in buttons {
            let button = engine.registry_mut().add_part(card, PartType::Button, &name)?;
            engine.part(button)?.set_script(script);
        }
        Ok(())
    })??;

    Ok(())
}
