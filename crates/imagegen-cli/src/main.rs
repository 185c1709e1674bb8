use std::collections::BTreeMap;
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use imagegen_contracts::config::{resolve, ConfigSources};
use imagegen_engine::{
    call_tool, ImagePipeline, EDIT_IMAGE_TOOL, GENERATE_IMAGE_TOOL, HEALTH_TOOL, TOOL_NAMES,
};
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "imagegen", version, about = "Generate and edit images through the images API")]
struct Cli {
    /// Configuration override as `-e KEY VALUE`, repeatable.
    #[arg(
        short = 'e',
        long = "env",
        num_args = 2,
        value_names = ["KEY", "VALUE"],
        global = true
    )]
    env: Vec<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Generate(GenerateArgs),
    Edit(EditArgs),
    Health,
    Call(CallArgs),
    /// Answer one JSON tool call per stdin line.
    Serve,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, value_parser = ["transparent", "opaque", "auto"])]
    background: Option<String>,
    #[arg(long, value_parser = ["low", "auto"])]
    moderation: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=10))]
    n: Option<u8>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    output_compression: Option<u8>,
    #[arg(long, value_parser = ["png", "jpeg", "webp"])]
    output_format: Option<String>,
    #[arg(long, value_parser = ["auto", "high", "medium", "low"])]
    quality: Option<String>,
    #[arg(long, value_parser = ["1024x1024", "1536x1024", "1024x1536", "auto"])]
    size: Option<String>,
}

impl GenerateArgs {
    fn into_arguments(self) -> Value {
        let mut arguments = Map::new();
        arguments.insert("prompt".to_string(), Value::String(self.prompt));
        insert_present(&mut arguments, "model", self.model.map(Value::String));
        insert_present(&mut arguments, "background", self.background.map(Value::String));
        insert_present(&mut arguments, "moderation", self.moderation.map(Value::String));
        insert_present(&mut arguments, "n", self.n.map(|n| json!(n)));
        insert_present(
            &mut arguments,
            "output_compression",
            self.output_compression.map(|value| json!(value)),
        );
        insert_present(&mut arguments, "output_format", self.output_format.map(Value::String));
        insert_present(&mut arguments, "quality", self.quality.map(Value::String));
        insert_present(&mut arguments, "size", self.size.map(Value::String));
        Value::Object(arguments)
    }
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    mask: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=10))]
    n: Option<u8>,
    #[arg(long, value_parser = ["1024x1024", "1536x1024", "1024x1536"])]
    size: Option<String>,
    #[arg(long, value_parser = ["png", "jpeg", "webp"])]
    output_format: Option<String>,
}

impl EditArgs {
    fn into_arguments(self) -> Result<Value> {
        let mut arguments = Map::new();
        arguments.insert("image_path".to_string(), path_argument("--image", self.image)?);
        arguments.insert("prompt".to_string(), Value::String(self.prompt));
        let mask = self.mask.map(|path| path_argument("--mask", path)).transpose()?;
        insert_present(&mut arguments, "mask_path", mask);
        insert_present(&mut arguments, "model", self.model.map(Value::String));
        insert_present(&mut arguments, "n", self.n.map(|n| json!(n)));
        insert_present(&mut arguments, "size", self.size.map(Value::String));
        insert_present(&mut arguments, "output_format", self.output_format.map(Value::String));
        Ok(Value::Object(arguments))
    }
}

fn path_argument(flag: &str, path: PathBuf) -> Result<Value> {
    match path.into_os_string().into_string() {
        Ok(path) => Ok(Value::String(path)),
        Err(path) => bail!("{flag} path is not valid UTF-8: {}", path.to_string_lossy()),
    }
}

#[derive(Debug, Parser)]
struct CallArgs {
    /// One of generate-image, edit-image, health.
    tool: String,
    /// Tool arguments as a JSON object.
    #[arg(long)]
    arguments: Option<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("imagegen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let overrides = overrides_from_pairs(&cli.env)?;
    let config = resolve(&ConfigSources::from_process(overrides));
    let pipeline = ImagePipeline::new(config)?;

    match cli.command {
        Command::Generate(args) => print_tool_result(&pipeline, GENERATE_IMAGE_TOOL, args.into_arguments()),
        Command::Edit(args) => print_tool_result(&pipeline, EDIT_IMAGE_TOOL, args.into_arguments()?),
        Command::Health => print_tool_result(&pipeline, HEALTH_TOOL, Value::Null),
        Command::Call(args) => {
            let arguments = match args.arguments.as_deref() {
                Some(raw) => serde_json::from_str(raw).context("--arguments is not valid JSON")?,
                None => Value::Null,
            };
            print_tool_result(&pipeline, &args.tool, arguments)
        }
        Command::Serve => {
            serve(&pipeline)?;
            Ok(0)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imagegen=info,imagegen_engine=info,imagegen_contracts=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn overrides_from_pairs(values: &[String]) -> Result<BTreeMap<String, String>> {
    if values.len() % 2 != 0 {
        bail!("-e expects KEY VALUE pairs");
    }
    Ok(values
        .chunks(2)
        .map(|pair| (pair[0].trim().to_string(), pair[1].clone()))
        .collect())
}

fn print_tool_result(pipeline: &ImagePipeline, tool: &str, arguments: Value) -> Result<i32> {
    let result = call_tool(pipeline, tool, arguments).with_context(|| format!("{tool} failed"))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(0)
}

fn serve(pipeline: &ImagePipeline) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();
    info!(tools = ?TOOL_NAMES, "serving tool calls on stdin");

    loop {
        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let reply = handle_tool_line(pipeline, input);
        writeln!(stdout, "{}", serde_json::to_string(&reply)?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_tool_line(pipeline: &ImagePipeline, input: &str) -> Value {
    let parsed: Value = match serde_json::from_str(input) {
        Ok(parsed) => parsed,
        Err(err) => return failure(None, format!("invalid request line: {err}")),
    };
    let id = parsed.get("id").cloned();
    let Some(tool) = parsed.get("tool").and_then(Value::as_str) else {
        return failure(id, "request is missing 'tool'".to_string());
    };
    let arguments = parsed.get("arguments").cloned().unwrap_or(Value::Null);

    match call_tool(pipeline, tool, arguments) {
        Ok(result) => {
            let mut reply = Map::new();
            if let Some(id) = id {
                reply.insert("id".to_string(), id);
            }
            reply.insert("ok".to_string(), Value::Bool(true));
            reply.insert("result".to_string(), result);
            Value::Object(reply)
        }
        Err(err) => {
            warn!(tool, "tool call failed: {err}");
            failure(id, err.to_string())
        }
    }
}

fn failure(id: Option<Value>, error: String) -> Value {
    let mut reply = Map::new();
    if let Some(id) = id {
        reply.insert("id".to_string(), id);
    }
    reply.insert("ok".to_string(), Value::Bool(false));
    reply.insert("error".to_string(), Value::String(error));
    Value::Object(reply)
}

fn insert_present(arguments: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        arguments.insert(key.to_string(), value);
    }
}
