//! The Mesh RPC command-line tool.
//!
//! Provides the `meshrpc` command with the following subcommands:
//!
//! - `meshrpc decode <file>` - Decode and verify a captured request
//! - `meshrpc signature <type>` - Print the serialized type string of a type
//! - `meshrpc policy` - Write a policy admitting every class in a manifest
//!
//! Options:
//! - `-v/--verbose` - Raise the log level (repeatable); `RUST_LOG` overrides

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mesh_rpc::registry::erase;
use mesh_rpc::{
    decode_request, load_manifest, parse_type, RpcContext, RpcError, RpcRequest,
    SerializationPolicy, TypeEnv, TypeRegistry,
};
use mesh_wire::Flags;

#[derive(Parser)]
#[command(name = "meshrpc", version, about = "Inspect and verify Mesh RPC payloads")]
struct Cli {
    /// Log more (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a request, verify its arguments and print the call
    Decode {
        /// File holding one serialized request
        file: PathBuf,

        /// Manifest declaring the service's classes and interfaces
        #[arg(long)]
        manifest: PathBuf,

        /// Serialization policy the receiver enforces
        #[arg(long)]
        policy: PathBuf,

        /// Interface the receiving service implements
        #[arg(long)]
        interface: Option<String>,

        /// Print the call or the rejection as a JSON object
        #[arg(long)]
        json: bool,
    },
    /// Print the serialized type string of a declared type
    Signature {
        /// Type expression, e.g. `List<String>` or `int[]`
        #[arg(value_name = "TYPE")]
        ty: String,

        #[arg(long)]
        manifest: PathBuf,
    },
    /// Write a policy that admits every instantiable class in a manifest
    Policy {
        #[arg(long)]
        manifest: PathBuf,

        /// Assign obfuscated type ids
        #[arg(long)]
        elide: bool,

        /// Output path (stdout when absent)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Decode {
            file,
            manifest,
            policy,
            interface,
            json,
        } => decode(&file, &manifest, &policy, interface.as_deref(), json),
        Commands::Signature { ty, manifest } => signature(&ty, &manifest),
        Commands::Policy {
            manifest,
            elide,
            output,
        } => write_policy(&manifest, elide, output.as_deref()),
    };
    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn registry(manifest: &Path) -> Result<TypeRegistry, String> {
    load_manifest(manifest).map_err(|e| format!("{}: {}", manifest.display(), e))
}

fn decode(
    file: &Path,
    manifest: &Path,
    policy: &Path,
    interface: Option<&str>,
    json: bool,
) -> Result<(), String> {
    let registry = registry(manifest)?;
    let policy = SerializationPolicy::from_file(policy)
        .map_err(|e| format!("{}: {}", policy.display(), e))?;
    let ctx = RpcContext::new(registry, policy);

    let wire = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;
    // Captures often end with a newline the stream itself does not have.
    let wire = wire.trim_end_matches(['\n', '\r']);

    match decode_request(&ctx, wire, interface) {
        Ok(request) if json => {
            println!("{}", call_json(&request));
            Ok(())
        }
        Ok(request) => {
            println!("{}", render_call(&request));
            Ok(())
        }
        Err(err) if json => {
            println!("{}", rejection_json(&err));
            Err(format!("request rejected ({})", err.kind()))
        }
        Err(err) => Err(format!("request rejected: {}", err)),
    }
}

fn render_call(request: &RpcRequest) -> String {
    let args: Vec<String> = request
        .args
        .iter()
        .map(|a| request.heap.render(a))
        .collect();
    format!(
        "{}.{}({})",
        request.interface,
        request.method_name(),
        args.join(", ")
    )
}

fn call_json(request: &RpcRequest) -> serde_json::Value {
    let params: Vec<String> = request
        .method
        .method
        .params
        .iter()
        .map(ToString::to_string)
        .collect();
    let args: Vec<String> = request
        .args
        .iter()
        .map(|a| request.heap.render(a))
        .collect();
    serde_json::json!({
        "interface": request.interface,
        "declaring": request.method.declaring,
        "method": request.method_name(),
        "params": params,
        "args": args,
        "objects": request.heap.len(),
    })
}

fn rejection_json(err: &RpcError) -> serde_json::Value {
    serde_json::json!({
        "error": err.kind(),
        "message": err.to_string(),
    })
}

fn signature(ty: &str, manifest: &Path) -> Result<(), String> {
    let registry = registry(manifest)?;
    let declared = parse_type(ty, &[]).map_err(|e| e.to_string())?;
    let erased = erase(&declared, &TypeEnv::new());
    if !registry.is_known(&erased) {
        return Err(format!("unknown type `{}`", erased));
    }
    let ctx = RpcContext::new(registry, SerializationPolicy::default());
    let type_string = ctx
        .param_type_string(&erased, Flags::NONE)
        .map_err(|e| e.to_string())?;
    println!("{}", type_string);
    Ok(())
}

fn write_policy(manifest: &Path, elide: bool, output: Option<&Path>) -> Result<(), String> {
    let registry = registry(manifest)?;
    let policy = SerializationPolicy::permissive(&registry, elide);
    let text = policy.to_toml_string().map_err(|e| e.to_string())?;
    match output {
        Some(path) => std::fs::write(path, text)
            .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?,
        None => print!("{}", text),
    }
    tracing::debug!(types = policy.len(), elide, "wrote policy");
    Ok(())
}
