//! Moonlet CLI
//!
//! Command-line driver for the moonlet engine: runs a Lua script in a
//! dedicated engine and plays the host side of the callback protocol
//! from the terminal.

use clap::{Parser as ClapParser, Subcommand};
use crossbeam_channel::Receiver;
use moonlet_engine::{Engine, HostMessage, Router, STATUS_OK};
use moonlet_term::{ATOM_FALSE, ATOM_TRUE, Pid, Term};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::debug;

#[derive(ClapParser)]
#[command(name = "moonlet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run Lua scripts inside a moonlet engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a Lua script, optionally calling one of its globals afterwards
    Run {
        /// Lua source file to load
        script: PathBuf,

        /// Global function to call once the script has loaded
        #[arg(long)]
        call: Option<String>,

        /// Arguments for --call, as a JSON array
        #[arg(long, default_value = "[]")]
        args: String,

        /// JSON value answering every host.call the script makes
        #[arg(long)]
        reply: Option<String>,
    },

    /// Evaluate a Lua chunk given on the command line
    Eval {
        /// Lua source text
        code: String,

        /// JSON value answering every host.call the chunk makes
        #[arg(long)]
        reply: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("moonlet=info".parse().unwrap())
                .add_directive("moonlet_engine=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            script,
            call,
            args,
            reply,
        } => {
            run_script(&script, call, &args, reply);
        }
        Commands::Eval { code, reply } => {
            run_eval(&code, reply);
        }
    }
}

fn run_script(script: &PathBuf, call: Option<String>, args: &str, reply: Option<String>) {
    let call_args = parse_args(args);
    let reply = parse_reply(reply);
    let (_router, caller, inbox, engine) = start_engine();

    if let Err(e) = engine.submit_load(script.display().to_string(), caller) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
    let loaded = await_response(&engine, &inbox, caller, &reply);

    match call {
        None => finish(loaded),
        Some(name) => {
            let (status, value) = split_response(loaded);
            if status != STATUS_OK {
                report_error(&value);
            }
            debug!("loaded {}", script.display());

            if let Err(e) = engine.submit_call(name.as_str(), call_args, caller) {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
            finish(await_response(&engine, &inbox, caller, &reply));
        }
    }
}

fn run_eval(code: &str, reply: Option<String>) {
    let reply = parse_reply(reply);
    let (_router, caller, inbox, engine) = start_engine();

    if let Err(e) = engine.submit_eval(code, caller) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
    finish(await_response(&engine, &inbox, caller, &reply));
}

fn start_engine() -> (Arc<Router>, Pid, Receiver<HostMessage>, Engine) {
    let router = Arc::new(Router::new());
    let (caller, inbox) = router.register();
    match Engine::spawn(caller, router.clone()) {
        Ok(engine) => (router, caller, inbox, engine),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Waits for the response to the task in flight, answering any callbacks
/// the script raises along the way with `reply`.
fn await_response(
    engine: &Engine,
    inbox: &Receiver<HostMessage>,
    caller: Pid,
    reply: &Term,
) -> Term {
    loop {
        match inbox.recv() {
            Ok(HostMessage::Callback(payload)) => {
                println!("callback: {}", payload);
                if let Err(e) = engine.submit_response(reply.clone(), caller) {
                    eprintln!("Error answering callback: {}", e);
                    process::exit(1);
                }
            }
            Ok(HostMessage::Response(term)) => return term,
            Err(_) => {
                eprintln!("Error: engine hung up before responding");
                process::exit(1);
            }
        }
    }
}

fn split_response(term: Term) -> (String, Term) {
    match term {
        Term::Tuple(mut parts) if parts.len() == 2 => {
            let value = parts.pop().unwrap_or_else(Term::nil);
            let status = match parts.pop() {
                Some(Term::Atom(atom)) => atom.into_string(),
                _ => String::new(),
            };
            (status, value)
        }
        other => (String::new(), other),
    }
}

fn finish(response: Term) -> ! {
    let (status, value) = split_response(response);
    if status == STATUS_OK {
        println!("{}", value);
        process::exit(0);
    }
    report_error(&value)
}

fn report_error(value: &Term) -> ! {
    eprintln!("Error: {}", term_text(value));
    process::exit(1);
}

/// Errors arrive as binaries holding the diagnostic; print those as
/// plain text rather than quoted term syntax.
fn term_text(term: &Term) -> String {
    match term {
        Term::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        other => other.to_string(),
    }
}

fn parse_args(args: &str) -> Vec<Term> {
    match serde_json::from_str::<serde_json::Value>(args) {
        Ok(serde_json::Value::Array(items)) => items.iter().map(json_to_term).collect(),
        Ok(_) => {
            eprintln!("Error: --args must be a JSON array");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error parsing --args: {}", e);
            process::exit(1);
        }
    }
}

fn parse_reply(reply: Option<String>) -> Term {
    match reply {
        None => Term::atom("undefined"),
        Some(text) => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) => json_to_term(&value),
            Err(e) => {
                eprintln!("Error parsing --reply: {}", e);
                process::exit(1);
            }
        },
    }
}

/// Maps JSON onto the term model: objects become lists of key/value
/// pairs, arrays become lists, strings become binaries.
fn json_to_term(value: &serde_json::Value) -> Term {
    match value {
        serde_json::Value::Null => Term::nil(),
        serde_json::Value::Bool(true) => Term::atom(ATOM_TRUE),
        serde_json::Value::Bool(false) => Term::atom(ATOM_FALSE),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Term::int(i),
            None => Term::float(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Term::binary(s.as_str()),
        serde_json::Value::Array(items) => Term::list(items.iter().map(json_to_term).collect()),
        serde_json::Value::Object(map) => Term::list(
            map.iter()
                .map(|(k, v)| Term::tuple(vec![Term::binary(k.as_str()), json_to_term(v)]))
                .collect(),
        ),
    }
}
