use std::fs;
use std::process::ExitCode;

use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use triplex::{Database, Result, Settings, Term, TriplexError, parse};

const USAGE: &str = "\
usage: triplex [--config FILE] load ORIGIN FILE
       triplex [--config FILE] delete ORIGIN
       triplex [--config FILE] get ORIGIN
       triplex [--config FILE] list [ORIGIN]
       triplex [--config FILE] query FILE [--limit N] [--sources] [VAR...]";

enum Command {
    Load { origin: Term, file: String },
    Delete { origin: Term },
    Get { origin: Term },
    List { from: Option<Term> },
    Query {
        file: String,
        domain: Vec<Term>,
        limit: Option<usize>,
        sources: bool,
    },
}

fn usage(message: &str) -> TriplexError {
    TriplexError::Config(format!("{}\n{}", message, USAGE))
}

fn origin(argument: &str) -> Result<Term> {
    match argument {
        "@default" => Ok(Term::DefaultGraph),
        _ => parse::term(argument).or_else(|_| Ok(Term::iri(argument))),
    }
}

fn arguments(mut args: Vec<String>) -> Result<(Option<String>, Command)> {
    let mut config = None;
    if args.first().map(String::as_str) == Some("--config") {
        if args.len() < 2 {
            return Err(usage("--config needs a file"));
        }
        config = Some(args.remove(1));
        args.remove(0);
    }
    let mut args = args.into_iter();
    let command = match (args.next().as_deref(), args.next(), args.next()) {
        (Some("load"), Some(o), Some(file)) => Command::Load {
            origin: origin(&o)?,
            file,
        },
        (Some("delete"), Some(o), None) => Command::Delete { origin: origin(&o)? },
        (Some("get"), Some(o), None) => Command::Get { origin: origin(&o)? },
        (Some("list"), from, None) => Command::List {
            from: from.as_deref().map(origin).transpose()?,
        },
        (Some("query"), Some(file), first) => {
            let mut domain = Vec::new();
            let mut limit = None;
            let mut sources = false;
            let mut rest = first.into_iter().chain(args);
            while let Some(argument) = rest.next() {
                match argument.as_str() {
                    "--sources" => sources = true,
                    "--limit" => {
                        let n = rest
                            .next()
                            .and_then(|n| n.parse().ok())
                            .ok_or_else(|| usage("--limit needs a number"))?;
                        limit = Some(n);
                    }
                    label => domain.push(parse::term(label)?),
                }
            }
            Command::Query {
                file,
                domain,
                limit,
                sources,
            }
        }
        _ => return Err(usage("unrecognized command")),
    };
    Ok((config, command))
}

fn run(db: &Database, command: Command) -> Result<()> {
    match command {
        Command::Load { origin, file } => {
            let text = fs::read_to_string(&file)
                .map_err(|e| TriplexError::Config(format!("{}: {}", file, e)))?;
            let quads = parse::dataset(&text)?;
            let added = db.set(&origin, &quads)?;
            println!("{}", json!({ "origin": origin, "quads": quads.len(), "added": added }));
        }
        Command::Delete { origin } => {
            let removed = db.delete(&origin)?;
            println!("{}", json!({ "origin": origin, "removed": removed }));
        }
        Command::Get { origin } => {
            for quad in db.get(&origin)? {
                println!("{}", json!(quad));
            }
        }
        Command::List { from } => {
            for origin in db.list(from.as_ref())? {
                println!("{}", json!(origin?));
            }
        }
        Command::Query {
            file,
            domain,
            limit,
            sources,
        } => {
            let text = fs::read_to_string(&file)
                .map_err(|e| TriplexError::Config(format!("{}: {}", file, e)))?;
            let pattern = parse::pattern(&text)?;
            let mut graph = db.query(&pattern, &domain, &[])?;
            println!("{}", json!({ "domain": graph.domain() }));
            let mut rows = 0;
            while limit.is_none_or(|limit| rows < limit) {
                if graph.next_position(None)?.is_none() {
                    break;
                }
                let Some(row) = graph.index()? else { break };
                rows += 1;
                let exposed = &row[..graph.pivot()];
                if sources {
                    println!("{}", json!({ "row": exposed, "sources": graph.sources()? }));
                } else {
                    println!("{}", json!(exposed));
                }
            }
            graph.close();
            info!(rows, "query finished");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config, command) = match arguments(args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let settings = match Settings::load(config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = Database::open(&settings).and_then(|db| run(&db, command));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
