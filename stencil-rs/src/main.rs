use std::process::ExitCode;

use stencil::cli::{self, ConfigFile, TemplateSource};
use stencil::config::{self, Config};
use stencil::template::{EvaluationContext, Record, Template, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("stencil: {e}");
            eprintln!("Usage: stencil [-c<config>] [-n] [-D<name>=<value>]... [-i] [-s] <template|->");
            return ExitCode::from(2);
        }
    };

    // ── Load config ───────────────────────────────────────────────────────────
    let path = match args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(path) => Some(path),
        ConfigFile::Search => config::find_user_config(),
    };
    let mut config = Config::new();
    if let Some(path) = path {
        match Config::load_file(&path) {
            Ok((loaded, errors)) => {
                for e in errors {
                    eprintln!("stencil: warning: {}: {e}", path.display());
                }
                config = loaded;
            }
            Err(e) => eprintln!("stencil: warning: {}: {e}", path.display()),
        }
    }
    config.options.ignore_evaluation_errors |= args.ignore_errors;
    config.options.strict_identifiers |= args.strict;

    let dialect = match config.dialect() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("stencil: {e}");
            return ExitCode::FAILURE;
        }
    };

    // ── Read and compile the template ─────────────────────────────────────────
    let source = match &args.template {
        TemplateSource::Stdin => {
            let mut s = String::new();
            tokio::io::stdin().read_to_string(&mut s).await.map(|_| s)
        }
        TemplateSource::File(path) => tokio::fs::read_to_string(path).await,
    };
    let source = match source {
        Ok(s) => s,
        Err(e) => {
            eprintln!("stencil: {e}");
            return ExitCode::FAILURE;
        }
    };

    let template = match Template::compile(dialect.clone(), &source) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("stencil: {e}");
            return ExitCode::FAILURE;
        }
    };

    // ── Render ────────────────────────────────────────────────────────────────
    let mut data = Record::new();
    for (name, value) in args.defines {
        data.insert(name, typed(&value));
    }
    let ctx = EvaluationContext::new(dialect)
        .with_self(data)
        .with_options(config.options);

    match template.render_async(ctx).await {
        Ok((out, _)) => {
            let mut stdout = tokio::io::stdout();
            if let Err(e) = stdout.write_all(out.as_bytes()).await {
                eprintln!("stencil: {e}");
                return ExitCode::FAILURE;
            }
            let _ = stdout.flush().await;
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("stencil: {e}");
            ExitCode::FAILURE
        }
    }
}

/// `STENCIL_LOG` selects what is logged to stderr; warnings by default.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("STENCIL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

/// `-D` values that read as numbers or booleans are bound as such.
fn typed(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map_or_else(|| Value::from(raw), Value::Number),
    }
}
