use std::env;

use fhir_upsert_server::ServerBuilder;
use fhir_upsert_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    let config_path = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    fhir_upsert_server::observability::init_tracing_with_level(&cfg.logging.level);
    tracing::info!(
        path = %config_path,
        allow_update_as_create = cfg.conditional.allow_update_as_create,
        "configuration loaded"
    );

    let server = ServerBuilder::new().with_config(cfg).build();
    if let Err(err) = server.run().await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}

/// `--config <path>`, then `FHIR_UPSERT_CONFIG`, then the default path.
fn resolve_config_path() -> String {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config"
            && let Some(path) = args.next()
        {
            return path;
        }
    }

    if let Ok(path) = env::var("FHIR_UPSERT_CONFIG")
        && !path.is_empty()
    {
        return path;
    }

    DEFAULT_CONFIG_PATH.to_string()
}
