use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ruta")]
#[command(about = "Ruta — route inbound leads and messages to agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default files (config, data directory).
    Init {
        /// Config file path (default: RUTA_CONFIG_PATH or ~/.ruta/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the HTTP API server (agents, sources, facebook sync, mappings, dispatch).
    Serve {
        /// Config file path (default: RUTA_CONFIG_PATH or ~/.ruta/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 7077)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Sync lead forms from the configured Facebook page, then pull leads.
    Sync {
        /// Config file path (default: RUTA_CONFIG_PATH or ~/.ruta/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Pull leads for this external form ID only (default: every known form)
        #[arg(long, value_name = "FORM_ID")]
        form: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("ruta {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Sync { config, form }) => {
            if let Err(e) = run_sync(config, form).await {
                log::error!("sync failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let (config, path) = lib::config::load_config(Some(path))?;
    let dir = lib::init::init_config_dir(&path, &config)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.server.port = p;
    }
    log::info!("starting api on {}:{}", config.server.bind, config.server.port);
    lib::api::run_server(config, path).await
}

async fn run_sync(
    config_path: Option<std::path::PathBuf>,
    form: Option<String>,
) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    let data_dir = lib::config::resolve_data_dir(&config, &path);
    let sources = lib::sources::SourceRegistry::load(data_dir.join("sources.json")).await;
    let leads = lib::leads::LeadStore::load(data_dir.join("leads.json")).await;
    let graph = lib::facebook::GraphClient::new(
        lib::config::resolve_facebook_token(&config),
        config.facebook.page_id.clone(),
        config.facebook.api_base.clone(),
    );

    let forms = lib::sync::sync_forms(&graph, &sources).await?;
    println!("synced {} form(s)", forms.len());

    match form {
        Some(form_id) => {
            let inserted = lib::sync::sync_form_leads(&graph, &sources, &leads, &form_id).await?;
            println!("form {}: {} new lead(s)", form_id, inserted.len());
        }
        None => {
            let outcomes = lib::sync::sync_all_leads(&graph, &sources, &leads).await;
            for outcome in &outcomes {
                match &outcome.error {
                    Some(e) => println!("form {} ({}): failed: {}", outcome.external_id, outcome.name, e),
                    None => println!(
                        "form {} ({}): {} new lead(s)",
                        outcome.external_id, outcome.name, outcome.inserted
                    ),
                }
            }
            let total: usize = outcomes.iter().map(|o| o.inserted).sum();
            println!("done: {} new lead(s) across {} form(s)", total, outcomes.len());
        }
    }
    Ok(())
}
