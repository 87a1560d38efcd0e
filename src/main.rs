use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use formstep::config::Config;
use formstep::wizard::definition::load_definition;
use formstep::{logging, rest};

#[derive(Parser)]
#[command(name = "formstep")]
#[command(about = "Server-rendered multi-step form wizards")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the wizard definitions in the forms directory
    Serve {
        /// Port to listen on (default: server.port from config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate a wizard definition file
    Check {
        /// Definition file (.yaml, .yml, .json or .toml)
        definition: PathBuf,
    },

    /// Print the OpenAPI document
    Openapi {
        /// Emit YAML instead of JSON
        #[arg(long)]
        yaml: bool,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;
    let _logging_handle = logging::init_logging(&config, cli.debug)?;

    match cli.command {
        Commands::Serve { port } => cmd_serve(&config, port).await?,
        Commands::Check { definition } => cmd_check(&config, &definition)?,
        Commands::Openapi { yaml, output } => cmd_openapi(yaml, output)?,
    }

    Ok(())
}

async fn cmd_serve(config: &Config, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.server.port);
    let state = rest::ApiState::new(config.clone())?;

    println!("Starting formstep server...");
    println!("  Address: http://{}:{}", config.server.host, port);
    println!("  Forms:   {}", config.forms_path().display());
    for id in state.forms.keys() {
        println!("    - {}", id);
    }
    println!("  Endpoints:");
    println!("    GET    /api/v1/health                                  Health check");
    println!("    GET    /api/v1/forms                                   List forms");
    println!("    POST   /api/v1/forms/:form_id/sessions                 Start a session");
    println!("    GET    /api/v1/forms/:form_id/sessions/:id/render      Wizard page");
    println!("    POST   /api/v1/forms/:form_id/sessions/:id/submit      Browser submission");
    println!("    POST   /api/v1/forms/:form_id/sessions/:id             JSON submission");
    println!("    DELETE /api/v1/forms/:form_id/sessions/:id             Reset");
    println!();

    rest::serve(state, &config.server.host, port).await
}

fn cmd_check(config: &Config, path: &Path) -> Result<()> {
    let wizard = load_definition(path, &config.session.prefix)
        .with_context(|| format!("Invalid wizard definition {}", path.display()))?;
    let form = &wizard.config;

    let steps: Vec<String> = form.steps().iter().map(ToString::to_string).collect();
    let mut required: Vec<String> = form
        .required_save_steps()
        .iter()
        .map(ToString::to_string)
        .collect();
    required.sort();

    println!("{}: ok", wizard.id);
    if let Some(description) = &wizard.description {
        println!("  Description: {}", description);
    }
    println!("  Steps:       {}", steps.join(" > "));
    println!("  Init step:   {}", form.init_step());
    println!("  Mode:        {}", form.mode());
    println!("  Navigation:  {}", if form.allow_navigation() { "allowed" } else { "disabled" });
    if !required.is_empty() {
        println!("  Must save:   {}", required.join(", "));
    }
    for step in form.steps() {
        let fields = form.rules().get(step).map_or(0, Vec::len);
        let view = if form.view(step).is_some() { "view" } else { "no view" };
        println!("    [{}] {} rule field(s), {}", step, fields, view);
    }

    Ok(())
}

fn cmd_openapi(yaml: bool, output: Option<PathBuf>) -> Result<()> {
    let document = if yaml {
        rest::ApiDoc::yaml()?
    } else {
        rest::ApiDoc::json()?
    };

    match output {
        Some(path) => std::fs::write(&path, document)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", document),
    }

    Ok(())
}
