use std::sync::Arc;
use std::{fs, process};

use clap::Parser;
use replay_cli::{App, Command};
use replay_pipeline::{HttpPipeline, JsonFileStorage, ReplayConfig, Storage};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let app = App::parse();

    let storage: Arc<dyn Storage> = Arc::new(
        JsonFileStorage::open(app.data.clone()).unwrap_or_else(|e| {
            eprintln!("Failed to open state file {}: {e}", app.data.display());
            process::exit(1);
        }),
    );

    let config = load_config(&app, storage.as_ref());
    let pipeline = HttpPipeline::with_http(Arc::clone(&storage), config).unwrap_or_else(|e| {
        eprintln!("Failed to build pipeline: {e}");
        process::exit(1);
    });

    match &app.command {
        Command::Serve(args) => {
            if let Err(e) = replay_server::serve(Arc::new(pipeline), args.addr).await {
                eprintln!("Server error: {e}");
                process::exit(1);
            }
        }
        Command::Trigger => {
            pipeline.trigger().await.unwrap_or_else(|e| {
                eprintln!("Pipeline run failed: {e}");
                process::exit(1);
            });
            println!("Pipeline ran to the resolution boundary.");
        }
        Command::Retrigger => {
            pipeline.retrigger().await.unwrap_or_else(|e| {
                eprintln!("Pipeline re-run failed: {e}");
                process::exit(1);
            });
            println!("Pipeline re-ran from the previous boundary.");
        }
        Command::Push => {
            let outcome = pipeline.push().await.unwrap_or_else(|e| {
                eprintln!("Push failed: {e}");
                process::exit(1);
            });
            println!(
                "Pushed changeset {} with {} changes.",
                outcome.changeset_id, outcome.changes
            );
        }
        Command::Status => status(storage.as_ref()),
        Command::Emit(args) => emit(storage.as_ref(), args),
        Command::Reset => {
            pipeline.reset().unwrap_or_else(|e| {
                eprintln!("Reset failed: {e}");
                process::exit(1);
            });
            println!("Pipeline reset.");
        }
    }
}

fn load_config(app: &App, storage: &dyn Storage) -> ReplayConfig {
    if let Some(path) = &app.config {
        let raw = fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("Failed to read {}: {e}", path.display());
            process::exit(1);
        });
        let config: ReplayConfig = serde_json::from_str(&raw).unwrap_or_else(|e| {
            eprintln!("Failed to parse {}: {e}", path.display());
            process::exit(1);
        });
        if let Err(e) = storage.save_config(&config) {
            eprintln!("Failed to store configuration: {e}");
            process::exit(1);
        }
        return config;
    }
    match storage.load_config() {
        Ok(Some(config)) => config,
        Ok(None) => ReplayConfig::default(),
        Err(e) => {
            eprintln!("Failed to load stored configuration: {e}");
            process::exit(1);
        }
    }
}

fn status(storage: &dyn Storage) {
    let status = storage.load_status().unwrap_or_else(|e| {
        eprintln!("Failed to load status: {e}");
        process::exit(1);
    });
    println!("state: {}", status.state);
    println!("complete: {}", status.is_current_state_complete);
    if status.has_errored {
        println!(
            "errored: {}",
            status.error_details.as_deref().unwrap_or("unknown error")
        );
    }
    if let Some(data) = status.elements_data {
        println!(
            "local: {} nodes, {} ways, {} relations",
            data.local.nodes, data.local.ways, data.local.relations
        );
        println!(
            "upstream: {} nodes, {} ways, {} relations",
            data.upstream.nodes, data.upstream.ways, data.upstream.relations
        );
    }
}

fn emit(storage: &dyn Storage, args: &replay_cli::EmitArgs) {
    let store = storage.load_elements().unwrap_or_else(|e| {
        eprintln!("Failed to load elements: {e}");
        process::exit(1);
    });
    let plan = replay_core::plan_changeset(&store, args.changeset).unwrap_or_else(|e| {
        eprintln!("Failed to plan changeset: {e:?}");
        process::exit(1);
    });
    let xml = replay_osm::writer::osm_change_to_xml(&plan).unwrap_or_else(|e| {
        eprintln!("Failed to serialize changeset: {e}");
        process::exit(1);
    });
    match &args.out {
        Some(path) => {
            fs::write(path, xml).unwrap_or_else(|e| {
                eprintln!("Failed to write {}: {e}", path.display());
                process::exit(1);
            });
            println!("Wrote {} changes to {}.", plan.changes.len(), path.display());
        }
        None => println!("{xml}"),
    }
}
