use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use timeclock_core::{FaceEmbedder, FaceEncoder};
use timeclock_geo::Coordinate;
use timeclock_store::Store;

#[derive(Parser)]
#[command(name = "timeclock", about = "Timeclock attendance administration CLI")]
struct Cli {
    /// Path to the SQLite database (defaults to the daemon's data directory).
    #[arg(long)]
    db: Option<PathBuf>,

    /// Directory containing the ONNX model files (needed for enrollment).
    #[arg(long)]
    models: Option<PathBuf>,

    /// Company scope to operate on.
    #[arg(long, default_value = "default")]
    scope: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new identity
    Add {
        #[arg(short, long)]
        name: String,
    },
    /// List identities in the scope
    List,
    /// Deactivate an identity (drops it out of matching)
    Deactivate { id: i64 },
    /// Enroll a reference photo for an identity
    Enroll {
        #[arg(long)]
        id: i64,
        /// Path to the photo file
        #[arg(long)]
        image: PathBuf,
    },
    /// Re-encode every identity that has a reference photo on file
    Reencode,
    /// Manage geofence zones
    Zone {
        #[command(subcommand)]
        command: ZoneCommands,
    },
    /// Show recent attendance for an identity
    Attendance {
        #[arg(long)]
        id: i64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ZoneCommands {
    /// Add a circular zone
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
        /// Radius in meters
        #[arg(long)]
        radius: f64,
    },
    /// List zones in the scope
    List,
    /// Remove a zone by id
    Remove { id: i64 },
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("timeclock")
}

fn open_store(cli: &Cli) -> Result<Store> {
    let path = cli
        .db
        .clone()
        .or_else(|| std::env::var("TIMECLOCK_DB_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| data_dir().join("timeclock.db"));
    Store::open(&path).with_context(|| format!("opening database {}", path.display()))
}

fn load_encoder(cli: &Cli) -> Result<FaceEncoder> {
    let dir = cli
        .models
        .clone()
        .or_else(|| std::env::var("TIMECLOCK_MODEL_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| data_dir().join("models"));
    let detector = dir.join("version-RFB-320.onnx");
    let embedder = dir.join("face_recognition_resnet_v1.onnx");
    FaceEncoder::load(
        &detector.to_string_lossy(),
        &embedder.to_string_lossy(),
    )
    .context("loading face models")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let store = open_store(&cli)?;

    match &cli.command {
        Commands::Add { name } => {
            let identity = store.create_identity(&cli.scope, name)?;
            println!("Created identity {} ({})", identity.id, identity.name);
        }
        Commands::List => {
            for identity in store.list_identities(&cli.scope)? {
                println!(
                    "{:>5}  {:<24} active={} enrolled={}",
                    identity.id, identity.name, identity.active, identity.has_encoding
                );
            }
        }
        Commands::Deactivate { id } => {
            store.set_active(*id, false)?;
            println!("Deactivated identity {id}");
        }
        Commands::Enroll { id, image } => {
            let bytes = std::fs::read(image)
                .with_context(|| format!("reading {}", image.display()))?;
            store.set_reference_image(*id, &bytes)?;

            let mut encoder = load_encoder(&cli)?;
            match encoder.encode(&bytes) {
                Ok(encoding) => {
                    store.store_encoding(*id, &encoding)?;
                    println!("Enrolled identity {id}");
                }
                Err(err) => {
                    store.clear_encoding(*id)?;
                    bail!("enrollment failed for identity {id}: {err}");
                }
            }
        }
        Commands::Reencode => {
            let ids = store.identities_with_reference_image(&cli.scope)?;
            if ids.is_empty() {
                println!("No identities with reference photos in scope {}", cli.scope);
                return Ok(());
            }

            let mut encoder = load_encoder(&cli)?;
            let mut generated = 0usize;
            for id in ids {
                let Some(bytes) = store.reference_image(id)? else {
                    continue;
                };
                match encoder.encode(&bytes) {
                    Ok(encoding) => {
                        store.store_encoding(id, &encoding)?;
                        generated += 1;
                    }
                    Err(err) => {
                        tracing::warn!(identity_id = id, error = %err, "re-encoding failed");
                        store.clear_encoding(id)?;
                    }
                }
            }
            println!("Face encodings generated for {generated} identities");
        }
        Commands::Zone { command } => match command {
            ZoneCommands::Add { name, lat, lon, radius } => {
                let zone =
                    store.add_zone(&cli.scope, name, Coordinate::new(*lat, *lon), *radius)?;
                println!("Added zone {} ({})", zone.id, zone.name);
            }
            ZoneCommands::List => {
                for zone in store.zones_for_scope(&cli.scope)? {
                    println!(
                        "{:>5}  {:<24} ({:.6}, {:.6}) r={}m",
                        zone.id, zone.name, zone.center.latitude, zone.center.longitude,
                        zone.radius_m
                    );
                }
            }
            ZoneCommands::Remove { id } => {
                store.remove_zone(*id)?;
                println!("Removed zone {id}");
            }
        },
        Commands::Attendance { id, limit } => {
            for record in store.attendance_for_identity(*id, *limit)? {
                let check_out = record
                    .check_out
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "(open)".to_string());
                println!(
                    "{:>5}  in {}  out {}  {}",
                    record.id,
                    record.check_in.to_rfc3339(),
                    check_out,
                    record.check_in_address.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}
