use clap::Parser;
use email_daemon::core::stage;
use email_daemon::utils::{logger, validation::Validate};
use email_daemon::DependencyManifest;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stage-deps")]
#[command(about = "Copies dependency build artifacts into dependencies/ using the manifest's import rules")]
struct Args {
    /// Path to a TOML dependency manifest (built-in manifest when omitted)
    #[arg(short, long)]
    manifest: Option<String>,

    /// Install prefix of a dependency; may be repeated
    #[arg(short, long, required = true)]
    prefix: Vec<PathBuf>,

    /// Staging root that receives the dependencies/ tree
    #[arg(short, long, default_value = ".")]
    dest: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Show what would be copied without copying
    #[arg(long)]
    dry_run: bool,
}

fn main() {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    let manifest = match &args.manifest {
        Some(path) => match DependencyManifest::from_file(path) {
            Ok(manifest) => manifest,
            Err(e) => {
                eprintln!("❌ Failed to load manifest '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        None => DependencyManifest::email_daemon(),
    };

    if let Err(e) = manifest.validate() {
        tracing::error!("❌ Manifest validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());
        std::process::exit(1);
    }

    println!("📋 Manifest: {}", manifest.project.name);
    for requirement in &manifest.requires {
        println!("  requires {}", requirement);
    }
    println!("  all static: {}", manifest.all_static());
    if let Some(tls) = manifest.tls_provider() {
        println!("  TLS provider: {} {}", tls.name, tls.version);
    }
    println!();

    match stage(&manifest, &args.prefix, &args.dest, args.dry_run) {
        Ok(report) => {
            for file in &report.files {
                match &file.link_target {
                    Some(target) => println!(
                        "  {} -> {} (link to {})",
                        file.source.display(),
                        file.destination.display(),
                        target.display()
                    ),
                    None => println!("  {} -> {}", file.source.display(), file.destination.display()),
                }
            }
            for collision in &report.collisions {
                println!(
                    "  ⚠️ {} kept from {}, ignored {}",
                    collision.destination.display(),
                    collision.kept.display(),
                    collision.ignored.display()
                );
            }
            println!();
            for (pattern, count) in &report.per_rule {
                println!("  {:<10} {} file(s)", pattern, count);
            }
            if args.dry_run {
                println!("🔍 Dry run: {} file(s) would be staged", report.files.len());
            } else {
                println!("✅ Staged {} file(s) into {}", report.files.len(), args.dest.display());
            }
        }
        Err(e) => {
            tracing::error!("❌ Staging failed: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    }
}
