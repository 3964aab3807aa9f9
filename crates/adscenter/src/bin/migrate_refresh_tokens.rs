// CLI tool for re-encrypting stored refresh tokens after key rotation.
// Run with: cargo run --bin migrate-refresh-tokens -- --help

use anyhow::{bail, Context, Result};
use autoads_storage::{migrate_refresh_tokens, Database, TokenCipher};
use std::env;

#[derive(Debug)]
struct Args {
    dry_run: bool,
    batch_size: i64,
}

impl Args {
    fn parse() -> Result<Self> {
        let args: Vec<String> = env::args().collect();
        let mut dry_run = false;
        let mut batch_size = 100i64;
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--dry-run" | "-n" => dry_run = true,
                "--batch-size" | "-b" => {
                    i += 1;
                    batch_size = args
                        .get(i)
                        .context("--batch-size requires a value")?
                        .parse()
                        .context("Invalid batch size")?;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                arg => {
                    eprintln!("Unknown argument: {}", arg);
                    print_help();
                    std::process::exit(1);
                }
            }
            i += 1;
        }

        Ok(Self { dry_run, batch_size })
    }
}

fn print_help() {
    eprintln!(
        r#"
migrate-refresh-tokens - Re-encrypt Google Ads refresh tokens under the current key

USAGE:
    migrate-refresh-tokens [OPTIONS]

OPTIONS:
    -n, --dry-run           Report rows that would be rewritten without changing them
    -b, --batch-size <N>    Scan N connections at a time (default: 100)
    -h, --help              Show this help message

ENVIRONMENT:
    DATABASE_URL                    PostgreSQL connection string (required)
    REFRESH_TOKEN_ENC_KEY_B64       Current 32-byte key, base64 (required)
    REFRESH_TOKEN_ENC_KEY_B64_OLD   Previous key, for rows sealed before rotation

Rows that open under the current key are left alone. Rows sealed under the
previous key, and legacy plaintext rows, are sealed again under the current key.

EXAMPLES:
    # See how many rows are pending
    migrate-refresh-tokens --dry-run

    # Rewrite them
    migrate-refresh-tokens --batch-size 500
"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse()?;

    if let Ok(path) = dotenvy::dotenv() {
        tracing::info!("Loaded .env from {:?}", path);
    }

    let cipher = TokenCipher::from_env()
        .context("Failed to initialize token cipher. Ensure REFRESH_TOKEN_ENC_KEY_B64 is set.")?;
    if cipher.is_plaintext() {
        bail!("REFRESH_TOKEN_ENC_KEY_B64 is not set; nothing to encrypt with");
    }
    tracing::info!(previous_key = cipher.has_previous(), "Token cipher initialized");

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = Database::from_url(&database_url)
        .await
        .context("Failed to connect to database")?;

    if args.dry_run {
        tracing::info!("DRY RUN - no changes will be made");
    }

    let report = migrate_refresh_tokens(&db, &cipher, args.batch_size, args.dry_run).await?;

    tracing::info!(
        scanned = report.scanned,
        pending = report.pending,
        updated = report.updated,
        failed = report.failed,
        "Migration finished"
    );
    println!(
        "scanned={} pending={} updated={} failed={}{}",
        report.scanned,
        report.pending,
        report.updated,
        report.failed,
        if args.dry_run { " (dry run)" } else { "" }
    );

    if report.failed > 0 {
        bail!("{} refresh tokens could not be re-encrypted", report.failed);
    }
    Ok(())
}
