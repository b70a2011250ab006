use std::path::Path;
use std::sync::Arc;

use nooltools_core::app::App;
use nooltools_core::storage::DataPaths;
use nooltools_core::store::FileStoreOpener;
use nooltools_core::updater::{follow_until_terminal, BroadcastSink, UpdateConfig, UpdateStage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout은 --json 출력 전용
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args_ref: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

    if matches!(args_ref.first(), Some(&"help" | &"--help" | &"-h")) {
        print_help();
        return Ok(());
    }
    if matches!(args_ref.first(), Some(&"--version" | &"-V")) {
        println!("nooltools-core {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let sink = BroadcastSink::new(64);
    let mut app = App::start(
        DataPaths::from_env()?,
        Arc::new(FileStoreOpener),
        UpdateConfig::default(),
        Arc::new(sink.clone()),
    )?;
    if let Some(notice) = app.startup_notice() {
        eprintln!("⚠ {}", notice);
    }

    let result = match args_ref.first().copied().unwrap_or("status") {
        "status" => cmd_status(&app),
        "check" => cmd_check(&app, &args_ref[1..]).await,
        "update" => cmd_update(&app, &sink).await,
        "migrate" => cmd_migrate(&mut app, &args_ref[1..]),
        other => {
            eprintln!("✗ Unknown command: {}", other);
            eprintln!("  Run 'nooltools-core help' for usage.");
            std::process::exit(1);
        }
    };

    app.shutdown()?;
    result
}

// ═══════════════════════════════════════════════════════
// 명령어 핸들러
// ═══════════════════════════════════════════════════════

fn cmd_status(app: &App) -> anyhow::Result<()> {
    let settings = app.storage_settings()?;
    println!("Data directory:    {}", settings.current_data_dir.display());
    println!("Default directory: {}", settings.default_data_dir.display());
    println!("Custom:            {}", settings.is_custom);
    if let Some(path) = app.store_path() {
        println!("Store:             {}", path.display());
    }
    Ok(())
}

async fn cmd_check(app: &App, flags: &[&str]) -> anyhow::Result<()> {
    let json_mode = flags.contains(&"--json");

    let result = match app.check_for_update().await {
        Ok(result) => result,
        Err(e) if json_mode => {
            let body = serde_json::json!({
                "ok": false,
                "error": e.to_string(),
                "error_code": e.error_code(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("✗ {}", e.user_message());
            return Err(e.into());
        }
    };

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if !result.has_update {
        println!("✓ {} ({})", result.message, result.current_version);
        return Ok(());
    }

    println!(
        "⬆ {} {} → {}",
        result.message, result.current_version, result.latest_version
    );
    if !result.release_url.is_empty() {
        println!("  {}", result.release_url);
    }
    if result.can_auto_update {
        println!("  Run 'nooltools-core update' to install {} ({} bytes).", result.asset_name, result.asset_size);
    } else {
        println!("  Automatic update unavailable: {}", result.auto_update_reason);
    }
    Ok(())
}

async fn cmd_update(app: &App, sink: &BroadcastSink) -> anyhow::Result<()> {
    let mut events = sink.subscribe();
    let handle = app.start_auto_update()?;

    let printer = tokio::spawn(async move {
        follow_until_terminal(&mut events, |event| {
            if event.detail.is_empty() {
                eprintln!("[{:>3}%] {}: {}", event.percent, event.stage.as_str(), event.message);
            } else {
                eprintln!(
                    "[{:>3}%] {}: {} ({})",
                    event.percent,
                    event.stage.as_str(),
                    event.message,
                    event.detail
                );
            }
        })
        .await
    });

    handle.await?;
    match printer.await? {
        Some(event) if event.stage == UpdateStage::Error => {
            eprintln!("✗ {}", event.message);
            anyhow::bail!("automatic update failed: {}", event.detail)
        }
        Some(_) => Ok(()),
        None => anyhow::bail!("automatic update ended without a final status"),
    }
}

fn cmd_migrate(app: &mut App, args: &[&str]) -> anyhow::Result<()> {
    let Some(parent) = args.first() else {
        eprintln!("✗ Usage: nooltools-core migrate <parent-dir>");
        std::process::exit(1);
    };

    let result = app.migrate_storage_directory(Path::new(parent))?;
    println!("✓ Migrated {} → {}", result.from_dir.display(), result.to_dir.display());
    for backup in &result.backed_up_conflicts {
        println!("  backed up: {}", backup.display());
    }
    if result.restart_recommended {
        println!("  Restart nooltools to use the new location.");
    }
    Ok(())
}

fn print_help() {
    println!("nooltools-core {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("USAGE:");
    println!("  nooltools-core <command>");
    println!();
    println!("COMMANDS:");
    println!("  status               Show the current data directory");
    println!("  check [--json]       Check the release feed for a newer version");
    println!("  update               Download, verify and install the latest version");
    println!("  migrate <parent-dir> Move the data directory to <parent-dir>/nooltools_data");
    println!("  help                 Show this help");
}
