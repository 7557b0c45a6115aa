//! Mood Reply Daemon - CLI entry point
//!
//! Manages the auto-reply daemon process: start/stop/status, log tailing,
//! LaunchAgent installation, and the daemon loop itself.

use clap::{Parser, Subcommand};
use mood_reply_rs::config::Config;
use mood_reply_rs::daemon::Daemon;
use mood_reply_rs::ollama::OllamaClient;
use mood_reply_rs::Result;
use std::fs;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Mood Reply - iMessage auto-reply daemon manager
#[derive(Parser)]
#[command(name = "mood-reply-rs")]
#[command(about = "Manage the mood reply daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start,

    /// Stop the daemon
    Stop,

    /// Restart the daemon
    Restart,

    /// Show daemon status
    Status,

    /// Tail the log file
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: u32,

        /// Don't follow the log
        #[arg(long = "no-follow")]
        no_follow: bool,
    },

    /// Install LaunchAgent for auto-start
    Install,

    /// Uninstall LaunchAgent
    Uninstall,

    /// Run the daemon (internal)
    #[command(hide = true)]
    Run,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = Config::default();

    match cli.command {
        Commands::Start => cmd_start(&config),
        Commands::Stop => cmd_stop(&config),
        Commands::Restart => cmd_restart(&config),
        Commands::Status => cmd_status(&config),
        Commands::Logs { lines, no_follow } => cmd_logs(&config, lines, !no_follow),
        Commands::Install => cmd_install(&config),
        Commands::Uninstall => cmd_uninstall(&config),
        Commands::Run => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cmd_run(&config))
        }
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

fn get_pid(config: &Config) -> Option<u32> {
    let pid_file = config.state_dir.join("daemon.pid");
    if !pid_file.exists() {
        return None;
    }

    let content = fs::read_to_string(&pid_file).ok()?;
    let pid: u32 = content.trim().parse().ok()?;

    // Check if process is running
    let status = Command::new("kill").args(["-0", &pid.to_string()]).status();

    if status.map(|s| s.success()).unwrap_or(false) {
        Some(pid)
    } else {
        // PID file exists but process is dead
        let _ = fs::remove_file(&pid_file);
        None
    }
}

fn is_running(config: &Config) -> bool {
    get_pid(config).is_some()
}

fn cmd_start(config: &Config) -> Result<()> {
    if is_running(config) {
        println!("Daemon already running (PID {})", get_pid(config).unwrap());
        return Ok(());
    }

    // Ensure directories exist
    fs::create_dir_all(&config.state_dir)?;
    fs::create_dir_all(&config.logs_dir)?;

    let log_file = config.logs_dir.join("daemon.log");
    let log = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)?;

    // Get current executable path
    let exe = std::env::current_exe()?;

    // Start the daemon
    let child = Command::new(&exe)
        .arg("run")
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log))
        .spawn()?;

    // Write PID file
    let pid_file = config.state_dir.join("daemon.pid");
    fs::write(&pid_file, child.id().to_string())?;

    println!("Daemon started (PID {})", child.id());
    println!("Logs: {}", log_file.display());

    Ok(())
}

fn cmd_stop(config: &Config) -> Result<()> {
    let pid = match get_pid(config) {
        Some(p) => p,
        None => {
            println!("Daemon not running");
            return Ok(());
        }
    };

    println!("Stopping daemon (PID {})...", pid);

    // Send SIGTERM
    let _ = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status();

    // Wait for it to die
    for _ in 0..10 {
        std::thread::sleep(Duration::from_millis(500));
        let status = Command::new("kill").args(["-0", &pid.to_string()]).status();
        if !status.map(|s| s.success()).unwrap_or(false) {
            break;
        }
    }

    // Force kill if still running
    let status = Command::new("kill").args(["-0", &pid.to_string()]).status();
    if status.map(|s| s.success()).unwrap_or(false) {
        println!("Force killing...");
        let _ = Command::new("kill")
            .args(["-KILL", &pid.to_string()])
            .status();
    }

    let pid_file = config.state_dir.join("daemon.pid");
    let _ = fs::remove_file(&pid_file);

    println!("Daemon stopped");
    Ok(())
}

fn cmd_restart(config: &Config) -> Result<()> {
    if is_running(config) {
        cmd_stop(config)?;
        std::thread::sleep(Duration::from_secs(1));
    }
    cmd_start(config)
}

fn cmd_status(config: &Config) -> Result<()> {
    if let Some(pid) = get_pid(config) {
        // Get uptime
        let result = Command::new("ps")
            .args(["-p", &pid.to_string(), "-o", "etime="])
            .output();

        if let Ok(output) = result {
            let uptime = String::from_utf8_lossy(&output.stdout);
            println!("Daemon running (PID {}, uptime {})", pid, uptime.trim());
        } else {
            println!("Daemon running (PID {})", pid);
        }

        if config.handoff_file.exists() {
            println!("Hand-off record: {}", config.handoff_file.display());
        }
    } else {
        println!("Daemon not running");
    }

    Ok(())
}

fn cmd_logs(config: &Config, lines: u32, follow: bool) -> Result<()> {
    let log_file = config.logs_dir.join("daemon.log");
    if !log_file.exists() {
        println!("Log file not found: {}", log_file.display());
        return Ok(());
    }

    let mut cmd = Command::new("tail");
    if follow {
        cmd.arg("-f");
    }
    cmd.args(["-n", &lines.to_string(), log_file.to_str().unwrap()]);

    let _ = cmd.status();
    Ok(())
}

fn cmd_install(config: &Config) -> Result<()> {
    let plist_dst = dirs::home_dir()
        .unwrap()
        .join("Library/LaunchAgents/com.moodreply.daemon.plist");

    let exe = std::env::current_exe()?;
    let plist_content = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>com.moodreply.daemon</string>
    <key>ProgramArguments</key>
    <array>
        <string>{}</string>
        <string>run</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
    <key>StandardOutPath</key>
    <string>{}/daemon.log</string>
    <key>StandardErrorPath</key>
    <string>{}/daemon.log</string>
</dict>
</plist>
"#,
        exe.display(),
        config.logs_dir.display(),
        config.logs_dir.display()
    );

    fs::create_dir_all(plist_dst.parent().unwrap())?;
    fs::write(&plist_dst, plist_content)?;
    println!("Installed: {}", plist_dst.display());

    Command::new("launchctl")
        .args(["load", plist_dst.to_str().unwrap()])
        .status()?;
    println!("LaunchAgent loaded - daemon will start on login");

    Ok(())
}

fn cmd_uninstall(_config: &Config) -> Result<()> {
    let plist_dst = dirs::home_dir()
        .unwrap()
        .join("Library/LaunchAgents/com.moodreply.daemon.plist");

    if !plist_dst.exists() {
        println!("LaunchAgent not installed");
        return Ok(());
    }

    Command::new("launchctl")
        .args(["unload", plist_dst.to_str().unwrap()])
        .output()?;

    fs::remove_file(&plist_dst)?;
    println!("LaunchAgent uninstalled");

    Ok(())
}

// ============================================================================
// Daemon
// ============================================================================

async fn cmd_run(config: &Config) -> Result<()> {
    let backend = OllamaClient::new(&config.ollama_url, &config.ollama_model);
    Daemon::new(config, backend).run().await
}
