mod config;
mod render;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use config::Config;
use rollcall_core::types::{ClassId, RecordId};
use rollcall_core::{
    AttendanceBackend, AttendanceCalendar, AttendanceReviewController, GroupKey, HttpBackend,
    RecognitionClient, RecognitionMode, RecognitionSession,
};
use rollcall_hw::{CameraWorker, CaptureEncoder, V4l2Camera};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance capture and review")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "ROLLCALL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List classes known to the backend
    Classes,
    /// List V4L2 capture devices
    Devices,
    /// Stream the camera and submit captures for recognition
    Capture {
        /// Class the captures are recorded against
        #[arg(long)]
        class: Option<ClassId>,
        /// Make Enter submit a dry run instead of registering attendance
        #[arg(long)]
        dry_run: bool,
    },
    /// Print a month calendar
    Calendar {
        /// Month to show (YYYY-MM); defaults to the current month
        #[arg(long, value_parser = parse_month)]
        month: Option<NaiveDate>,
        /// Day to highlight (YYYY-MM-DD)
        #[arg(long)]
        select: Option<NaiveDate>,
    },
    /// Show the attendance of one day, grouped by class
    Review {
        #[arg(long)]
        date: NaiveDate,
        /// Only show one class (id or "unassigned")
        #[arg(long)]
        class: Option<GroupKey>,
    },
    /// Approve (or with --reject, revoke) an attendance record
    Approve {
        id: RecordId,
        /// Day the record belongs to
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        reject: bool,
    },
}

fn parse_month(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d")
        .map_err(|_| format!("expected YYYY-MM, got {raw:?}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(
        api_url = %config.api_url,
        device = %config.camera_device,
        "configuration loaded"
    );

    match cli.command {
        Commands::Classes => {
            let classes = backend(&config)?.list_classes().await?;
            if classes.is_empty() {
                println!("No classes");
            }
            for class in classes {
                println!("{:>6}  {}", class.id, class.name);
            }
        }
        Commands::Devices => {
            let devices = V4l2Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Capture { class, dry_run } => {
            let default_mode = if dry_run {
                RecognitionMode::DryRun
            } else {
                RecognitionMode::Commit
            };
            capture(&config, class, default_mode).await?;
        }
        Commands::Calendar { month, select } => {
            let mut calendar = AttendanceCalendar::default();
            if let Some(date) = select {
                calendar.select_day(date);
            }
            if let Some(month) = month {
                calendar.show_month(month);
            }
            print!("{}", render::calendar(&calendar));
        }
        Commands::Review { date, class } => {
            let mut review = reviewer(&config)?;
            review.select_day(date).await?;
            if let Some(key) = class {
                if !review.available_classes().iter().any(|(k, _)| *k == key) {
                    tracing::warn!(class = %key, %date, "class has no attendance on this day");
                }
            }
            review.set_class_filter(class);
            print!("{}", render::calendar(review.calendar()));
            println!();
            print!("{}", render::groups(&review.groups(), &review.summary()));
        }
        Commands::Approve { id, date, reject } => {
            let mut review = reviewer(&config)?;
            review.select_day(date).await?;
            review.set_approval(id, !reject).await?;
            println!(
                "Record {id} {}",
                if reject { "marked invalid" } else { "approved" }
            );
            print!("{}", render::groups(&review.groups(), &review.summary()));
        }
    }

    Ok(())
}

fn backend(config: &Config) -> Result<Arc<dyn AttendanceBackend>> {
    let backend = HttpBackend::new(
        &config.api_url,
        config.endpoints.clone(),
        config.request_timeout(),
    )?;
    Ok(Arc::new(backend))
}

fn reviewer(config: &Config) -> Result<AttendanceReviewController> {
    Ok(AttendanceReviewController::new(
        backend(config)?,
        config.reviewer_id,
        AttendanceCalendar::default(),
    ))
}

/// Interactive capture loop: Enter submits in `default_mode`, `t` submits
/// a dry run, `q` quits.
async fn capture(
    config: &Config,
    class_id: Option<ClassId>,
    default_mode: RecognitionMode,
) -> Result<()> {
    let backend = backend(config)?;
    let class = match class_id {
        Some(id) => {
            let classes = backend.list_classes().await.context("loading classes")?;
            Some(
                classes
                    .into_iter()
                    .find(|c| c.id == id)
                    .ok_or_else(|| anyhow!("unknown class {id}"))?,
            )
        }
        None => None,
    };

    let camera = V4l2Camera::new(
        &config.camera_device,
        config.capture_width,
        config.capture_height,
    )
    .with_warmup_frames(config.warmup_frames);
    let mut session = RecognitionSession::new(
        CameraWorker::spawn(camera)?,
        CaptureEncoder::new(config.jpeg_quality),
        RecognitionClient::new(backend),
    )
    .with_max_upload_size(config.capture_width, config.capture_height);
    session.bind_class(class);

    session
        .toggle_streaming()
        .await
        .with_context(|| format!("starting camera {}", config.camera_device))?;

    match session.class() {
        Some(class) => println!("Capturing for {} ({default_mode})", class.name),
        None => println!("Capturing without a class ({default_mode})"),
    }
    println!("Enter = capture, t = dry run, q = quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let mode = match line.trim() {
            "" => default_mode,
            "t" => RecognitionMode::DryRun,
            "q" => break,
            other => {
                println!("unknown command {other:?}");
                continue;
            }
        };
        match session.submit(mode).await {
            Ok(result) => println!("{}", render::capture_result(&result)),
            Err(e) => {
                tracing::debug!(error = %e, "capture failed");
                let banner = session.banner().map(str::to_string);
                println!("Error: {}", banner.unwrap_or_else(|| e.to_string()));
            }
        }
    }

    session.stop_streaming().await;
    Ok(())
}
