use anyhow::{anyhow, bail, Context};
use idcapture::analytics::LogAnalytics;
use idcapture::capture::{CaptureAdapter, ExternalDevice, FieldCaptureResult};
use idcapture::flow::MemoryHistory;
use idcapture::upload::{EncryptionKey, HttpTransport};
use idcapture::{DocumentCapture, IdCaptureConfig, Messages, SubmissionOutcome};
use std::env;
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    idcapture::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: idcapture-cli <command> [args]");
        eprintln!("Commands:");
        eprintln!("  submit --config <toml> --front <img> --back <img> [--selfie <img>] [--key-base64 <key>] [--json]");
        eprintln!("  check-config <toml>");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "submit" => cmd_submit(&args).await,
        "check-config" => cmd_check_config(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn cmd_check_config(args: &[String]) -> anyhow::Result<()> {
    let path = args
        .get(2)
        .ok_or_else(|| anyhow!("Usage: idcapture-cli check-config <toml>"))?;
    if !Path::new(path).exists() {
        bail!("Config file not found: {}", path);
    }

    let config = IdCaptureConfig::load_from_file(path)?;
    config.validate()?;

    println!("{}: ok", path);
    println!("  endpoint: {}", config.submission.endpoint);
    println!(
        "  background uploads: {}",
        if config.submission.is_async() {
            config
                .submission
                .background_upload_urls
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            "disabled".to_string()
        }
    );
    Ok(())
}

struct SubmitArgs {
    config: String,
    images: Vec<(&'static str, String)>,
    key_base64: Option<String>,
    json: bool,
}

fn next_value(args: &[String], i: &mut usize) -> anyhow::Result<String> {
    let flag = &args[*i];
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| anyhow!("{} requires a value", flag))
}

fn parse_submit_args(args: &[String]) -> anyhow::Result<SubmitArgs> {
    let mut config = None;
    let mut images = Vec::new();
    let mut key_base64 = None;
    let mut json = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => config = Some(next_value(args, &mut i)?),
            "--front" => images.push(("front", next_value(args, &mut i)?)),
            "--back" => images.push(("back", next_value(args, &mut i)?)),
            "--selfie" => images.push(("selfie", next_value(args, &mut i)?)),
            "--key-base64" => key_base64 = Some(next_value(args, &mut i)?),
            "--json" => json = true,
            other => bail!("Unknown argument: {}", other),
        }
        i += 1;
    }

    Ok(SubmitArgs {
        config: config.ok_or_else(|| anyhow!("--config required"))?,
        images,
        key_base64,
        json,
    })
}

fn mime_type_for(path: &str) -> &'static str {
    match Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

async fn cmd_submit(args: &[String]) -> anyhow::Result<()> {
    let submit = parse_submit_args(args)?;

    let config = IdCaptureConfig::load_from_file(&submit.config)?;
    config.validate()?;
    let messages = Messages::for_locale(&config.flow.locale).unwrap_or_else(Messages::english);

    let key = submit
        .key_base64
        .as_deref()
        .map(EncryptionKey::from_base64)
        .transpose()?;
    let transport = HttpTransport::new(config.submission.request_timeout())?;
    let has_selfie = submit.images.iter().any(|(field, _)| *field == "selfie");

    let pipeline = DocumentCapture::new(config, Arc::new(transport), key, Arc::new(LogAnalytics))
        .with_selfie(has_selfie);
    let mut flow = pipeline.mount(Box::new(MemoryHistory::new()));

    for (field, path) in &submit.images {
        let field: &str = field;
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path))?;
        let name = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(field);

        let adapter = CaptureAdapter::new(Arc::new(ExternalDevice), Arc::new(LogAnalytics), false);
        let mut capture = pipeline.field_capture(field, adapter);
        match capture.upload(name, mime_type_for(path), &bytes).await {
            FieldCaptureResult::Accepted { value, .. } => flow.set_field_value(field, value),
            FieldCaptureResult::Rejected(error) => {
                let message = messages.render(&error).unwrap_or_else(|| error.to_string());
                bail!("{} rejected: {}", field, message);
            }
            FieldCaptureResult::UploadRequired => bail!("{} requires a file upload", field),
        }
    }

    let outcome = pipeline.submit_flow(&mut flow).await?;

    if submit.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        SubmissionOutcome::Completed { values } => {
            println!("Submitted {} field(s)", values.len());
        }
        SubmissionOutcome::Redirect { url } => println!("Redirected to {}", url),
        SubmissionOutcome::Blocked { errors } => {
            for display in messages.render_step_errors(&errors) {
                println!("{:?}", display);
            }
            bail!("Flow incomplete");
        }
        SubmissionOutcome::Retry { state } => {
            for display in messages.render_step_errors(&state.errors) {
                println!("{:?}", display);
            }
            if let Some(remaining) = state.remaining_attempts {
                println!("Remaining attempts: {}", remaining);
            }
            bail!("Submission not accepted");
        }
        SubmissionOutcome::Cancelled => println!("Cancelled"),
    }
    Ok(())
}
