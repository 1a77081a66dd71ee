use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use clap::{error::ErrorKind, CommandFactory, Parser};
use fyuse_tryon::{
    config::AppConfig,
    models::request::TryOnRequest,
    services::{
        analytics::AnalyticsClient,
        api::HttpJobApi,
        auth::{Claims, StaticToken, TokenProvider},
        store::{JobStore, MemoryJobStore, RedisJobStore},
        upload::{ImageKind, ImageUploader, UploadError},
    },
    workflow::{
        flow::{FlowConfig, FlowKind},
        presenter::{LogPresenter, Presentation},
        state::WorkflowState,
        JobWorkflow,
    },
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Submit a virtual try-on and wait for the generated image.
#[derive(Debug, Parser)]
#[command(name = "fyuse-tryon", version)]
struct Cli {
    /// Photo of the person: an uploaded image URL or a local JPEG path
    #[arg(long, required_unless_present = "resume")]
    person_image: Option<String>,

    /// Photo of the garment: an uploaded image URL or a local JPEG path
    #[arg(long, required_unless_present = "resume")]
    garment_image: Option<String>,

    /// Requesting user; defaults to the e-mail claim of API_TOKEN
    #[arg(long, env = "USER_EMAIL")]
    user_email: Option<String>,

    /// fitting-room, direct-fitting or style-recommendation (overrides FLOW)
    #[arg(long, value_parser = parse_flow)]
    flow: Option<FlowKind>,

    /// Resume polling the job left behind by an interrupted run
    #[arg(long)]
    resume: bool,
}

fn parse_flow(raw: &str) -> Result<FlowKind, String> {
    FlowKind::from_str(raw).map_err(|_| format!("unknown flow '{raw}'"))
}

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    let flow = FlowConfig::for_kind(cli.flow.unwrap_or(config.flow));
    tracing::info!(flow = %flow.kind, "Initializing fyuse-tryon");

    let auth: Arc<dyn TokenProvider> = Arc::new(StaticToken::new(config.api_token.clone()));

    let store: Arc<dyn JobStore> = match &config.redis_url {
        Some(url) => {
            tracing::info!("Connecting to Redis job store");
            let store = RedisJobStore::new(url, &flow.storage_key)
                .expect("Failed to initialize Redis job store");
            if let Err(e) = store.health_check().await {
                tracing::warn!(error = %e, "Redis job store unreachable");
            }
            Arc::new(store)
        }
        None => Arc::new(MemoryJobStore::new()),
    };

    let api = Arc::new(HttpJobApi::new(&config.api_base_url, flow.clone(), auth.clone()));
    let analytics = AnalyticsClient::new(config.analytics_url.clone(), auth.clone());

    let workflow = JobWorkflow::new(
        flow,
        api,
        store,
        config.poll_policy(),
        Arc::new(LogPresenter),
    )
    .with_analytics(analytics);

    // Ctrl-C behaves like leaving the page: abort and stop polling.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let final_state = if cli.resume {
        match workflow.resume(&cancel).await {
            Some(state) => state,
            None => {
                tracing::info!("No interrupted job to resume");
                return;
            }
        }
    } else {
        let Some(user_email) = cli
            .user_email
            .clone()
            .or_else(|| email_from_token(config.api_token.as_deref()))
        else {
            Cli::command()
                .error(
                    ErrorKind::MissingRequiredArgument,
                    "no user e-mail: pass --user-email or use a token with an email claim",
                )
                .exit();
        };

        let uploader = ImageUploader::new(&config.api_base_url, auth.clone());
        let person = prepare_image(&uploader, ImageKind::Person, cli.person_image.as_deref(), &user_email).await;
        let garment = prepare_image(&uploader, ImageKind::Garment, cli.garment_image.as_deref(), &user_email).await;

        workflow
            .run(TryOnRequest::new(person, garment, user_email), &cancel)
            .await
    };

    let output = Presentation::for_state(&final_state)
        .map(serde_json::to_value)
        .unwrap_or_else(|| serde_json::to_value(&final_state));
    match output {
        Ok(json) => println!("{json:#}"),
        Err(e) => tracing::error!(error = %e, "Failed to render result"),
    }

    if !matches!(final_state, WorkflowState::Succeeded { .. }) {
        std::process::exit(1);
    }
}

fn email_from_token(token: Option<&str>) -> Option<String> {
    Claims::from_token(token?).ok()?.email
}

/// Resolve an image reference or exit with an error.
async fn prepare_image(
    uploader: &ImageUploader,
    kind: ImageKind,
    reference: Option<&str>,
    user_email: &str,
) -> String {
    match resolve_image(uploader, kind, reference, user_email).await {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(?kind, error = %e, "Could not prepare image");
            std::process::exit(1);
        }
    }
}

/// URLs are used as given; anything else is read from disk and uploaded.
async fn resolve_image(
    uploader: &ImageUploader,
    kind: ImageKind,
    reference: Option<&str>,
    user_email: &str,
) -> Result<String, ImageInputError> {
    let reference = reference.ok_or(ImageInputError::Missing)?;
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Ok(reference.to_string());
    }

    let path = Path::new(reference);
    let bytes = std::fs::read(path).map_err(|source| ImageInputError::Read {
        path: reference.to_string(),
        source,
    })?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("photo.jpg");

    let url = uploader.upload(kind, file_name, &bytes, user_email).await?;
    tracing::info!(?kind, url = %url, "Image uploaded");
    Ok(url)
}

#[derive(Debug, thiserror::Error)]
enum ImageInputError {
    #[error("No image reference given")]
    Missing,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Upload(#[from] UploadError),
}
