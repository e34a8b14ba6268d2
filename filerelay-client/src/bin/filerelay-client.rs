use clap::{Parser, Subcommand};
use filerelay_client::{
    ChunkUploader, DEFAULT_TIMEOUT, RelayClient, RetryPolicy, UploadOptions,
};
use filerelay_core::DEFAULT_CHUNK_SIZE;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "filerelay-client")]
#[command(about = "Upload files to a Filerelay server")]
struct Cli {
    /// Base URL of the relay server
    #[arg(long, default_value = "http://127.0.0.1:7094")]
    server: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file in chunks, optionally relaying it to a container
    Upload {
        path: PathBuf,

        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Relay the finished upload into this container
        #[arg(long)]
        container: Option<String>,

        /// Fail instead of replacing an existing blob
        #[arg(long)]
        no_overwrite: bool,

        #[arg(long, default_value_t = 5)]
        max_attempts: u32,
    },
    /// Upload a small file in a single multipart request
    Put { path: PathBuf },
    /// List staged files
    List,
    /// List blobs in a container
    Blobs { container: String },
    /// Relay a staged file into a container
    Copy {
        name: String,
        container: String,

        #[arg(long)]
        no_overwrite: bool,

        #[arg(long)]
        remove_staged: bool,
    },
    /// Pull a blob from a container into staging
    Fetch { name: String, container: String },
    /// Delete a staged file
    Delete { name: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "filerelay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> filerelay_client::Result<()> {
    let client = RelayClient::new(&cli.server, Duration::from_secs(cli.timeout_secs))?;

    match cli.command {
        Commands::Upload {
            path,
            chunk_size,
            container,
            no_overwrite,
            max_attempts,
        } => {
            let options = UploadOptions {
                chunk_size,
                retry: RetryPolicy {
                    max_attempts: max_attempts.max(1),
                    ..RetryPolicy::default()
                },
                relay_container: container,
                overwrite: !no_overwrite,
            };
            let uploader = ChunkUploader::new(client, options);

            let mut progress = uploader.progress();
            let reporter = tokio::spawn(async move {
                while progress.changed().await.is_ok() {
                    let current = *progress.borrow_and_update();
                    tracing::info!(
                        "Uploaded {} of {} bytes ({}%)",
                        current.uploaded_bytes,
                        current.total_bytes,
                        current.percent()
                    );
                }
            });

            let report = uploader.upload_large_file(&path).await;
            drop(uploader);
            let _ = reporter.await;
            let report = report?;

            println!("{}", report.destination_name);
            if let Some(url) = report.blob_url {
                println!("{}", url);
            }
        }
        Commands::Put { path } => {
            client.upload_file(&path).await?;
            tracing::info!("Uploaded {}", path.display());
        }
        Commands::List => {
            for url in client.list_staged().await? {
                println!("{}", url);
            }
        }
        Commands::Blobs { container } => {
            for url in client.list_blobs(&container).await? {
                println!("{}", url);
            }
        }
        Commands::Copy {
            name,
            container,
            no_overwrite,
            remove_staged,
        } => {
            let url = client
                .copy_to_container(&name, &container, !no_overwrite, remove_staged)
                .await?;
            println!("{}", url);
        }
        Commands::Fetch { name, container } => {
            let staged = client.fetch(&name, &container).await?;
            println!("{}", staged);
        }
        Commands::Delete { name } => {
            client.delete_staged(&name).await?;
            tracing::info!("Deleted staged file {}", name);
        }
    }

    Ok(())
}
