use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docmirror_repl::applier::{ApplierOptions, EventApplier};
use docmirror_repl::client::{SourceRepository, TargetRepository};
use docmirror_repl::{
    AttachmentTransfer, ContentFilter, HttpBlobTransport, MappingCleanup, Replicator,
    ReplicatorOptions,
};
use docmirror_server::config::RepositorySettings;
use docmirror_server::{api, Config, GracefulShutdown, HttpRepository, TokenSource};
use docmirror_store::StateDb;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().context("read configuration")?;

    run(config).await
}

async fn run(config: Config) -> Result<()> {
    let store = Arc::new(StateDb::open(&config.state_db).context("open state database")?);

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("build http client")?;

    let source: Arc<dyn SourceRepository> = Arc::new(HttpRepository::new(
        http.clone(),
        &config.source.endpoint,
        token_source(&http, &config.source).await?,
    ));
    let target: Arc<dyn TargetRepository> = Arc::new(HttpRepository::new(
        http.clone(),
        &config.target.endpoint,
        token_source(&http, &config.target).await?,
    ));

    let filter = ContentFilter::from_section_filters(&config.ignore_sections)
        .context("build content filters")?;
    let attachments = AttachmentTransfer::new(
        source.clone(),
        target.clone(),
        Arc::new(HttpBlobTransport::new(http)),
        config.include_attachments.clone(),
        config.all_attachments,
    );
    let applier = EventApplier::new(
        store.clone(),
        source.clone(),
        target.clone(),
        attachments,
        filter,
        ApplierOptions {
            ignore_types: config.ignore_types.clone(),
            ignore_subs: config.ignore_subs.clone(),
        },
    );

    let mut replicator = Replicator::new(
        store.clone(),
        source,
        applier,
        ReplicatorOptions {
            start_event: config.start_event,
            ..Default::default()
        },
    )
    .context("restore replication state")?;

    let cleanup = MappingCleanup::new(store);

    let shutdown = Arc::new(GracefulShutdown::new(Duration::from_secs(10)));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.watch_signals().await });
    }

    let mut tasks: tokio::task::JoinSet<Result<()>> = tokio::task::JoinSet::new();

    let stop = shutdown.stop_signal();
    tasks.spawn(async move { replicator.run(stop).await.context("replicator task") });

    let stop = shutdown.stop_signal();
    tasks.spawn(async move { cleanup.run(stop).await.context("cleanup task") });

    let app = api::router(&config.cors_hosts);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    info!(addr = %config.addr, "serving replication API");

    let mut quit = shutdown.quit_signal();
    tasks.spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = quit.changed().await;
            })
            .await
            .context("server task")
    });

    if let Some(addr) = config.profile_addr {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind {addr}"))?;
        let mut quit = shutdown.quit_signal();
        tokio::spawn(async move {
            let _ = axum::serve(listener, api::internal_router())
                .with_graceful_shutdown(async move {
                    let _ = quit.changed().await;
                })
                .await;
        });
    }

    // Drain every task before returning. A clean shutdown resolves all of
    // them: stop releases the replicator and cleanup at once, the server
    // follows when quit fires after the drain window. The first task to
    // fail initiates shutdown for the rest and decides the exit status.
    let mut result = Ok(());
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined.context("join task")? {
            if result.is_ok() {
                result = Err(err);
                shutdown.stop();
            }
        }
    }

    result
}

async fn token_source(
    http: &reqwest::Client,
    settings: &RepositorySettings,
) -> Result<Option<Arc<TokenSource>>> {
    let (Some(oidc_config), Some(client_id), Some(client_secret)) = (
        &settings.oidc_config,
        &settings.client_id,
        &settings.client_secret,
    ) else {
        return Ok(None);
    };

    let source = TokenSource::discover(
        http.clone(),
        oidc_config,
        client_id.clone(),
        client_secret.clone(),
    )
    .await
    .context("resolve token endpoint")?;

    Ok(Some(Arc::new(source)))
}
