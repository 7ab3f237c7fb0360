use std::env;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use relation_index::{report, AppError, Dependencies};

#[tokio::main]
async fn main() {
    // Variables from .env do not override the real environment
    dotenv::dotenv().ok();
    init_tracing();

    if let Err(e) = run().await {
        if e.is_connectivity() {
            error!(error = %e, "Search engine unreachable, check ES_HOST and ES_PORT");
        } else {
            error!(error = %e, "Relation index run failed");
        }
        std::process::exit(1);
    }
}

/// Install the subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run() -> Result<(), AppError> {
    let dependencies = Dependencies::new().await?;

    let result = tokio::select! {
        result = scan_and_report(&dependencies) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
            Ok(())
        }
    };

    // Flush pending writes before releasing the connection
    dependencies.manager.close().await?;
    result
}

async fn scan_and_report(dependencies: &Dependencies) -> Result<(), AppError> {
    let manager = &dependencies.manager;
    let queries = manager.query_service().await?;

    info!("Scanning relations for related properties");
    let scan = queries.related_property_ids(&manager.config().scroll).await;
    if let Some(failure) = &scan.failure {
        warn!(
            error = %failure,
            pages = scan.pages,
            properties = scan.values.len(),
            "Scan stopped early, reporting partial results"
        );
    }

    report::write_property_report(&dependencies.report_path, &scan.values, &queries).await?;
    Ok(())
}
