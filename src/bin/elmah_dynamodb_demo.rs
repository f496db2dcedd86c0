//! elmah-dynamodb-demo: raise sample errors and list them
//!
//! Logs a batch of errors for the configured application, then prints the
//! newest page of the listing and the approximate total.
//!
//! ## Configuration
//! - ELMAH_CONFIG: YAML config file (default: elmah.yaml, if present)
//! - ELMAH_APPLICATION_NAME, ELMAH_TABLE_NAME, ELMAH_REGION,
//!   ELMAH_ENDPOINT_URL, ...: override the file
//! - ELMAH_DEMO_COUNT: errors to raise (default: 100)
//! - ELMAH_DEMO_PAGE_SIZE: entries to print (default: 15)
//! - ELMAH_LOG: tracing filter (default: info)
//!
//! Against DynamoDB Local:
//! ```text
//! ELMAH_APPLICATION_NAME=demo ELMAH_ENDPOINT_URL=http://localhost:8000 \
//!     cargo run --bin elmah-dynamodb-demo
//! ```

use std::fmt;

use tracing::info;

use elmah_dynamodb::utils::bootstrap::init_tracing;
use elmah_dynamodb::{ErrorEvent, ErrorLog, ErrorLogConfig, TableErrorLog};

const DEFAULT_COUNT: usize = 100;
const DEFAULT_PAGE_SIZE: usize = 15;

#[derive(Debug)]
struct DemoError(usize);

impl fmt::Display for DemoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exception #{}", self.0)
    }
}

impl std::error::Error for DemoError {}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = ErrorLogConfig::load(None)?;
    let count = env_usize("ELMAH_DEMO_COUNT", DEFAULT_COUNT);
    let page_size = env_usize("ELMAH_DEMO_PAGE_SIZE", DEFAULT_PAGE_SIZE);

    let log = TableErrorLog::connect(&config).await?;
    info!(
        application = %log.application_name(),
        table = %log.table_name(),
        count,
        "elmah-dynamodb-demo started"
    );

    for i in 0..count {
        let event = ErrorEvent::from_error(&DemoError(i))
            .with_source("elmah-dynamodb-demo")
            .with_status_code(500);
        log.log(&event).await?;
    }

    let mut entries = Vec::new();
    let total = log.get_errors(0, page_size, &mut entries).await?;

    println!("{} errors (approximate), newest {}:", total, entries.len());
    for entry in &entries {
        println!(
            "{}  {}  {}",
            entry.id,
            entry.error.time.to_rfc3339(),
            entry.error.message
        );
    }

    Ok(())
}
