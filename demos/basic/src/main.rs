//! Run with
//!
//! ```not_rust
//! cargo run -p example-basic
//! ```
//!
//! Then, for instance:
//!
//! ```not_rust
//! curl -u admin:pw -c jar http://localhost:3000/
//! curl -b jar http://localhost:3000/secret
//! ```

use crate::app::App;

mod app;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(
            |_| "axum_identity=debug,example_basic=debug".into(),
        )))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    App::from_env()?.serve().await
}
