use tracing_subscriber::{filter::Directive, EnvFilter};

/// Install the fmt subscriber. `RUST_LOG` refines the default
/// `traffic_collector=info` filter.
pub fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "traffic_collector=info".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
