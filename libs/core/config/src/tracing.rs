use crate::Environment;
use tracing::{debug, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Install color-eyre for binaries that drive a listener.
///
/// Safe to call multiple times. Shows file:line locations, hides the
/// environment section.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Initialize tracing with environment-aware formatting and span capture.
///
/// - **Production** (`APP_ENV=production`): flattened JSON events, no targets,
///   `warn` unless `RUST_LOG` says otherwise.
/// - **Development** (default): pretty output, `info` with the listener crates
///   at `debug` so seek and retry decisions are visible.
///
/// Both variants add [`tracing_error::ErrorLayer`] so `ListenerError`s carry
/// the span trace of the failed handling pass.
///
/// Installs color-eyre first via [`install_color_eyre`]. Calling this more
/// than once is fine (tests do); later calls are no-ops.
pub fn init_tracing(environment: &Environment) {
    // color-eyre has to be in place before the ErrorLayer starts capturing
    install_color_eyre();

    let is_production = environment.is_production();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if is_production {
            EnvFilter::new("warn")
        } else {
            EnvFilter::new("info,listener_errors=debug")
        }
    });

    let result = if is_production {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty(),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    };

    match result {
        Ok(_) => {
            info!(environment = ?environment, "Tracing initialized");
        }
        Err(_) => {
            debug!("Tracing already initialized, skipping re-initialization");
        }
    }
}
