//! Tracing setup for the host binaries
//!
//! Shared by the `mcp-host` CLI and the `echo-mcp` fixture server. The
//! library itself never installs a subscriber.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing to stderr.
///
/// Stdout stays free for command output (and, in the fixture server, for the
/// MCP protocol). `RUST_LOG` refines the filter; `<crate_name>=info` is always
/// added. Set `LOG_FORMAT=json` for structured JSON lines.
///
/// Uses `try_init`, so a process that already has a global subscriber (a test
/// harness, or an application embedding the host) gets an error back instead
/// of a panic.
pub fn init_tracing(crate_name: &str) -> anyhow::Result<()> {
    let directive = format!("{}=info", crate_name);
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}
