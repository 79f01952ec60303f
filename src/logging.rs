//! Tracing subscriber setup for sweep drivers

use tracing_subscriber::EnvFilter;

/// Default filter for a verbosity count (`-v` flags).
#[must_use]
pub const fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install a stderr fmt subscriber.
///
/// `RUST_LOG` wins over `verbosity` when set. Returns `false` if a global
/// subscriber was already installed, which leaves the existing one active.
pub fn init_tracing(verbosity: u8) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for(verbosity)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(0), "info");
        assert_eq!(level_for(1), "debug");
        assert_eq!(level_for(5), "trace");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let _ = init_tracing(0);
        assert!(!init_tracing(1));
    }
}
