//! Telemetry utilities for operation timing and interaction correlation.

use crate::error::TicketResult;
use std::future::Future;
use std::time::Instant;

/// Guard for timing an operation.
///
/// Records the operation and its latency when dropped.
pub struct OperationTimer {
    op: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            start: Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_operation(self.op, duration);
    }
}

/// Run an operation under a timer, counting its failure by error code.
pub async fn observe<T>(op: &'static str, fut: impl Future<Output = TicketResult<T>>) -> TicketResult<T> {
    let _timer = OperationTimer::new(op);
    let result = fut.await;
    if let Err(e) = &result {
        crate::metrics::record_operation_error(op, e.error_code());
    }
    result
}

/// Standardized span constructors.
pub mod spans {
    use crate::platform::{ChannelId, GuildId, UserId};
    use tracing::{Span, info_span};

    /// Span for one gateway interaction.
    pub fn interaction(kind: &str, name: &str, guild: GuildId, channel: ChannelId, user: UserId) -> Span {
        info_span!(
            "interaction",
            kind = %kind,
            name = %name,
            guild = %guild,
            channel = %channel,
            user = %user
        )
    }

    /// Span for startup work.
    pub fn startup(step: &str) -> Span {
        info_span!("startup", step = %step)
    }
}
