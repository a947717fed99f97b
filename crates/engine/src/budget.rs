//! Token-budgeted message admission.
//!
//! Prompt assembly appends message groups in stages (context, memory
//! excerpts, recent history), each under its own budget. The loop here is
//! shared by all stages: render the candidate prompt, count its tokens
//! through the backend, and drop the oldest candidate until it fits.

use palaver_core::{BackendError, ChatBackend, ConvMessage};
use tracing::debug;

/// Resolve a stage budget against the backend's context window.
///
/// A non-negative budget is a cap on its own, clamped to the window. A
/// negative budget reserves that many tokens out of the window (for the
/// reply, typically). No budget means the whole window.
pub fn effective_limit(budget: Option<i64>, max_tokens: usize) -> i64 {
    let max_tokens = max_tokens as i64;
    match budget {
        Some(b) if b >= 0 => b.min(max_tokens),
        Some(b) => max_tokens + b,
        None => max_tokens,
    }
}

/// Append as many of `candidates` to `target` as the budget allows,
/// dropping from the oldest end until the rendered prompt fits.
///
/// Returns the rendered prompt text covering whatever was admitted. When
/// the limit is already spent (zero or negative) the target is left
/// untouched and its own rendering is returned.
pub async fn append_within_budget<F>(
    target: &mut Vec<ConvMessage>,
    candidates: &[ConvMessage],
    budget: Option<i64>,
    backend: &dyn ChatBackend,
    render: F,
) -> Result<String, BackendError>
where
    F: Fn(&[ConvMessage]) -> String,
{
    let limit = effective_limit(budget, backend.max_tokens());
    if limit <= 0 {
        return Ok(render(target));
    }

    let mut start = 0;
    while start < candidates.len() {
        let mut attempt = target.clone();
        attempt.extend_from_slice(&candidates[start..]);
        let rendered = render(&attempt);
        let tokens = backend.count_tokens(&rendered).await? as i64;
        if tokens <= limit {
            target.extend_from_slice(&candidates[start..]);
            return Ok(rendered);
        }
        debug!(tokens, limit, dropped = start + 1, "prompt over budget, dropping oldest");
        start += 1;
    }

    Ok(render(target))
}
