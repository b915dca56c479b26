//! Provider status payload normalization.
//!
//! Providers speak wildly different status dialects: Kie wraps everything in
//! `{ code, data: { successFlag, response: {...} } }` with a numeric flag,
//! Fal returns bare result objects or textual queue states, and output URLs
//! appear under half a dozen key names. This module reduces any raw status
//! payload to a single [`JobOutcome`] so the reconciliation loop never sees
//! provider JSON.

use serde_json::Value;

use timeless_core::JobOutcome;

/// Textual statuses treated as terminal success.
const SUCCESS_STATUSES: &[&str] = &["SUCCESS", "COMPLETED", "DONE"];

/// Textual statuses treated as terminal failure.
const FAILURE_STATUSES: &[&str] = &["FAILED", "FAILURE"];

/// Map a raw provider status payload to a [`JobOutcome`].
///
/// A row completes only when an output URL can actually be extracted; a
/// success flag with no URL yet leaves the job pending so the next poll can
/// pick up the materialized result. Any shape carrying no recognizable
/// signal is "still pending", never an error.
#[must_use]
pub fn normalize(payload: &Value) -> JobOutcome {
    let roots = candidate_roots(payload);

    for root in &roots {
        if let Some(flag) = root.get("successFlag").and_then(Value::as_i64) {
            match flag {
                2 | 3 => {
                    return JobOutcome::Failed {
                        reason: failure_reason(&roots),
                    }
                }
                // 1 is success; the URL scan below decides whether the
                // result has landed yet. 0 and anything else is pending.
                _ => {}
            }
        }
    }

    if let Some(status) = textual_status(&roots) {
        if FAILURE_STATUSES.contains(&status.as_str()) {
            return JobOutcome::Failed {
                reason: failure_reason(&roots),
            };
        }
    }

    if let Some(output_url) = extract_output_url(&roots) {
        return JobOutcome::Succeeded {
            output_url,
            thumbnail_url: extract_thumbnail_url(&roots),
        };
    }

    JobOutcome::Pending
}

/// True when the payload carries a terminal-success signal, whether or not
/// the output URL is present. Queue adapters use this to decide when to
/// fetch the separate result document.
#[must_use]
pub fn is_terminal_success(payload: &Value) -> bool {
    let roots = candidate_roots(payload);

    if roots
        .iter()
        .any(|root| root.get("successFlag").and_then(Value::as_i64) == Some(1))
    {
        return true;
    }

    textual_status(&roots).is_some_and(|s| SUCCESS_STATUSES.contains(&s.as_str()))
}

/// The payload itself plus the nesting envelopes providers wrap results in,
/// outermost first.
fn candidate_roots(payload: &Value) -> Vec<&Value> {
    let mut roots = vec![payload];
    if let Some(data) = payload.get("data") {
        roots.push(data);
        if let Some(response) = data.get("response") {
            roots.push(response);
        }
    }
    if let Some(response) = payload.get("response") {
        roots.push(response);
    }
    roots
}

/// First `status`/`state` string found, uppercased.
fn textual_status(roots: &[&Value]) -> Option<String> {
    roots
        .iter()
        .find_map(|root| {
            root.get("status")
                .or_else(|| root.get("state"))
                .and_then(Value::as_str)
        })
        .map(str::to_uppercase)
}

/// Scan the known output URL shapes in priority order.
fn extract_output_url(roots: &[&Value]) -> Option<String> {
    for root in roots {
        let found = root
            .get("resultUrls")
            .and_then(|v| v.get(0))
            .or_else(|| root.get("output").and_then(|v| v.get(0)))
            .or_else(|| root.get("video").and_then(|v| v.get("url")))
            .or_else(|| root.get("image").and_then(|v| v.get("url")))
            .or_else(|| root.get("images").and_then(|v| v.get(0)).and_then(|v| v.get("url")))
            .or_else(|| root.get("audio").and_then(|v| v.get("url")))
            .and_then(Value::as_str);

        if let Some(url) = found {
            return Some(url.to_string());
        }
    }
    None
}

fn extract_thumbnail_url(roots: &[&Value]) -> Option<String> {
    for root in roots {
        let found = root
            .get("thumbnailUrl")
            .or_else(|| root.get("thumbnail_url"))
            .or_else(|| root.get("video").and_then(|v| v.get("thumbnail_url")))
            .and_then(Value::as_str);

        if let Some(url) = found {
            return Some(url.to_string());
        }
    }
    None
}

/// Best-effort human-readable reason for a failed job.
fn failure_reason(roots: &[&Value]) -> String {
    for root in roots {
        let found = root
            .get("errorMessage")
            .or_else(|| root.get("failReason"))
            .or_else(|| root.get("error").and_then(|e| {
                if e.is_string() {
                    Some(e)
                } else {
                    e.get("message")
                }
            }))
            .or_else(|| root.get("message"))
            .and_then(Value::as_str);

        if let Some(reason) = found {
            if !reason.is_empty() {
                return reason.to_string();
            }
        }
    }
    "provider reported failure".to_string()
}
