//! Classification of retryable streaming failures.
//!
//! The run loop retries a failed model request exactly once, with the
//! fallback model substituted, and only for the transient class of errors:
//! capacity exhaustion and temporary unavailability. Everything else —
//! authentication failures, malformed requests, parse errors — is fatal to
//! the run.

/// Substrings marking a stream error as retryable with the fallback model.
/// Matched case-insensitively against the error text.
const RETRYABLE_MARKERS: &[&str] = &["overloaded", "model_unavailable", "529", "503"];

/// Whether a terminal stream error qualifies for the single fallback-model
/// retry.
pub fn is_retryable_stream_error(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    RETRYABLE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_markers() {
        assert!(is_retryable_stream_error(
            "API error: overloaded_error: Overloaded"
        ));
        assert!(is_retryable_stream_error("API error 529: upstream busy"));
        assert!(is_retryable_stream_error(
            "API error 503: Service Unavailable"
        ));
        assert!(is_retryable_stream_error("model_unavailable"));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert!(is_retryable_stream_error("OVERLOADED"));
        assert!(is_retryable_stream_error("Model_Unavailable"));
    }

    #[test]
    fn test_non_retryable_errors() {
        assert!(!is_retryable_stream_error("API error 401: invalid x-api-key"));
        assert!(!is_retryable_stream_error(
            "Streaming error: failed to parse stream event"
        ));
        assert!(!is_retryable_stream_error("API error 400: bad request"));
    }
}
