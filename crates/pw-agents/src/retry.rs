//! Bounded retry with corrective re-prompting, shared by both agents.

use tracing::{debug, warn};

use pw_core::{CompletionRequest, Error, Message, Provider};

use crate::AgentOptions;

/// Call the backend until `parse` accepts the reply or attempts run out.
///
/// Timeouts and retryable transport errors count as failed attempts, the
/// same as unparseable output. Non-retryable errors (bad credentials,
/// rejected requests) propagate immediately. On each retry the last failure
/// is appended to the conversation as a corrective instruction, and the
/// backoff delay doubles. `exhausted` wraps the final failure into the
/// caller's error kind (`Error::Planning` / `Error::Refining`).
pub(crate) async fn call_with_repair<T, P, X>(
    role: &'static str,
    provider: &dyn Provider,
    options: &AgentOptions,
    base_messages: &[Message],
    parse: P,
    exhausted: X,
) -> Result<T, Error>
where
    P: Fn(&str) -> Result<T, Error>,
    X: FnOnce(String) -> Error,
{
    let mut last_failure: Option<String> = None;

    for attempt in 1..=options.max_attempts {
        if attempt > 1 {
            let backoff = options.retry_backoff * 2u32.saturating_pow(attempt - 2);
            tokio::time::sleep(backoff).await;
        }

        let mut messages = base_messages.to_vec();
        if let Some(failure) = &last_failure {
            messages.push(Message::user(format!(
                "Your previous reply could not be used: {failure}. \
                 Reply again with ONLY the corrected JSON array and nothing else."
            )));
        }

        let mut request = CompletionRequest::new(messages);
        if let Some(model) = &options.model {
            request = request.with_model(model);
        }
        if let Some(temperature) = options.temperature {
            request = request.with_temperature(temperature);
        }

        let outcome = tokio::time::timeout(options.request_timeout, provider.complete(request)).await;
        let failure = match outcome {
            Err(_) => {
                let error = Error::timeout(format!(
                    "no response after {:.0?}",
                    options.request_timeout
                ));
                warn!(agent = role, attempt, error = %error, "backend call timed out");
                error.to_string()
            }
            Ok(Err(error)) if error.is_retryable() => {
                warn!(agent = role, attempt, error = %error, "backend call failed");
                error.to_string()
            }
            Ok(Err(error)) => return Err(error),
            Ok(Ok(response)) => match parse(&response.message.content) {
                Ok(value) => {
                    debug!(agent = role, attempt, "backend output accepted");
                    return Ok(value);
                }
                Err(error) => {
                    warn!(agent = role, attempt, error = %error, "backend output rejected");
                    error.to_string()
                }
            },
        };
        last_failure = Some(failure);
    }

    Err(exhausted(format!(
        "output unusable after {} attempts; last failure: {}",
        options.max_attempts,
        last_failure.unwrap_or_else(|| "none recorded".to_string())
    )))
}
