use std::future::Future;

use tracing::warn;

use crate::configuration::StoreRetrySettings;

/// Runs a store operation, retrying failures the classifier reports as
/// transient, a bounded number of times with exponential backoff.
///
/// The gallery store is a shared external resource: a connection
/// hiccup is not "no match" and must never be reported as one. After
/// the attempts are exhausted the last error surfaces as-is.
pub async fn retry_on<T, E, F, Fut, C>(
    settings: &StoreRetrySettings,
    operation_name: &str,
    operation: F,
    is_transient: C,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < settings.max_attempts && is_transient(&error) => {
                warn!(
                    %error,
                    attempt,
                    operation = operation_name,
                    "Transient store error, retrying after backoff"
                );
                tokio::time::sleep(settings.backoff(attempt)).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
