use std::{future::Future, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempt(s): {last}")]
    Failed { attempts: usize, last: E },
    #[error("timed out after {attempts} attempt(s) of {deadline:?} each")]
    TimedOut { attempts: usize, deadline: Duration },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::Failed { attempts, .. } | RetryError::TimedOut { attempts, .. } => *attempts,
        }
    }
}

/// Run `attempt` once, plus up to `retries` more times if it fails or misses `deadline`.
/// The error reported is the one from the final attempt.
pub async fn with_retry<T, E, F, Fut>(
    retries: usize,
    deadline: Duration,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let total = retries + 1;
    let mut attempts = 0;
    loop {
        attempts += 1;
        let failure = match tokio::time::timeout(deadline, attempt()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => RetryError::Failed { attempts, last: e },
            Err(_) => RetryError::TimedOut { attempts, deadline },
        };
        if attempts >= total {
            return Err(failure);
        }
        log::warn!("Attempt {attempts}/{total} failed, retrying: {failure}");
    }
}
