use futures::future::BoxFuture;

use crate::caching::{FetchError, FetchResult};

/// The output budget for a single provider attempt.
///
/// A validation failure earns the provider one more attempt with the
/// [`Extended`](Self::Extended) budget before the chain moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptBudget {
    /// The regular, configured budget.
    Normal,
    /// An enlarged budget for retrying truncated or incomplete output.
    Extended,
}

/// A single upstream provider in a fallback chain.
///
/// All providers in a chain are interchangeable: they produce the same kind
/// of output, and the first validated success wins.
pub trait Provider: Send + Sync {
    /// The payload this provider produces.
    type Output: Send;

    /// A short name identifying the provider in logs and metrics.
    fn name(&self) -> &str;

    /// Performs one attempt against this provider.
    fn attempt(&self, budget: AttemptBudget) -> BoxFuture<'_, FetchResult<Self::Output>>;

    /// Validates a transport-successful response.
    ///
    /// Returning an error marks the output as incomplete, which earns the
    /// provider a retry with the extended budget.
    fn validate(&self, _output: &Self::Output) -> Result<(), String> {
        Ok(())
    }
}

/// An ordered chain of interchangeable providers.
///
/// The chain tries providers in order until one of them produces validated
/// output. Any kind of failure moves on to the next provider, and the total
/// number of attempts across the whole chain is bounded. When every provider
/// fails, the chain reports the most actionable error it saw.
#[derive(Debug)]
pub struct FallbackChain<P> {
    providers: Vec<P>,
    max_attempts: usize,
}

impl<P: Provider> FallbackChain<P> {
    pub fn new(providers: Vec<P>, max_attempts: usize) -> Self {
        Self {
            providers,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Runs the chain until one provider produces validated output.
    pub async fn run(&self) -> FetchResult<P::Output> {
        let mut attempts = 0;
        let mut last_error: Option<FetchError> = None;

        'providers: for provider in &self.providers {
            let mut budget = AttemptBudget::Normal;

            loop {
                if attempts >= self.max_attempts {
                    break 'providers;
                }
                attempts += 1;
                metric!(counter("providers.attempt") += 1, "provider" => provider.name());

                let error = match provider.attempt(budget).await {
                    Ok(output) => match provider.validate(&output) {
                        Ok(()) => {
                            metric!(counter("providers.success") += 1, "provider" => provider.name());
                            return Ok(output);
                        }
                        Err(details) => FetchError::Incomplete(details),
                    },
                    Err(error) => error,
                };

                let dynerr: &dyn std::error::Error = &error;
                tracing::debug!(
                    error = dynerr,
                    provider = provider.name(),
                    "provider attempt failed"
                );
                metric!(
                    counter("providers.failure") += 1,
                    "provider" => provider.name(),
                    "status" => error.status_tag(),
                );

                let retry_same_provider =
                    matches!(error, FetchError::Incomplete(_)) && budget == AttemptBudget::Normal;

                last_error = Some(match last_error.take() {
                    Some(previous) => previous.prefer(error),
                    None => error,
                });

                if retry_same_provider {
                    // One more shot at the same provider with more room.
                    budget = AttemptBudget::Extended;
                    continue;
                }
                continue 'providers;
            }
        }

        Err(last_error.unwrap_or(FetchError::InternalError).into_final())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// A provider that replays scripted attempt outcomes.
    ///
    /// Outputs starting with "truncated" are rejected by validation.
    struct TestProvider {
        name: &'static str,
        attempts: AtomicUsize,
        script: Mutex<VecDeque<FetchResult<String>>>,
    }

    impl TestProvider {
        fn new(name: &'static str, script: Vec<FetchResult<String>>) -> Self {
            Self {
                name,
                attempts: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
            }
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl Provider for TestProvider {
        type Output = String;

        fn name(&self) -> &str {
            self.name
        }

        fn attempt(&self, budget: AttemptBudget) -> BoxFuture<'_, FetchResult<String>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let result = self
                    .script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(Err(FetchError::InternalError));
                // An extended budget "repairs" truncated scripted output.
                match (result, budget) {
                    (Ok(output), AttemptBudget::Extended) if output.starts_with("truncated") => {
                        Ok("complete".to_owned())
                    }
                    (result, _) => result,
                }
            })
        }

        fn validate(&self, output: &String) -> Result<(), String> {
            if output.starts_with("truncated") {
                Err("output was cut off".to_owned())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let a = TestProvider::new("a", vec![Ok("from a".to_owned())]);
        let b = TestProvider::new("b", vec![Ok("from b".to_owned())]);
        let chain = FallbackChain::new(vec![a, b], 4);

        let output = chain.run().await.unwrap();
        assert_eq!(output, "from a");
        assert_eq!(chain.providers[0].attempts(), 1);
        assert_eq!(chain.providers[1].attempts(), 0);
    }

    #[tokio::test]
    async fn test_rate_limited_provider_is_skipped() {
        let a = TestProvider::new("a", vec![Err(FetchError::RateLimited)]);
        let b = TestProvider::new("b", vec![Ok("from b".to_owned())]);
        let c = TestProvider::new("c", vec![Ok("from c".to_owned())]);
        let chain = FallbackChain::new(vec![a, b, c], 4);

        let output = chain.run().await.unwrap();
        assert_eq!(output, "from b");
        // The chain stops at the first success, later providers stay untouched.
        assert_eq!(chain.providers[2].attempts(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_output_retries_same_provider() {
        // Both attempts pop scripted output; only the extended-budget retry
        // repairs it.
        let a = TestProvider::new("a", vec![Ok("truncated ...".to_owned()); 2]);
        let b = TestProvider::new("b", vec![Ok("from b".to_owned())]);
        let chain = FallbackChain::new(vec![a, b], 4);

        let output = chain.run().await.unwrap();
        // The second attempt against `a` ran with the extended budget.
        assert_eq!(output, "complete");
        assert_eq!(chain.providers[0].attempts(), 2);
        assert_eq!(chain.providers[1].attempts(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_output_falls_through_after_retry() {
        let a = TestProvider::new(
            "a",
            vec![Err(FetchError::Incomplete("short".into())); 2],
        );
        let b = TestProvider::new("b", vec![Ok("from b".to_owned())]);
        let chain = FallbackChain::new(vec![a, b], 4);

        let output = chain.run().await.unwrap();
        assert_eq!(output, "from b");
        assert_eq!(chain.providers[0].attempts(), 2);
    }

    #[tokio::test]
    async fn test_total_attempts_are_bounded() {
        let a = TestProvider::new(
            "a",
            vec![Err(FetchError::Unavailable("500".into())); 5],
        );
        let b = TestProvider::new(
            "b",
            vec![Err(FetchError::Unavailable("500".into())); 5],
        );
        let c = TestProvider::new("c", vec![Ok("never reached".to_owned())]);
        let chain = FallbackChain::new(vec![a, b, c], 2);

        let result = chain.run().await;
        assert_eq!(result, Err(FetchError::Unavailable("500".into())));
        assert_eq!(
            chain.providers.iter().map(|p| p.attempts()).sum::<usize>(),
            2
        );
    }

    #[tokio::test]
    async fn test_most_actionable_error_is_reported() {
        let a = TestProvider::new("a", vec![Err(FetchError::Malformed("bad json".into()))]);
        let b = TestProvider::new("b", vec![Err(FetchError::RateLimited)]);
        let c = TestProvider::new("c", vec![Err(FetchError::Malformed("bad json".into()))]);
        let chain = FallbackChain::new(vec![a, b, c], 4);

        let result = chain.run().await;
        assert_eq!(result, Err(FetchError::RateLimited));
    }

    #[tokio::test]
    async fn test_equally_actionable_errors_report_the_last() {
        let a = TestProvider::new("a", vec![Err(FetchError::Unavailable("a down".into()))]);
        let b = TestProvider::new("b", vec![Err(FetchError::Unavailable("b down".into()))]);
        let chain = FallbackChain::new(vec![a, b], 4);

        let result = chain.run().await;
        assert_eq!(result, Err(FetchError::Unavailable("b down".into())));
    }

    #[tokio::test]
    async fn test_unrepaired_incompleteness_degrades() {
        let a = TestProvider::new(
            "a",
            vec![Err(FetchError::Incomplete("cut off".into())); 2],
        );
        let chain = FallbackChain::new(vec![a], 4);

        let result = chain.run().await;
        assert_eq!(result, Err(FetchError::Malformed("cut off".into())));
    }

    #[tokio::test]
    async fn test_empty_chain_reports_internal_error() {
        let chain: FallbackChain<TestProvider> = FallbackChain::new(vec![], 4);
        assert_eq!(chain.run().await, Err(FetchError::InternalError));
    }
}
