//! Ordered composition of [`PipelineStep`]s.

use crate::context::AuthContext;
use crate::error::SocialAuthResult;
use crate::steps::PipelineStep;
use std::sync::Arc;
use tracing::{Instrument, debug, info_span};

/// Runs its steps in order, feeding each the previous step's context.
/// The first failing step aborts the run.
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, step: impl PipelineStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub async fn run(&self, mut context: AuthContext) -> SocialAuthResult<AuthContext> {
        for step in &self.steps {
            let span = info_span!(
                "social_auth_step",
                step = step.name(),
                provider = %context.provider().name
            );
            context = step.apply(context).instrument(span).await.inspect_err(|e| {
                debug!("Step {} failed: {}", step.name(), e);
            })?;
        }
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SocialAuthError;
    use crate::registry::{Endpoint, Provider};
    use async_trait::async_trait;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl PipelineStep for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn apply(&self, mut context: AuthContext) -> SocialAuthResult<AuthContext> {
            let seen = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(SocialAuthError::auth("stop"));
            }
            context.data.avatar_uri = Some(format!("step {seen}"));
            Ok(context)
        }
    }

    fn context() -> AuthContext {
        let provider = Provider {
            name: "google".to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: None,
            auth_uri: None,
            tokens_uri: Endpoint::new("https://oauth2.googleapis.com/token"),
            user_info_uri: Endpoint::new("https://www.googleapis.com/oauth2/v2/userinfo"),
        };
        AuthContext::new(Map::new(), Arc::new(provider))
    }

    fn step(calls: &Arc<AtomicUsize>, fail: bool) -> Counting {
        Counting {
            calls: calls.clone(),
            fail,
        }
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new().then(step(&calls, false)).then(step(&calls, false));

        let ctx = pipeline.run(context()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.data.avatar_uri.as_deref(), Some("step 2"));
        assert_eq!(pipeline.step_names(), vec!["counting", "counting"]);
    }

    #[tokio::test]
    async fn test_failure_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new()
            .then(step(&calls, false))
            .then(step(&calls, true))
            .then(step(&calls, false));

        let result = pipeline.run(context()).await;
        assert!(matches!(result, Err(SocialAuthError::Auth(msg)) if msg == "stop"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_identity() {
        let ctx = Pipeline::new().run(context()).await.unwrap();
        assert!(ctx.data.user.is_none());
    }
}
