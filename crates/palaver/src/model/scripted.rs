use super::{ChatModel, Decision, ModelFuture};
use crate::error::ProviderError;
use crate::{Message, ToolDef};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// What the scripted model saw on one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedCall {
    pub history_len: usize,
    pub tool_names: Vec<String>,
}

/// A [`ChatModel`] that replays prepared decisions in order.
///
/// Once the script is exhausted it repeats the fallback decision if one was
/// set with [`ScriptedModel::always`], otherwise it fails with
/// [`ProviderError::Exhausted`].
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<Decision, ProviderError>>>,
    fallback: Option<Decision>,
    calls: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedModel {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            script: Mutex::new(decisions.into_iter().map(Ok).collect()),
            ..Default::default()
        }
    }

    /// A model that returns `decision` on every call.
    pub fn always(decision: Decision) -> Self {
        Self {
            fallback: Some(decision),
            ..Default::default()
        }
    }

    /// Queue a provider failure after the current script.
    pub fn then_fail(self, error: ProviderError) -> Self {
        lock(&self.script).push_back(Err(error));
        self
    }

    /// Queue a decision after the current script.
    pub fn then(self, decision: Decision) -> Self {
        lock(&self.script).push_back(Ok(decision));
        self
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<ScriptedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ChatModel for ScriptedModel {
    fn decide<'a>(&'a self, history: &'a [Message], tools: &'a [ToolDef]) -> ModelFuture<'a> {
        lock(&self.calls).push(ScriptedCall {
            history_len: history.len(),
            tool_names: tools.iter().map(|t| t.name().to_string()).collect(),
        });
        let next = lock(&self.script).pop_front();
        let result = match next {
            Some(result) => result,
            None => self.fallback.clone().ok_or(ProviderError::Exhausted),
        };
        Box::pin(async move { result })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_then_exhausts() {
        let model = ScriptedModel::new([Decision::Reply("one".into())])
            .then_fail(ProviderError::Api("down".into()));

        let history = [Message::user("hi")];
        assert_eq!(
            model.decide(&history, &[]).await,
            Ok(Decision::Reply("one".into()))
        );
        assert_eq!(
            model.decide(&history, &[]).await,
            Err(ProviderError::Api("down".into()))
        );
        assert_eq!(
            model.decide(&history, &[]).await,
            Err(ProviderError::Exhausted)
        );
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn always_repeats_and_records_tools() {
        let model = ScriptedModel::always(Decision::Reply("ok".into()));
        let tools = [ToolDef::new("echo", "", serde_json::json!({}))];

        for _ in 0..3 {
            assert_eq!(
                model.decide(&[], &tools).await,
                Ok(Decision::Reply("ok".into()))
            );
        }
        let calls = model.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].tool_names, vec!["echo".to_string()]);
    }
}
