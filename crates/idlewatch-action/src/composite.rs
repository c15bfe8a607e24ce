//! Chained terminal actions

use async_trait::async_trait;

use crate::{ActionResult, TerminalAction};

/// Runs each action in order and stops at the first failure
pub struct CompositeAction {
    actions: Vec<Box<dyn TerminalAction>>,
}

impl CompositeAction {
    pub fn new(actions: Vec<Box<dyn TerminalAction>>) -> Self {
        Self { actions }
    }
}

#[async_trait]
impl TerminalAction for CompositeAction {
    fn describe(&self) -> String {
        self.actions
            .iter()
            .map(|a| a.describe())
            .collect::<Vec<_>>()
            .join(", then ")
    }

    async fn perform(&self) -> ActionResult<()> {
        for action in &self.actions {
            action.perform().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockAction;

    #[tokio::test]
    async fn runs_in_order_and_fails_fast() {
        let first = MockAction::new("first");
        let second = MockAction::new("second");
        let third = MockAction::new("third");
        second.set_fail(true);

        let composite = CompositeAction::new(vec![
            Box::new(first.clone()),
            Box::new(second.clone()),
            Box::new(third.clone()),
        ]);

        assert_eq!(composite.describe(), "first, then second, then third");
        assert!(composite.perform().await.is_err());
        assert_eq!(first.performed(), 1);
        assert_eq!(second.performed(), 1);
        assert_eq!(third.performed(), 0);
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let only = MockAction::new("only");
        let composite = CompositeAction::new(vec![Box::new(only.clone())]);

        composite.execute(true).await.unwrap();
        assert_eq!(only.performed(), 0);
    }
}
