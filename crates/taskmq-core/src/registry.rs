//! TaskRegistry - closed dispatch table (TaskKind -> handler).

use std::sync::Arc;

use crate::domain::TaskKind;
use crate::error::UnsupportedTaskError;
use crate::handler::{InventoryStatisticsHandler, TaskHandler};

/// One handler slot per [`TaskKind`].
///
/// Built once at startup and read-only afterwards. Resolution is an exhaustive
/// match, so a new `TaskKind` variant fails to compile until it gets a slot.
pub struct TaskRegistry<C> {
    inventory_statistics: Arc<dyn TaskHandler<C>>,
}

impl<C> Clone for TaskRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            inventory_statistics: Arc::clone(&self.inventory_statistics),
        }
    }
}

impl<C: Send + 'static> TaskRegistry<C> {
    pub fn new(inventory_statistics: Arc<dyn TaskHandler<C>>) -> Self {
        Self {
            inventory_statistics,
        }
    }

    /// Registry wired with the stock handlers.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(InventoryStatisticsHandler::new()))
    }

    pub fn resolve(&self, kind: TaskKind) -> Arc<dyn TaskHandler<C>> {
        match kind {
            TaskKind::InventoryStatistics => Arc::clone(&self.inventory_statistics),
        }
    }

    /// Look a handler up by its external task name.
    pub fn resolve_name(&self, name: &str) -> Result<Arc<dyn TaskHandler<C>>, UnsupportedTaskError> {
        let kind: TaskKind = name.parse()?;
        Ok(self.resolve(kind))
    }

    pub fn registered_types(&self) -> Vec<&'static str> {
        TaskKind::ALL.iter().map(|kind| kind.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HandlerStatus, Payload};
    use async_trait::async_trait;
    use serde_json::json;

    struct AlwaysFails;

    #[async_trait]
    impl TaskHandler<()> for AlwaysFails {
        async fn execute(&self, _conn: &mut (), _payload: &Payload) -> HandlerStatus {
            HandlerStatus::Failed
        }
    }

    #[tokio::test]
    async fn resolves_registered_handler() {
        let registry = TaskRegistry::<()>::new(Arc::new(AlwaysFails));
        let handler = registry.resolve(TaskKind::InventoryStatistics);
        let status = handler.execute(&mut (), &Payload::new(json!([]))).await;
        assert_eq!(status, HandlerStatus::Failed);
    }

    #[tokio::test]
    async fn resolves_by_name() {
        let registry = TaskRegistry::<()>::with_defaults();
        let handler = registry.resolve_name("inventoryStaticticsMain").unwrap();
        let status = handler
            .execute(&mut (), &Payload::new(json!([{ "sku": "A" }])))
            .await;
        assert_eq!(status, HandlerStatus::Success);
    }

    #[test]
    fn unknown_name_fails_with_requested_name() {
        let registry = TaskRegistry::<()>::with_defaults();
        let err = registry.resolve_name("reportDaily").err().unwrap();
        assert_eq!(err, UnsupportedTaskError("reportDaily".to_string()));
    }

    #[test]
    fn registered_types_lists_every_kind() {
        let registry = TaskRegistry::<()>::with_defaults();
        assert_eq!(registry.registered_types(), vec!["inventoryStaticticsMain"]);
    }
}
