use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Receives node notifications for every path watched by a hub session.
///
/// Implementations override only the hooks they need. An `Err` is handed to
/// the hub's abort policy.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ZnodeListener: Send + Sync + 'static {
    async fn node_created(
        &self,
        _path: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn node_deleted(
        &self,
        _path: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn node_data_changed(
        &self,
        _path: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn node_children_changed(
        &self,
        _path: &str,
    ) -> Result<()> {
        Ok(())
    }
}
