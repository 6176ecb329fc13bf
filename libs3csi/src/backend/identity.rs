//! Identity service: static plugin metadata.

use async_trait::async_trait;

use crate::config::Meta;
use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::types::{PluginCapability, PluginInfo};

pub struct S3Identity {
    meta: Meta,
}

impl S3Identity {
    pub fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

#[async_trait]
impl CsiIdentity for S3Identity {
    async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError> {
        Ok(PluginInfo {
            name: self.meta.driver_name.clone(),
            vendor_version: self.meta.driver_version.clone(),
        })
    }

    // Nothing is initialized lazily, a running process is ready.
    async fn probe(&self) -> Result<bool, CsiError> {
        Ok(true)
    }

    async fn get_plugin_capabilities(&self) -> Result<Vec<PluginCapability>, CsiError> {
        Ok(vec![PluginCapability::ControllerService])
    }
}
