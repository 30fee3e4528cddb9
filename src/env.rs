//! The collaborator bundle handed to every import.

use std::sync::Arc;

use crate::adder::BulkAdderFactory;
use crate::config::Settings;
use crate::convert::ConverterFactory;
use crate::job::JobRegistry;
use crate::storage::StorageFactory;

/// Everything an import needs from the embedding system.
#[derive(Clone)]
pub struct ImportEnv {
    pub settings: Arc<Settings>,
    pub storage: Arc<dyn StorageFactory>,
    pub jobs: Arc<dyn JobRegistry>,
    pub adders: Arc<dyn BulkAdderFactory>,
    pub converters: Arc<dyn ConverterFactory>,
}
