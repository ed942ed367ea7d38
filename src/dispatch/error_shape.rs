//! Error-shaping layer: surface failures as error-value tokens.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::layer::{DispatchLayer, LayerContext};
use crate::model::{ErrorEvent, ResultEvent, ValueRef};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorShapeConfig {
    /// Output ports to populate with error documents.
    #[serde(default)]
    pub output_ports: Vec<String>,
}

/// Converts any upward-bound error into a result carrying error-document
/// references on the configured output ports.
///
/// With this layer installed a failure poisons only its own index: the
/// owning process keeps streaming, and downstream steps see conventional
/// error tokens instead of an aborted stream.
pub struct ErrorShapeLayer {
    config: ErrorShapeConfig,
}

impl ErrorShapeLayer {
    pub fn new(config: ErrorShapeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DispatchLayer for ErrorShapeLayer {
    fn name(&self) -> &'static str {
        "error-shape"
    }

    async fn receive_error(&self, ctx: &LayerContext, event: ErrorEvent) {
        debug!(process = %event.process, index = %event.index,
               message = %event.message, "shaping error into error-value result");
        let outputs: HashMap<String, ValueRef> = self
            .config
            .output_ports
            .iter()
            .map(|port| (port.clone(), ValueRef::error_document(&event.message)))
            .collect();
        ctx.send_result_up(ResultEvent {
            process: event.process,
            index: event.index,
            outputs,
        })
        .await;
    }
}
