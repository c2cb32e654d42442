use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::messages::IncomingMessage;
use crate::core::player::{PresentRequest, UtterancePlayer};
use crate::errors::EngineResult;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Malformed message: {0}")]
    Malformed(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Which player handles a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Route {
    Playback,
    Pipeline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Presented { route: Route, utterance_id: String },
    Superseded { route: Route, utterance_id: String },
    /// A supersede signal that matched nothing in progress.
    Ignored { utterance_id: String },
}

/// Routes messages by type tag and keeps the two paths mutually exclusive.
///
/// Starting an utterance on one path halts the other if it is still busy,
/// so both never drive the effectors at the same time.
pub struct Dispatcher {
    playback: Arc<dyn UtterancePlayer>,
    pipeline: Arc<dyn UtterancePlayer>,
    route: Mutex<Option<Route>>,
    serial: tokio::sync::Mutex<()>,
}

impl Dispatcher {
    pub fn new(playback: Arc<dyn UtterancePlayer>, pipeline: Arc<dyn UtterancePlayer>) -> Self {
        Self {
            playback,
            pipeline,
            route: Mutex::new(None),
            serial: tokio::sync::Mutex::new(()),
        }
    }

    fn player(&self, route: Route) -> &Arc<dyn UtterancePlayer> {
        match route {
            Route::Playback => &self.playback,
            Route::Pipeline => &self.pipeline,
        }
    }

    /// The path that handled the most recent utterance.
    pub fn active_route(&self) -> Option<Route> {
        *self.route.lock()
    }

    pub async fn dispatch_json(&self, raw: &str) -> EngineResult<DispatchOutcome> {
        let message: IncomingMessage =
            serde_json::from_str(raw).map_err(|e| DispatchError::Malformed(e.to_string()))?;
        self.dispatch(message).await
    }

    /// Handle one message. Messages are processed one at a time.
    pub async fn dispatch(&self, message: IncomingMessage) -> EngineResult<DispatchOutcome> {
        let _serial = self.serial.lock().await;
        debug!("Dispatching {} '{}'", message.type_tag(), message.id());

        if let IncomingMessage::SupersedeSignal { id } = &message {
            return Ok(self.supersede(id).await);
        }

        let route = match &message {
            IncomingMessage::SynthesizedUtterance { .. } => Route::Playback,
            _ => Route::Pipeline,
        };
        match message.into_request() {
            Some(request) => self.present(route, request).await,
            None => Ok(DispatchOutcome::Ignored {
                utterance_id: String::new(),
            }),
        }
    }

    async fn present(&self, route: Route, request: PresentRequest) -> EngineResult<DispatchOutcome> {
        let previous = self.route.lock().replace(route);
        if let Some(previous) = previous
            && previous != route
            && self.player(previous).active_utterance().is_some()
        {
            info!(
                "Utterance on {:?} path halts the busy {:?} path",
                route, previous
            );
            self.player(previous).halt().await;
        }

        let utterance_id = request.utterance_id().to_string();
        self.player(route).present(request).await?;
        Ok(DispatchOutcome::Presented {
            route,
            utterance_id,
        })
    }

    async fn supersede(&self, utterance_id: &str) -> DispatchOutcome {
        let first = self.active_route().unwrap_or(Route::Playback);
        let second = match first {
            Route::Playback => Route::Pipeline,
            Route::Pipeline => Route::Playback,
        };

        for route in [first, second] {
            if self.player(route).supersede(utterance_id).await {
                info!("Superseded '{}' on {:?} path", utterance_id, route);
                return DispatchOutcome::Superseded {
                    route,
                    utterance_id: utterance_id.to_string(),
                };
            }
        }
        debug!("Supersede signal for '{}' matched nothing", utterance_id);
        DispatchOutcome::Ignored {
            utterance_id: utterance_id.to_string(),
        }
    }
}
