//! Context shared by the bridge components

use std::sync::Arc;

use crate::command::Translator;
use crate::config::Config;
use crate::records::RecordCodec;
use crate::scheduler::ActionQueue;

/// Everything the orchestrator hands to the codec, translator and scheduler.
///
/// Owned by the orchestrator; there is no process-wide state.
#[derive(Clone)]
pub struct BridgeContext {
    pub config: Arc<Config>,
    pub codec: RecordCodec,
    pub translator: Translator,
    pub actions: ActionQueue,
}

impl BridgeContext {
    pub fn new(config: Config, actions: ActionQueue) -> Self {
        let config = Arc::new(config);

        let codec = RecordCodec::new(config.encoding);
        let translator = Translator::new(config.key_bindings.clone(), config.turn_sensitivity);

        Self {
            config,
            codec,
            translator,
            actions,
        }
    }
}
