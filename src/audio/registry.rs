use super::mixer::{Mixer, MixerConfig, MixerOutput};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One mixer per scope (usually a guild), shared by every command run there.
pub struct MixerRegistry {
    config: MixerConfig,
    mixers: Mutex<HashMap<String, Arc<Mixer>>>,
}

impl MixerRegistry {
    pub fn new(config: MixerConfig) -> Self {
        Self {
            config,
            mixers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the scope's mixer, creating it on first use. `on_create` gets
    /// the new mixer's output so it can be wired to a voice connection.
    pub fn get_or_create(&self, scope: &str, on_create: impl FnOnce(MixerOutput)) -> Arc<Mixer> {
        let mut mixers = self.mixers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mixer) = mixers.get(scope) {
            return mixer.clone();
        }
        let (mixer, output) = Mixer::new(self.config);
        mixers.insert(scope.to_string(), mixer.clone());
        drop(mixers);
        debug!(scope, "mixer created");
        on_create(output);
        mixer
    }

    pub fn get(&self, scope: &str) -> Option<Arc<Mixer>> {
        self.mixers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(scope)
            .cloned()
    }

    /// Shuts the scope's mixer down and forgets it.
    pub fn remove(&self, scope: &str) -> bool {
        let removed = self
            .mixers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(scope);
        match removed {
            Some(mixer) => {
                mixer.shutdown();
                debug!(scope, "mixer removed");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.mixers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
