use super::{Component, ComponentState, ProcessSupervisor};
use std::collections::HashMap;
use tracing::debug;

impl ProcessSupervisor {
    pub async fn set_component_state(&self, component: Component, state: ComponentState) {
        let mut states = self.component_states.lock().await;
        states.insert(component, state);
        debug!(%component, ?state, "component state changed");
    }

    pub async fn get_component_state(&self, component: Component) -> Option<ComponentState> {
        let states = self.component_states.lock().await;
        states.get(&component).copied()
    }

    pub async fn get_all_component_states(&self) -> HashMap<Component, ComponentState> {
        let states = self.component_states.lock().await;
        states.clone()
    }
}
