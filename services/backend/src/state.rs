use engine::RoundEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RoundEngine>,
}

impl AppState {
    pub fn new(engine: Arc<RoundEngine>) -> Self {
        Self { engine }
    }
}
