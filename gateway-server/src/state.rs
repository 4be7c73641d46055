//! Application state shared across handlers via axum's `State` extractor.

use gateway_engine::{Config, Engine};

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
}

impl AppState {
    pub fn new(config: Config) -> std::io::Result<Self> {
        Ok(Self {
            engine: Engine::new(config)?,
        })
    }

    /// Test-only constructor — small concurrency ceiling and cache so tests
    /// stay fast and isolated, no environment dependency.
    #[doc(hidden)]
    pub fn new_test() -> Self {
        let config = Config {
            max_concurrent: 4,
            cache_capacity: 16,
            ..Config::default()
        };
        Self {
            engine: Engine::new(config).expect("scratch dir creation"),
        }
    }
}
