use anyhow::Result;

use engine::{Engine, EngineConfig};

fn main() -> Result<()> {
    pretty_env_logger::init();

    // Any error reaching this point is fatal: it gets printed to stderr with
    // its underlying status code and the process exits non-zero.
    let engine = Engine::new(EngineConfig::default())?;
    engine.run()
}
