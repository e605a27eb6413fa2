//! Logger setup from the `[logging]` configuration section.

use crate::config::Logging;

pub fn setup(config: &Logging) -> crate::Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(config.level);

    for (module, level) in &config.filters {
        builder.filter_module(&module, *level);
    }

    builder.try_init()?;
    Ok(())
}
