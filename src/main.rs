use runtime_ibl::cli::CliOverrides;
use runtime_ibl::config::DEFAULT_CONFIG_PATH;
use runtime_ibl::run_with_overrides;
use std::path::PathBuf;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            log::error!("[cli] {err}");
            std::process::exit(2);
        }
    };
    let config_path = cli.config_path().cloned().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    if let Err(err) = pollster::block_on(run_with_overrides(&config_path, cli.into_config_overrides())) {
        log::error!("Application error: {err:?}");
        std::process::exit(1);
    }
}
