use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let config_path = std::env::args_os().nth(1).map(PathBuf::from);
  pressure_logger_lib::run(config_path.as_deref()).await
}
