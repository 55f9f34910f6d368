use anyhow::Context as _;
use serde::de::DeserializeOwned;

/// Loads layered config: `config/{run_mode}/base`, `config/{run_mode}/{app}`,
/// an optional `.local` override and finally `APP_*` env variables.
pub fn load_config<T: DeserializeOwned>() -> anyhow::Result<T> {
    let app_name = std::env::var("APP_NAME").context("pass APP_NAME env to load correct config")?;
    let run_mode = std::env::var("APP_RUN_MODE").unwrap_or_else(|_| "dev".into());
    load_config_from(&format!("config/{run_mode}"), &app_name)
}

pub fn load_config_from<T: DeserializeOwned>(base_path: &str, app_name: &str) -> anyhow::Result<T> {
    config::Config::builder()
        .add_source(config::File::with_name(&format!("{base_path}/base")).required(false))
        .add_source(config::File::with_name(&format!("{base_path}/{app_name}")).required(true))
        .add_source(
            config::File::with_name(&format!("{base_path}/{app_name}.local")).required(false),
        )
        .add_source(
            config::Environment::default()
                .prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .with_context(|| format!("build config for {app_name} from {base_path}"))?
        .try_deserialize::<T>()
        .with_context(|| format!("deserialize config for {app_name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    struct Sample {
        label: String,
        #[serde(default)]
        retries: u32,
    }

    #[test]
    fn test_local_file_overrides_app_file() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join(format!("cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("svc.toml"), "label = \"app\"\nretries = 2\n")?;
        std::fs::write(dir.join("svc.local.toml"), "label = \"local\"\n")?;

        let base = dir.to_str().context("utf8 temp dir")?;
        let sample: Sample = load_config_from(base, "svc")?;
        assert_eq!(sample.label, "local");
        assert_eq!(sample.retries, 2);

        assert!(load_config_from::<Sample>(base, "missing").is_err());
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
