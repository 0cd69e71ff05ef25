use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  NaiveDate,
  Weekday
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  info
};

use crate::datetime::{
  parse_weekday_name,
  resolve_timezone,
  today_in
};
use crate::debounce::DEFAULT_SEARCH_DEBOUNCE;

pub const CONFIG_ENV_VAR: &str =
  "TRELLIS_CONFIG";

#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(default)]
pub struct Config {
  /// IANA zone name used to decide
  /// what "today" is.
  pub timezone:    Option<String>,
  /// Calendar week start; Sunday when
  /// unset.
  pub week_start:  Option<String>,
  pub search:      SearchConfig,
  pub log:         LogConfig,
  pub storage:     StorageConfig,
  pub backend:     Option<BackendConfig>,
  #[serde(skip)]
  pub loaded_from: Option<PathBuf>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(default)]
pub struct SearchConfig {
  pub debounce_ms: u64
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      debounce_ms:
        DEFAULT_SEARCH_DEBOUNCE
          .as_millis()
          as u64
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(default)]
pub struct LogConfig {
  /// `EnvFilter` directive; `RUST_LOG`
  /// takes precedence.
  pub filter: String
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      filter: "warn".to_string()
    }
  }
}

#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(default)]
pub struct StorageConfig {
  pub data_dir: Option<PathBuf>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct BackendConfig {
  pub url:      String,
  pub anon_key: String
}

/// Where records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
  Remote(BackendConfig),
  Local {
    data_dir: PathBuf
  }
}

impl Config {
  /// Load from `override_path`, then
  /// `TRELLIS_CONFIG`, then the user
  /// config dir. No file means
  /// defaults.
  #[tracing::instrument(skip(
    override_path
  ))]
  pub fn load(
    override_path: Option<&Path>
  ) -> anyhow::Result<Self> {
    let Some(path) =
      resolve_config_path(override_path)?
    else {
      info!(
        "no config file found; using \
         defaults"
      );
      return Ok(Self::default());
    };

    let path = expand_tilde(&path);
    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    let mut cfg = Self::from_toml_str(
      &text
    )
    .with_context(|| {
      format!(
        "invalid config {}",
        path.display()
      )
    })?;
    info!(config = %path.display(), "loaded config");
    cfg.loaded_from = Some(path);
    Ok(cfg)
  }

  pub fn from_toml_str(
    text: &str
  ) -> anyhow::Result<Self> {
    let cfg: Config = toml::from_str(text)
      .context("failed to parse TOML")?;
    cfg.week_start()?;
    Ok(cfg)
  }

  pub fn timezone(&self) -> Tz {
    resolve_timezone(
      self.timezone.as_deref()
    )
  }

  /// The local calendar day in the
  /// resolved timezone.
  pub fn today(&self) -> NaiveDate {
    today_in(self.timezone())
  }

  pub fn week_start(
    &self
  ) -> anyhow::Result<Weekday> {
    match self.week_start.as_deref() {
      | None => Ok(Weekday::Sun),
      | Some(raw) => {
        parse_weekday_name(raw)
          .ok_or_else(|| {
            anyhow!(
              "unknown week_start \
               '{raw}'"
            )
          })
      }
    }
  }

  pub fn search_debounce(
    &self
  ) -> Duration {
    Duration::from_millis(
      self.search.debounce_ms
    )
  }

  /// Remote when a backend is
  /// configured, otherwise the local
  /// blob store.
  pub fn storage_mode(
    &self
  ) -> anyhow::Result<StorageMode> {
    if let Some(backend) = &self.backend
    {
      if backend.url.trim().is_empty()
        || backend
          .anon_key
          .trim()
          .is_empty()
      {
        return Err(anyhow!(
          "[backend] needs both url and \
           anon_key"
        ));
      }
      debug!(url = %backend.url, "remote storage mode");
      return Ok(StorageMode::Remote(
        backend.clone()
      ));
    }

    let data_dir = match &self
      .storage
      .data_dir
    {
      | Some(dir) => expand_tilde(dir),
      | None => default_data_dir()?
    };
    debug!(data_dir = %data_dir.display(), "local storage mode");
    Ok(StorageMode::Local {
      data_dir
    })
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(env_path) =
    std::env::var(CONFIG_ENV_VAR)
  {
    if env_path == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      env_path
    )));
  }

  let Some(config_dir) =
    dirs::config_dir()
  else {
    debug!(
      "no user config directory on \
       this platform"
    );
    return Ok(None);
  };
  let candidate = config_dir
    .join("trellis")
    .join("config.toml");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let base = dirs::data_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine data \
         directory"
      )
    })?;
  Ok(base.join("trellis"))
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}
