use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::query::ViewState;

const RC_ENV_VAR: &str = "AGENDARC";
const RC_FILE_NAME: &str = ".agendarc";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("data.location", "~/.agenda"),
      ("data.file", "todos.json"),
      ("color", "on"),
      ("default.status", "all"),
      ("default.range", "all"),
      ("default.sort", "default")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_rc_path(rc_override)? {
      | Some(path) => {
        info!(rc = %path.display(), "loading agendarc");
        cfg.load_file(&path)?;
      }
      | None => {
        debug!(
          "no agendarc found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// `None` when unset; an error when
  /// set to something that is not a
  /// yes/no word.
  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    self
      .map
      .get(key)
      .map(|v| {
        parse_bool(v).ok_or_else(|| {
          anyhow!(
            "invalid {key} setting: {v}"
          )
        })
      })
      .transpose()
  }

  /// The list view a command starts
  /// from before its own flags apply.
  pub fn default_view(
    &self
  ) -> anyhow::Result<ViewState> {
    let mut view = ViewState::default();
    if let Some(raw) =
      self.get("default.status")
    {
      view.status =
        raw.parse().context(
          "invalid default.status"
        )?;
    }
    if let Some(raw) =
      self.get("default.range")
    {
      view.range =
        raw.parse().context(
          "invalid default.range"
        )?;
    }
    if let Some(raw) =
      self.get("default.sort")
    {
      view.sort = raw
        .parse()
        .context("invalid default.sort")?;
    }
    Ok(view)
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = match raw_line
        .split_once('#')
      {
        | Some((before, _)) => {
          before.trim()
        }
        | None => raw_line.trim()
      };
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        if include_path == path {
          warn!(
            include = %include_path.display(),
            "agendarc includes itself; skipping"
          );
          continue;
        }

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// The list file: `--file` when given,
/// otherwise `data.location/data.file`.
/// Its directory is created if needed.
#[tracing::instrument(skip(
  cfg,
  override_file
))]
pub fn resolve_data_file(
  cfg: &Config,
  override_file: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let file = if let Some(path) =
    override_file
  {
    expand_tilde(path)
  } else {
    let dir = cfg
      .get("data.location")
      .map(|raw| {
        expand_tilde(Path::new(&raw))
      })
      .ok_or_else(|| {
        anyhow!(
          "data.location is not set"
        )
      })?;
    let name = cfg
      .get("data.file")
      .unwrap_or_else(|| {
        "todos.json".to_string()
      });
    dir.join(name)
  };

  if let Some(dir) = file.parent()
    && !dir.as_os_str().is_empty()
    && !dir.exists()
  {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(file)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping agendarc"
    );
    return Ok(None);
  };
  let candidate =
    home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
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

fn parse_bool(
  s: &str
) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;
  use crate::query::{
    RangeFilter,
    SortKey,
    StatusFilter
  };

  #[test]
  fn rc_file_with_include_and_comments()
  {
    let temp =
      tempdir().expect("tempdir");
    let extra = temp.path().join("extra");
    fs::write(
      &extra,
      "default.sort = priority\n"
    )
    .expect("write include");
    let rc = temp.path().join("rc");
    fs::write(
      &rc,
      "# personal settings\n\
       data.location = /tmp/lists # inline\n\
       color = off\n\
       include extra\n\
       include missing\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(rc.as_path()))
      .expect("load config");
    assert_eq!(
      cfg.get("data.location").as_deref(),
      Some("/tmp/lists")
    );
    assert_eq!(
      cfg
        .get_bool("color")
        .expect("color flag"),
      Some(false)
    );
    assert_eq!(
      cfg
        .default_view()
        .expect("view")
        .sort,
      SortKey::Priority
    );
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn malformed_line_is_an_error() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("rc");
    fs::write(&rc, "just words\n")
      .expect("write rc");

    let err = Config::load(Some(rc.as_path()))
      .expect_err("bad line");
    assert!(
      err
        .to_string()
        .contains("invalid config line")
    );
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      (
        "rc.default.status".to_string(),
        "todo".to_string()
      ),
      (
        "default.range".to_string(),
        "week".to_string()
      )
    ]);
    let view =
      cfg.default_view().expect("view");
    assert_eq!(
      view.status,
      StatusFilter::Todo
    );
    assert_eq!(
      view.range,
      RangeFilter::Week
    );

    cfg.apply_overrides([(
      "default.sort".to_string(),
      "random".to_string()
    )]);
    assert!(cfg.default_view().is_err());
  }

  #[test]
  fn bool_settings_are_strict() {
    let mut cfg = Config::default();
    assert_eq!(
      cfg.get_bool("color").expect("on"),
      Some(true)
    );
    assert_eq!(
      cfg
        .get_bool("missing")
        .expect("unset"),
      None
    );

    cfg.apply_overrides([(
      "rc.color".to_string(),
      "sometimes".to_string()
    )]);
    let err = cfg
      .get_bool("color")
      .expect_err("not a flag");
    assert!(
      err
        .to_string()
        .contains("invalid color setting")
    );
  }

  #[test]
  fn data_file_comes_from_location_and_name()
   {
    let temp =
      tempdir().expect("tempdir");
    let mut cfg = Config::default();
    let location =
      temp.path().join("nested");
    cfg.apply_overrides([
      (
        "data.location".to_string(),
        location
          .to_string_lossy()
          .to_string()
      ),
      (
        "data.file".to_string(),
        "work.json".to_string()
      )
    ]);

    let file =
      resolve_data_file(&cfg, None)
        .expect("resolve");
    assert_eq!(
      file,
      location.join("work.json")
    );
    assert!(location.is_dir());

    let explicit =
      temp.path().join("other.json");
    assert_eq!(
      resolve_data_file(
        &cfg,
        Some(explicit.as_path())
      )
      .expect("resolve"),
      explicit
    );
  }
}
