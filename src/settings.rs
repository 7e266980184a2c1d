use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, File, FileFormat};
use tracing::debug;

const CONF_RELATIVE: &str = ".config/nvd-mirror.conf";

/// Values supplied by the INI configuration file, e.g.:
///
/// ```ini
/// [default]
/// mirror_path=/home/user/mirrors/nvd/
/// ```
#[derive(Debug, Clone)]
pub struct Settings {
    pub mirror_path: Utf8PathBuf,
}

impl Settings {
    /// Load settings from `path`, or from `~/.config/nvd-mirror.conf`
    /// when no path is given.
    pub fn load(path: Option<&Utf8Path>) -> crate::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_conf_path()?,
        };
        if !path.is_file() {
            return Err(crate::NvdMirrorError::InvalidConfig(format!(
                "no configuration file; create {}",
                path
            )));
        }

        let cfg = Config::builder()
            .add_source(File::new(path.as_str(), FileFormat::Ini))
            .build()?;

        let mirror_path = cfg
            .get_string("default.mirror_path")
            .or_else(|_| cfg.get_string("DEFAULT.mirror_path"))
            .or_else(|_| cfg.get_string("mirror_path"))
            .map_err(|_| {
                crate::NvdMirrorError::InvalidConfig(format!(
                    "mirror_path not defined in {}",
                    path
                ))
            })?;

        debug!("local mirror path is {}", mirror_path);
        Ok(Self {
            mirror_path: Utf8PathBuf::from(mirror_path),
        })
    }
}

fn default_conf_path() -> crate::Result<Utf8PathBuf> {
    let home = std::env::var("HOME").map_err(|_| {
        crate::NvdMirrorError::InvalidConfig(
            "HOME is not set; pass --config or --mirror-path".to_string(),
        )
    })?;
    Ok(Utf8PathBuf::from(home).join(CONF_RELATIVE))
}
