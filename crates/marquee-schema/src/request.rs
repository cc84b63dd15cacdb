use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("failed to read launch request: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse launch request: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("session_id must not be empty")]
    EmptySessionId,
    #[error("session_id '{0}' may only contain [A-Za-z0-9_.-]")]
    InvalidSessionId(String),
    #[error("launch_command must not be empty")]
    EmptyLaunchCommand,
    #[error("platform image must not be empty")]
    EmptyImage,
    #[error("wine launches need a game slug or id to key the prefix")]
    MissingIdentifier,
    #[error("game declares variant '{game}' but platform is '{platform}'")]
    VariantMismatch {
        game: ExecutionVariant,
        platform: ExecutionVariant,
    },
    #[error("invalid resolution '{0}', expected '<width>x<height>'")]
    InvalidResolution(String),
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionVariant {
    #[default]
    Native,
    #[serde(alias = "compat")]
    Wine,
}

impl fmt::Display for ExecutionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Wine => f.write_str("wine"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WineArch {
    Win32,
    #[default]
    Win64,
}

impl WineArch {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Win32 => "win32",
            Self::Win64 => "win64",
        }
    }
}

/// Named Wine debug channels. `all` overrides every individual flag.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DebugChannels {
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub relay: bool,
    #[serde(default)]
    pub seh: bool,
    #[serde(default)]
    pub tid: bool,
    #[serde(default)]
    pub timestamp: bool,
    #[serde(default)]
    pub loaddll: bool,
    #[serde(default)]
    pub heap: bool,
    #[serde(default)]
    pub file: bool,
    #[serde(default)]
    pub module: bool,
    #[serde(default)]
    pub d3d: bool,
}

impl DebugChannels {
    fn channels(&self) -> [(&'static str, bool); 9] {
        [
            ("relay", self.relay),
            ("seh", self.seh),
            ("tid", self.tid),
            ("timestamp", self.timestamp),
            ("loaddll", self.loaddll),
            ("heap", self.heap),
            ("file", self.file),
            ("module", self.module),
            ("d3d", self.d3d),
        ]
    }

    /// Value for `WINEDEBUG`.
    pub fn winedebug(&self) -> String {
        if self.all {
            return "+all".to_owned();
        }
        let enabled: Vec<String> = self
            .channels()
            .iter()
            .filter(|(_, on)| *on)
            .map(|(name, _)| format!("+{name}"))
            .collect();
        if enabled.is_empty() {
            "-all".to_owned()
        } else {
            enabled.join(",")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RequestError::InvalidResolution(s.to_owned());
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width = w.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = h.trim().parse::<u32>().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = RequestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GameDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    pub title: String,
    /// Library-relative directory, or an absolute host path.
    #[serde(default)]
    pub location: Option<String>,
    /// Where an installer put the game, usually a Windows path inside the prefix.
    #[serde(default)]
    pub installed_path: Option<String>,
    pub launch_command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub variant: Option<ExecutionVariant>,
    #[serde(default)]
    pub wine_arch: WineArch,
    #[serde(default)]
    pub debug: DebugChannels,
    #[serde(default)]
    pub fullscreen: bool,
    #[serde(default)]
    pub resolution: Option<Resolution>,
}

impl GameDescriptor {
    /// Stable identifier: slug, falling back to id.
    pub fn identifier(&self) -> Option<&str> {
        self.slug
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.id.as_deref().filter(|s| !s.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PlatformDescriptor {
    pub variant: ExecutionVariant,
    pub image: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LaunchRequest {
    pub session_id: String,
    pub game: GameDescriptor,
    pub platform: PlatformDescriptor,
}

impl LaunchRequest {
    pub fn variant(&self) -> ExecutionVariant {
        self.platform.variant
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.session_id.is_empty() {
            return Err(RequestError::EmptySessionId);
        }
        if !self
            .session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(RequestError::InvalidSessionId(self.session_id.clone()));
        }
        if self.game.launch_command.trim().is_empty() {
            return Err(RequestError::EmptyLaunchCommand);
        }
        if self.platform.image.trim().is_empty() {
            return Err(RequestError::EmptyImage);
        }
        if let Some(game) = self.game.variant {
            if game != self.platform.variant {
                return Err(RequestError::VariantMismatch {
                    game,
                    platform: self.platform.variant,
                });
            }
        }
        if self.platform.variant == ExecutionVariant::Wine && self.game.identifier().is_none() {
            return Err(RequestError::MissingIdentifier);
        }
        Ok(())
    }
}

pub fn parse_request_str(input: &str) -> Result<LaunchRequest, RequestError> {
    let request: LaunchRequest = toml::from_str(input)?;
    request.validate()?;
    Ok(request)
}

pub fn parse_request_file(path: impl AsRef<Path>) -> Result<LaunchRequest, RequestError> {
    let content = fs::read_to_string(path)?;
    parse_request_str(&content)
}
