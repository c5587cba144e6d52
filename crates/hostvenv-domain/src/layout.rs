use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::version::TargetVersion;

pub const ENV_DIR_NAME: &str = "venv";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    Posix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }
}

/// Paths inside an environment directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvLayout {
    root: PathBuf,
    platform: Platform,
}

impl EnvLayout {
    /// Layout of `<project>/venv` for the given platform.
    pub fn in_project(project_root: &Path, platform: Platform) -> Self {
        Self::at(project_root.join(ENV_DIR_NAME), platform)
    }

    pub fn at(root: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            root: root.into(),
            platform,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn bin_dir(&self) -> PathBuf {
        match self.platform {
            Platform::Windows => self.root.join("Scripts"),
            Platform::Posix => self.root.join("bin"),
        }
    }

    pub fn interpreter(&self) -> PathBuf {
        match self.platform {
            Platform::Windows => self.bin_dir().join("python.exe"),
            Platform::Posix => self.bin_dir().join("python"),
        }
    }

    pub fn installer(&self) -> PathBuf {
        match self.platform {
            Platform::Windows => self.bin_dir().join("pip.exe"),
            Platform::Posix => self.bin_dir().join("pip"),
        }
    }

    pub fn lib_dir(&self) -> PathBuf {
        match self.platform {
            Platform::Windows => self.root.join("Lib"),
            Platform::Posix => self.root.join("lib"),
        }
    }

    /// Windows keeps a single `Lib/site-packages`; POSIX environments nest
    /// it under the channel of the interpreter that created them.
    pub fn site_packages(&self, channel: &TargetVersion) -> PathBuf {
        match self.platform {
            Platform::Windows => self.lib_dir().join("site-packages"),
            Platform::Posix => self
                .lib_dir()
                .join(format!("python{channel}"))
                .join("site-packages"),
        }
    }
}
