//! Build information reported at startup and by `sos version`

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub build_profile: &'static str,
    pub build_features: &'static str,
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, features: {})",
            self.version, self.build_profile, self.build_features
        )
    }
}

/// Build information for the crate that invokes the macro
#[macro_export]
macro_rules! build_info {
    () => {
        $crate::version::BuildInfo {
            version: env!("CARGO_PKG_VERSION"),
            build_profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
            build_features: option_env!("BUILD_FEATURES").unwrap_or("default"),
        }
    };
}

pub fn build_info() -> BuildInfo {
    build_info!()
}
