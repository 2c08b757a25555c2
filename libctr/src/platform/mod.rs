//! Platform specifiers and matchers.
//!
//! A platform is the `os/architecture[/variant]` triple an image manifest is
//! built for. Strings coming from users, archives and image configs use many
//! spellings for the same thing (`x86_64`, `amd64`, `aarch64`, `arm64/v8`...),
//! so everything is normalized before it is compared or printed.

use crate::error::{CtrError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;


/// A normalized platform specifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system, e.g. `linux`
    pub os: String,
    /// CPU architecture, e.g. `amd64`
    pub architecture: String,
    /// Optional architecture variant, e.g. `v7`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Platform {
    /// Builds a platform and normalizes it.
    pub fn new(os: &str, architecture: &str, variant: Option<&str>) -> Self {
        let (architecture, variant) = normalize_arch(architecture, variant.unwrap_or(""));
        Self {
            os: normalize_os(os),
            architecture,
            variant,
        }
    }

    /// The platform this binary runs on.
    pub fn host() -> Self {
        let variant = match std::env::consts::ARCH {
            "arm" => Some("v7"),
            _ => None,
        };
        Self::new(std::env::consts::OS, std::env::consts::ARCH, variant)
    }

    /// Platforms the host (or `self`) can also run, best match first.
    fn compatible(&self) -> Vec<Platform> {
        let mut out = vec![self.clone()];
        let with = |arch: &str, variant: Option<&str>| Platform {
            os: self.os.clone(),
            architecture: arch.to_string(),
            variant: variant.map(str::to_string),
        };
        match (self.architecture.as_str(), self.variant.as_deref()) {
            ("amd64", _) => out.push(with("386", None)),
            ("arm64", _) => {
                for v in ["v8", "v7", "v6"] {
                    out.push(with("arm", Some(v)));
                }
            }
            ("arm", Some(v)) => {
                if let Some(n) = v.strip_prefix('v').and_then(|n| n.parse::<u32>().ok()) {
                    for lower in (5..n).rev() {
                        out.push(with("arm", Some(&format!("v{}", lower))));
                    }
                }
            }
            _ => {}
        }
        out
    }
}

impl FromStr for Platform {
    type Err = CtrError;

    /// Parses `os`, `arch`, `os/arch` or `os/arch/variant`.
    ///
    /// A single component is tried as an OS first and as an architecture
    /// second, filling the other half from the host.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| CtrError::invalid_argument(format!("{:?}: {}", s, why));
        if s.is_empty() {
            return Err(invalid("empty platform specifier"));
        }
        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("empty component in platform specifier"));
        }
        for part in &parts {
            if !part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            {
                return Err(invalid("platform components must be alphanumeric"));
            }
        }
        let host = Platform::host();
        match parts.as_slice() {
            [single] => {
                let lower = single.to_lowercase();
                if is_known_os(&lower) {
                    let host_arch_variant = host.variant.as_deref();
                    Ok(Platform::new(&lower, &host.architecture, host_arch_variant))
                } else if is_known_arch(&lower) {
                    Ok(Platform::new(&host.os, &lower, None))
                } else {
                    Err(invalid("unknown operating system or architecture"))
                }
            }
            [os, arch] => Ok(Platform::new(&os.to_lowercase(), &arch.to_lowercase(), None)),
            [os, arch, variant] => Ok(Platform::new(
                &os.to_lowercase(),
                &arch.to_lowercase(),
                Some(&variant.to_lowercase()),
            )),
            _ => Err(invalid("too many components")),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.os.is_empty() {
            return f.write_str("unknown");
        }
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

impl From<&oci_spec::image::Platform> for Platform {
    fn from(p: &oci_spec::image::Platform) -> Self {
        Platform::new(
            &p.os().to_string(),
            &p.architecture().to_string(),
            p.variant().as_deref(),
        )
    }
}

fn is_known_os(os: &str) -> bool {
    matches!(
        os,
        "aix"
            | "android"
            | "darwin"
            | "dragonfly"
            | "freebsd"
            | "illumos"
            | "ios"
            | "js"
            | "linux"
            | "netbsd"
            | "openbsd"
            | "plan9"
            | "solaris"
            | "wasip1"
            | "windows"
            | "macos"
    )
}

fn is_known_arch(arch: &str) -> bool {
    matches!(
        arch,
        "386"
            | "i386"
            | "x86"
            | "amd64"
            | "x86_64"
            | "x86-64"
            | "arm"
            | "armhf"
            | "armel"
            | "arm64"
            | "aarch64"
            | "loong64"
            | "mips"
            | "mipsle"
            | "mips64"
            | "mips64le"
            | "ppc64"
            | "ppc64le"
            | "riscv64"
            | "s390x"
            | "wasm"
    )
}

fn normalize_os(os: &str) -> String {
    match os.to_lowercase().as_str() {
        "macos" => "darwin".to_string(),
        other => other.to_string(),
    }
}

fn normalize_arch(arch: &str, variant: &str) -> (String, Option<String>) {
    let arch = arch.to_lowercase();
    let variant = variant.to_lowercase();
    let keep = |v: &str| {
        if v.is_empty() {
            None
        } else {
            Some(v.to_string())
        }
    };
    match arch.as_str() {
        "i386" | "x86" => ("386".to_string(), None),
        "x86_64" | "x86-64" | "amd64" => {
            if variant == "v1" {
                ("amd64".to_string(), None)
            } else {
                ("amd64".to_string(), keep(&variant))
            }
        }
        "aarch64" | "arm64" => match variant.as_str() {
            "8" | "v8" | "" => ("arm64".to_string(), None),
            other => ("arm64".to_string(), keep(other)),
        },
        "armhf" => ("arm".to_string(), Some("v7".to_string())),
        "armel" => ("arm".to_string(), Some("v6".to_string())),
        "arm" => match variant.as_str() {
            "" | "7" => ("arm".to_string(), Some("v7".to_string())),
            "5" | "6" | "8" => ("arm".to_string(), Some(format!("v{}", variant))),
            other => ("arm".to_string(), keep(other)),
        },
        other => (other.to_string(), keep(&variant)),
    }
}

/// Decides which platforms are acceptable and in which order of preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformMatcher {
    /// The host platform and the platforms it can also run
    Default,
    /// Exactly this platform after normalization
    OnlyStrict(Platform),
    /// Any platform
    All,
}

impl PlatformMatcher {
    /// Returns true when `platform` is acceptable.
    pub fn matches(&self, platform: &Platform) -> bool {
        self.rank(platform).is_some()
    }

    /// Position of `platform` in the preference order, lower is better.
    ///
    /// `None` means the platform does not match at all.
    pub fn rank(&self, platform: &Platform) -> Option<usize> {
        match self {
            PlatformMatcher::All => Some(0),
            PlatformMatcher::OnlyStrict(want) => (want == platform).then_some(0),
            PlatformMatcher::Default => Platform::host()
                .compatible()
                .iter()
                .position(|p| p == platform),
        }
    }
}

impl fmt::Display for PlatformMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformMatcher::Default => write!(f, "{}", Platform::host()),
            PlatformMatcher::OnlyStrict(p) => write!(f, "{}", p),
            PlatformMatcher::All => f.write_str("all"),
        }
    }
}
