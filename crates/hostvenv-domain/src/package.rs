use std::fmt;

use serde::{Deserialize, Serialize};

use crate::version::TargetVersion;

/// Packages whose current major line dropped support for an older channel.
/// `(package, channel, constraint)`.
const CHANNEL_CONSTRAINTS: &[(&str, &str, &str)] = &[("numpy", "3.9", "<2.0")];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRequirement {
    pub name: String,
    pub constraint: Option<String>,
}

impl PackageRequirement {
    pub fn unconstrained(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: None,
        }
    }
}

impl fmt::Display for PackageRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(constraint) => write!(f, "{}{}", self.name, constraint),
            None => f.write_str(&self.name),
        }
    }
}

/// Picks the requirement to install for `name` on the target channel.
pub fn requirement_for(name: &str, target: &TargetVersion) -> PackageRequirement {
    let constraint = CHANNEL_CONSTRAINTS
        .iter()
        .find(|(package, channel, _)| package.eq_ignore_ascii_case(name) && *channel == target.as_str())
        .map(|(_, _, constraint)| (*constraint).to_string());
    PackageRequirement {
        name: name.to_string(),
        constraint,
    }
}

/// Reads `<name>-<version>` out of pip's `Successfully installed ...` line.
pub fn parse_installed_version<'a, I>(name: &str, lines: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let prefix = format!("{}-", name.to_ascii_lowercase());
    lines
        .into_iter()
        .filter_map(|line| line.trim().strip_prefix("Successfully installed "))
        .flat_map(str::split_whitespace)
        .find_map(|token| {
            let lowered = token.to_ascii_lowercase();
            let version = lowered.strip_prefix(prefix.as_str())?;
            version
                .starts_with(|c: char| c.is_ascii_digit())
                .then(|| token[prefix.len()..].to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numpy_is_held_below_two_on_3_9() {
        let target = TargetVersion::parse("3.9").unwrap();
        let requirement = requirement_for("numpy", &target);
        assert_eq!(requirement.constraint.as_deref(), Some("<2.0"));
        assert_eq!(requirement.to_string(), "numpy<2.0");
    }

    #[test]
    fn other_channels_install_unconstrained() {
        for channel in ["3.10", "3.11", "3.12"] {
            let target = TargetVersion::parse(channel).unwrap();
            let requirement = requirement_for("numpy", &target);
            assert_eq!(requirement, PackageRequirement::unconstrained("numpy"));
            assert_eq!(requirement.to_string(), "numpy");
        }
        let target = TargetVersion::parse("3.9").unwrap();
        assert_eq!(requirement_for("requests", &target).to_string(), "requests");
    }

    #[test]
    fn parses_version_from_pip_summary() {
        let output = [
            "Collecting numpy<2.0",
            "Installing collected packages: numpy",
            "Successfully installed numpy-1.26.4",
        ];
        assert_eq!(
            parse_installed_version("numpy", output),
            Some("1.26.4".to_string())
        );
    }

    #[test]
    fn parses_version_among_several_packages() {
        let output = ["Successfully installed certifi-2024.2.2 NumPy-1.24.0 urllib3-2.2.1"];
        assert_eq!(
            parse_installed_version("numpy", output),
            Some("1.24.0".to_string())
        );
    }

    #[test]
    fn missing_summary_is_not_an_error() {
        let output = ["Requirement already satisfied: numpy in ./venv/lib/python3.9/site-packages (1.26.4)"];
        assert_eq!(parse_installed_version("numpy", output), None);
        assert_eq!(parse_installed_version("numpy", ["Successfully installed numpy-extras-0.1"]), None);
    }
}
