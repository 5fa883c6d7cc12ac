//! Version information for apigen.

/// apigen version from Cargo.toml
pub const APIGEN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build details reported at startup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub apigen: &'static str,
    /// Version of the schema canonicalizer crate linked in.
    pub schema_canon: &'static str,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            apigen: APIGEN_VERSION,
            schema_canon: schema_canon::VERSION,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_info_has_apigen_version() {
        let info = VersionInfo::new();
        assert_eq!(info.apigen, APIGEN_VERSION);
        assert!(!info.schema_canon.is_empty());
    }

    #[test]
    fn version_info_serializes() {
        let info = VersionInfo {
            apigen: "0.1.0",
            schema_canon: "0.1.0",
        };
        insta::assert_json_snapshot!(info, @r#"
        {
          "apigen": "0.1.0",
          "schema_canon": "0.1.0"
        }
        "#);
    }
}
