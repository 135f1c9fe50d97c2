//! Configuration types for USDZ-to-GLB conversion.
//!
//! All conversion behaviour is controlled through [`ConverterConfig`], built
//! via its [`ConverterConfigBuilder`]. The config is immutable once built and
//! shared between concurrent requests behind an `Arc`.

use crate::error::ConvertError;
use std::path::PathBuf;

/// Configuration for the conversion service.
///
/// # Example
/// ```rust
/// use usdz2glb::ConverterConfig;
///
/// let config = ConverterConfig::builder()
///     .unpack_tool("/opt/usd/bin/usdcat")
///     .upload_bucket("converted-models")
///     .build()
///     .unwrap();
/// assert_eq!(config.input_extension, "usdz");
/// ```
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Extension every source file must carry (without the dot). Default: `usdz`.
    pub input_extension: String,

    /// Extension of the scene-description file produced by step 1. Default: `usd`.
    pub intermediate_extension: String,

    /// Extension of files produced by step 2 in upload mode. Default: `glb`.
    pub output_extension: String,

    /// Step 1 program, resolved through `PATH`. Default: `usdcat`.
    pub unpack_tool: String,

    /// Step 2 program, resolved through `PATH`. Default: `usd2gltf`.
    pub gltf_tool: String,

    /// Directory under which per-request workspaces are created.
    /// `None` uses the system temp directory.
    pub workspace_root: Option<PathBuf>,

    /// Overall timeout for fetching a remote source, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Bucket that receives results of inline uploads. Upload mode is
    /// unavailable while this is `None`.
    pub upload_bucket: Option<String>,

    /// Key prefix for inline-upload results. Default: `converted`.
    pub upload_prefix: String,

    /// Largest accepted inline upload, in bytes. Default: 256 MiB.
    pub max_upload_bytes: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            input_extension: "usdz".to_string(),
            intermediate_extension: "usd".to_string(),
            output_extension: "glb".to_string(),
            unpack_tool: "usdcat".to_string(),
            gltf_tool: "usd2gltf".to_string(),
            workspace_root: None,
            download_timeout_secs: 120,
            upload_bucket: None,
            upload_prefix: "converted".to_string(),
            max_upload_bytes: 256 * 1024 * 1024,
        }
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn input_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.input_extension = normalise_extension(ext.into());
        self
    }

    pub fn intermediate_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.intermediate_extension = normalise_extension(ext.into());
        self
    }

    pub fn output_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.output_extension = normalise_extension(ext.into());
        self
    }

    pub fn unpack_tool(mut self, program: impl Into<String>) -> Self {
        self.config.unpack_tool = program.into();
        self
    }

    pub fn gltf_tool(mut self, program: impl Into<String>) -> Self {
        self.config.gltf_tool = program.into();
        self
    }

    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = Some(root.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn upload_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.upload_bucket = Some(bucket.into());
        self
    }

    pub fn upload_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.upload_prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, ConvertError> {
        let c = &self.config;
        for (name, ext) in [
            ("input", &c.input_extension),
            ("intermediate", &c.intermediate_extension),
            ("output", &c.output_extension),
        ] {
            if ext.is_empty() || ext.contains('/') {
                return Err(ConvertError::Unexpected(format!(
                    "invalid {name} extension '{ext}'"
                )));
            }
        }
        if c.input_extension.eq_ignore_ascii_case(&c.intermediate_extension) {
            return Err(ConvertError::Unexpected(
                "input and intermediate extensions must differ".into(),
            ));
        }
        if c.unpack_tool.trim().is_empty() || c.gltf_tool.trim().is_empty() {
            return Err(ConvertError::Unexpected(
                "tool program names must not be empty".into(),
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(ConvertError::Unexpected(
                "download timeout must be ≥ 1s".into(),
            ));
        }
        if matches!(c.upload_bucket.as_deref(), Some(b) if b.trim().is_empty()) {
            return Err(ConvertError::Unexpected(
                "upload bucket must not be blank".into(),
            ));
        }
        Ok(self.config)
    }
}

fn normalise_extension(ext: String) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}
